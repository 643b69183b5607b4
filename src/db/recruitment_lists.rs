use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::db::DbError;
use crate::models::recruitment_lists::{
    RecruitmentList, RecruitmentListFilter, RecruitmentListInfo, StudyAction,
};

#[derive(sqlx::FromRow)]
struct RecruitmentListTbl {
    document: Json<RecruitmentList>,
}

#[derive(sqlx::FromRow)]
struct RecruitmentListInfoTbl {
    id: Uuid,
    name: String,
    description: String,
    tags: Json<Vec<String>>,
    created_at: DateTime<Utc>,
}

// Create recruitment list
pub async fn create_recruitment_list(
    pool: &PgPool,
    mut list: RecruitmentList,
    created_by: &str,
) -> Result<RecruitmentList, DbError> {
    list.created_at = Utc::now();
    list.created_by = created_by.to_string();

    sqlx::query(
        r#"
        INSERT INTO recruitment_lists
            (id, name, description, created_at, created_by, tags, study_key, inclusion_type, document)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(list.id)
    .bind(&list.name)
    .bind(&list.description)
    .bind(list.created_at)
    .bind(&list.created_by)
    .bind(Json(&list.tags))
    .bind(list.study_key())
    .bind(list.participant_inclusion.inclusion_type.as_str())
    .bind(Json(&list))
    .execute(pool)
    .await?;

    Ok(list)
}

// Get recruitment list by ID
pub async fn get_recruitment_list_by_id(pool: &PgPool, id: Uuid) -> Result<RecruitmentList, DbError> {
    let row = sqlx::query_as::<_, RecruitmentListTbl>(
        "SELECT document FROM recruitment_lists WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(row.document.0),
        None => Err(DbError::NotFound(format!("recruitment list {}", id))),
    }
}

// Replace recruitment list
pub async fn save_recruitment_list(pool: &PgPool, list: &RecruitmentList) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"
        UPDATE recruitment_lists
        SET name = $2, description = $3, tags = $4, study_key = $5, inclusion_type = $6, document = $7
        WHERE id = $1
        "#,
    )
    .bind(list.id)
    .bind(&list.name)
    .bind(&list.description)
    .bind(Json(&list.tags))
    .bind(list.study_key())
    .bind(list.participant_inclusion.inclusion_type.as_str())
    .bind(Json(list))
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound(format!("recruitment list {}", list.id)));
    }
    Ok(())
}

pub async fn update_tags(pool: &PgPool, id: Uuid, tags: &[String]) -> Result<(), DbError> {
    let mut list = get_recruitment_list_by_id(pool, id).await?;
    list.tags = tags.to_vec();
    save_recruitment_list(pool, &list).await
}

pub async fn update_study_actions(
    pool: &PgPool,
    id: Uuid,
    study_actions: &[StudyAction],
) -> Result<(), DbError> {
    let mut list = get_recruitment_list_by_id(pool, id).await?;
    list.study_actions = study_actions.to_vec();
    save_recruitment_list(pool, &list).await
}

pub async fn get_recruitment_list_infos(pool: &PgPool) -> Result<Vec<RecruitmentListInfo>, DbError> {
    let rows = sqlx::query_as::<_, RecruitmentListInfoTbl>(
        r#"
        SELECT id, name, description, tags, created_at
        FROM recruitment_lists
        ORDER BY created_at
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| RecruitmentListInfo {
            id: row.id,
            name: row.name,
            description: row.description,
            tags: row.tags.0,
            created_at: row.created_at,
        })
        .collect())
}

// Find recruitment lists by study key / inclusion type
pub async fn find_recruitment_lists(
    pool: &PgPool,
    filter: &RecruitmentListFilter,
) -> Result<Vec<RecruitmentList>, DbError> {
    let mut query: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT document FROM recruitment_lists WHERE TRUE");
    if let Some(study_key) = &filter.study_key {
        query.push(" AND study_key = ").push_bind(study_key.clone());
    }
    if let Some(inclusion_type) = filter.inclusion_type {
        query
            .push(" AND inclusion_type = ")
            .push_bind(inclusion_type.as_str());
    }
    query.push(" ORDER BY created_at");

    let rows = query
        .build_query_as::<RecruitmentListTbl>()
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(|row| row.document.0).collect())
}

pub async fn delete_recruitment_list(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM recruitment_lists WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound(format!("recruitment list {}", id)));
    }
    Ok(())
}
