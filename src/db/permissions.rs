use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::db::DbError;
use crate::models::permissions::Permission;

#[derive(sqlx::FromRow)]
struct PermissionTbl {
    id: Uuid,
    user_id: String,
    action: String,
    resource_id: String,
    limiter: Json<Vec<BTreeMap<String, String>>>,
    created_at: DateTime<Utc>,
    created_by: String,
}

impl From<PermissionTbl> for Permission {
    fn from(row: PermissionTbl) -> Self {
        Permission {
            id: row.id,
            user_id: row.user_id,
            resource_id: row.resource_id,
            action: row.action,
            limiter: row.limiter.0,
            created_at: row.created_at,
            created_by: row.created_by,
        }
    }
}

const SELECT_PERMISSIONS: &str =
    "SELECT id, user_id, action, resource_id, limiter, created_at, created_by FROM permissions";

pub async fn create_permission(
    pool: &PgPool,
    user_id: &str,
    action: &str,
    resource_id: &str,
    created_by: &str,
    limiter: Vec<BTreeMap<String, String>>,
) -> Result<Permission, DbError> {
    let permission = Permission {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        resource_id: resource_id.to_string(),
        action: action.to_string(),
        limiter,
        created_at: Utc::now(),
        created_by: created_by.to_string(),
    };

    sqlx::query(
        r#"
        INSERT INTO permissions (id, user_id, action, resource_id, limiter, created_at, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(permission.id)
    .bind(&permission.user_id)
    .bind(&permission.action)
    .bind(&permission.resource_id)
    .bind(Json(&permission.limiter))
    .bind(permission.created_at)
    .bind(&permission.created_by)
    .execute(pool)
    .await?;

    Ok(permission)
}

pub async fn get_permissions_by_user(
    pool: &PgPool,
    user_id: &str,
) -> Result<Vec<Permission>, DbError> {
    let rows = sqlx::query_as::<_, PermissionTbl>(&format!("{} WHERE user_id = $1", SELECT_PERMISSIONS))
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(Permission::from).collect())
}

pub async fn get_permissions_by_resource(
    pool: &PgPool,
    resource_id: &str,
) -> Result<Vec<Permission>, DbError> {
    let rows =
        sqlx::query_as::<_, PermissionTbl>(&format!("{} WHERE resource_id = $1", SELECT_PERMISSIONS))
            .bind(resource_id)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(Permission::from).collect())
}

pub async fn get_specific_permissions(
    pool: &PgPool,
    user_id: &str,
    actions: &[&str],
    resources: &[&str],
) -> Result<Vec<Permission>, DbError> {
    let mut query: QueryBuilder<Postgres> = QueryBuilder::new(SELECT_PERMISSIONS);
    query.push(" WHERE user_id = ").push_bind(user_id.to_string());
    if !actions.is_empty() {
        let actions: Vec<String> = actions.iter().map(|a| a.to_string()).collect();
        query.push(" AND action = ANY(").push_bind(actions).push(")");
    }
    if !resources.is_empty() {
        let resources: Vec<String> = resources.iter().map(|r| r.to_string()).collect();
        query
            .push(" AND resource_id = ANY(")
            .push_bind(resources)
            .push(")");
    }

    let rows = query
        .build_query_as::<PermissionTbl>()
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(Permission::from).collect())
}

pub async fn delete_permission(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    sqlx::query("DELETE FROM permissions WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete_permissions_by_resource(pool: &PgPool, resource_id: &str) -> Result<(), DbError> {
    sqlx::query("DELETE FROM permissions WHERE resource_id = $1")
        .bind(resource_id)
        .execute(pool)
        .await?;
    Ok(())
}
