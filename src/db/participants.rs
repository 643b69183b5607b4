use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::db::DbError;
use crate::models::pagination::{prep_pagination_infos, PaginationInfos};
use crate::models::participant_notes::SYSTEM_AUTHOR;
use crate::models::participants::{
    Participant, ParticipantFilter, ParticipantInfos, ParticipantSort,
};

const STREAM_BATCH_SIZE: i64 = 200;

const PARTICIPANT_COLUMNS: &str = "seq, id, participant_id, recruitment_list_id, included_at, \
     included_by, deleted_at, recruitment_status, infos";

#[derive(sqlx::FromRow)]
struct ParticipantTbl {
    seq: i64,
    id: Uuid,
    participant_id: String,
    recruitment_list_id: Uuid,
    included_at: DateTime<Utc>,
    included_by: String,
    deleted_at: Option<DateTime<Utc>>,
    recruitment_status: String,
    infos: Json<ParticipantInfos>,
}

impl From<ParticipantTbl> for Participant {
    fn from(row: ParticipantTbl) -> Self {
        Participant {
            id: row.id,
            participant_id: row.participant_id,
            recruitment_list_id: row.recruitment_list_id,
            included_at: row.included_at,
            included_by: row.included_by,
            deleted_at: row.deleted_at,
            recruitment_status: row.recruitment_status,
            infos: row.infos.0,
        }
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(e) if e.code().as_deref() == Some("23505"))
}

pub async fn participant_exists(
    pool: &PgPool,
    participant_id: &str,
    list_id: Uuid,
) -> Result<bool, DbError> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM participants WHERE participant_id = $1 AND recruitment_list_id = $2
        )
        "#,
    )
    .bind(participant_id)
    .bind(list_id)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

// Create participant
pub async fn create_participant(
    pool: &PgPool,
    participant_id: &str,
    list_id: Uuid,
    included_by: &str,
) -> Result<Participant, DbError> {
    let participant = Participant::new(participant_id, list_id, included_by);

    sqlx::query(
        r#"
        INSERT INTO participants
            (id, participant_id, recruitment_list_id, included_at, included_by, recruitment_status, infos)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(participant.id)
    .bind(&participant.participant_id)
    .bind(participant.recruitment_list_id)
    .bind(participant.included_at)
    .bind(&participant.included_by)
    .bind(&participant.recruitment_status)
    .bind(Json(&participant.infos))
    .execute(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            DbError::Conflict(format!(
                "participant {} is already in list {}",
                participant_id, list_id
            ))
        } else {
            DbError::Sqlx(e)
        }
    })?;

    Ok(participant)
}

// Get participant by ID
pub async fn get_participant_by_id(
    pool: &PgPool,
    id: Uuid,
    list_id: Uuid,
) -> Result<Participant, DbError> {
    let row = sqlx::query_as::<_, ParticipantTbl>(&format!(
        "SELECT {} FROM participants WHERE id = $1 AND recruitment_list_id = $2",
        PARTICIPANT_COLUMNS
    ))
    .bind(id)
    .bind(list_id)
    .fetch_optional(pool)
    .await?;

    row.map(Participant::from)
        .ok_or_else(|| DbError::NotFound(format!("participant {}", id)))
}

pub async fn update_participant_status(
    pool: &PgPool,
    id: Uuid,
    list_id: Uuid,
    status: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE participants SET recruitment_status = $3 WHERE id = $1 AND recruitment_list_id = $2",
    )
    .bind(id)
    .bind(list_id)
    .bind(status)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound(format!("participant {}", id)));
    }
    Ok(())
}

pub async fn update_participant_infos(
    pool: &PgPool,
    participant_id: &str,
    list_id: Uuid,
    infos: &ParticipantInfos,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE participants SET infos = $3 WHERE participant_id = $1 AND recruitment_list_id = $2",
    )
    .bind(participant_id)
    .bind(list_id)
    .bind(Json(infos))
    .execute(pool)
    .await?;

    Ok(())
}

// Soft delete participant, drop its research data and leave a note
pub async fn mark_participant_deleted(
    pool: &PgPool,
    participant: &Participant,
    reason: &str,
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE participants SET deleted_at = $3, infos = '{}'::jsonb
        WHERE participant_id = $1 AND recruitment_list_id = $2
        "#,
    )
    .bind(&participant.participant_id)
    .bind(participant.recruitment_list_id)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM research_data WHERE participant_id = $1 AND recruitment_list_id = $2")
        .bind(&participant.participant_id)
        .bind(participant.recruitment_list_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO participant_notes (id, pid, recruitment_list_id, note, created_at, created_by_id, created_by)
        VALUES ($1, $2, $3, $4, $5, '', $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(participant.id)
    .bind(participant.recruitment_list_id)
    .bind(format!("Participant deleted: {}", reason))
    .bind(Utc::now())
    .bind(SYSTEM_AUTHOR)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

async fn fetch_participant_batch(
    pool: &PgPool,
    list_id: Uuid,
    after_seq: i64,
) -> Result<Vec<ParticipantTbl>, DbError> {
    let rows = sqlx::query_as::<_, ParticipantTbl>(&format!(
        r#"
        SELECT {} FROM participants
        WHERE recruitment_list_id = $1 AND seq > $2
        ORDER BY seq
        LIMIT $3
        "#,
        PARTICIPANT_COLUMNS
    ))
    .bind(list_id)
    .bind(after_seq)
    .bind(STREAM_BATCH_SIZE)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Keyset paged walk over the members of a list. Rows created while the
/// stream is consumed are picked up once the walk reaches them.
pub fn stream_participants(
    pool: PgPool,
    list_id: Uuid,
) -> BoxStream<'static, Result<Participant, DbError>> {
    stream::unfold(Some(0_i64), move |cursor| {
        let pool = pool.clone();
        async move {
            let after_seq = cursor?;
            match fetch_participant_batch(&pool, list_id, after_seq).await {
                Ok(rows) if rows.is_empty() => None,
                Ok(rows) => {
                    let next = if (rows.len() as i64) < STREAM_BATCH_SIZE {
                        None
                    } else {
                        rows.last().map(|row| row.seq)
                    };
                    let batch: Vec<Result<Participant, DbError>> =
                        rows.into_iter().map(|row| Ok(row.into())).collect();
                    Some((batch, next))
                }
                Err(e) => Some((vec![Err(e)], None)),
            }
        }
    })
    .flat_map(stream::iter)
    .boxed()
}

pub async fn delete_participants_by_list(pool: &PgPool, list_id: Uuid) -> Result<(), DbError> {
    sqlx::query("DELETE FROM participants WHERE recruitment_list_id = $1")
        .bind(list_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn count_participants(pool: &PgPool, list_id: Uuid) -> Result<i64, DbError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM participants WHERE recruitment_list_id = $1")
            .bind(list_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

fn push_participant_filter(
    query: &mut QueryBuilder<'_, Postgres>,
    list_id: Uuid,
    filter: &ParticipantFilter,
) {
    query.push(" WHERE recruitment_list_id = ").push_bind(list_id);
    if let Some(since) = filter.included_since {
        query.push(" AND included_at >= ").push_bind(since);
    }
    if let Some(until) = filter.included_until {
        query.push(" AND included_at <= ").push_bind(until);
    }
    if let Some(pid) = &filter.participant_id {
        query.push(" AND participant_id = ").push_bind(pid.clone());
    }
    if let Some(status) = &filter.recruitment_status {
        query.push(" AND recruitment_status = ").push_bind(status.clone());
    }
}

// Get paginated participants of a list
pub async fn get_participants_page(
    pool: &PgPool,
    list_id: Uuid,
    page: i64,
    limit: i64,
    filter: &ParticipantFilter,
    sort: ParticipantSort,
) -> Result<(Vec<Participant>, PaginationInfos), DbError> {
    let mut count_query: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT COUNT(*) FROM participants");
    push_participant_filter(&mut count_query, list_id, filter);
    let total: i64 = count_query
        .build_query_scalar()
        .fetch_one(pool)
        .await?;

    let pagination = prep_pagination_infos(total, page, limit);

    let mut query: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("SELECT {} FROM participants", PARTICIPANT_COLUMNS));
    push_participant_filter(&mut query, list_id, filter);
    // sort column comes from a fixed whitelist
    query.push(format!(
        " ORDER BY {} {}, seq",
        sort.field.column(),
        sort.order.as_sql()
    ));
    query
        .push(" LIMIT ")
        .push_bind(pagination.page_size)
        .push(" OFFSET ")
        .push_bind(pagination.offset());

    let rows = query
        .build_query_as::<ParticipantTbl>()
        .fetch_all(pool)
        .await?;

    Ok((rows.into_iter().map(Participant::from).collect(), pagination))
}
