use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::DbError;
use crate::models::sync_infos::{SyncInfo, SyncStatus};

#[derive(sqlx::FromRow)]
struct SyncInfoTbl {
    recruitment_list_id: Uuid,
    participant_sync_status: String,
    participant_sync_started_at: Option<DateTime<Utc>>,
    data_sync_status: String,
    data_sync_started_at: Option<DateTime<Utc>>,
}

impl From<SyncInfoTbl> for SyncInfo {
    fn from(row: SyncInfoTbl) -> Self {
        SyncInfo {
            recruitment_list_id: row.recruitment_list_id,
            participant_sync_status: row.participant_sync_status.parse().unwrap_or_default(),
            participant_sync_started_at: row.participant_sync_started_at,
            data_sync_status: row.data_sync_status.parse().unwrap_or_default(),
            data_sync_started_at: row.data_sync_started_at,
        }
    }
}

pub async fn get_sync_info(pool: &PgPool, list_id: Uuid) -> Result<Option<SyncInfo>, DbError> {
    let row = sqlx::query_as::<_, SyncInfoTbl>(
        r#"
        SELECT recruitment_list_id, participant_sync_status, participant_sync_started_at,
               data_sync_status, data_sync_started_at
        FROM sync_infos
        WHERE recruitment_list_id = $1
        "#,
    )
    .bind(list_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(SyncInfo::from))
}

pub async fn start_participant_sync(pool: &PgPool, list_id: Uuid) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO sync_infos (recruitment_list_id, participant_sync_status, participant_sync_started_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (recruitment_list_id) DO UPDATE
        SET participant_sync_status = EXCLUDED.participant_sync_status,
            participant_sync_started_at = EXCLUDED.participant_sync_started_at
        "#,
    )
    .bind(list_id)
    .bind(SyncStatus::Running.as_str())
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn finish_participant_sync(pool: &PgPool, list_id: Uuid) -> Result<(), DbError> {
    sqlx::query("UPDATE sync_infos SET participant_sync_status = $2 WHERE recruitment_list_id = $1")
        .bind(list_id)
        .bind(SyncStatus::Idle.as_str())
        .execute(pool)
        .await?;
    Ok(())
}

// Also releases a run that never finished
pub async fn reset_participant_sync(pool: &PgPool, list_id: Uuid) -> Result<(), DbError> {
    sqlx::query(
        r#"
        UPDATE sync_infos SET participant_sync_status = $2, participant_sync_started_at = NULL
        WHERE recruitment_list_id = $1
        "#,
    )
    .bind(list_id)
    .bind(SyncStatus::Idle.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn start_data_sync(pool: &PgPool, list_id: Uuid) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO sync_infos (recruitment_list_id, data_sync_status, data_sync_started_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (recruitment_list_id) DO UPDATE
        SET data_sync_status = EXCLUDED.data_sync_status,
            data_sync_started_at = EXCLUDED.data_sync_started_at
        "#,
    )
    .bind(list_id)
    .bind(SyncStatus::Running.as_str())
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn finish_data_sync(pool: &PgPool, list_id: Uuid) -> Result<(), DbError> {
    sqlx::query("UPDATE sync_infos SET data_sync_status = $2 WHERE recruitment_list_id = $1")
        .bind(list_id)
        .bind(SyncStatus::Idle.as_str())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn reset_data_sync(pool: &PgPool, list_id: Uuid) -> Result<(), DbError> {
    sqlx::query(
        r#"
        UPDATE sync_infos SET data_sync_status = $2, data_sync_started_at = NULL
        WHERE recruitment_list_id = $1
        "#,
    )
    .bind(list_id)
    .bind(SyncStatus::Idle.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_sync_infos(pool: &PgPool, list_id: Uuid) -> Result<(), DbError> {
    sqlx::query("DELETE FROM sync_infos WHERE recruitment_list_id = $1")
        .bind(list_id)
        .execute(pool)
        .await?;
    Ok(())
}
