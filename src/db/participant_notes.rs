use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::DbError;
use crate::models::participant_notes::ParticipantNote;

#[derive(sqlx::FromRow)]
struct ParticipantNoteTbl {
    id: Uuid,
    pid: Uuid,
    recruitment_list_id: Uuid,
    note: String,
    created_at: chrono::DateTime<Utc>,
    created_by_id: String,
    created_by: String,
}

pub async fn create_participant_note(
    pool: &PgPool,
    pid: Uuid,
    list_id: Uuid,
    note: &str,
    created_by_id: &str,
    created_by: &str,
) -> Result<ParticipantNote, DbError> {
    let participant_note = ParticipantNote {
        id: Uuid::new_v4(),
        pid,
        recruitment_list_id: list_id,
        note: note.to_string(),
        created_at: Utc::now(),
        created_by_id: created_by_id.to_string(),
        created_by: created_by.to_string(),
    };

    sqlx::query(
        r#"
        INSERT INTO participant_notes (id, pid, recruitment_list_id, note, created_at, created_by_id, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(participant_note.id)
    .bind(participant_note.pid)
    .bind(participant_note.recruitment_list_id)
    .bind(&participant_note.note)
    .bind(participant_note.created_at)
    .bind(&participant_note.created_by_id)
    .bind(&participant_note.created_by)
    .execute(pool)
    .await?;

    Ok(participant_note)
}

// Get notes of participant
pub async fn get_participant_notes(
    pool: &PgPool,
    pid: Uuid,
    list_id: Uuid,
) -> Result<Vec<ParticipantNote>, DbError> {
    let rows = sqlx::query_as::<_, ParticipantNoteTbl>(
        r#"
        SELECT id, pid, recruitment_list_id, note, created_at, created_by_id, created_by
        FROM participant_notes
        WHERE pid = $1 AND recruitment_list_id = $2
        ORDER BY created_at
        "#,
    )
    .bind(pid)
    .bind(list_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| ParticipantNote {
            id: row.id,
            pid: row.pid,
            recruitment_list_id: row.recruitment_list_id,
            note: row.note,
            created_at: row.created_at,
            created_by_id: row.created_by_id,
            created_by: row.created_by,
        })
        .collect())
}

pub async fn delete_participant_notes_by_list(pool: &PgPool, list_id: Uuid) -> Result<(), DbError> {
    sqlx::query("DELETE FROM participant_notes WHERE recruitment_list_id = $1")
        .bind(list_id)
        .execute(pool)
        .await?;
    Ok(())
}
