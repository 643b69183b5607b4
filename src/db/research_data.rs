use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::db::DbError;
use crate::models::research_data::{ResearchDataFilter, ResponseData, ResponseDataInfo};

const STREAM_BATCH_SIZE: i64 = 500;
// Postgres caps bind parameters per statement at 65535
const INSERT_CHUNK_SIZE: usize = 1000;

#[derive(sqlx::FromRow)]
struct ResponseDataTbl {
    seq: i64,
    id: Uuid,
    response_id: String,
    participant_id: String,
    recruitment_list_id: Uuid,
    survey_key: String,
    arrived_at: i64,
    response: Json<BTreeMap<String, serde_json::Value>>,
}

impl From<ResponseDataTbl> for ResponseData {
    fn from(row: ResponseDataTbl) -> Self {
        ResponseData {
            id: row.id,
            response_id: row.response_id,
            participant_id: row.participant_id,
            recruitment_list_id: row.recruitment_list_id,
            survey_key: row.survey_key,
            arrived_at: row.arrived_at,
            response: row.response.0,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ResponseDataInfoTbl {
    survey_key: String,
    count: i64,
    first_arrived_at: i64,
    last_arrived_at: i64,
}

// Bulk insert research data, existing responses are left untouched
pub async fn save_research_data(pool: &PgPool, data: &[ResponseData]) -> Result<u64, DbError> {
    let mut inserted = 0;

    for chunk in data.chunks(INSERT_CHUNK_SIZE) {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO research_data \
             (id, response_id, participant_id, recruitment_list_id, survey_key, arrived_at, response) ",
        );
        query.push_values(chunk, |mut row, item| {
            row.push_bind(item.id)
                .push_bind(item.response_id.clone())
                .push_bind(item.participant_id.clone())
                .push_bind(item.recruitment_list_id)
                .push_bind(item.survey_key.clone())
                .push_bind(item.arrived_at)
                .push_bind(Json(item.response.clone()));
        });
        query.push(" ON CONFLICT (participant_id, response_id, recruitment_list_id) DO NOTHING");

        let result = query.build().execute(pool).await?;
        inserted += result.rows_affected();
    }

    Ok(inserted)
}

pub async fn delete_research_data_by_list(pool: &PgPool, list_id: Uuid) -> Result<(), DbError> {
    sqlx::query("DELETE FROM research_data WHERE recruitment_list_id = $1")
        .bind(list_id)
        .execute(pool)
        .await?;
    Ok(())
}

fn push_research_data_filter(
    query: &mut QueryBuilder<'_, Postgres>,
    list_id: Uuid,
    filter: &ResearchDataFilter,
) {
    query.push(" WHERE recruitment_list_id = ").push_bind(list_id);
    if let Some(pid) = &filter.participant_id {
        query.push(" AND participant_id = ").push_bind(pid.clone());
    }
    if let Some(survey_key) = &filter.survey_key {
        query.push(" AND survey_key = ").push_bind(survey_key.clone());
    }
    if let Some(from) = filter.arrived_from {
        query.push(" AND arrived_at >= ").push_bind(from.timestamp());
    }
    if let Some(until) = filter.arrived_until {
        query.push(" AND arrived_at <= ").push_bind(until.timestamp());
    }
}

// Response counts per survey
pub async fn get_available_response_infos(
    pool: &PgPool,
    list_id: Uuid,
    filter: &ResearchDataFilter,
) -> Result<Vec<ResponseDataInfo>, DbError> {
    let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT survey_key, COUNT(*) AS count, MIN(arrived_at) AS first_arrived_at, \
         MAX(arrived_at) AS last_arrived_at FROM research_data",
    );
    push_research_data_filter(&mut query, list_id, filter);
    query.push(" GROUP BY survey_key ORDER BY survey_key");

    let rows = query
        .build_query_as::<ResponseDataInfoTbl>()
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| ResponseDataInfo {
            survey_key: row.survey_key,
            count: row.count,
            first_arrived_at: row.first_arrived_at,
            last_arrived_at: row.last_arrived_at,
        })
        .collect())
}

async fn fetch_research_data_batch(
    pool: &PgPool,
    list_id: Uuid,
    filter: &ResearchDataFilter,
    after_seq: i64,
) -> Result<Vec<ResponseDataTbl>, DbError> {
    let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT seq, id, response_id, participant_id, recruitment_list_id, survey_key, \
         arrived_at, response FROM research_data",
    );
    push_research_data_filter(&mut query, list_id, filter);
    query
        .push(" AND seq > ")
        .push_bind(after_seq)
        .push(" ORDER BY seq LIMIT ")
        .push_bind(STREAM_BATCH_SIZE);

    let rows = query
        .build_query_as::<ResponseDataTbl>()
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub fn stream_research_data(
    pool: PgPool,
    list_id: Uuid,
    filter: ResearchDataFilter,
) -> BoxStream<'static, Result<ResponseData, DbError>> {
    stream::unfold(Some(0_i64), move |cursor| {
        let pool = pool.clone();
        let filter = filter.clone();
        async move {
            let after_seq = cursor?;
            match fetch_research_data_batch(&pool, list_id, &filter, after_seq).await {
                Ok(rows) if rows.is_empty() => None,
                Ok(rows) => {
                    let next = if (rows.len() as i64) < STREAM_BATCH_SIZE {
                        None
                    } else {
                        rows.last().map(|row| row.seq)
                    };
                    let batch: Vec<Result<ResponseData, DbError>> =
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
