use actix_web::{get, web, HttpResponse, Responder};
use tracing::instrument;
use uuid::Uuid;

use crate::core::jwt_auth::JwtMiddleware;
use crate::core::{AppError, AppSuccessResponse};
use crate::models::permissions::{
    ACTION_ACCESS_RECRUITMENT_LIST, ACTION_DELETE_RECRUITMENT_LIST, ACTION_MANAGE_RECRUITMENT_LIST,
};
use crate::models::research_data::{AvailableResponsesQuery, ResearchDataFilter};
use crate::routes::{parse_date_query, require_list_permission};
use crate::sync::SyncService;

#[instrument(name = "Get Available Responses", skip(service, auth))]
#[get("/{id}/available-responses")]
pub async fn get_available_responses(
    service: web::Data<SyncService>,
    auth: JwtMiddleware,
    path: web::Path<Uuid>,
    query: web::Query<AvailableResponsesQuery>,
) -> Result<impl Responder, AppError> {
    let list_id = path.into_inner();
    require_list_permission(
        &service,
        &auth,
        list_id,
        &[
            ACTION_ACCESS_RECRUITMENT_LIST,
            ACTION_MANAGE_RECRUITMENT_LIST,
            ACTION_DELETE_RECRUITMENT_LIST,
        ],
    )
    .await?;

    let filter = ResearchDataFilter {
        participant_id: query.pid.clone().filter(|pid| !pid.is_empty()),
        survey_key: None,
        arrived_from: parse_date_query("startDate", query.start_date.as_ref()),
        arrived_until: parse_date_query("endDate", query.end_date.as_ref()),
    };

    let infos = service
        .db()
        .get_available_response_infos(list_id, &filter)
        .await?;

    Ok(HttpResponse::Ok().json(AppSuccessResponse::ok(infos, "Available responses retrieved")))
}
