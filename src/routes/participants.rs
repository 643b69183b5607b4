use actix_web::{get, post, web, HttpResponse, Responder};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::core::jwt_auth::JwtMiddleware;
use crate::core::{AppError, AppSuccessResponse};
use crate::models::pagination::PaginationQuery;
use crate::models::participants::{
    ImportParticipantRequest, ParticipantFilter, ParticipantSort, ParticipantSortField,
    ParticipantsQuery, SortOrder, UpdateParticipantStatusRequest,
};
use crate::models::permissions::{
    ACTION_ACCESS_RECRUITMENT_LIST, ACTION_DELETE_RECRUITMENT_LIST, ACTION_MANAGE_RECRUITMENT_LIST,
};
use crate::routes::{parse_date_query, require_list_permission};
use crate::sync::{ImportResult, SyncService};

const ACCESS_ACTIONS: [&str; 3] = [
    ACTION_ACCESS_RECRUITMENT_LIST,
    ACTION_MANAGE_RECRUITMENT_LIST,
    ACTION_DELETE_RECRUITMENT_LIST,
];

#[instrument(name = "Import Participant", skip(service, auth))]
#[post("/{id}/import-participant")]
pub async fn import_participant(
    service: web::Data<SyncService>,
    auth: JwtMiddleware,
    path: web::Path<Uuid>,
    request: web::Json<ImportParticipantRequest>,
) -> Result<impl Responder, AppError> {
    let list_id = path.into_inner();
    require_list_permission(&service, &auth, list_id, &[ACTION_MANAGE_RECRUITMENT_LIST]).await?;

    request.validate().map_err(AppError::bad_request)?;

    let message = match service
        .import_participant(list_id, &request.participant_id, &auth.user_id)
        .await?
    {
        ImportResult::Imported => "participant imported",
        ImportResult::AlreadyIncluded => "participant already included",
    };

    Ok(HttpResponse::Ok().json(AppSuccessResponse::ok((), message)))
}

#[instrument(name = "Get Participants", skip(service, auth))]
#[get("/{id}/participants")]
pub async fn get_participants(
    service: web::Data<SyncService>,
    auth: JwtMiddleware,
    path: web::Path<Uuid>,
    query: web::Query<ParticipantsQuery>,
) -> Result<impl Responder, AppError> {
    let list_id = path.into_inner();
    require_list_permission(&service, &auth, list_id, &ACCESS_ACTIONS).await?;

    let pagination = PaginationQuery::new(query.page, query.limit);
    let filter = ParticipantFilter {
        included_since: parse_date_query("includedSince", query.included_since.as_ref()),
        included_until: parse_date_query("includedUntil", query.included_until.as_ref()),
        participant_id: query.participant_id.clone().filter(|v| !v.is_empty()),
        recruitment_status: query.recruitment_status.clone().filter(|v| !v.is_empty()),
    };
    let sort = ParticipantSort {
        field: query
            .sort_by
            .as_deref()
            .map(ParticipantSortField::parse)
            .unwrap_or_default(),
        order: query
            .sort_dir
            .as_deref()
            .map(SortOrder::parse)
            .unwrap_or_default(),
    };

    let (participants, pagination_infos) = service
        .db()
        .get_participants_page(list_id, pagination.page, pagination.limit, &filter, sort)
        .await?;

    let mut response = AppSuccessResponse::ok(participants, "Participants retrieved");
    response.pagination = Some(pagination_infos);
    Ok(HttpResponse::Ok().json(response))
}

#[instrument(name = "Get Participant", skip(service, auth))]
#[get("/{id}/participants/{participant_id}")]
pub async fn get_participant(
    service: web::Data<SyncService>,
    auth: JwtMiddleware,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<impl Responder, AppError> {
    let (list_id, participant_id) = path.into_inner();
    require_list_permission(&service, &auth, list_id, &ACCESS_ACTIONS).await?;

    let participant = service.db().get_participant(participant_id, list_id).await?;

    Ok(HttpResponse::Ok().json(AppSuccessResponse::ok(participant, "Participant retrieved")))
}

#[instrument(name = "Get Participant Notes", skip(service, auth))]
#[get("/{id}/participants/{participant_id}/notes")]
pub async fn get_participant_notes(
    service: web::Data<SyncService>,
    auth: JwtMiddleware,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<impl Responder, AppError> {
    let (list_id, participant_id) = path.into_inner();
    require_list_permission(&service, &auth, list_id, &ACCESS_ACTIONS).await?;

    let notes = service
        .db()
        .get_participant_notes(participant_id, list_id)
        .await?;

    Ok(HttpResponse::Ok().json(AppSuccessResponse::ok(notes, "Participant notes retrieved")))
}

#[instrument(name = "Update Participant Status", skip(service, auth))]
#[post("/{id}/participants/{participant_id}/status")]
pub async fn update_participant_status(
    service: web::Data<SyncService>,
    auth: JwtMiddleware,
    path: web::Path<(Uuid, Uuid)>,
    request: web::Json<UpdateParticipantStatusRequest>,
) -> Result<impl Responder, AppError> {
    let (list_id, participant_id) = path.into_inner();
    require_list_permission(&service, &auth, list_id, &ACCESS_ACTIONS).await?;
    request.validate().map_err(AppError::bad_request)?;

    service
        .db()
        .update_participant_status(participant_id, list_id, &request.status)
        .await?;

    Ok(HttpResponse::Ok().json(AppSuccessResponse::ok((), "participant status updated")))
}
