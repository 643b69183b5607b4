use actix_web::{get, post, web, HttpResponse, Responder};
use tracing::instrument;
use uuid::Uuid;

use crate::core::jwt_auth::JwtMiddleware;
use crate::core::{AppError, AppSuccessResponse};
use crate::models::permissions::ACTION_MANAGE_RECRUITMENT_LIST;
use crate::models::sync_infos::SyncInfo;
use crate::routes::require_list_permission;
use crate::sync::SyncService;

#[instrument(name = "Get Sync Infos", skip(service, auth))]
#[get("/{id}/sync-infos")]
pub async fn get_sync_infos(
    service: web::Data<SyncService>,
    auth: JwtMiddleware,
    path: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let list_id = path.into_inner();
    require_list_permission(&service, &auth, list_id, &[ACTION_MANAGE_RECRUITMENT_LIST]).await?;

    let sync_info = service
        .db()
        .get_sync_info(list_id)
        .await?
        .unwrap_or_else(|| SyncInfo::empty(list_id));

    Ok(HttpResponse::Ok().json(AppSuccessResponse::ok(sync_info, "Sync infos retrieved")))
}

#[instrument(name = "Sync Participants", skip(service, auth))]
#[post("/{id}/sync-participants")]
pub async fn sync_participants(
    service: web::Data<SyncService>,
    auth: JwtMiddleware,
    path: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let list_id = path.into_inner();
    require_list_permission(&service, &auth, list_id, &[ACTION_MANAGE_RECRUITMENT_LIST]).await?;

    tracing::info!(user_id = %auth.user_id, %list_id, "sync participants");
    service.spawn_participant_sync(list_id);

    Ok(HttpResponse::Ok().json(AppSuccessResponse::ok((), "participant sync started")))
}

#[instrument(name = "Sync Responses", skip(service, auth))]
#[post("/{id}/sync-responses")]
pub async fn sync_responses(
    service: web::Data<SyncService>,
    auth: JwtMiddleware,
    path: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let list_id = path.into_inner();
    require_list_permission(&service, &auth, list_id, &[ACTION_MANAGE_RECRUITMENT_LIST]).await?;

    tracing::info!(user_id = %auth.user_id, %list_id, "sync responses");
    service.spawn_research_data_sync(list_id);

    Ok(HttpResponse::Ok().json(AppSuccessResponse::ok((), "sync started")))
}

#[instrument(name = "Reset Participant Sync", skip(service, auth))]
#[post("/{id}/reset-participant-sync")]
pub async fn reset_participant_sync(
    service: web::Data<SyncService>,
    auth: JwtMiddleware,
    path: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let list_id = path.into_inner();
    require_list_permission(&service, &auth, list_id, &[ACTION_MANAGE_RECRUITMENT_LIST]).await?;

    service.reset_participant_sync(list_id).await.map_err(|e| {
        tracing::error!("Failed to reset participant sync: {:?}", e);
        AppError::from(e)
    })?;

    Ok(HttpResponse::Ok().json(AppSuccessResponse::ok((), "participant sync reset")))
}

#[instrument(name = "Reset Data Sync", skip(service, auth))]
#[post("/{id}/reset-data-sync")]
pub async fn reset_data_sync(
    service: web::Data<SyncService>,
    auth: JwtMiddleware,
    path: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let list_id = path.into_inner();
    require_list_permission(&service, &auth, list_id, &[ACTION_MANAGE_RECRUITMENT_LIST]).await?;

    service.reset_data_sync(list_id).await.map_err(|e| {
        tracing::error!("Failed to reset data sync: {:?}", e);
        AppError::from(e)
    })?;

    Ok(HttpResponse::Ok().json(AppSuccessResponse::ok((), "data sync reset")))
}
