use actix_web::{delete, web, HttpResponse, Responder};
use tracing::instrument;
use uuid::Uuid;

use crate::core::jwt_auth::JwtMiddleware;
use crate::core::{is_authorized, AppError, AppSuccessResponse};
use crate::models::permissions::ACTION_DELETE_RECRUITMENT_LIST;
use crate::sync::SyncService;

/// Deleting needs the global delete permission, not one scoped to the list.
#[instrument(name = "Delete Recruitment List", skip(service, auth))]
#[delete("/{id}")]
pub async fn delete_recruitment_list(
    service: web::Data<SyncService>,
    auth: JwtMiddleware,
    path: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let list_id = path.into_inner();
    if !is_authorized(
        service.db().as_permission_store(),
        &auth.user_id,
        &[ACTION_DELETE_RECRUITMENT_LIST],
        &[],
        auth.claims.is_admin,
    )
    .await
    {
        return Err(AppError::forbidden_error("permission denied"));
    }

    tracing::info!(user_id = %auth.user_id, %list_id, "delete recruitment list");
    service.delete_recruitment_list(list_id).await?;

    Ok(HttpResponse::Ok().json(AppSuccessResponse::ok((), "recruitment list deleted")))
}
