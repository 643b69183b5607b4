use actix_web::web::{scope, ServiceConfig};
use actix_web::Scope;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::jwt_auth::JwtMiddleware;
use crate::core::{is_authorized, AppError};
use crate::sync::SyncService;

use participants::{
    get_participant, get_participant_notes, get_participants, import_participant,
    update_participant_status,
};
use recruitment_lists::delete_recruitment_list;
use research_data::get_available_responses;
use sync::{
    get_sync_infos, reset_data_sync, reset_participant_sync, sync_participants, sync_responses,
};

mod health_check;
mod participants;
mod recruitment_lists;
mod research_data;
mod sync;

/// Fails with 403 unless the caller holds one of `actions` on the list.
async fn require_list_permission(
    service: &SyncService,
    auth: &JwtMiddleware,
    list_id: Uuid,
    actions: &[&str],
) -> Result<(), AppError> {
    let resource = list_id.to_string();
    if is_authorized(
        service.db().as_permission_store(),
        &auth.user_id,
        actions,
        &[resource.as_str()],
        auth.claims.is_admin,
    )
    .await
    {
        Ok(())
    } else {
        tracing::warn!(user_id = %auth.user_id, %list_id, "permission denied");
        Err(AppError::forbidden_error("permission denied"))
    }
}

/// Unparsable dates are logged and ignored.
fn parse_date_query(name: &str, value: Option<&String>) -> Option<DateTime<Utc>> {
    let value = value.filter(|v| !v.is_empty())?;
    match DateTime::parse_from_rfc3339(value) {
        Ok(date) => Some(date.with_timezone(&Utc)),
        Err(e) => {
            tracing::error!("could not parse {}: {}", name, e);
            None
        }
    }
}

fn recruitment_list_routes() -> Scope {
    scope("recruitment-lists")
        .service(delete_recruitment_list)
        // sync
        .service(get_sync_infos)
        .service(sync_participants)
        .service(sync_responses)
        .service(reset_participant_sync)
        .service(reset_data_sync)
        // participants
        .service(import_participant)
        .service(get_participants)
        .service(get_participant)
        .service(get_participant_notes)
        .service(update_participant_status)
        // research data
        .service(get_available_responses)
}

pub fn recruitment_list_api_routes(conf: &mut ServiceConfig) {
    conf.service(health_check::health_check)
        .service(scope("api/v1").service(recruitment_list_routes()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_queries() {
        let valid = "2024-03-01T10:00:00+02:00".to_string();
        let parsed = parse_date_query("since", Some(&valid)).unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-01T08:00:00+00:00");

        let garbage = "yesterday".to_string();
        assert!(parse_date_query("since", Some(&garbage)).is_none());
        assert!(parse_date_query("since", Some(&String::new())).is_none());
        assert!(parse_date_query("since", None).is_none());
    }
}
