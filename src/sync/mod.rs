//! The synchronization engine: participant inclusion, participant infos
//! and research data of recruitment lists.

use chrono::Duration;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::core::NotificationSender;
use crate::db::RecruitmentListDb;
use crate::study::StudyService;

pub mod criteria;
mod data_sync;
mod error;
mod maintenance;
pub mod mapping;
mod participant_infos;
mod participant_sync;
pub mod research_data;
pub mod response_parser;
pub mod run_context;

pub use data_sync::check_exclusion_conditions;
pub use error::SyncError;
pub use participant_infos::{last_submission_later_than, stringify_value};
pub use participant_sync::ImportResult;
pub use run_context::SyncRunContext;

pub const INCLUDED_BY_AUTO: &str = "auto";
pub const REASON_DELETED_IN_STUDY: &str = "deleted in study DB";
pub const REASON_EXCLUDED: &str = "excluded by exclusion conditions";

#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    /// A participant sync started less than this ago blocks a new one.
    pub participant_sync_guard: Duration,
    /// When set, a running data sync younger than this blocks a new one.
    pub data_sync_guard: Option<Duration>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            participant_sync_guard: Duration::minutes(5),
            data_sync_guard: Some(Duration::hours(3)),
        }
    }
}

#[derive(Clone)]
pub struct SyncService {
    db: Arc<dyn RecruitmentListDb>,
    study_service: Arc<dyn StudyService>,
    notifier: Arc<dyn NotificationSender>,
    settings: SyncSettings,
}

impl SyncService {
    pub fn new(
        db: Arc<dyn RecruitmentListDb>,
        study_service: Arc<dyn StudyService>,
        notifier: Arc<dyn NotificationSender>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            db,
            study_service,
            notifier,
            settings,
        }
    }

    pub fn db(&self) -> &dyn RecruitmentListDb {
        self.db.as_ref()
    }

    /// Runs a participant sync in a detached task. The outcome is only
    /// visible through the list's sync infos.
    pub fn spawn_participant_sync(&self, list_id: Uuid) {
        let service = self.clone();
        tokio::spawn(async move {
            match service.sync_participants(list_id).await {
                Ok(added) => info!("participant sync of {} added {} participants", list_id, added),
                Err(e) => error!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    "participant sync of {} failed",
                    list_id
                ),
            }
        });
    }

    /// Runs a data sync in a detached task.
    pub fn spawn_research_data_sync(&self, list_id: Uuid) {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.sync_research_data(list_id).await {
                error!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    "data sync of {} failed",
                    list_id
                );
            }
        });
    }
}
