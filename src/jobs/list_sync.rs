use std::time::Duration;
use tracing::{error, info};

use crate::sync::{SyncError, SyncService};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncJobReport {
    pub lists: usize,
    pub participant_sync_failures: usize,
    pub data_sync_failures: usize,
}

/// Background job that syncs participants and research data of every list
pub fn start_list_sync_job(service: SyncService, interval_secs: u64) {
    if interval_secs == 0 {
        info!("Periodic list sync is disabled");
        return;
    }
    info!("Starting list sync background job, every {}s", interval_secs);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

        loop {
            interval.tick().await;

            if let Err(e) = run_sync_for_all_lists(&service).await {
                error!("Failed to run list sync: {}", e);
            }
        }
    });
}

/// Participant sync followed by data sync, list by list. A failing list
/// does not stop the others.
pub async fn run_sync_for_all_lists(service: &SyncService) -> Result<SyncJobReport, SyncError> {
    info!("Sync job started");
    let lists = service.db().get_recruitment_list_infos().await?;
    let mut report = SyncJobReport {
        lists: lists.len(),
        ..Default::default()
    };

    for list in lists {
        info!(id = %list.id, name = %list.name, "start sync for recruitment list");

        match service.sync_participants(list.id).await {
            Ok(added) => info!(id = %list.id, added, "participant sync finished"),
            Err(e) => {
                report.participant_sync_failures += 1;
                error!(id = %list.id, name = %list.name, "could not sync participants: {}", e);
            }
        }

        match service.sync_research_data(list.id).await {
            Ok(()) => info!(id = %list.id, "response sync finished"),
            Err(e) => {
                report.data_sync_failures += 1;
                error!(id = %list.id, name = %list.name, "could not sync research data: {}", e);
            }
        }
    }

    info!("Sync job finished");
    Ok(report)
}
