use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::sync::{SyncError, SyncService};

impl SyncService {
    /// Drops all members of a list together with their notes and research
    /// data, so the next participant sync starts from scratch.
    #[instrument(skip(self))]
    pub async fn reset_participant_sync(&self, list_id: Uuid) -> Result<(), SyncError> {
        self.db.reset_participant_sync(list_id).await?;
        self.db.delete_participants_by_list(list_id).await?;
        self.db.delete_participant_notes_by_list(list_id).await?;
        self.db.delete_research_data_by_list(list_id).await?;
        self.db.reset_data_sync(list_id).await?;
        info!("participant sync of {} reset", list_id);
        Ok(())
    }

    /// Drops the research data of a list, the next data sync fetches the
    /// full history again.
    #[instrument(skip(self))]
    pub async fn reset_data_sync(&self, list_id: Uuid) -> Result<(), SyncError> {
        self.db.delete_research_data_by_list(list_id).await?;
        self.db.reset_data_sync(list_id).await?;
        info!("data sync of {} reset", list_id);
        Ok(())
    }

    /// Deletes a list and everything that belongs to it. Only the list
    /// itself has to go, the rest is cleaned up best effort.
    #[instrument(skip(self))]
    pub async fn delete_recruitment_list(&self, list_id: Uuid) -> Result<(), SyncError> {
        self.db
            .delete_recruitment_list(list_id)
            .await
            .map_err(SyncError::from_list_lookup)?;

        let resource_id = list_id.to_string();
        if let Err(e) = self.db.delete_permissions_by_resource(&resource_id).await {
            error!("could not delete permissions of {}: {}", list_id, e);
        }
        if let Err(e) = self.db.delete_participants_by_list(list_id).await {
            error!("could not delete participants of {}: {}", list_id, e);
        }
        if let Err(e) = self.db.delete_sync_infos(list_id).await {
            error!("could not delete sync infos of {}: {}", list_id, e);
        }
        if let Err(e) = self.db.delete_research_data_by_list(list_id).await {
            error!("could not delete research data of {}: {}", list_id, e);
        }
        if let Err(e) = self.db.delete_participant_notes_by_list(list_id).await {
            error!("could not delete participant notes of {}: {}", list_id, e);
        }
        info!("recruitment list {} deleted", list_id);
        Ok(())
    }
}
