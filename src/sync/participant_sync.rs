use chrono::Utc;
use futures_util::StreamExt;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::db::DbError;
use crate::models::recruitment_lists::{InclusionType, RecruitmentList};
use crate::study::{ParticipantStateFilter, PARTICIPANT_STUDY_STATUS_ACCOUNT_DELETED};
use crate::sync::criteria::CriteriaGroup;
use crate::sync::{SyncError, SyncService, INCLUDED_BY_AUTO};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportResult {
    Imported,
    AlreadyIncluded,
}

impl SyncService {
    /// Adds every study participant matching the inclusion criteria of an
    /// auto list. Returns the number of new members.
    #[instrument(skip(self))]
    pub async fn sync_participants(&self, list_id: Uuid) -> Result<usize, SyncError> {
        let list = self
            .db
            .get_recruitment_list(list_id)
            .await
            .map_err(SyncError::from_list_lookup)?;

        if list.participant_inclusion.inclusion_type != InclusionType::Auto {
            info!("list {} includes participants manually, skipping sync", list_id);
            self.db.finish_participant_sync(list_id).await?;
            return Ok(0);
        }

        if let Some(started_at) = self
            .db
            .get_sync_info(list_id)
            .await?
            .and_then(|info| info.participant_sync_started_at)
        {
            if Utc::now() - started_at < self.settings.participant_sync_guard {
                warn!("participant sync of {} started at {}, skipping", list_id, started_at);
                return Err(SyncError::Overlap(format!(
                    "participant sync of {} started less than {} minutes ago",
                    list_id,
                    self.settings.participant_sync_guard.num_minutes()
                )));
            }
        }

        let criteria = match list
            .participant_inclusion
            .auto_config
            .as_ref()
            .filter(|config| !config.criteria.is_empty())
        {
            Some(config) => Some(CriteriaGroup::from_json(&config.criteria)?),
            None => None,
        };

        self.db.start_participant_sync(list_id).await?;

        let added = self.include_matching_participants(&list, criteria.as_ref()).await;

        if added > 0 {
            self.notify_new_participants(&list, added).await;
        }

        self.db.finish_participant_sync(list_id).await?;
        info!("participant sync of {} finished, {} new participants", list_id, added);
        Ok(added)
    }

    async fn include_matching_participants(
        &self,
        list: &RecruitmentList,
        criteria: Option<&CriteriaGroup>,
    ) -> usize {
        let auto_config = list.participant_inclusion.auto_config.as_ref();
        let filter = ParticipantStateFilter {
            exclude_statuses: vec![PARTICIPANT_STUDY_STATUS_ACCOUNT_DELETED.to_string()],
            entered_after: auto_config.and_then(|c| c.start_date),
            entered_before: auto_config.and_then(|c| c.end_date),
        };

        let mut participants = self
            .study_service
            .stream_participants(list.study_key(), filter);
        let mut added = 0;

        while let Some(next) = participants.next().await {
            let study_participant = match next {
                Ok(p) => p,
                Err(e) => {
                    error!("could not read study participants of {}: {}", list.id, e);
                    break;
                }
            };
            let pid = study_participant.participant_id.as_str();

            match self.db.participant_exists(pid, list.id).await {
                Ok(true) => {
                    debug!("participant {} already included in {}", pid, list.id);
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    error!("could not check membership of {}: {}", pid, e);
                    break;
                }
            }

            if let Some(criteria) = criteria {
                if !criteria.evaluate(&study_participant) {
                    continue;
                }
            }

            match self.db.create_participant(pid, list.id, INCLUDED_BY_AUTO).await {
                Ok(_) => added += 1,
                Err(e) => {
                    error!("could not create participant {}: {}", pid, e);
                    break;
                }
            }
        }
        added
    }

    async fn notify_new_participants(&self, list: &RecruitmentList, added: usize) {
        let recipients = &list.participant_inclusion.notification_emails;
        if recipients.is_empty() {
            return;
        }
        let subject = format!("[{}] - New participants", list.name);
        let body = if added == 1 {
            format!(
                "One new participant has been added to recruitment list '{}'",
                list.name
            )
        } else {
            format!(
                "{} new participants have been added to recruitment list '{}'",
                added, list.name
            )
        };
        if let Err(e) = self.notifier.send(recipients, &subject, &body).await {
            error!("could not send new participants notification: {}", e);
        }
    }

    /// Manually adds a study participant to a list.
    #[instrument(skip(self))]
    pub async fn import_participant(
        &self,
        list_id: Uuid,
        participant_id: &str,
        imported_by: &str,
    ) -> Result<ImportResult, SyncError> {
        let list = self
            .db
            .get_recruitment_list(list_id)
            .await
            .map_err(SyncError::from_list_lookup)?;

        let study_participant = self
            .study_service
            .get_participant(list.study_key(), participant_id)
            .await?;
        if study_participant.is_account_deleted() {
            return Err(SyncError::Config(format!(
                "participant {} has been deleted",
                participant_id
            )));
        }

        if self.db.participant_exists(participant_id, list_id).await? {
            info!("participant {} already included in {}", participant_id, list_id);
            return Ok(ImportResult::AlreadyIncluded);
        }

        match self
            .db
            .create_participant(participant_id, list_id, imported_by)
            .await
        {
            Ok(_) => Ok(ImportResult::Imported),
            Err(DbError::Conflict(_)) => Ok(ImportResult::AlreadyIncluded),
            Err(e) => Err(e.into()),
        }
    }
}
