use chrono::{DateTime, TimeZone, Utc};
use futures_util::StreamExt;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::models::participants::{Participant, ParticipantInfos};
use crate::models::recruitment_lists::{RecruitmentList, ResearchDataDefinition};
use crate::models::sync_infos::SyncStatus;
use crate::study::{ResponseFilter, ResponseSortDirection};
use crate::sync::research_data::responses_to_research_data;
use crate::sync::run_context::ParserPurpose;
use crate::sync::{
    SyncError, SyncRunContext, SyncService, REASON_DELETED_IN_STUDY, REASON_EXCLUDED,
};

const RESPONSE_PAGE_SIZE: i64 = 1000;

/// Boundary used for lists that have never been synced.
fn initial_sync_boundary() -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).single()
}

impl SyncService {
    /// Refreshes infos and research data of every member of a list.
    #[instrument(skip(self))]
    pub async fn sync_research_data(&self, list_id: Uuid) -> Result<(), SyncError> {
        let list = self
            .db
            .get_recruitment_list(list_id)
            .await
            .map_err(SyncError::from_list_lookup)?;

        let sync_info = self.db.get_sync_info(list_id).await?;
        let last_sync = match &sync_info {
            Some(info) => info.data_sync_started_at,
            None => initial_sync_boundary(),
        };

        if let (Some(guard), Some(info)) = (self.settings.data_sync_guard, &sync_info) {
            if let (SyncStatus::Running, Some(started_at)) =
                (info.data_sync_status, info.data_sync_started_at)
            {
                if Utc::now() - started_at < guard {
                    warn!("data sync of {} is running since {}, skipping", list_id, started_at);
                    return Err(SyncError::Overlap(format!(
                        "data sync of {} is already running",
                        list_id
                    )));
                }
            }
        }

        self.db.start_data_sync(list_id).await?;

        let mut run = SyncRunContext::new();
        let mut members = self.db.stream_participants(list_id);
        while let Some(next) = members.next().await {
            let participant = match next {
                Ok(p) => p,
                Err(e) => {
                    error!("could not iterate participants of {}: {}", list_id, e);
                    break;
                }
            };
            if let Err(e) = self
                .sync_participant_data(&list, &participant, last_sync, &mut run)
                .await
            {
                error!(
                    participant_id = %participant.participant_id,
                    "stopping data sync of {}: {}",
                    list_id,
                    e
                );
                break;
            }
        }

        self.db.finish_data_sync(list_id).await?;
        info!("data sync of {} finished", list_id);
        Ok(())
    }

    /// Only storage failures are returned, study lookup failures skip the
    /// participant.
    async fn sync_participant_data(
        &self,
        list: &RecruitmentList,
        participant: &Participant,
        last_sync: Option<DateTime<Utc>>,
        run: &mut SyncRunContext,
    ) -> Result<(), SyncError> {
        if participant.is_deleted() {
            debug!("skip deleted participant {}", participant.participant_id);
            return Ok(());
        }

        let study_participant = match self
            .study_service
            .get_participant(list.study_key(), &participant.participant_id)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                error!(
                    "could not retrieve participant {} from study: {}",
                    participant.participant_id, e
                );
                return Ok(());
            }
        };

        if study_participant.is_account_deleted() {
            self.db
                .mark_participant_deleted(participant, REASON_DELETED_IN_STUDY)
                .await?;
            info!("participant {} was deleted in the study", participant.participant_id);
            return Ok(());
        }

        let infos = self
            .derive_participant_infos(list, participant, &study_participant, last_sync, run)
            .await?;

        if check_exclusion_conditions(list, &infos) {
            self.db
                .mark_participant_deleted(participant, REASON_EXCLUDED)
                .await?;
            info!(
                "excluded participant {} from {}",
                participant.participant_id, list.id
            );
            return Ok(());
        }

        for definition in &list.participant_data.research_data {
            self.sync_new_responses(list, participant, definition, last_sync, run)
                .await;
        }
        Ok(())
    }

    async fn sync_new_responses(
        &self,
        list: &RecruitmentList,
        participant: &Participant,
        definition: &ResearchDataDefinition,
        last_sync: Option<DateTime<Utc>>,
        run: &mut SyncRunContext,
    ) {
        let filter = response_window(definition, participant, last_sync, Utc::now());

        let mut page = 1;
        loop {
            let responses = match self
                .study_service
                .get_responses(
                    list.study_key(),
                    &filter,
                    ResponseSortDirection::Asc,
                    page,
                    RESPONSE_PAGE_SIZE,
                )
                .await
            {
                Ok(responses) => responses,
                Err(e) => {
                    error!("could not get responses for {}: {}", definition.survey_key, e);
                    return;
                }
            };
            if responses.is_empty() {
                if page == 1 {
                    debug!(
                        participant_id = %participant.participant_id,
                        survey_key = %definition.survey_key,
                        "no responses found"
                    );
                }
                return;
            }
            let last_page = (responses.len() as i64) < RESPONSE_PAGE_SIZE;

            let parser = match run
                .response_parser(
                    self.study_service.as_ref(),
                    list.study_key(),
                    &definition.survey_key,
                    &definition.excluded_columns,
                    ParserPurpose::ResearchData,
                )
                .await
            {
                Ok(parser) => parser,
                Err(e) => {
                    error!(
                        "failed to create response parser for {}: {}",
                        definition.survey_key, e
                    );
                    return;
                }
            };

            let research_data =
                responses_to_research_data(parser, &responses, list.id, &participant.participant_id);
            if !research_data.is_empty() {
                match self.db.save_research_data(&research_data).await {
                    Ok(saved) => debug!(
                        "stored {} new responses of {} for {}",
                        saved, definition.survey_key, participant.participant_id
                    ),
                    Err(e) => {
                        error!("could not save research data: {}", e);
                        return;
                    }
                }
            }

            if last_page {
                return;
            }
            page += 1;
        }
    }
}

/// Arrival window of responses to fetch for one research data definition.
/// Participants included before the last sync only need what arrived since.
pub(crate) fn response_window(
    definition: &ResearchDataDefinition,
    participant: &Participant,
    last_sync: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> ResponseFilter {
    let until = definition.end_date.unwrap_or(now).timestamp();
    let mut since = definition.start_date.map(|d| d.timestamp()).unwrap_or(0);

    let last_sync_started = last_sync.map(|t| t.timestamp()).unwrap_or(0);
    if participant.included_at.timestamp() <= last_sync_started {
        since = since.max(last_sync_started);
    }

    ResponseFilter {
        participant_id: participant.participant_id.clone(),
        survey_key: definition.survey_key.clone(),
        arrived_from: Some(since),
        arrived_until: Some(until),
    }
}

/// True if any exclusion condition matches the infos exactly.
pub fn check_exclusion_conditions(list: &RecruitmentList, infos: &ParticipantInfos) -> bool {
    list.exclusion_conditions
        .iter()
        .any(|condition| infos.get(&condition.key) == Some(&condition.value))
}
