use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error};

use crate::models::participants::{Participant, ParticipantInfos};
use crate::models::recruitment_lists::{
    MappingType, ParticipantInfoDefinition, RecruitmentList, SourceType,
};
use crate::study::{ResponseFilter, ResponseItem, ResponseSortDirection, StudyParticipant, SurveyResponse};
use crate::sync::mapping::apply_mapping;
use crate::sync::research_data::responses_to_research_data;
use crate::sync::response_parser::FlatResponse;
use crate::sync::run_context::ParserPurpose;
use crate::sync::{SyncError, SyncRunContext, SyncService};

/// Lookups done while deriving the infos of one participant.
#[derive(Default)]
struct DerivationCache {
    confidential_id: Option<String>,
    confidential_responses: HashMap<String, Option<SurveyResponse>>,
    last_responses: HashMap<String, FlatResponse>,
}

impl SyncService {
    /// Recomputes the infos of a participant from the list's definitions,
    /// stores them and returns the stored map.
    pub async fn derive_participant_infos(
        &self,
        list: &RecruitmentList,
        participant: &Participant,
        study_participant: &StudyParticipant,
        last_sync: Option<DateTime<Utc>>,
        run: &mut SyncRunContext,
    ) -> Result<ParticipantInfos, SyncError> {
        let definitions = &list.participant_data.participant_infos;
        let mut infos: ParticipantInfos = participant
            .infos
            .iter()
            .filter(|(label, _)| definitions.iter().any(|d| &d.label == *label))
            .map(|(label, value)| (label.clone(), value.clone()))
            .collect();

        let mut cache = DerivationCache::default();

        for definition in definitions {
            if definition.source_key.is_empty() {
                error!(list_id = %list.id, label = %definition.label, "source key is empty");
                continue;
            }
            if definition.label.is_empty() {
                error!(list_id = %list.id, source_key = %definition.source_key, "label is empty");
                continue;
            }

            let value = match definition.source_type {
                SourceType::FlagValue => {
                    let raw = study_participant
                        .flags
                        .get(&definition.source_key)
                        .map(String::as_str)
                        .unwrap_or_default();
                    Some(apply_mapping(definition, raw))
                }
                SourceType::ConfidentialData => {
                    self.confidential_value(list, participant, definition, run, &mut cache)
                        .await
                }
                SourceType::ResponseData => {
                    self.response_value(
                        list,
                        participant,
                        study_participant,
                        definition,
                        last_sync,
                        run,
                        &mut cache,
                    )
                    .await
                }
                SourceType::Unknown => {
                    error!(label = %definition.label, "unknown source type");
                    None
                }
            };

            if let Some(value) = value {
                infos.insert(definition.label.clone(), value);
            }
        }

        self.db
            .update_participant_infos(&participant.participant_id, list.id, &infos)
            .await?;
        Ok(infos)
    }

    async fn confidential_value(
        &self,
        list: &RecruitmentList,
        participant: &Participant,
        definition: &ParticipantInfoDefinition,
        run: &mut SyncRunContext,
        cache: &mut DerivationCache,
    ) -> Option<String> {
        let Some((item_key, slot_path)) = definition.source_key.split_once('-') else {
            error!(source_key = %definition.source_key, "invalid confidential data source key");
            return None;
        };

        if !cache.confidential_responses.contains_key(item_key) {
            let newest = self
                .fetch_confidential_response(list, participant, item_key, run, cache)
                .await;
            cache
                .confidential_responses
                .insert(item_key.to_string(), newest);
        }
        let response = cache.confidential_responses.get(item_key)?.as_ref()?;

        let Some(answer) = response
            .item_response(item_key)
            .and_then(|r| r.response.as_ref())
        else {
            debug!(item_key, "no item response found");
            return None;
        };

        let value = extract_slot_value(answer, slot_path, definition);
        if value.is_none() {
            debug!(slot_path, "no slot value found");
        }
        value
    }

    async fn fetch_confidential_response(
        &self,
        list: &RecruitmentList,
        participant: &Participant,
        item_key: &str,
        run: &mut SyncRunContext,
        cache: &mut DerivationCache,
    ) -> Option<SurveyResponse> {
        if cache.confidential_id.is_none() {
            let study = match run.study(self.study_service.as_ref(), list.study_key()).await {
                Ok(study) => study,
                Err(e) => {
                    error!("could not get study {}: {}", list.study_key(), e);
                    return None;
                }
            };
            match self
                .study_service
                .resolve_confidential_id(&participant.participant_id, study)
            {
                Ok(id) => cache.confidential_id = Some(id),
                Err(e) => {
                    error!("failed to get confidential participant id: {}", e);
                    return None;
                }
            }
        }
        let confidential_id = cache.confidential_id.as_deref()?;

        let responses = match self
            .study_service
            .find_confidential_responses(list.study_key(), confidential_id, item_key)
            .await
        {
            Ok(responses) => responses,
            Err(e) => {
                debug!("could not get confidential data: {}", e);
                return None;
            }
        };

        // Newest first, earlier entries win ties.
        let mut newest: Option<SurveyResponse> = None;
        for response in responses {
            if newest
                .as_ref()
                .map_or(true, |current| response.arrived_at > current.arrived_at)
            {
                newest = Some(response);
            }
        }
        if newest.is_none() {
            debug!(item_key, "no confidential data found");
        }
        newest
    }

    #[allow(clippy::too_many_arguments)]
    async fn response_value(
        &self,
        list: &RecruitmentList,
        participant: &Participant,
        study_participant: &StudyParticipant,
        definition: &ParticipantInfoDefinition,
        last_sync: Option<DateTime<Utc>>,
        run: &mut SyncRunContext,
        cache: &mut DerivationCache,
    ) -> Option<String> {
        let (survey_key, field_path) = definition
            .source_key
            .split_once('.')
            .unwrap_or((definition.source_key.as_str(), ""));

        if !last_submission_later_than(&study_participant.last_submissions, survey_key, last_sync)
        {
            return None;
        }

        if !cache.last_responses.contains_key(survey_key) {
            let flat = self
                .fetch_last_flat_response(list, participant, survey_key, last_sync, run)
                .await?;
            cache.last_responses.insert(survey_key.to_string(), flat);
        }
        let record = cache.last_responses.get(survey_key)?;

        let Some(entry) = record
            .get(&definition.source_key)
            .or_else(|| record.get(field_path))
        else {
            debug!(survey_key, source_key = %definition.source_key, "no response value found");
            return None;
        };

        Some(apply_mapping(definition, &stringify_value(entry)))
    }

    async fn fetch_last_flat_response(
        &self,
        list: &RecruitmentList,
        participant: &Participant,
        survey_key: &str,
        last_sync: Option<DateTime<Utc>>,
        run: &mut SyncRunContext,
    ) -> Option<FlatResponse> {
        let filter = ResponseFilter {
            participant_id: participant.participant_id.clone(),
            survey_key: survey_key.to_string(),
            arrived_from: Some(last_sync.map(|t| t.timestamp()).unwrap_or(0)),
            arrived_until: None,
        };
        let responses = match self
            .study_service
            .get_responses(list.study_key(), &filter, ResponseSortDirection::Desc, 1, 1)
            .await
        {
            Ok(responses) => responses,
            Err(e) => {
                error!("could not get responses: {}", e);
                return None;
            }
        };
        if responses.is_empty() {
            debug!(participant_id = %participant.participant_id, survey_key, "no responses found");
            return None;
        }

        let parser = match run
            .response_parser(
                self.study_service.as_ref(),
                list.study_key(),
                survey_key,
                &[],
                ParserPurpose::ParticipantInfos,
            )
            .await
        {
            Ok(parser) => parser,
            Err(e) => {
                error!("failed to create response parser for {}: {}", survey_key, e);
                return None;
            }
        };

        responses_to_research_data(parser, &responses, list.id, &participant.participant_id)
            .into_iter()
            .next()
            .map(|data| data.response)
    }
}

/// Resolves `slot_path` below an item response. Slots with children yield
/// their keys, or the children as JSON for json mappings.
fn extract_slot_value(
    answer: &ResponseItem,
    slot_path: &str,
    definition: &ParticipantInfoDefinition,
) -> Option<String> {
    let slot = answer.find_path(slot_path)?;
    if slot.items.is_empty() {
        return Some(apply_mapping(definition, &slot.value));
    }
    if definition.mapping_type == MappingType::Json {
        return match serde_json::to_string(&slot.items) {
            Ok(json) => Some(json),
            Err(e) => {
                error!("failed to encode slot value: {}", e);
                None
            }
        };
    }
    Some(
        slot.items
            .iter()
            .map(|child| apply_mapping(definition, &child.key))
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// Whether the participant submitted `survey_key` after the last data sync
/// started. Always true before the first sync.
pub fn last_submission_later_than(
    last_submissions: &BTreeMap<String, i64>,
    survey_key: &str,
    last_sync: Option<DateTime<Utc>>,
) -> bool {
    let Some(last_sync) = last_sync else {
        return true;
    };
    last_submissions
        .get(survey_key)
        .map(|submitted| *submitted > last_sync.timestamp())
        .unwrap_or(false)
}

pub fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) => f.to_string(),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}
