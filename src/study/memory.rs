use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::study::id_mapping::participant_id_to_confidential_id;
use crate::study::{
    ParticipantStateFilter, ResponseFilter, ResponseSortDirection, Study, StudyParticipant,
    StudyService, StudyServiceError, SurveyResponse, SurveyVersion,
};

#[derive(Default)]
struct StudyData {
    participants: BTreeMap<String, Vec<StudyParticipant>>,
    responses: BTreeMap<String, Vec<SurveyResponse>>,
    confidential_responses: BTreeMap<String, Vec<SurveyResponse>>,
    studies: BTreeMap<String, Study>,
    survey_versions: BTreeMap<(String, String), Vec<SurveyVersion>>,
    failing_participants: HashSet<String>,
    fail_confidential_lookups: bool,
}

/// Study service backed by process memory. Used by the sync tests and for
/// running the service without a study instance.
#[derive(Clone, Default)]
pub struct InMemoryStudyService {
    data: Arc<Mutex<StudyData>>,
    global_secret: String,
    response_queries: Arc<AtomicUsize>,
    participant_lookups: Arc<AtomicUsize>,
}

impl InMemoryStudyService {
    pub fn new(global_secret: &str) -> Self {
        Self {
            global_secret: global_secret.to_string(),
            ..Default::default()
        }
    }

    fn data(&self) -> MutexGuard<'_, StudyData> {
        match self.data.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn add_study(&self, study: Study) {
        self.data().studies.insert(study.key.clone(), study);
    }

    pub fn add_participant(&self, study_key: &str, participant: StudyParticipant) {
        let mut data = self.data();
        let list = data.participants.entry(study_key.to_string()).or_default();
        list.retain(|p| p.participant_id != participant.participant_id);
        list.push(participant);
    }

    pub fn add_response(&self, study_key: &str, response: SurveyResponse) {
        self.data()
            .responses
            .entry(study_key.to_string())
            .or_default()
            .push(response);
    }

    /// `response.participant_id` must already be the confidential id.
    pub fn add_confidential_response(&self, study_key: &str, response: SurveyResponse) {
        self.data()
            .confidential_responses
            .entry(study_key.to_string())
            .or_default()
            .push(response);
    }

    pub fn set_survey_versions(
        &self,
        study_key: &str,
        survey_key: &str,
        versions: Vec<SurveyVersion>,
    ) {
        self.data()
            .survey_versions
            .insert((study_key.to_string(), survey_key.to_string()), versions);
    }

    /// Lookups and response queries for this participant fail.
    pub fn fail_participant(&self, participant_id: &str) {
        self.data()
            .failing_participants
            .insert(participant_id.to_string());
    }

    pub fn fail_confidential_lookups(&self, fail: bool) {
        self.data().fail_confidential_lookups = fail;
    }

    pub fn response_queries(&self) -> usize {
        self.response_queries.load(Ordering::SeqCst)
    }

    pub fn participant_lookups(&self) -> usize {
        self.participant_lookups.load(Ordering::SeqCst)
    }

    fn unavailable(what: &str) -> StudyServiceError {
        StudyServiceError::Api {
            status: 503,
            message: format!("{} unavailable", what),
        }
    }
}

#[async_trait]
impl StudyService for InMemoryStudyService {
    async fn get_participant(
        &self,
        study_key: &str,
        participant_id: &str,
    ) -> Result<StudyParticipant, StudyServiceError> {
        self.participant_lookups.fetch_add(1, Ordering::SeqCst);
        let data = self.data();
        if data.failing_participants.contains(participant_id) {
            return Err(Self::unavailable("participant"));
        }
        data.participants
            .get(study_key)
            .and_then(|list| list.iter().find(|p| p.participant_id == participant_id))
            .cloned()
            .ok_or_else(|| StudyServiceError::NotFound(format!("participant {}", participant_id)))
    }

    fn stream_participants(
        &self,
        study_key: &str,
        filter: ParticipantStateFilter,
    ) -> BoxStream<'static, Result<StudyParticipant, StudyServiceError>> {
        let data = self.data();
        let items: Vec<Result<StudyParticipant, StudyServiceError>> = data
            .participants
            .get(study_key)
            .map(|list| {
                list.iter()
                    .filter(|p| filter.matches(p))
                    .map(|p| {
                        if data.failing_participants.contains(&p.participant_id) {
                            Err(Self::unavailable("participant"))
                        } else {
                            Ok(p.clone())
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        stream::iter(items).boxed()
    }

    async fn get_responses(
        &self,
        study_key: &str,
        filter: &ResponseFilter,
        sort: ResponseSortDirection,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<SurveyResponse>, StudyServiceError> {
        self.response_queries.fetch_add(1, Ordering::SeqCst);
        let data = self.data();
        if data.failing_participants.contains(&filter.participant_id) {
            return Err(Self::unavailable("responses"));
        }
        let mut matching: Vec<SurveyResponse> = data
            .responses
            .get(study_key)
            .map(|list| list.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default();
        matching.sort_by_key(|r| r.arrived_at);
        if sort == ResponseSortDirection::Desc {
            matching.reverse();
        }
        let skip = ((page.max(1) - 1) * page_size.max(0)) as usize;
        Ok(matching
            .into_iter()
            .skip(skip)
            .take(page_size.max(0) as usize)
            .collect())
    }

    async fn find_confidential_responses(
        &self,
        study_key: &str,
        confidential_id: &str,
        item_key: &str,
    ) -> Result<Vec<SurveyResponse>, StudyServiceError> {
        let data = self.data();
        if data.fail_confidential_lookups {
            return Err(Self::unavailable("confidential responses"));
        }
        Ok(data
            .confidential_responses
            .get(study_key)
            .map(|list| {
                list.iter()
                    .filter(|r| r.participant_id == confidential_id)
                    .filter(|r| r.item_response(item_key).is_some())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_study(&self, study_key: &str) -> Result<Study, StudyServiceError> {
        self.data()
            .studies
            .get(study_key)
            .cloned()
            .ok_or_else(|| StudyServiceError::NotFound(format!("study {}", study_key)))
    }

    fn resolve_confidential_id(
        &self,
        participant_id: &str,
        study: &Study,
    ) -> Result<String, StudyServiceError> {
        participant_id_to_confidential_id(
            participant_id,
            &self.global_secret,
            &study.secret_key,
            &study.configs.id_mapping_method,
        )
    }

    async fn get_survey_versions(
        &self,
        study_key: &str,
        survey_key: &str,
    ) -> Result<Vec<SurveyVersion>, StudyServiceError> {
        Ok(self
            .data()
            .survey_versions
            .get(&(study_key.to_string(), survey_key.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claim::{assert_err, assert_ok};

    fn response(pid: &str, arrived_at: i64) -> SurveyResponse {
        SurveyResponse {
            id: format!("r{}", arrived_at),
            key: "intake".to_string(),
            participant_id: pid.to_string(),
            arrived_at,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn responses_are_paged_in_arrival_order() {
        let service = InMemoryStudyService::new("g");
        for ts in [30, 10, 20] {
            service.add_response("s1", response("p1", ts));
        }
        let filter = ResponseFilter {
            participant_id: "p1".to_string(),
            survey_key: "intake".to_string(),
            ..Default::default()
        };

        let first = service
            .get_responses("s1", &filter, ResponseSortDirection::Asc, 1, 2)
            .await
            .unwrap();
        let second = service
            .get_responses("s1", &filter, ResponseSortDirection::Asc, 2, 2)
            .await
            .unwrap();
        let newest = service
            .get_responses("s1", &filter, ResponseSortDirection::Desc, 1, 1)
            .await
            .unwrap();

        assert_eq!(first.iter().map(|r| r.arrived_at).collect::<Vec<_>>(), vec![10, 20]);
        assert_eq!(second.iter().map(|r| r.arrived_at).collect::<Vec<_>>(), vec![30]);
        assert_eq!(newest[0].arrived_at, 30);
        assert_eq!(service.response_queries(), 3);
    }

    #[tokio::test]
    async fn failing_participant_lookups_error() {
        let service = InMemoryStudyService::new("g");
        service.add_participant(
            "s1",
            StudyParticipant {
                participant_id: "p1".to_string(),
                ..Default::default()
            },
        );
        assert_ok!(service.get_participant("s1", "p1").await);
        service.fail_participant("p1");
        assert_err!(service.get_participant("s1", "p1").await);
    }
}
