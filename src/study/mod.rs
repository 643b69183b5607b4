//! Access to the external study management service: participant states,
//! survey responses, confidential responses and survey definitions.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

pub mod http_client;
pub mod id_mapping;
pub mod memory;
pub mod types;

pub use http_client::HttpStudyService;
pub use memory::InMemoryStudyService;
pub use types::*;

#[derive(Debug, thiserror::Error)]
pub enum StudyServiceError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("study service request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("study service responded with {status}: {message}")]
    Api { status: u16, message: String },
    #[error("unsupported id mapping method {0}")]
    UnsupportedIdMapping(String),
}

#[async_trait]
pub trait StudyService: Send + Sync {
    async fn get_participant(
        &self,
        study_key: &str,
        participant_id: &str,
    ) -> Result<StudyParticipant, StudyServiceError>;

    /// All participant states of a study matching `filter`.
    fn stream_participants(
        &self,
        study_key: &str,
        filter: ParticipantStateFilter,
    ) -> BoxStream<'static, Result<StudyParticipant, StudyServiceError>>;

    /// `page` starts at 1. Responses are sorted by arrival time.
    async fn get_responses(
        &self,
        study_key: &str,
        filter: &ResponseFilter,
        sort: ResponseSortDirection,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<SurveyResponse>, StudyServiceError>;

    async fn find_confidential_responses(
        &self,
        study_key: &str,
        confidential_id: &str,
        item_key: &str,
    ) -> Result<Vec<SurveyResponse>, StudyServiceError>;

    async fn get_study(&self, study_key: &str) -> Result<Study, StudyServiceError>;

    /// Confidential responses are stored under a participant id derived
    /// from the instance wide secret and the study secret.
    fn resolve_confidential_id(
        &self,
        participant_id: &str,
        study: &Study,
    ) -> Result<String, StudyServiceError>;

    /// Version history of a survey, oldest first.
    async fn get_survey_versions(
        &self,
        study_key: &str,
        survey_key: &str,
    ) -> Result<Vec<SurveyVersion>, StudyServiceError>;
}
