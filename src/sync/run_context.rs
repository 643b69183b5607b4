use std::collections::HashMap;

use crate::study::{Study, StudyService};
use crate::sync::response_parser::ResponseParser;
use crate::sync::SyncError;

/// Which cache a parser is kept in. Attribute parsers never exclude
/// columns, so they can't be shared with the research data ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParserPurpose {
    ResearchData,
    ParticipantInfos,
}

/// State shared by all participants of one data sync run. Survey
/// definitions may change between runs, so a context is never reused.
#[derive(Default)]
pub struct SyncRunContext {
    parsers: HashMap<(ParserPurpose, String), ResponseParser>,
    study: Option<Study>,
}

impl SyncRunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached_parsers(&self) -> usize {
        self.parsers.len()
    }

    /// Parser of `survey_key`, built from the survey's version history on
    /// first use.
    pub async fn response_parser(
        &mut self,
        study_service: &dyn StudyService,
        study_key: &str,
        survey_key: &str,
        excluded_columns: &[String],
        purpose: ParserPurpose,
    ) -> Result<&ResponseParser, SyncError> {
        let cache_key = (purpose, survey_key.to_string());
        if !self.parsers.contains_key(&cache_key) {
            let parser =
                init_response_parser(study_service, study_key, survey_key, excluded_columns)
                    .await?;
            self.parsers.insert(cache_key.clone(), parser);
        }
        self.parsers
            .get(&cache_key)
            .ok_or_else(|| SyncError::NotFound(format!("response parser for {}", survey_key)))
    }

    pub async fn study(
        &mut self,
        study_service: &dyn StudyService,
        study_key: &str,
    ) -> Result<&Study, SyncError> {
        if self.study.is_none() {
            self.study = Some(study_service.get_study(study_key).await?);
        }
        self.study
            .as_ref()
            .ok_or_else(|| SyncError::NotFound(format!("study {}", study_key)))
    }
}

pub async fn init_response_parser(
    study_service: &dyn StudyService,
    study_key: &str,
    survey_key: &str,
    excluded_columns: &[String],
) -> Result<ResponseParser, SyncError> {
    let versions = study_service
        .get_survey_versions(study_key, survey_key)
        .await?;
    tracing::debug!(
        "loaded {} versions of survey {} for study {}",
        versions.len(),
        survey_key,
        study_key
    );
    Ok(ResponseParser::new(survey_key, versions, excluded_columns))
}
