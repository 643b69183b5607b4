use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InclusionType {
    #[default]
    Manual,
    Auto,
}

impl InclusionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct InclusionAutoConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub criteria: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInclusion {
    pub study_key: String,
    #[serde(rename = "type", default)]
    pub inclusion_type: InclusionType,
    pub auto_config: Option<InclusionAutoConfig>,
    #[serde(default)]
    pub notification_emails: Vec<String>,
}

/// If the participant info with the given key equals the given value, the
/// participant is excluded from the list.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ExclusionCondition {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum MappingType {
    #[default]
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "key2value")]
    Key2Value,
    #[serde(rename = "ts2date")]
    Ts2Date,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    #[serde(rename = "flagValue")]
    FlagValue,
    #[serde(rename = "confidentialData")]
    ConfidentialData,
    #[serde(rename = "responseData")]
    ResponseData,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfoDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub source_type: SourceType,
    #[serde(default)]
    pub source_key: String,
    #[serde(default)]
    pub show_in_preview: bool,
    #[serde(default)]
    pub mapping_type: MappingType,
    #[serde(default)]
    pub mapping: Vec<Mapping>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResearchDataDefinition {
    #[serde(default)]
    pub id: String,
    pub survey_key: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub excluded_columns: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDataConfig {
    #[serde(default)]
    pub participant_infos: Vec<ParticipantInfoDefinition>,
    #[serde(default)]
    pub research_data: Vec<ResearchDataDefinition>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Customization {
    #[serde(default)]
    pub recruitment_status_values: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct StudyAction {
    pub id: String,
    pub encoded_action: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RecruitmentList {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub participant_inclusion: ParticipantInclusion,
    #[serde(default)]
    pub exclusion_conditions: Vec<ExclusionCondition>,
    #[serde(default)]
    pub participant_data: ParticipantDataConfig,
    #[serde(default)]
    pub customization: Customization,
    #[serde(default)]
    pub study_actions: Vec<StudyAction>,
}

impl RecruitmentList {
    /// Builds a list that has not been stored yet.
    pub fn new(name: impl Into<String>, participant_inclusion: ParticipantInclusion) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            created_at: Utc::now(),
            created_by: String::new(),
            tags: Vec::new(),
            participant_inclusion,
            exclusion_conditions: Vec::new(),
            participant_data: ParticipantDataConfig::default(),
            customization: Customization::default(),
            study_actions: Vec::new(),
        }
    }

    pub fn study_key(&self) -> &str {
        &self.participant_inclusion.study_key
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RecruitmentListInfo {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone)]
pub struct RecruitmentListFilter {
    pub study_key: Option<String>,
    pub inclusion_type: Option<InclusionType>,
}

impl RecruitmentListFilter {
    pub fn matches(&self, list: &RecruitmentList) -> bool {
        if let Some(study_key) = &self.study_key {
            if list.study_key() != study_key {
                return false;
            }
        }
        if let Some(inclusion_type) = self.inclusion_type {
            if list.participant_inclusion.inclusion_type != inclusion_type {
                return false;
            }
        }
        true
    }
}
