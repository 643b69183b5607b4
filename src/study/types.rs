use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const PARTICIPANT_STUDY_STATUS_ACTIVE: &str = "active";
pub const PARTICIPANT_STUDY_STATUS_ACCOUNT_DELETED: &str = "accountDeleted";

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudyParticipant {
    #[serde(rename = "participantID", alias = "participantId")]
    pub participant_id: String,
    #[serde(default)]
    pub study_status: String,
    #[serde(default)]
    pub entered_at: i64,
    #[serde(default)]
    pub flags: BTreeMap<String, String>,
    /// Survey key to the epoch second of the last submission.
    #[serde(default)]
    pub last_submissions: BTreeMap<String, i64>,
}

impl StudyParticipant {
    pub fn is_account_deleted(&self) -> bool {
        self.study_status == PARTICIPANT_STUDY_STATUS_ACCOUNT_DELETED
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantStateFilter {
    pub exclude_statuses: Vec<String>,
    pub entered_after: Option<DateTime<Utc>>,
    pub entered_before: Option<DateTime<Utc>>,
}

impl ParticipantStateFilter {
    pub fn matches(&self, participant: &StudyParticipant) -> bool {
        if self.exclude_statuses.contains(&participant.study_status) {
            return false;
        }
        if let Some(after) = self.entered_after {
            if participant.entered_at < after.timestamp() {
                return false;
            }
        }
        if let Some(before) = self.entered_before {
            if participant.entered_at > before.timestamp() {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseItem {
    pub key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dtype: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ResponseItem>,
}

impl ResponseItem {
    pub fn child(&self, key: &str) -> Option<&ResponseItem> {
        self.items.iter().find(|item| item.key == key)
    }

    /// Follows a dot separated key path whose first segment is this item.
    pub fn find_path(&self, path: &str) -> Option<&ResponseItem> {
        let mut segments = path.split('.');
        if segments.next() != Some(self.key.as_str()) {
            return None;
        }
        segments.try_fold(self, |current, segment| current.child(segment))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SurveyItemResponse {
    pub key: String,
    #[serde(default)]
    pub response: Option<ResponseItem>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SurveyResponse {
    pub id: String,
    pub key: String,
    #[serde(rename = "participantID", alias = "participantId")]
    pub participant_id: String,
    #[serde(rename = "versionID", alias = "versionId", default)]
    pub version_id: String,
    #[serde(default)]
    pub opened_at: i64,
    #[serde(default)]
    pub submitted_at: i64,
    #[serde(default)]
    pub arrived_at: i64,
    #[serde(default)]
    pub responses: Vec<SurveyItemResponse>,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl SurveyResponse {
    pub fn item_response(&self, item_key: &str) -> Option<&SurveyItemResponse> {
        self.responses.iter().find(|r| r.key == item_key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseFilter {
    pub participant_id: String,
    pub survey_key: String,
    pub arrived_from: Option<i64>,
    pub arrived_until: Option<i64>,
}

impl ResponseFilter {
    pub fn matches(&self, response: &SurveyResponse) -> bool {
        if response.participant_id != self.participant_id || response.key != self.survey_key {
            return false;
        }
        if let Some(from) = self.arrived_from {
            if response.arrived_at < from {
                return false;
            }
        }
        if let Some(until) = self.arrived_until {
            if response.arrived_at > until {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StudyConfigs {
    #[serde(default)]
    pub id_mapping_method: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Study {
    pub key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub configs: StudyConfigs,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum SlotType {
    #[serde(rename = "singleChoice")]
    SingleChoice,
    #[serde(rename = "dropDown")]
    DropDown,
    #[serde(rename = "multipleChoice")]
    MultipleChoice,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "text")]
    Text,
    #[serde(other)]
    Other,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SlotOption {
    pub id: String,
    /// `option` for plain choices, anything else carries an input value.
    #[serde(default = "default_option_type")]
    pub option_type: String,
}

fn default_option_type() -> String {
    "option".to_string()
}

impl SlotOption {
    pub fn has_input(&self) -> bool {
        self.option_type != "option"
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSlotDef {
    /// Dot separated path into the item's response tree, e.g. `rg.scg`.
    pub id: String,
    pub slot_type: SlotType,
    #[serde(default)]
    pub options: Vec<SlotOption>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SurveyItemDef {
    pub key: String,
    #[serde(default)]
    pub slots: Vec<ResponseSlotDef>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SurveyVersion {
    #[serde(rename = "versionID", alias = "versionId")]
    pub version_id: String,
    #[serde(default)]
    pub published: i64,
    #[serde(default)]
    pub unpublished: i64,
    #[serde(default)]
    pub items: Vec<SurveyItemDef>,
}

impl SurveyVersion {
    pub fn was_active_at(&self, ts: i64) -> bool {
        self.published <= ts && (self.unpublished == 0 || self.unpublished > ts)
    }
}
