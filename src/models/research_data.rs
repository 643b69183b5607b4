use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One flattened survey response stored for a recruitment list.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
    pub id: Uuid,
    pub response_id: String,
    pub participant_id: String,
    pub recruitment_list_id: Uuid,
    pub survey_key: String,
    pub arrived_at: i64,
    pub response: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDataInfo {
    pub survey_key: String,
    pub count: i64,
    pub first_arrived_at: i64,
    pub last_arrived_at: i64,
}

#[derive(Debug, Default, Clone)]
pub struct ResearchDataFilter {
    pub participant_id: Option<String>,
    pub survey_key: Option<String>,
    pub arrived_from: Option<DateTime<Utc>>,
    pub arrived_until: Option<DateTime<Utc>>,
}

impl ResearchDataFilter {
    pub fn matches(&self, data: &ResponseData) -> bool {
        if let Some(pid) = &self.participant_id {
            if &data.participant_id != pid {
                return false;
            }
        }
        if let Some(survey_key) = &self.survey_key {
            if &data.survey_key != survey_key {
                return false;
            }
        }
        if let Some(from) = self.arrived_from {
            if data.arrived_at < from.timestamp() {
                return false;
            }
        }
        if let Some(until) = self.arrived_until {
            if data.arrived_at > until.timestamp() {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableResponsesQuery {
    pub pid: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}
