use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SYSTEM_AUTHOR: &str = "<system>";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantNote {
    pub id: Uuid,
    /// Id of the participant record (not the study participant id).
    pub pid: Uuid,
    pub recruitment_list_id: Uuid,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub created_by_id: String,
    pub created_by: String,
}
