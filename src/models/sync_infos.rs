use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Running,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "idle" => Ok(Self::Idle),
            "running" => Ok(Self::Running),
            other => Err(format!("{} is not a valid sync status", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncInfo {
    pub recruitment_list_id: Uuid,
    pub participant_sync_status: SyncStatus,
    pub participant_sync_started_at: Option<DateTime<Utc>>,
    pub data_sync_status: SyncStatus,
    pub data_sync_started_at: Option<DateTime<Utc>>,
}

impl SyncInfo {
    pub fn empty(recruitment_list_id: Uuid) -> Self {
        Self {
            recruitment_list_id,
            participant_sync_status: SyncStatus::Idle,
            participant_sync_started_at: None,
            data_sync_status: SyncStatus::Idle,
            data_sync_started_at: None,
        }
    }
}
