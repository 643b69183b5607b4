use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

pub type ParticipantInfos = BTreeMap<String, String>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: Uuid,
    pub participant_id: String,
    pub recruitment_list_id: Uuid,
    pub included_at: DateTime<Utc>,
    pub included_by: String,
    pub deleted_at: Option<DateTime<Utc>>,
    pub recruitment_status: String,
    #[serde(default)]
    pub infos: ParticipantInfos,
}

impl Participant {
    pub fn new(participant_id: &str, recruitment_list_id: Uuid, included_by: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            participant_id: participant_id.to_string(),
            recruitment_list_id,
            included_at: Utc::now(),
            included_by: included_by.to_string(),
            deleted_at: None,
            recruitment_status: String::new(),
            infos: ParticipantInfos::new(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantFilter {
    pub included_since: Option<DateTime<Utc>>,
    pub included_until: Option<DateTime<Utc>>,
    pub participant_id: Option<String>,
    pub recruitment_status: Option<String>,
}

impl ParticipantFilter {
    pub fn matches(&self, participant: &Participant) -> bool {
        if let Some(since) = self.included_since {
            if participant.included_at < since {
                return false;
            }
        }
        if let Some(until) = self.included_until {
            if participant.included_at > until {
                return false;
            }
        }
        if let Some(pid) = &self.participant_id {
            if &participant.participant_id != pid {
                return false;
            }
        }
        if let Some(status) = &self.recruitment_status {
            if &participant.recruitment_status != status {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ParticipantSortField {
    #[default]
    IncludedAt,
    ParticipantId,
    RecruitmentStatus,
    DeletedAt,
}

impl ParticipantSortField {
    /// Unknown sort fields fall back to the inclusion date.
    pub fn parse(value: &str) -> Self {
        match value {
            "participantId" => Self::ParticipantId,
            "recruitmentStatus" => Self::RecruitmentStatus,
            "deletedAt" => Self::DeletedAt,
            _ => Self::IncludedAt,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Self::IncludedAt => "included_at",
            Self::ParticipantId => "participant_id",
            Self::RecruitmentStatus => "recruitment_status",
            Self::DeletedAt => "deleted_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct ParticipantSort {
    pub field: ParticipantSortField,
    pub order: SortOrder,
}

#[derive(Validate, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportParticipantRequest {
    #[validate(length(min = 1, message = "participantId is required"))]
    pub participant_id: String,
}

#[derive(Validate, Debug, Deserialize)]
pub struct UpdateParticipantStatusRequest {
    #[validate(length(min = 1, message = "status is required"))]
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub included_since: Option<String>,
    pub included_until: Option<String>,
    pub participant_id: Option<String>,
    pub recruitment_status: Option<String>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
}
