use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub const ACTION_CREATE_RECRUITMENT_LIST: &str = "create-recruitment-list";
pub const ACTION_MANAGE_RECRUITMENT_LIST: &str = "manage-recruitment-list";
pub const ACTION_ACCESS_RECRUITMENT_LIST: &str = "access-recruitment-list";
pub const ACTION_DELETE_RECRUITMENT_LIST: &str = "delete-recruitment-list";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: Uuid,
    pub user_id: String,
    /// Recruitment list id, empty for global actions.
    pub resource_id: String,
    pub action: String,
    #[serde(default)]
    pub limiter: Vec<BTreeMap<String, String>>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}
