//! Inclusion criteria of auto lists: a tree of AND/OR groups over
//! participant flags and study status.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::study::StudyParticipant;
use crate::sync::SyncError;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ConditionType {
    #[serde(rename = "flagExists")]
    FlagExists,
    #[serde(rename = "flagHasValue")]
    FlagHasValue,
    #[serde(rename = "flagNotExists")]
    FlagNotExists,
    #[serde(rename = "flagNotHasValue")]
    FlagNotHasValue,
    #[serde(rename = "hasStatus")]
    HasStatus,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    #[serde(default)]
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct CriteriaGroup {
    pub operator: Operator,
    pub conditions: Vec<CriteriaNode>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CriteriaNode {
    Group(CriteriaGroup),
    Condition(Condition),
}

#[derive(Deserialize)]
struct RawGroup {
    operator: Operator,
    #[serde(default)]
    conditions: Option<Vec<CriteriaNode>>,
}

impl<'de> Deserialize<'de> for CriteriaGroup {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawGroup::deserialize(deserializer)?;
        Ok(CriteriaGroup {
            operator: raw.operator,
            conditions: raw.conditions.unwrap_or_default(),
        })
    }
}

// Nodes written by this crate carry `kind`. Stored criteria without it are
// told apart by the presence of `operator`.
impl<'de> Deserialize<'de> for CriteriaNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let is_group = match value.get("kind").and_then(|k| k.as_str()) {
            Some("group") => true,
            Some("condition") => false,
            Some(other) => {
                return Err(D::Error::custom(format!("unknown criteria node kind {}", other)))
            }
            None => value.get("operator").is_some(),
        };

        if is_group {
            CriteriaGroup::deserialize(value)
                .map(CriteriaNode::Group)
                .map_err(D::Error::custom)
        } else {
            Condition::deserialize(value)
                .map(CriteriaNode::Condition)
                .map_err(D::Error::custom)
        }
    }
}

impl CriteriaGroup {
    pub fn from_json(raw: &str) -> Result<Self, SyncError> {
        serde_json::from_str(raw)
            .map_err(|e| SyncError::Config(format!("could not parse inclusion criteria: {}", e)))
    }

    /// An empty AND holds, an empty OR does not. A non-empty OR without a
    /// matching child yields the value of its last child.
    pub fn evaluate(&self, participant: &StudyParticipant) -> bool {
        let mut result = match self.operator {
            Operator::And => true,
            Operator::Or => false,
            Operator::Unknown => return false,
        };

        for node in &self.conditions {
            result = match node {
                CriteriaNode::Condition(condition) => condition.evaluate(participant),
                CriteriaNode::Group(group) => group.evaluate(participant),
            };
            match self.operator {
                Operator::And if !result => return false,
                Operator::Or if result => return true,
                _ => {}
            }
        }
        result
    }
}

impl Condition {
    pub fn evaluate(&self, participant: &StudyParticipant) -> bool {
        let stored = participant.flags.get(&self.key);
        match self.condition_type {
            ConditionType::FlagExists => stored.is_some(),
            ConditionType::FlagHasValue => match (stored, &self.value) {
                (Some(stored), Some(expected)) => stored == expected,
                _ => false,
            },
            ConditionType::FlagNotExists => stored.is_none(),
            // Only holds for absent flags, compared against the empty string.
            ConditionType::FlagNotHasValue => match (stored, &self.value) {
                (None, Some(expected)) => !expected.is_empty(),
                _ => false,
            },
            ConditionType::HasStatus => self
                .value
                .as_ref()
                .map(|expected| &participant.study_status == expected)
                .unwrap_or(false),
            ConditionType::Unknown => false,
        }
    }
}
