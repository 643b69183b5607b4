//! Flattens survey responses into one column per answer slot, driven by the
//! version history of the survey.

use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::study::{
    ResponseItem, ResponseSlotDef, SlotType, SurveyItemDef, SurveyResponse, SurveyVersion,
};

pub const COLUMN_PARTICIPANT_ID: &str = "participantID";
pub const COLUMN_VERSION: &str = "version";
pub const COLUMN_OPENED: &str = "opened";
pub const COLUMN_SUBMITTED: &str = "submitted";
pub const COLUMN_ARRIVED: &str = "arrived";

const COLUMN_SEPARATOR: &str = "-";

pub type FlatResponse = BTreeMap<String, Value>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParserError {
    #[error("survey {survey_key} has no version {version_id}")]
    UnknownVersion {
        survey_key: String,
        version_id: String,
    },
    #[error("survey {survey_key} had no published version at {timestamp}")]
    NoActiveVersion { survey_key: String, timestamp: i64 },
    #[error("response belongs to survey {found}, parser is for {expected}")]
    WrongSurvey { expected: String, found: String },
}

#[derive(Debug, Clone)]
pub struct ResponseParser {
    survey_key: String,
    versions: Vec<SurveyVersion>,
    excluded_columns: HashSet<String>,
}

impl ResponseParser {
    pub fn new(
        survey_key: impl Into<String>,
        versions: Vec<SurveyVersion>,
        excluded_columns: &[String],
    ) -> Self {
        Self {
            survey_key: survey_key.into(),
            versions,
            excluded_columns: excluded_columns.iter().cloned().collect(),
        }
    }

    pub fn survey_key(&self) -> &str {
        &self.survey_key
    }

    fn version_for(&self, response: &SurveyResponse) -> Result<&SurveyVersion, ParserError> {
        if response.version_id.is_empty() {
            return self
                .versions
                .iter()
                .rev()
                .find(|v| v.was_active_at(response.submitted_at))
                .ok_or_else(|| ParserError::NoActiveVersion {
                    survey_key: self.survey_key.clone(),
                    timestamp: response.submitted_at,
                });
        }
        self.versions
            .iter()
            .find(|v| v.version_id == response.version_id)
            .ok_or_else(|| ParserError::UnknownVersion {
                survey_key: self.survey_key.clone(),
                version_id: response.version_id.clone(),
            })
    }

    pub fn flatten(&self, response: &SurveyResponse) -> Result<FlatResponse, ParserError> {
        if response.key != self.survey_key {
            return Err(ParserError::WrongSurvey {
                expected: self.survey_key.clone(),
                found: response.key.clone(),
            });
        }
        let version = self.version_for(response)?;

        let mut columns = FlatResponse::new();
        self.insert(
            &mut columns,
            COLUMN_PARTICIPANT_ID.to_string(),
            Value::String(response.participant_id.clone()),
        );
        self.insert(
            &mut columns,
            COLUMN_VERSION.to_string(),
            Value::String(version.version_id.clone()),
        );
        self.insert(&mut columns, COLUMN_OPENED.to_string(), response.opened_at.into());
        self.insert(
            &mut columns,
            COLUMN_SUBMITTED.to_string(),
            response.submitted_at.into(),
        );
        self.insert(&mut columns, COLUMN_ARRIVED.to_string(), response.arrived_at.into());

        for item in &version.items {
            if self.excluded_columns.contains(&item.key) {
                continue;
            }
            let answer = response
                .item_response(&item.key)
                .and_then(|r| r.response.as_ref());
            for slot in &item.slots {
                let base = column_name(item, slot);
                let slot_answer = answer.and_then(|root| root.find_path(&slot.id));
                self.flatten_slot(&mut columns, &base, slot, slot_answer);
            }
        }

        Ok(columns)
    }

    fn flatten_slot(
        &self,
        columns: &mut FlatResponse,
        base: &str,
        slot: &ResponseSlotDef,
        answer: Option<&ResponseItem>,
    ) {
        match slot.slot_type {
            SlotType::SingleChoice | SlotType::DropDown => {
                let selected = answer.and_then(|a| a.items.first());
                let value = selected.map(|s| s.key.clone()).unwrap_or_default();
                self.insert(columns, base.to_string(), Value::String(value));
                for option in slot.options.iter().filter(|o| o.has_input()) {
                    let input = selected
                        .filter(|s| s.key == option.id)
                        .map(|s| s.value.clone())
                        .unwrap_or_default();
                    self.insert(
                        columns,
                        format!("{}{}{}", base, COLUMN_SEPARATOR, option.id),
                        Value::String(input),
                    );
                }
            }
            SlotType::MultipleChoice => {
                for option in &slot.options {
                    let column = format!("{}{}{}", base, COLUMN_SEPARATOR, option.id);
                    let value = match answer {
                        Some(a) => Value::Bool(a.child(&option.id).is_some()),
                        None => Value::String(String::new()),
                    };
                    self.insert(columns, column, value);
                }
            }
            SlotType::Number => {
                let value = answer
                    .and_then(|a| number_value(&a.value))
                    .unwrap_or_else(|| Value::String(String::new()));
                self.insert(columns, base.to_string(), value);
            }
            SlotType::Date => {
                let value = answer
                    .and_then(|a| a.value.parse::<i64>().ok())
                    .map(Value::from)
                    .unwrap_or_else(|| Value::String(String::new()));
                self.insert(columns, base.to_string(), value);
            }
            SlotType::Text => {
                let value = answer.map(|a| a.value.clone()).unwrap_or_default();
                self.insert(columns, base.to_string(), Value::String(value));
            }
            SlotType::Other => {
                let value = answer
                    .and_then(|a| serde_json::to_string(a).ok())
                    .unwrap_or_default();
                self.insert(columns, base.to_string(), Value::String(value));
            }
        }
    }

    fn insert(&self, columns: &mut FlatResponse, column: String, value: Value) {
        if !self.excluded_columns.contains(&column) {
            columns.insert(column, value);
        }
    }
}

fn column_name(item: &SurveyItemDef, slot: &ResponseSlotDef) -> String {
    if item.slots.len() == 1 {
        item.key.clone()
    } else {
        format!("{}{}{}", item.key, COLUMN_SEPARATOR, slot.id)
    }
}

fn number_value(raw: &str) -> Option<Value> {
    if let Ok(int) = raw.parse::<i64>() {
        return Some(Value::from(int));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}
