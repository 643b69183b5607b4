use chrono::{Local, TimeZone};
use tracing::warn;

use crate::models::recruitment_lists::{MappingType, ParticipantInfoDefinition};

/// Turns a raw value into the string stored as participant info.
pub fn apply_mapping(definition: &ParticipantInfoDefinition, raw: &str) -> String {
    match definition.mapping_type {
        MappingType::Key2Value => definition
            .mapping
            .iter()
            .find(|m| m.key == raw)
            .map(|m| m.value.clone())
            .unwrap_or_else(|| raw.to_string()),
        MappingType::Ts2Date => timestamp_to_date(raw),
        MappingType::Default | MappingType::Json | MappingType::Unknown => raw.to_string(),
    }
}

fn timestamp_to_date(raw: &str) -> String {
    let seconds_part = raw.split('.').next().unwrap_or(raw);
    let seconds = match seconds_part.parse::<i64>() {
        Ok(seconds) => seconds,
        Err(e) => {
            warn!("could not parse timestamp {}: {}", raw, e);
            return seconds_part.to_string();
        }
    };
    match Local.timestamp_opt(seconds, 0).single() {
        Some(date) => date.format("%Y-%b-%d").to_string(),
        None => {
            warn!("timestamp {} is out of range", raw);
            seconds_part.to_string()
        }
    }
}
