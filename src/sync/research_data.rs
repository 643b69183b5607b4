use tracing::error;
use uuid::Uuid;

use crate::models::research_data::ResponseData;
use crate::study::SurveyResponse;
use crate::sync::response_parser::ResponseParser;

/// Flattens raw responses into storable rows. Responses that fail to parse
/// are logged and left out.
pub fn responses_to_research_data(
    parser: &ResponseParser,
    responses: &[SurveyResponse],
    recruitment_list_id: Uuid,
    participant_id: &str,
) -> Vec<ResponseData> {
    responses
        .iter()
        .filter_map(|raw| match parser.flatten(raw) {
            Ok(flat) => Some(ResponseData {
                id: Uuid::new_v4(),
                response_id: raw.id.clone(),
                participant_id: participant_id.to_string(),
                recruitment_list_id,
                survey_key: parser.survey_key().to_string(),
                arrived_at: raw.arrived_at,
                response: flat,
            }),
            Err(e) => {
                error!(
                    response_id = %raw.id,
                    survey_key = %parser.survey_key(),
                    "failed to parse response: {}",
                    e
                );
                None
            }
        })
        .collect()
}
