use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::config::StudyServiceConfig;
use crate::study::id_mapping::participant_id_to_confidential_id;
use crate::study::{
    ParticipantStateFilter, ResponseFilter, ResponseSortDirection, Study, StudyParticipant,
    StudyService, StudyServiceError, SurveyResponse, SurveyVersion,
};

const PARTICIPANT_PAGE_SIZE: i64 = 100;

/// Study service client talking to the management api of a study instance.
#[derive(Clone)]
pub struct HttpStudyService {
    client: Client,
    base_url: String,
    instance_id: String,
    api_key: Secret<String>,
    global_secret: Secret<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ParticipantQuery<'a> {
    filter: &'a ParticipantStateFilter,
    page: i64,
    page_size: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParticipantPage {
    #[serde(default)]
    participants: Vec<StudyParticipant>,
    #[serde(default)]
    total_pages: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResponseQuery<'a> {
    filter: &'a ResponseFilter,
    sort: ResponseSortDirection,
    page: i64,
    page_size: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfidentialResponseQuery<'a> {
    participant_id: &'a str,
    key: &'a str,
}

#[derive(Deserialize)]
struct ResponseList {
    #[serde(default)]
    responses: Vec<SurveyResponse>,
}

#[derive(Deserialize)]
struct SurveyVersionList {
    #[serde(default)]
    versions: Vec<SurveyVersion>,
}

impl HttpStudyService {
    pub fn new(config: &StudyServiceConfig) -> Result<Self, StudyServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            instance_id: config.instance_id.clone(),
            api_key: config.api_key.clone(),
            global_secret: config.global_secret.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/v1/instances/{}/studies{}",
            self.base_url, self.instance_id, path
        )
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T, StudyServiceError> {
        let response = request
            .header("Api-Key", self.api_key.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response.json::<T>().await?)
        } else if status.as_u16() == 404 {
            Err(StudyServiceError::NotFound(what.to_string()))
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(StudyServiceError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn participant_page(
        &self,
        study_key: &str,
        filter: &ParticipantStateFilter,
        page: i64,
    ) -> Result<ParticipantPage, StudyServiceError> {
        let request = self
            .client
            .post(self.url(&format!("/{}/participants/query", study_key)))
            .json(&ParticipantQuery {
                filter,
                page,
                page_size: PARTICIPANT_PAGE_SIZE,
            });
        self.send(request, "participants").await
    }
}

#[async_trait]
impl StudyService for HttpStudyService {
    async fn get_participant(
        &self,
        study_key: &str,
        participant_id: &str,
    ) -> Result<StudyParticipant, StudyServiceError> {
        let request = self
            .client
            .get(self.url(&format!("/{}/participants/{}", study_key, participant_id)));
        self.send(request, &format!("participant {}", participant_id))
            .await
    }

    fn stream_participants(
        &self,
        study_key: &str,
        filter: ParticipantStateFilter,
    ) -> BoxStream<'static, Result<StudyParticipant, StudyServiceError>> {
        let service = self.clone();
        let study_key = study_key.to_string();

        stream::unfold(Some(1_i64), move |page| {
            let service = service.clone();
            let study_key = study_key.clone();
            let filter = filter.clone();
            async move {
                let current = page?;
                match service.participant_page(&study_key, &filter, current).await {
                    Ok(result) => {
                        let next = if current < result.total_pages && !result.participants.is_empty() {
                            Some(current + 1)
                        } else {
                            None
                        };
                        let batch: Vec<Result<StudyParticipant, StudyServiceError>> =
                            result.participants.into_iter().map(Ok).collect();
                        Some((batch, next))
                    }
                    Err(e) => Some((vec![Err(e)], None)),
                }
            }
        })
        .flat_map(stream::iter)
        .boxed()
    }

    async fn get_responses(
        &self,
        study_key: &str,
        filter: &ResponseFilter,
        sort: ResponseSortDirection,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<SurveyResponse>, StudyServiceError> {
        let request = self
            .client
            .post(self.url(&format!("/{}/responses/query", study_key)))
            .json(&ResponseQuery {
                filter,
                sort,
                page,
                page_size,
            });
        let list: ResponseList = self.send(request, "responses").await?;
        Ok(list.responses)
    }

    async fn find_confidential_responses(
        &self,
        study_key: &str,
        confidential_id: &str,
        item_key: &str,
    ) -> Result<Vec<SurveyResponse>, StudyServiceError> {
        let request = self
            .client
            .post(self.url(&format!("/{}/confidential-responses", study_key)))
            .json(&ConfidentialResponseQuery {
                participant_id: confidential_id,
                key: item_key,
            });
        let list: ResponseList = self.send(request, "confidential responses").await?;
        Ok(list.responses)
    }

    async fn get_study(&self, study_key: &str) -> Result<Study, StudyServiceError> {
        let request = self.client.get(self.url(&format!("/{}", study_key)));
        self.send(request, &format!("study {}", study_key)).await
    }

    fn resolve_confidential_id(
        &self,
        participant_id: &str,
        study: &Study,
    ) -> Result<String, StudyServiceError> {
        participant_id_to_confidential_id(
            participant_id,
            self.global_secret.expose_secret(),
            &study.secret_key,
            &study.configs.id_mapping_method,
        )
    }

    async fn get_survey_versions(
        &self,
        study_key: &str,
        survey_key: &str,
    ) -> Result<Vec<SurveyVersion>, StudyServiceError> {
        let request = self
            .client
            .get(self.url(&format!("/{}/surveys/{}/versions", study_key, survey_key)));
        let list: SurveyVersionList = self
            .send(request, &format!("survey {}", survey_key))
            .await?;
        Ok(list.versions)
    }
}
