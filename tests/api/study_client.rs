use claim::assert_ok;
use futures_util::StreamExt;
use secrecy::Secret;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use recruitment_lists::core::config::StudyServiceConfig;
use recruitment_lists::study::{
    HttpStudyService, ParticipantStateFilter, ResponseFilter, ResponseSortDirection, StudyService,
    StudyServiceError,
};

const BASE_PATH: &str = "/v1/instances/default/studies/covid";

fn client(server: &MockServer) -> HttpStudyService {
    HttpStudyService::new(&StudyServiceConfig {
        base_url: format!("{}/", server.uri()),
        api_key: Secret::new("api-key".to_string()),
        instance_id: "default".to_string(),
        global_secret: Secret::new("global".to_string()),
        timeout_secs: 5,
    })
    .unwrap()
}

#[tokio::test]
async fn get_participant_sends_the_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/participants/p1", BASE_PATH)))
        .and(header("Api-Key", "api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "participantID": "p1",
            "studyStatus": "active",
            "enteredAt": 1700000000,
            "flags": {"gender": "female"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let participant = client(&server)
        .get_participant("covid", "p1")
        .await
        .unwrap();

    assert_eq!(participant.participant_id, "p1");
    assert_eq!(participant.flags.get("gender").map(String::as_str), Some("female"));
    assert!(participant.last_submissions.is_empty());
}

#[tokio::test]
async fn missing_resources_map_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/participants/ghost", BASE_PATH)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = client(&server).get_participant("covid", "ghost").await;

    assert!(matches!(result, Err(StudyServiceError::NotFound(_))));
}

#[tokio::test]
async fn server_errors_keep_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(BASE_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let result = client(&server).get_study("covid").await;

    match result {
        Err(StudyServiceError::Api { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn participants_are_streamed_across_pages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}/participants/query", BASE_PATH)))
        .and(body_partial_json(json!({"page": 1})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "participants": [{"participantID": "p1"}, {"participantID": "p2"}],
            "totalPages": 2
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/participants/query", BASE_PATH)))
        .and(body_partial_json(json!({"page": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "participants": [{"participantID": "p3"}],
            "totalPages": 2
        })))
        .expect(1)
        .mount(&server)
        .await;

    let participants: Vec<_> = client(&server)
        .stream_participants("covid", ParticipantStateFilter::default())
        .collect()
        .await;

    let pids: Vec<String> = participants
        .into_iter()
        .map(|p| p.unwrap().participant_id)
        .collect();
    assert_eq!(pids, vec!["p1", "p2", "p3"]);
}

#[tokio::test]
async fn response_queries_carry_filter_and_sort() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}/responses/query", BASE_PATH)))
        .and(body_partial_json(json!({
            "filter": {"participantId": "p1", "surveyKey": "weekly", "arrivedFrom": 10},
            "sort": "desc",
            "page": 1,
            "pageSize": 1
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "responses": [{"id": "r1", "key": "weekly", "participantID": "p1", "arrivedAt": 20}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let filter = ResponseFilter {
        participant_id: "p1".to_string(),
        survey_key: "weekly".to_string(),
        arrived_from: Some(10),
        arrived_until: None,
    };
    let responses = client(&server)
        .get_responses("covid", &filter, ResponseSortDirection::Desc, 1, 1)
        .await;

    let responses = assert_ok!(responses);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].arrived_at, 20);
}
