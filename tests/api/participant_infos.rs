use std::collections::BTreeMap;

use recruitment_lists::db::ParticipantStore;
use recruitment_lists::models::participants::Participant;
use recruitment_lists::models::recruitment_lists::{
    MappingType, ParticipantInfoDefinition, RecruitmentList, SourceType,
};
use recruitment_lists::study::id_mapping::{participant_id_to_confidential_id, ID_MAPPING_SHA256};
use recruitment_lists::study::{Study, StudyConfigs, SurveyItemResponse, SurveyResponse};
use recruitment_lists::sync::SyncRunContext;

use crate::helpers::{active_participant, auto_list, item, spawn_app, TestApp, GLOBAL_SECRET, STUDY_KEY};

const STUDY_SECRET: &str = "study-secret";

fn definition(label: &str, source_type: SourceType, source_key: &str) -> ParticipantInfoDefinition {
    ParticipantInfoDefinition {
        id: label.to_lowercase(),
        label: label.to_string(),
        source_type,
        source_key: source_key.to_string(),
        show_in_preview: false,
        mapping_type: MappingType::Default,
        mapping: vec![],
    }
}

fn confidential_response(pid: &str, name: &str, arrived_at: i64) -> SurveyResponse {
    let confidential_id =
        participant_id_to_confidential_id(pid, GLOBAL_SECRET, STUDY_SECRET, ID_MAPPING_SHA256)
            .unwrap();
    SurveyResponse {
        id: format!("c{}", arrived_at),
        key: "contact".to_string(),
        participant_id: confidential_id,
        arrived_at,
        responses: vec![SurveyItemResponse {
            key: "contact.address".to_string(),
            response: Some(item("rg", "", vec![item("name", name, vec![])])),
        }],
        context: BTreeMap::new(),
        ..Default::default()
    }
}

fn add_study(app: &TestApp) {
    app.study.add_study(Study {
        key: STUDY_KEY.to_string(),
        secret_key: STUDY_SECRET.to_string(),
        configs: StudyConfigs {
            id_mapping_method: ID_MAPPING_SHA256.to_string(),
        },
    });
}

async fn member(app: &TestApp, list: &RecruitmentList, pid: &str) -> Participant {
    app.db.create_participant(pid, list.id, "auto").await.unwrap()
}

#[tokio::test]
async fn confidential_data_uses_the_newest_response() {
    let app = spawn_app();
    add_study(&app);
    app.study
        .add_confidential_response(STUDY_KEY, confidential_response("p1", "Old Name", 100));
    app.study
        .add_confidential_response(STUDY_KEY, confidential_response("p1", "New Name", 200));

    let mut list = auto_list("Study A");
    list.participant_data.participant_infos = vec![definition(
        "Name",
        SourceType::ConfidentialData,
        "contact.address-rg.name",
    )];
    let list = app.store_list(list).await;
    let participant = member(&app, &list, "p1").await;

    let infos = app
        .service
        .derive_participant_infos(
            &list,
            &participant,
            &active_participant("p1"),
            None,
            &mut SyncRunContext::new(),
        )
        .await
        .unwrap();

    assert_eq!(infos.get("Name").map(String::as_str), Some("New Name"));
    assert_eq!(app.db.all_participants(list.id)[0].infos, infos);
}

#[tokio::test]
async fn failing_confidential_lookups_leave_other_infos_intact() {
    let app = spawn_app();
    add_study(&app);
    app.study.fail_confidential_lookups(true);

    let mut study_participant = active_participant("p1");
    study_participant
        .flags
        .insert("region".to_string(), "north".to_string());

    let mut list = auto_list("Study A");
    list.participant_data.participant_infos = vec![
        definition("Name", SourceType::ConfidentialData, "contact.address-rg.name"),
        definition("Region", SourceType::FlagValue, "region"),
    ];
    let list = app.store_list(list).await;
    let participant = member(&app, &list, "p1").await;

    let infos = app
        .service
        .derive_participant_infos(
            &list,
            &participant,
            &study_participant,
            None,
            &mut SyncRunContext::new(),
        )
        .await
        .unwrap();

    assert!(infos.get("Name").is_none());
    assert_eq!(infos.get("Region").map(String::as_str), Some("north"));
}

#[tokio::test]
async fn labels_without_definition_are_dropped() {
    let app = spawn_app();
    let mut list = auto_list("Study A");
    list.participant_data.participant_infos =
        vec![definition("Region", SourceType::FlagValue, "region")];
    let list = app.store_list(list).await;

    let mut participant = Participant::new("p1", list.id, "auto");
    participant
        .infos
        .insert("Removed".to_string(), "stale".to_string());
    participant
        .infos
        .insert("Region".to_string(), "south".to_string());
    app.db.put_participant(participant.clone());

    let infos = app
        .service
        .derive_participant_infos(
            &list,
            &participant,
            &active_participant("p1"),
            None,
            &mut SyncRunContext::new(),
        )
        .await
        .unwrap();

    assert!(infos.get("Removed").is_none());
    // a missing flag yields an empty value
    assert_eq!(infos.get("Region").map(String::as_str), Some(""));
}

#[tokio::test]
async fn definitions_without_label_or_source_key_are_skipped() {
    let app = spawn_app();
    let mut study_participant = active_participant("p1");
    study_participant
        .flags
        .insert("region".to_string(), "north".to_string());

    let mut list = auto_list("Study A");
    list.participant_data.participant_infos = vec![
        definition("", SourceType::FlagValue, "region"),
        definition("Empty", SourceType::FlagValue, ""),
    ];
    let list = app.store_list(list).await;
    let participant = member(&app, &list, "p1").await;

    let infos = app
        .service
        .derive_participant_infos(
            &list,
            &participant,
            &study_participant,
            None,
            &mut SyncRunContext::new(),
        )
        .await
        .unwrap();

    assert!(infos.is_empty());
}
