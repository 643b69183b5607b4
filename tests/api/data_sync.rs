use chrono::{Duration, Utc};

use recruitment_lists::db::{ParticipantStore, SyncInfoStore};
use recruitment_lists::models::recruitment_lists::{
    ExclusionCondition, Mapping, MappingType, ParticipantInfoDefinition, ResearchDataDefinition,
    SourceType,
};
use recruitment_lists::models::sync_infos::{SyncInfo, SyncStatus};
use recruitment_lists::study::PARTICIPANT_STUDY_STATUS_ACCOUNT_DELETED;
use recruitment_lists::sync::SyncError;

use crate::helpers::{
    active_participant, auto_list, single_choice_response, single_choice_version, spawn_app,
    study_participant, STUDY_KEY,
};

fn weekly_definition() -> ResearchDataDefinition {
    ResearchDataDefinition {
        id: "rd1".to_string(),
        survey_key: "weekly".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn participants_deleted_in_the_study_are_soft_deleted_with_a_note() {
    let app = spawn_app();
    app.study.add_participant(
        STUDY_KEY,
        study_participant("p1", PARTICIPANT_STUDY_STATUS_ACCOUNT_DELETED),
    );
    let list = app.store_list(auto_list("Study A")).await;
    app.db.create_participant("p1", list.id, "auto").await.unwrap();

    app.service.sync_research_data(list.id).await.unwrap();

    let members = app.db.all_participants(list.id);
    assert!(members[0].deleted_at.is_some());
    assert!(members[0].infos.is_empty());
    let notes = app.db.all_notes(list.id);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].note, "Participant deleted: deleted in study DB");
    assert_eq!(notes[0].pid, members[0].id);
}

#[tokio::test]
async fn deleted_members_are_not_looked_up_again() {
    let app = spawn_app();
    app.study.add_participant(
        STUDY_KEY,
        study_participant("p1", PARTICIPANT_STUDY_STATUS_ACCOUNT_DELETED),
    );
    let mut list = auto_list("Study A");
    list.participant_data.research_data = vec![weekly_definition()];
    let list = app.store_list(list).await;
    app.db.create_participant("p1", list.id, "auto").await.unwrap();

    app.service.sync_research_data(list.id).await.unwrap();
    let lookups = app.study.participant_lookups();
    app.service.sync_research_data(list.id).await.unwrap();

    assert_eq!(app.study.participant_lookups(), lookups);
    assert_eq!(app.db.all_notes(list.id).len(), 1);
}

#[tokio::test]
async fn exclusion_conditions_remove_matching_participants() {
    let app = spawn_app();
    let mut withdrawn = active_participant("p1");
    withdrawn
        .flags
        .insert("consent".to_string(), "withdrawn".to_string());
    let mut consenting = active_participant("p2");
    consenting
        .flags
        .insert("consent".to_string(), "given".to_string());
    app.study.add_participant(STUDY_KEY, withdrawn);
    app.study.add_participant(STUDY_KEY, consenting);

    let mut list = auto_list("Study A");
    list.participant_data.participant_infos = vec![ParticipantInfoDefinition {
        id: "i1".to_string(),
        label: "Consent".to_string(),
        source_type: SourceType::FlagValue,
        source_key: "consent".to_string(),
        show_in_preview: true,
        mapping_type: MappingType::Default,
        mapping: vec![],
    }];
    list.exclusion_conditions = vec![ExclusionCondition {
        key: "Consent".to_string(),
        value: "withdrawn".to_string(),
    }];
    let list = app.store_list(list).await;
    app.db.create_participant("p1", list.id, "auto").await.unwrap();
    app.db.create_participant("p2", list.id, "auto").await.unwrap();

    app.service.sync_research_data(list.id).await.unwrap();

    let members = app.db.all_participants(list.id);
    assert!(members[0].deleted_at.is_some());
    assert!(members[1].deleted_at.is_none());
    assert_eq!(members[1].infos.get("Consent").map(String::as_str), Some("given"));
    let notes = app.db.all_notes(list.id);
    assert_eq!(notes.len(), 1);
    assert_eq!(
        notes[0].note,
        "Participant deleted: excluded by exclusion conditions"
    );
}

#[tokio::test]
async fn new_responses_are_stored_once() {
    let app = spawn_app();
    app.study.add_participant(STUDY_KEY, active_participant("p1"));
    app.study
        .set_survey_versions(STUDY_KEY, "weekly", vec![single_choice_version("weekly")]);
    app.study.add_response(
        STUDY_KEY,
        single_choice_response("r1", "weekly", "p1", "a", 1_700_000_100),
    );
    app.study.add_response(
        STUDY_KEY,
        single_choice_response("r2", "weekly", "p1", "b", 1_700_000_200),
    );

    let mut list = auto_list("Study A");
    list.participant_data.research_data = vec![weekly_definition()];
    let list = app.store_list(list).await;
    app.db.create_participant("p1", list.id, "auto").await.unwrap();

    app.service.sync_research_data(list.id).await.unwrap();
    app.service.sync_research_data(list.id).await.unwrap();

    let data = app.db.all_research_data(list.id);
    assert_eq!(data.len(), 2);
    assert_eq!(data[0].response_id, "r1");
    assert_eq!(data[0].survey_key, "weekly");
    assert_eq!(
        data[0].response.get("weekly.q1"),
        Some(&serde_json::Value::String("a".to_string()))
    );
    assert_eq!(data[1].response_id, "r2");

    let info = app.db.get_sync_info(list.id).await.unwrap().unwrap();
    assert_eq!(info.data_sync_status, SyncStatus::Idle);
}

#[tokio::test]
async fn failing_study_lookups_skip_only_that_participant() {
    let app = spawn_app();
    app.study.add_participant(STUDY_KEY, active_participant("p1"));
    app.study.add_participant(STUDY_KEY, active_participant("p2"));
    app.study.fail_participant("p1");
    app.study
        .set_survey_versions(STUDY_KEY, "weekly", vec![single_choice_version("weekly")]);
    app.study.add_response(
        STUDY_KEY,
        single_choice_response("r1", "weekly", "p2", "a", 1_700_000_100),
    );

    let mut list = auto_list("Study A");
    list.participant_data.research_data = vec![weekly_definition()];
    let list = app.store_list(list).await;
    app.db.create_participant("p1", list.id, "auto").await.unwrap();
    app.db.create_participant("p2", list.id, "auto").await.unwrap();

    app.service.sync_research_data(list.id).await.unwrap();

    let data = app.db.all_research_data(list.id);
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].participant_id, "p2");
    assert!(app
        .db
        .all_participants(list.id)
        .iter()
        .all(|p| p.deleted_at.is_none()));
}

#[tokio::test]
async fn a_running_data_sync_blocks_a_new_one() {
    let app = spawn_app();
    let list = app.store_list(auto_list("Study A")).await;
    app.db.put_sync_info(SyncInfo {
        data_sync_status: SyncStatus::Running,
        data_sync_started_at: Some(Utc::now() - Duration::minutes(10)),
        ..SyncInfo::empty(list.id)
    });

    let result = app.service.sync_research_data(list.id).await;

    assert!(matches!(result, Err(SyncError::Overlap(_))));
}

#[tokio::test]
async fn a_stale_running_data_sync_is_taken_over() {
    let app = spawn_app();
    let list = app.store_list(auto_list("Study A")).await;
    let stale_start = Utc::now() - Duration::hours(4);
    app.db.put_sync_info(SyncInfo {
        data_sync_status: SyncStatus::Running,
        data_sync_started_at: Some(stale_start),
        ..SyncInfo::empty(list.id)
    });

    app.service.sync_research_data(list.id).await.unwrap();

    let info = app.db.get_sync_info(list.id).await.unwrap().unwrap();
    assert_eq!(info.data_sync_status, SyncStatus::Idle);
    assert!(info.data_sync_started_at.unwrap() > stale_start);
}

#[tokio::test]
async fn response_data_infos_are_mapped() {
    let app = spawn_app();
    let mut participant = active_participant("p1");
    participant
        .last_submissions
        .insert("survey1".to_string(), 1_700_000_100);
    app.study.add_participant(STUDY_KEY, participant);
    app.study
        .set_survey_versions(STUDY_KEY, "survey1", vec![single_choice_version("survey1")]);
    app.study.add_response(
        STUDY_KEY,
        single_choice_response("r1", "survey1", "p1", "1", 1_700_000_100),
    );

    let mut list = auto_list("Study A");
    list.participant_data.participant_infos = vec![ParticipantInfoDefinition {
        id: "i1".to_string(),
        label: "Vaccinated".to_string(),
        source_type: SourceType::ResponseData,
        source_key: "survey1.q1".to_string(),
        show_in_preview: true,
        mapping_type: MappingType::Key2Value,
        mapping: vec![
            Mapping {
                key: "1".to_string(),
                value: "yes".to_string(),
            },
            Mapping {
                key: "2".to_string(),
                value: "no".to_string(),
            },
        ],
    }];
    let list = app.store_list(list).await;
    app.db.create_participant("p1", list.id, "auto").await.unwrap();

    app.service.sync_research_data(list.id).await.unwrap();

    let members = app.db.all_participants(list.id);
    assert_eq!(
        members[0].infos.get("Vaccinated").map(String::as_str),
        Some("yes")
    );
}
