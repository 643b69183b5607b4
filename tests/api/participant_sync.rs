use chrono::Duration;
use claim::{assert_err, assert_ok};
use fake::Fake;
use std::collections::BTreeSet;

use recruitment_lists::db::{ParticipantStore, SyncInfoStore};
use recruitment_lists::models::sync_infos::SyncStatus;
use recruitment_lists::study::PARTICIPANT_STUDY_STATUS_ACCOUNT_DELETED;
use recruitment_lists::sync::{ImportResult, SyncError, SyncSettings};
use uuid::Uuid;

use crate::helpers::{
    active_participant, auto_list, manual_list, spawn_app, spawn_app_with, study_participant,
    STUDY_KEY,
};

fn no_guard() -> SyncSettings {
    SyncSettings {
        participant_sync_guard: Duration::zero(),
        ..Default::default()
    }
}

#[tokio::test]
async fn participant_sync_includes_active_participants_and_notifies() {
    let app = spawn_app();
    app.study.add_participant(STUDY_KEY, active_participant("p1"));
    app.study.add_participant(STUDY_KEY, active_participant("p2"));
    app.study.add_participant(
        STUDY_KEY,
        study_participant("p3", PARTICIPANT_STUDY_STATUS_ACCOUNT_DELETED),
    );
    let list = app.store_list(auto_list("Study A")).await;

    let added = app.service.sync_participants(list.id).await.unwrap();

    assert_eq!(added, 2);
    let members = app.db.all_participants(list.id);
    let pids: Vec<&str> = members.iter().map(|p| p.participant_id.as_str()).collect();
    assert_eq!(pids, vec!["p1", "p2"]);
    assert!(members.iter().all(|p| p.included_by == "auto"));

    let sent = app.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "[Study A] - New participants");
    assert_eq!(
        sent[0].body,
        "2 new participants have been added to recruitment list 'Study A'"
    );
    assert_eq!(sent[0].recipients, vec!["team@example.org".to_string()]);

    let info = app.db.get_sync_info(list.id).await.unwrap().unwrap();
    assert_eq!(info.participant_sync_status, SyncStatus::Idle);
    assert!(info.participant_sync_started_at.is_some());
}

#[tokio::test]
async fn a_second_run_within_the_guard_is_rejected() {
    let app = spawn_app();
    app.study.add_participant(STUDY_KEY, active_participant("p1"));
    let list = app.store_list(auto_list("Study A")).await;

    assert_ok!(app.service.sync_participants(list.id).await);
    let second = app.service.sync_participants(list.id).await;

    assert!(matches!(second, Err(SyncError::Overlap(_))));
    assert_eq!(app.db.all_participants(list.id).len(), 1);
}

#[tokio::test]
async fn rerunning_without_new_participants_sends_no_email() {
    let app = spawn_app_with(no_guard());
    app.study.add_participant(STUDY_KEY, active_participant("p1"));
    let list = app.store_list(auto_list("Study A")).await;

    assert_eq!(app.service.sync_participants(list.id).await.unwrap(), 1);
    assert_eq!(app.service.sync_participants(list.id).await.unwrap(), 0);

    assert_eq!(app.db.all_participants(list.id).len(), 1);
    assert_eq!(app.notifier.sent().len(), 1);
}

#[tokio::test]
async fn a_single_new_participant_gets_the_singular_wording() {
    let app = spawn_app_with(no_guard());
    app.study.add_participant(STUDY_KEY, active_participant("p1"));
    let list = app.store_list(auto_list("Study A")).await;
    app.service.sync_participants(list.id).await.unwrap();

    app.study.add_participant(STUDY_KEY, active_participant("p2"));
    app.service.sync_participants(list.id).await.unwrap();

    let sent = app.notifier.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(
        sent[1].body,
        "One new participant has been added to recruitment list 'Study A'"
    );
}

#[tokio::test]
async fn only_participants_matching_the_criteria_are_included() {
    let app = spawn_app();
    let mut female = active_participant("p1");
    female.flags.insert("gender".to_string(), "female".to_string());
    let mut male = active_participant("p2");
    male.flags.insert("gender".to_string(), "male".to_string());
    app.study.add_participant(STUDY_KEY, female);
    app.study.add_participant(STUDY_KEY, male);

    let mut list = auto_list("Study A");
    if let Some(config) = list.participant_inclusion.auto_config.as_mut() {
        config.criteria = r#"{
            "operator": "AND",
            "conditions": [
                {"kind": "condition", "type": "flagHasValue", "key": "gender", "value": "female"}
            ]
        }"#
        .to_string();
    }
    let list = app.store_list(list).await;

    assert_eq!(app.service.sync_participants(list.id).await.unwrap(), 1);
    assert_eq!(app.db.all_participants(list.id)[0].participant_id, "p1");
}

#[tokio::test]
async fn broken_criteria_fail_without_starting_a_sync() {
    let app = spawn_app();
    let mut list = auto_list("Study A");
    if let Some(config) = list.participant_inclusion.auto_config.as_mut() {
        config.criteria = "{not json".to_string();
    }
    let list = app.store_list(list).await;

    let result = app.service.sync_participants(list.id).await;

    assert!(matches!(result, Err(SyncError::Config(_))));
    assert!(app.db.get_sync_info(list.id).await.unwrap().is_none());
}

#[tokio::test]
async fn manual_lists_are_not_synced() {
    let app = spawn_app();
    app.study.add_participant(STUDY_KEY, active_participant("p1"));
    let list = app.store_list(manual_list("Manual")).await;

    assert_eq!(app.service.sync_participants(list.id).await.unwrap(), 0);
    assert!(app.db.all_participants(list.id).is_empty());
    assert!(app.notifier.sent().is_empty());
}

#[tokio::test]
async fn syncing_an_unknown_list_is_not_found() {
    let app = spawn_app();
    let result = app.service.sync_participants(Uuid::new_v4()).await;
    assert!(matches!(result, Err(SyncError::NotFound(_))));
}

#[tokio::test]
async fn import_participant_adds_once() {
    let app = spawn_app();
    app.study.add_participant(STUDY_KEY, active_participant("p1"));
    let list = app.store_list(manual_list("Manual")).await;

    let first = app
        .service
        .import_participant(list.id, "p1", "researcher-1")
        .await
        .unwrap();
    let second = app
        .service
        .import_participant(list.id, "p1", "researcher-1")
        .await
        .unwrap();

    assert_eq!(first, ImportResult::Imported);
    assert_eq!(second, ImportResult::AlreadyIncluded);
    let members = app.db.all_participants(list.id);
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].included_by, "researcher-1");
    assert!(app.db.participant_exists("p1", list.id).await.unwrap());
}

#[tokio::test]
async fn deleted_or_unknown_participants_cannot_be_imported() {
    let app = spawn_app();
    app.study.add_participant(
        STUDY_KEY,
        study_participant("gone", PARTICIPANT_STUDY_STATUS_ACCOUNT_DELETED),
    );
    let list = app.store_list(manual_list("Manual")).await;

    let deleted = app
        .service
        .import_participant(list.id, "gone", "researcher-1")
        .await;
    assert!(matches!(deleted, Err(SyncError::Config(_))));

    assert_err!(
        app.service
            .import_participant(list.id, "nobody", "researcher-1")
            .await
    );
    assert!(app.db.all_participants(list.id).is_empty());
}

#[tokio::test]
async fn every_active_participant_is_included_exactly_once() {
    let app = spawn_app_with(no_guard());
    let pids: BTreeSet<String> = (0..40).map(|_| (12usize..20).fake::<String>()).collect();
    for pid in &pids {
        app.study.add_participant(STUDY_KEY, active_participant(pid));
    }
    let list = app.store_list(auto_list("Study A")).await;

    let added = app.service.sync_participants(list.id).await.unwrap();
    app.service.sync_participants(list.id).await.unwrap();

    assert_eq!(added, pids.len());
    let included: BTreeSet<String> = app
        .db
        .all_participants(list.id)
        .into_iter()
        .map(|p| p.participant_id)
        .collect();
    assert_eq!(included, pids);
    assert_eq!(app.db.all_participants(list.id).len(), pids.len());
}

#[tokio::test]
async fn status_criteria_select_the_active_participants() {
    let app = spawn_app();
    app.study.add_participant(STUDY_KEY, active_participant("p1"));
    app.study.add_participant(STUDY_KEY, active_participant("p2"));
    app.study
        .add_participant(STUDY_KEY, study_participant("p3", "paused"));

    let mut list = auto_list("Study A");
    if let Some(config) = list.participant_inclusion.auto_config.as_mut() {
        config.criteria =
            r#"{"operator":"AND","conditions":[{"type":"hasStatus","value":"active"}]}"#
                .to_string();
    }
    let list = app.store_list(list).await;

    let added = app.service.sync_participants(list.id).await.unwrap();

    assert_eq!(added, 2);
    let members: Vec<(String, String)> = app
        .db
        .all_participants(list.id)
        .into_iter()
        .map(|p| (p.participant_id, p.included_by))
        .collect();
    assert_eq!(
        members,
        vec![
            ("p1".to_string(), "auto".to_string()),
            ("p2".to_string(), "auto".to_string()),
        ]
    );
}
