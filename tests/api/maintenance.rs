use std::collections::BTreeMap;

use recruitment_lists::db::{
    ParticipantStore, PermissionStore, RecruitmentListStore, ResearchDataStore, SyncInfoStore,
};
use recruitment_lists::models::permissions::ACTION_ACCESS_RECRUITMENT_LIST;
use recruitment_lists::models::research_data::ResponseData;
use recruitment_lists::models::sync_infos::SyncStatus;
use recruitment_lists::sync::SyncError;
use uuid::Uuid;

use crate::helpers::{active_participant, auto_list, spawn_app, TestApp, STUDY_KEY};

fn stored_response(list_id: Uuid, pid: &str, response_id: &str) -> ResponseData {
    ResponseData {
        id: Uuid::new_v4(),
        response_id: response_id.to_string(),
        participant_id: pid.to_string(),
        recruitment_list_id: list_id,
        survey_key: "weekly".to_string(),
        arrived_at: 1_700_000_000,
        response: BTreeMap::new(),
    }
}

async fn populated_list(app: &TestApp) -> Uuid {
    app.study.add_participant(STUDY_KEY, active_participant("p1"));
    let list = app.store_list(auto_list("Study A")).await;
    app.service.sync_participants(list.id).await.unwrap();
    app.db.start_data_sync(list.id).await.unwrap();
    app.db
        .save_research_data(&[stored_response(list.id, "p1", "r1")])
        .await
        .unwrap();
    list.id
}

#[tokio::test]
async fn reset_participant_sync_clears_members_and_data() {
    let app = spawn_app();
    let list_id = populated_list(&app).await;

    app.service.reset_participant_sync(list_id).await.unwrap();

    assert!(app.db.all_participants(list_id).is_empty());
    assert!(app.db.all_research_data(list_id).is_empty());
    assert!(app.db.all_notes(list_id).is_empty());
    let info = app.db.get_sync_info(list_id).await.unwrap().unwrap();
    assert_eq!(info.participant_sync_status, SyncStatus::Idle);
    assert!(info.participant_sync_started_at.is_none());
    assert_eq!(info.data_sync_status, SyncStatus::Idle);
    assert!(info.data_sync_started_at.is_none());

    // the guard no longer applies after a reset
    assert_eq!(app.service.sync_participants(list_id).await.unwrap(), 1);
}

#[tokio::test]
async fn reset_data_sync_keeps_members() {
    let app = spawn_app();
    let list_id = populated_list(&app).await;

    app.service.reset_data_sync(list_id).await.unwrap();

    assert_eq!(app.db.all_participants(list_id).len(), 1);
    assert!(app.db.all_research_data(list_id).is_empty());
    let info = app.db.get_sync_info(list_id).await.unwrap().unwrap();
    assert_eq!(info.data_sync_status, SyncStatus::Idle);
    assert!(info.data_sync_started_at.is_none());
    assert!(info.participant_sync_started_at.is_some());
}

#[tokio::test]
async fn deleting_a_list_removes_everything_attached() {
    let app = spawn_app();
    let list_id = populated_list(&app).await;
    app.db
        .create_permission(
            "researcher-2",
            ACTION_ACCESS_RECRUITMENT_LIST,
            &list_id.to_string(),
            "researcher-1",
            vec![],
        )
        .await
        .unwrap();

    app.service.delete_recruitment_list(list_id).await.unwrap();

    assert!(app.db.get_recruitment_list(list_id).await.is_err());
    assert_eq!(app.db.count_participants(list_id).await.unwrap(), 0);
    assert!(app.db.all_research_data(list_id).is_empty());
    assert!(app.db.get_sync_info(list_id).await.unwrap().is_none());
    assert!(app
        .db
        .get_permissions_by_resource(&list_id.to_string())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn deleting_an_unknown_list_is_not_found() {
    let app = spawn_app();
    let result = app.service.delete_recruitment_list(Uuid::new_v4()).await;
    assert!(matches!(result, Err(SyncError::NotFound(_))));
}
