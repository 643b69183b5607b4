use actix_web::{http::StatusCode, test, web, App};
use jsonwebtoken::{encode, EncodingKey, Header};
use secrecy::Secret;
use serde_json::{json, Value};

use recruitment_lists::core::config::JwtAuthConfig;
use recruitment_lists::core::jwt_auth::JwtClaims;
use recruitment_lists::db::PermissionStore;
use recruitment_lists::models::permissions::{
    ACTION_ACCESS_RECRUITMENT_LIST, ACTION_MANAGE_RECRUITMENT_LIST,
};
use recruitment_lists::routes::recruitment_list_api_routes;

use crate::helpers::{active_participant, manual_list, spawn_app, STUDY_KEY};

const JWT_SECRET: &str = "test-jwt-secret";

fn token(user_id: &str, is_admin: bool) -> String {
    let claims = JwtClaims {
        sub: user_id.to_string(),
        email: format!("{}@example.org", user_id),
        is_admin,
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

fn bearer(user_id: &str, is_admin: bool) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token(user_id, is_admin)))
}

macro_rules! test_app {
    ($service:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($service))
                .app_data(web::Data::new(JwtAuthConfig {
                    secret: Secret::new(JWT_SECRET.to_string()),
                }))
                .configure(recruitment_list_api_routes),
        )
        .await
    };
}

#[actix_web::test]
async fn health_check_works() {
    let app = spawn_app();
    let api = test_app!(app.service.clone());

    let req = test::TestRequest::get().uri("/health_check").to_request();
    let resp = test::call_service(&api, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn requests_without_token_are_rejected() {
    let app = spawn_app();
    let list = app.store_list(manual_list("Manual")).await;
    let api = test_app!(app.service.clone());

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/recruitment-lists/{}/sync-infos", list.id))
        .to_request();
    let resp = test::call_service(&api, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn users_without_permission_are_forbidden() {
    let app = spawn_app();
    let list = app.store_list(manual_list("Manual")).await;
    let api = test_app!(app.service.clone());

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/recruitment-lists/{}/sync-infos", list.id))
        .insert_header(bearer("researcher-2", false))
        .to_request();
    let resp = test::call_service(&api, req).await;

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn admins_get_empty_sync_infos_for_new_lists() {
    let app = spawn_app();
    let list = app.store_list(manual_list("Manual")).await;
    let api = test_app!(app.service.clone());

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/recruitment-lists/{}/sync-infos", list.id))
        .insert_header(bearer("admin", true))
        .to_request();
    let body: Value = test::call_and_read_body_json(&api, req).await;

    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["recruitmentListId"], json!(list.id.to_string()));
    assert_eq!(body["data"]["participantSyncStatus"], json!("idle"));
    assert_eq!(body["data"]["dataSyncStatus"], json!("idle"));
}

#[actix_web::test]
async fn imported_participants_show_up_in_the_participant_list() {
    let app = spawn_app();
    app.study.add_participant(STUDY_KEY, active_participant("p1"));
    let list = app.store_list(manual_list("Manual")).await;
    app.db
        .create_permission(
            "researcher-2",
            ACTION_MANAGE_RECRUITMENT_LIST,
            &list.id.to_string(),
            "admin",
            vec![],
        )
        .await
        .unwrap();
    let api = test_app!(app.service.clone());

    let req = test::TestRequest::post()
        .uri(&format!(
            "/api/v1/recruitment-lists/{}/import-participant",
            list.id
        ))
        .insert_header(bearer("researcher-2", false))
        .set_json(json!({"participantId": "p1"}))
        .to_request();
    let resp = test::call_service(&api, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri(&format!(
            "/api/v1/recruitment-lists/{}/participants?page=1&limit=10",
            list.id
        ))
        .insert_header(bearer("researcher-2", false))
        .to_request();
    let body: Value = test::call_and_read_body_json(&api, req).await;

    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["data"][0]["participantId"], json!("p1"));
    assert_eq!(body["data"][0]["includedBy"], json!("researcher-2"));
    assert_eq!(body["pagination"]["totalCount"], json!(1));
}

#[actix_web::test]
async fn access_permission_does_not_allow_imports() {
    let app = spawn_app();
    app.study.add_participant(STUDY_KEY, active_participant("p1"));
    let list = app.store_list(manual_list("Manual")).await;
    app.db
        .create_permission(
            "researcher-3",
            ACTION_ACCESS_RECRUITMENT_LIST,
            &list.id.to_string(),
            "admin",
            vec![],
        )
        .await
        .unwrap();
    let api = test_app!(app.service.clone());

    let req = test::TestRequest::post()
        .uri(&format!(
            "/api/v1/recruitment-lists/{}/import-participant",
            list.id
        ))
        .insert_header(bearer("researcher-3", false))
        .set_json(json!({"participantId": "p1"}))
        .to_request();
    let resp = test::call_service(&api, req).await;

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(app.db.all_participants(list.id).is_empty());
}

#[actix_web::test]
async fn importing_into_an_unknown_list_is_not_found() {
    let app = spawn_app();
    let api = test_app!(app.service.clone());

    let req = test::TestRequest::post()
        .uri(&format!(
            "/api/v1/recruitment-lists/{}/import-participant",
            uuid::Uuid::new_v4()
        ))
        .insert_header(bearer("admin", true))
        .set_json(json!({"participantId": "p1"}))
        .to_request();
    let resp = test::call_service(&api, req).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn empty_participant_ids_are_rejected() {
    let app = spawn_app();
    let list = app.store_list(manual_list("Manual")).await;
    let api = test_app!(app.service.clone());

    let req = test::TestRequest::post()
        .uri(&format!(
            "/api/v1/recruitment-lists/{}/import-participant",
            list.id
        ))
        .insert_header(bearer("admin", true))
        .set_json(json!({"participantId": ""}))
        .to_request();
    let resp = test::call_service(&api, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
