//! Integration tests for the family routes.

mod common;

use axum::http::StatusCode;
use serde_json::json;

async fn create_person(app: &axum::Router, given: &str, surname: &str) -> String {
    let (status, person) = common::post_json(
        app.clone(),
        "/api/v1/persons",
        &json!({ "given_names": given, "surname": surname }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    person["id"].as_str().unwrap().to_owned()
}

#[tokio::test]
async fn test_create_family_with_spouses() {
    let app = common::build_test_app().await;
    let husband = create_person(&app, "William", "King").await;
    let wife = create_person(&app, "Ada", "Lovelace").await;

    let (status, family) = common::post_json(
        app,
        "/api/v1/families",
        &json!({ "husband_id": husband, "wife_id": wife, "marriage_date": "1835-07-08" }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(family["husband_id"], husband.as_str());
    assert_eq!(family["children"], json!([]));
    assert_eq!(family["version"], 1);
}

#[tokio::test]
async fn test_link_and_unlink_child_updates_both_sides() {
    let app = common::build_test_app().await;
    let child = create_person(&app, "Byron", "King").await;
    let (_, family) = common::post_json(app.clone(), "/api/v1/families", &json!({})).await;
    let family_id = family["id"].as_str().unwrap().to_owned();

    let (status, family) = common::post_json(
        app.clone(),
        &format!("/api/v1/families/{family_id}/children"),
        &json!({ "person_id": child, "expected_version": 1 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(family["children"], json!([child]));
    assert_eq!(family["version"], 2);

    let (_, person) = common::get_json(app.clone(), &format!("/api/v1/persons/{child}")).await;
    assert_eq!(person["parent_family_id"], family_id.as_str());
    // Denormalized link; the person's own stream did not move.
    assert_eq!(person["version"], 1);

    let (status, family) = common::delete(
        app.clone(),
        &format!("/api/v1/families/{family_id}/children/{child}?expected_version=2"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(family["children"], json!([]));

    let (_, person) = common::get_json(app, &format!("/api/v1/persons/{child}")).await;
    assert!(person["parent_family_id"].is_null());
}

#[tokio::test]
async fn test_link_child_with_stale_version_returns_409() {
    let app = common::build_test_app().await;
    let child = create_person(&app, "Byron", "King").await;
    let (_, family) = common::post_json(app.clone(), "/api/v1/families", &json!({})).await;
    let family_id = family["id"].as_str().unwrap();

    let (status, json) = common::post_json(
        app,
        &format!("/api/v1/families/{family_id}/children"),
        &json!({ "person_id": child, "expected_version": 0 }),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "version_conflict");
}
