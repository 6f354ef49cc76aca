//! Integration tests for the history routes.

mod common;

use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn test_entity_history_shows_diffs_and_actor() {
    let app = common::build_test_app().await;
    let (_, person) = common::post_json_as(
        app.clone(),
        "/api/v1/persons",
        "margaret",
        &json!({ "given_names": "Ada", "surname": "Lovelace" }),
    )
    .await;
    let id = person["id"].as_str().unwrap();

    common::put_json(
        app.clone(),
        &format!("/api/v1/persons/{id}"),
        &json!({ "expected_version": 1, "surname": "King" }),
    )
    .await;

    let (status, history) =
        common::get_json(app, &format!("/api/v1/history/person/{id}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["total"], 2);
    let entries = history["entries"].as_array().unwrap();
    assert_eq!(entries[0]["action"], "updated");
    assert_eq!(entries[0]["changes"]["surname"]["old"], "Lovelace");
    assert_eq!(entries[0]["changes"]["surname"]["new"], "King");
    assert_eq!(entries[0]["entity_name"], "Ada King");
    assert_eq!(entries[1]["action"], "created");
    assert_eq!(entries[1]["actor"], "margaret");
}

#[tokio::test]
async fn test_global_history_filters_by_entity_type() {
    let app = common::build_test_app().await;
    common::post_json(
        app.clone(),
        "/api/v1/persons",
        &json!({ "given_names": "Ada", "surname": "Lovelace" }),
    )
    .await;
    common::post_json(
        app.clone(),
        "/api/v1/sources",
        &json!({ "title": "1850 Census" }),
    )
    .await;

    let (status, all) = common::get_json(app.clone(), "/api/v1/history").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all["total"], 2);

    let (status, sources) =
        common::get_json(app.clone(), "/api/v1/history?entity_type=source").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sources["total"], 1);
    assert_eq!(sources["entries"][0]["entity_name"], "1850 Census");

    let (status, json) = common::get_json(app, "/api/v1/history?entity_type=starship").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
}

#[tokio::test]
async fn test_history_survives_entity_deletion() {
    let app = common::build_test_app().await;
    let (_, person) = common::post_json(
        app.clone(),
        "/api/v1/persons",
        &json!({ "given_names": "Ada", "surname": "Lovelace" }),
    )
    .await;
    let id = person["id"].as_str().unwrap();
    common::delete(app.clone(), &format!("/api/v1/persons/{id}?expected_version=1")).await;

    let (status, history) =
        common::get_json(app, &format!("/api/v1/history/person/{id}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["total"], 2);
    assert_eq!(history["entries"][0]["action"], "deleted");
    assert_eq!(history["entries"][0]["entity_name"], "");
}
