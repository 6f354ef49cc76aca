//! Integration tests for the source and citation routes.

mod common;

use axum::http::StatusCode;
use serde_json::json;

async fn create_source(app: &axum::Router, title: &str) -> String {
    let (status, source) = common::post_json(
        app.clone(),
        "/api/v1/sources",
        &json!({ "title": title, "author": "Anonymous" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    source["id"].as_str().unwrap().to_owned()
}

#[tokio::test]
async fn test_citation_snapshots_title_and_bumps_count() {
    let app = common::build_test_app().await;
    let source_id = create_source(&app, "1850 Census").await;

    let (status, citation) = common::post_json(
        app.clone(),
        "/api/v1/citations",
        &json!({ "source_id": source_id, "page": "p. 4", "quality": 3 }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(citation["source_title"], "1850 Census");

    let (_, source) = common::get_json(app.clone(), &format!("/api/v1/sources/{source_id}")).await;
    assert_eq!(source["citation_count"], 1);

    // Renaming the source later leaves the snapshot alone.
    common::put_json(
        app.clone(),
        &format!("/api/v1/sources/{source_id}"),
        &json!({ "expected_version": 1, "title": "1850 US Federal Census" }),
    )
    .await;
    let citation_id = citation["id"].as_str().unwrap();
    let (_, citation) =
        common::get_json(app, &format!("/api/v1/citations/{citation_id}")).await;
    assert_eq!(citation["source_title"], "1850 Census");
}

#[tokio::test]
async fn test_citation_against_unknown_source_returns_404() {
    let app = common::build_test_app().await;

    let (status, _) = common::post_json(
        app,
        "/api/v1/citations",
        &json!({ "source_id": "00000000-0000-0000-0000-000000000000" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_citation_quality_out_of_range_returns_400() {
    let app = common::build_test_app().await;
    let source_id = create_source(&app, "1850 Census").await;

    let (status, json) = common::post_json(
        app,
        "/api/v1/citations",
        &json!({ "source_id": source_id, "quality": 7 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
}

#[tokio::test]
async fn test_cited_source_cannot_be_deleted_until_citations_go() {
    let app = common::build_test_app().await;
    let source_id = create_source(&app, "1850 Census").await;
    let (_, citation) = common::post_json(
        app.clone(),
        "/api/v1/citations",
        &json!({ "source_id": source_id }),
    )
    .await;
    let citation_id = citation["id"].as_str().unwrap();

    let (status, json) = common::delete(
        app.clone(),
        &format!("/api/v1/sources/{source_id}?expected_version=1"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");

    let (status, _) = common::delete(
        app.clone(),
        &format!("/api/v1/citations/{citation_id}?expected_version=1"),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = common::delete(
        app,
        &format!("/api/v1/sources/{source_id}?expected_version=1"),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}
