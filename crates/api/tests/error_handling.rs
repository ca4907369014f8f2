//! Integration tests for the JSON error envelope.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{body_json, get, post_json};
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
async fn unknown_job_is_404_with_code() {
    let app = common::build_test_app();
    let response = get(app.router.clone(), "/api/v1/jobs/job_missing").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "JOB_NOT_FOUND");
    assert!(json["error"].as_str().unwrap().contains("job_missing"));
}

#[tokio::test]
async fn unknown_job_results_and_progress_are_404() {
    let app = common::build_test_app();

    let response = get(app.router.clone(), "/api/v1/jobs/job_missing/results").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(app.router.clone(), "/api/v1/jobs/job_missing/progress").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "JOB_NOT_FOUND");
}

#[tokio::test]
async fn empty_job_input_is_rejected() {
    let app = common::build_test_app();
    let response = post_json(
        app.router.clone(),
        "/api/v1/jobs",
        json!({ "isbns": ["", "   "] }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "EMPTY_INPUT");
    assert_eq!(app.state.jobs.job_count().await, 0);
}

#[tokio::test]
async fn zero_chunk_size_is_a_validation_error() {
    let app = common::build_test_app();
    let response = post_json(
        app.router.clone(),
        "/api/v1/jobs",
        json!({ "isbns": ["9788804668237"], "chunk_size": 0 }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn oversized_sync_batch_is_rejected() {
    let app = common::build_test_app();
    let response = post_json(
        app.router.clone(),
        "/api/v1/workflow",
        json!({ "isbns": ["1111111111", "2222222222", "3333333333", "4444444444"] }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(app.model.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn scrape_failure_is_bad_gateway() {
    let app = common::build_test_app();
    let response = post_json(
        app.router.clone(),
        "/api/v1/scrape",
        json!({ "isbn": "0001112223" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(response).await;
    assert_eq!(json["code"], "SCRAPE_FAILED");
    assert_eq!(json["error"], "Failed to scrape from Libraccio.it: HTTP 404");
}

#[tokio::test]
async fn malformed_json_is_client_error() {
    let app = common::build_test_app();
    let response = app
        .router
        .clone()
        .oneshot(
            Request::post("/api/v1/jobs")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn missing_csv_field_is_bad_request() {
    let app = common::build_test_app();
    let response = common::post_csv(
        app.router.clone(),
        "/api/v1/jobs/csv",
        "not_the_file",
        "isbns.csv",
        "isbn\n9788804668237\n",
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(json["error"], "No CSV file uploaded");
}

#[tokio::test]
async fn export_without_store_file_is_404() {
    let app = common::build_test_app();
    let response = get(app.router.clone(), "/api/v1/books/export").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}
