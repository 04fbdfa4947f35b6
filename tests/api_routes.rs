//! HTTP-level tests for routing and error mapping.
//!
//! Handlers that shell out to the downloader binary are covered by the
//! supervisor scenarios; these tests stay on the paths that never spawn.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use tower::ServiceExt;

use mediagrab::api::routes::create_router;
use mediagrab::api::server::AppState;
use mediagrab::config::ServerConfig;
use mediagrab::extractor::{MediaInfo, OutputKind};
use mediagrab::jobs::{Job, JobParams};

fn test_state() -> AppState {
    AppState::new(ServerConfig::default())
}

fn registered_job(state: &AppState) -> Arc<Job> {
    let job = Arc::new(Job::new(
        JobParams {
            url: "https://example.com/v".to_string(),
            format: None,
            kind: OutputKind::Video,
        },
        MediaInfo::default(),
        PathBuf::from("/nonexistent/artifact.mp4"),
        "clip.mp4".to_string(),
        vec![],
    ));
    state.registry.insert(job.clone());
    job
}

fn json_post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("Failed to build request")
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_router(test_state());
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
        .await
        .expect("Failed to call router");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_start_download_without_url_is_bad_request() {
    let app = create_router(test_state());
    let response = app
        .oneshot(json_post("/api/start-download", r#"{"url":"  "}"#))
        .await
        .expect("Failed to call router");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_preview_without_url_is_bad_request() {
    let app = create_router(test_state());
    let response = app
        .oneshot(json_post("/api/preview", r#"{"url":""}"#))
        .await
        .expect("Failed to call router");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let state = test_state();

    for uri in ["/api/events/missing", "/api/stream/missing", "/api/file/missing"] {
        let response = create_router(state.clone())
            .oneshot(Request::get(uri).body(Body::empty()).expect("request"))
            .await
            .expect("Failed to call router");
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "GET {uri}");
    }

    let response = create_router(state)
        .oneshot(json_post("/api/control/missing", r#"{"action":"pause"}"#))
        .await
        .expect("Failed to call router");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_control_action_is_bad_request() {
    let state = test_state();
    let job = registered_job(&state);

    let response = create_router(state)
        .oneshot(json_post(
            &format!("/api/control/{}", job.id),
            r#"{"action":"rewind"}"#,
        ))
        .await
        .expect("Failed to call router");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_artifact_is_not_found() {
    let state = test_state();
    let job = registered_job(&state);

    let response = create_router(state)
        .oneshot(
            Request::get(format!("/api/file/{}", job.id))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("Failed to call router");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_resume_before_start_is_bad_request() {
    let state = test_state();
    let job = registered_job(&state);

    let response = create_router(state)
        .oneshot(json_post(
            &format!("/api/control/{}", job.id),
            r#"{"action":"resume"}"#,
        ))
        .await
        .expect("Failed to call router");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
