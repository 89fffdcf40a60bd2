//! Router-level tests for the HTTP surface
//!
//! Exercises the assembled router with in-process requests: health, the
//! debug ingestion trigger (including the Busy rejection), structured API
//! not-found payloads, the SPA fallback, and the degraded no-bundle mode.

mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::util::ServiceExt;

use common::{app_state, scheduler_config, ProbeJob};
use trialscope::config::Settings;
use trialscope::scheduler::TaskScheduler;
use trialscope::web::{AppServer, AssetResolver};

const PERIOD: Duration = Duration::from_secs(24 * 3600);
const GRACE: Duration = Duration::from_secs(30);

async fn started_scheduler(job: ProbeJob) -> Arc<TaskScheduler> {
    let scheduler = Arc::new(
        TaskScheduler::new(Arc::new(job), scheduler_config(PERIOD, GRACE)).expect("valid config"),
    );
    scheduler.start().await.expect("scheduler starts");
    scheduler
}

async fn build_app(job: ProbeJob, assets: AssetResolver) -> (Router, Arc<TaskScheduler>) {
    let scheduler = started_scheduler(job).await;
    let state = app_state(scheduler.clone(), assets);
    let server = AppServer::new(&Settings::default(), state);
    (server.build_router(), scheduler)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn get(path: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .body(Body::empty())
        .expect("request")
}

fn post(path: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .body(Body::empty())
        .expect("request")
}

/// A frontend bundle on disk
fn bundle_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("index.html"), "<html>trial explorer</html>").expect("index");
    fs::create_dir(dir.path().join("assets")).expect("assets dir");
    fs::write(dir.path().join("assets/app.js"), "console.log('app')").expect("asset");
    dir
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_reports_serving_state() {
    let (app, scheduler) = build_app(ProbeJob::instant(), AssetResolver::missing("static")).await;

    let response = app.oneshot(get("/api/v1/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["service_state"], "serving");
    assert_eq!(body["data"]["scheduler"]["running"], true);

    scheduler.stop().await;
}

// ============================================================================
// Debug Trigger
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_debug_trigger_fire_and_forget() {
    let (app, scheduler) = build_app(
        ProbeJob::with_delay(Duration::from_secs(10)),
        AssetResolver::missing("static"),
    )
    .await;

    let response = app
        .oneshot(post("/api/v1/debug/run-ingestion"))
        .await
        .unwrap();

    // Returns immediately, without awaiting the 10 s run
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body, serde_json::json!({ "status": "started" }));
    assert!(scheduler.is_busy());

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_debug_trigger_busy_conflict() {
    let job = ProbeJob::with_delay(Duration::from_secs(10));
    let counters = job.counters();
    let (app, scheduler) = build_app(job, AssetResolver::missing("static")).await;

    // Two calls in quick succession while ingestion takes 10 s
    let first = app
        .clone()
        .oneshot(post("/api/v1/debug/run-ingestion"))
        .await
        .unwrap();
    let second = app
        .clone()
        .oneshot(post("/api/v1/debug/run-ingestion"))
        .await
        .unwrap();

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::CONFLICT);

    let body = body_json(second).await;
    assert_eq!(body["success"], false);

    // Only one execution happened
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(counters.started(), 1);

    // Idle again: a retry succeeds
    let third = app
        .oneshot(post("/api/v1/debug/run-ingestion"))
        .await
        .unwrap();
    assert_eq!(third.status(), StatusCode::OK);

    scheduler.stop().await;
}

// ============================================================================
// Route Resolution
// ============================================================================

#[tokio::test]
async fn test_unknown_api_path_is_structured_not_found() {
    let dir = bundle_dir();
    let (app, scheduler) =
        build_app(ProbeJob::instant(), AssetResolver::with_root(dir.path())).await;

    let response = app.oneshot(get("/api/v1/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // A JSON payload, never the SPA entry document
    let body = body_json(response).await;
    assert_eq!(body["error"], "API route not found");

    scheduler.stop().await;
}

#[tokio::test]
async fn test_spa_fallback_serves_entry_document() {
    let dir = bundle_dir();
    let (app, scheduler) =
        build_app(ProbeJob::instant(), AssetResolver::with_root(dir.path())).await;

    let response = app.oneshot(get("/trials/NCT01234567")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("trial explorer"));

    scheduler.stop().await;
}

#[tokio::test]
async fn test_asset_is_served_from_bundle() {
    let dir = bundle_dir();
    let (app, scheduler) =
        build_app(ProbeJob::instant(), AssetResolver::with_root(dir.path())).await;

    let response = app.oneshot(get("/assets/app.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    scheduler.stop().await;
}

#[tokio::test]
async fn test_missing_bundle_names_expected_root() {
    let (app, scheduler) = build_app(ProbeJob::instant(), AssetResolver::missing("static")).await;

    let response = app.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    let message = body["error"].as_str().unwrap_or_default();
    assert!(message.contains("static"), "diagnostic was: {message}");

    scheduler.stop().await;
}

// ============================================================================
// Metrics
// ============================================================================

#[tokio::test]
async fn test_metrics_endpoint_renders() {
    trialscope::metrics::init_metrics().expect("metrics init");
    let (app, scheduler) = build_app(ProbeJob::instant(), AssetResolver::missing("static")).await;

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    scheduler.stop().await;
}
