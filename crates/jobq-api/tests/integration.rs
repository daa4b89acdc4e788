//! Integration tests: submit, status, cancel, queue controls over HTTP.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use jobq_api::server::{self, AppState};
use jobq_driver::ScriptedDriver;
use jobq_scheduler::{DriverRegistry, InMemoryScheduler, Scheduler, SchedulerConfig};
use jobq_types::JobStatus;
use serde_json::json;
use std::sync::Arc;
use tower::util::ServiceExt;

fn test_app(max_running: usize) -> (axum::Router, Arc<ScriptedDriver>, Arc<InMemoryScheduler>) {
    let driver = Arc::new(ScriptedDriver::new("scripted"));
    let scheduler = Arc::new(InMemoryScheduler::new(
        DriverRegistry::new(driver.clone()),
        SchedulerConfig::default().with_max_running(max_running),
    ));
    let state = Arc::new(AppState {
        scheduler: Arc::clone(&scheduler),
    });
    (server::router(state), driver, scheduler)
}

async fn call(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> serde_json::Value {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

async fn submit(app: &axum::Router, name: &str) -> String {
    let j = call(
        app,
        "POST",
        "/jobs",
        Some(json!({ "name": name, "command": "run.sh", "args": ["--case", name] })),
    )
    .await;
    assert_eq!(j["code"], 200);
    j["data"]["job_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn submit_then_poll_to_success() {
    let (app, driver, scheduler) = test_app(2);
    let id = submit(&app, "sim-1").await;

    let j = call(&app, "GET", &format!("/jobs/{}", id), None).await;
    assert_eq!(j["code"], 200);
    assert_eq!(j["data"]["state"], "submitted");
    assert_eq!(j["data"]["driver"], "scripted");
    assert_eq!(j["data"]["submit_attempts"], 1);

    driver.set_status("sim-1", JobStatus::Success);
    scheduler.poll_tick().await.unwrap();

    let j = call(&app, "GET", &format!("/jobs/{}", id), None).await;
    assert_eq!(j["data"]["state"], "succeeded");
    assert!(j["data"]["finished_at"].is_string());
    assert_eq!(driver.cleaned(), vec!["sim-1".to_string()]);
}

#[tokio::test]
async fn cancel_and_unknown_ids() {
    let (app, driver, _scheduler) = test_app(2);
    let id = submit(&app, "sim-2").await;

    let j = call(&app, "DELETE", &format!("/jobs/{}", id), None).await;
    assert_eq!(j["code"], 200);
    assert_eq!(driver.calls().aborts, 1);

    let j = call(&app, "DELETE", &format!("/jobs/{}", id), None).await;
    assert_eq!(j["code"], 404);

    let j = call(&app, "GET", &format!("/jobs/{}", id), None).await;
    assert_eq!(j["data"]["state"], "aborted");

    let j = call(&app, "GET", "/jobs/00000000-0000-0000-0000-000000000000", None).await;
    assert_eq!(j["code"], 404);

    let j = call(&app, "GET", "/jobs/not-a-uuid", None).await;
    assert_eq!(j["code"], 400);
}

#[tokio::test]
async fn summary_pause_resume_and_limit() {
    let (app, _driver, _scheduler) = test_app(1);
    let j = call(&app, "POST", "/queue/pause", None).await;
    assert_eq!(j["data"]["paused"], true);

    submit(&app, "a").await;
    submit(&app, "b").await;
    let j = call(&app, "GET", "/queue/summary", None).await;
    assert_eq!(j["data"]["pending"], 2);
    assert_eq!(j["data"]["max_running"], 1);

    let j = call(&app, "POST", "/queue/resume", None).await;
    assert_eq!(j["data"]["affected"], 1);

    let j = call(
        &app,
        "POST",
        "/queue/max_running",
        Some(json!({ "max_running": 2 })),
    )
    .await;
    assert_eq!(j["data"]["affected"], 1);

    let j = call(&app, "GET", "/queue/summary", None).await;
    assert_eq!(j["data"]["submitted"], 2);
    assert_eq!(j["data"]["pending"], 0);
}

#[tokio::test]
async fn cancel_all_then_reap() {
    let (app, _driver, _scheduler) = test_app(1);
    submit(&app, "a").await;
    submit(&app, "b").await;

    let j = call(&app, "POST", "/queue/cancel_all", None).await;
    assert_eq!(j["data"]["affected"], 2);

    let j = call(&app, "POST", "/queue/reap", None).await;
    let reaped = j["data"].as_array().unwrap();
    assert_eq!(reaped.len(), 2);
    assert!(reaped.iter().all(|r| r["state"] == "aborted"));

    let j = call(&app, "GET", "/jobs", None).await;
    assert!(j["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn health() {
    let (app, _driver, _scheduler) = test_app(1);
    let res = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"ok");
}
