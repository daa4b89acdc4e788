//! Axum server and routes.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use jobq_scheduler::{InMemoryScheduler, Scheduler, SchedulerError};
use jobq_types::{
    BaseResponse, JobId, JobListResponse, JobResponse, SubmitJobData, SubmitJobResponse,
    SummaryResponse, WorkDescriptor,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub struct AppState {
    pub scheduler: Arc<InMemoryScheduler>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/jobs", post(handle_submit).get(handle_list))
        .route("/jobs/:id", get(handle_get).delete(handle_cancel))
        .route("/queue/summary", get(handle_summary))
        .route("/queue/pause", post(handle_pause))
        .route("/queue/resume", post(handle_resume))
        .route("/queue/max_running", post(handle_max_running))
        .route("/queue/cancel_all", post(handle_cancel_all))
        .route("/queue/reap", post(handle_reap))
        .route("/health", get(handle_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Count of jobs affected by a queue-wide operation.
#[derive(Debug, Serialize, Deserialize)]
pub struct AffectedData {
    pub affected: usize,
}

pub type AffectedResponse = BaseResponse<AffectedData>;

#[derive(Debug, Deserialize)]
pub struct MaxRunningRequest {
    pub max_running: usize,
}

fn parse_id<T>(raw: &str) -> Result<JobId, Json<BaseResponse<T>>> {
    raw.parse()
        .map_err(|_| Json(BaseResponse::error(400, format!("invalid job id: {}", raw))))
}

fn error_response<T>(e: SchedulerError) -> Json<BaseResponse<T>> {
    match e {
        SchedulerError::JobNotFound(_) => Json(BaseResponse::error(404, e.to_string())),
    }
}

async fn handle_submit(
    State(state): State<Arc<AppState>>,
    Json(work): Json<WorkDescriptor>,
) -> Json<SubmitJobResponse> {
    match state.scheduler.submit_job(work).await {
        Ok(job_id) => {
            tracing::info!(job_id = %job_id, "job submitted");
            Json(BaseResponse::ok(SubmitJobData { job_id }))
        }
        Err(e) => error_response(e),
    }
}

async fn handle_list(State(state): State<Arc<AppState>>) -> Json<JobListResponse> {
    Json(BaseResponse::ok(state.scheduler.list_jobs().await))
}

async fn handle_get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<JobResponse> {
    let job_id = match parse_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };
    match state.scheduler.job(job_id).await {
        Ok(record) => Json(BaseResponse::ok(record)),
        Err(e) => error_response(e),
    }
}

async fn handle_cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<BaseResponse<JobId>> {
    let job_id = match parse_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };
    match state.scheduler.cancel_job(job_id).await {
        Ok(()) => {
            tracing::info!(job_id = %job_id, "job cancelled");
            Json(BaseResponse::ok(job_id))
        }
        Err(e) => error_response(e),
    }
}

async fn handle_summary(State(state): State<Arc<AppState>>) -> Json<SummaryResponse> {
    Json(BaseResponse::ok(state.scheduler.summary().await))
}

async fn handle_pause(State(state): State<Arc<AppState>>) -> Json<SummaryResponse> {
    state.scheduler.pause().await;
    Json(BaseResponse::ok(state.scheduler.summary().await))
}

async fn handle_resume(State(state): State<Arc<AppState>>) -> Json<AffectedResponse> {
    let affected = state.scheduler.resume().await;
    Json(BaseResponse::ok(AffectedData { affected }))
}

async fn handle_max_running(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MaxRunningRequest>,
) -> Json<AffectedResponse> {
    let affected = state.scheduler.set_max_running(req.max_running).await;
    Json(BaseResponse::ok(AffectedData { affected }))
}

async fn handle_cancel_all(State(state): State<Arc<AppState>>) -> Json<AffectedResponse> {
    let affected = state.scheduler.cancel_all().await;
    Json(BaseResponse::ok(AffectedData { affected }))
}

async fn handle_reap(State(state): State<Arc<AppState>>) -> Json<JobListResponse> {
    Json(BaseResponse::ok(state.scheduler.reap().await))
}

async fn handle_health() -> &'static str {
    "ok"
}
