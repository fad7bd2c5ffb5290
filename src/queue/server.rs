//! HTTP surface of the job queue.
use std::net::SocketAddr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::QueueError;
use crate::queue::store::JobStore;
use crate::types::action::Action;
use crate::types::job::Job;
use crate::types::unit::UnitId;

/// Body of a create request. `unit_id` is validated by hand so that quoted
/// ids from older frontends are accepted and everything else gets a 400
/// with a useful message.
#[derive(Debug, Deserialize)]
struct CreateJobRequest {
    #[serde(default, alias = "pond_id", alias = "pondId")]
    unit_id: Value,
    action: Option<String>,
    timestamp: Option<String>,
}

#[derive(Serialize)]
struct CreateJobResponse {
    success: bool,
    message: String,
    job_id: UnitId,
    timestamp: String,
}

#[derive(Serialize)]
struct PollResponse {
    has_job: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_data: Option<Job>,
    message: String,
}

#[derive(Serialize)]
struct AckResponse {
    success: bool,
    message: String,
}

#[derive(Serialize)]
struct StatusResponse {
    pending_jobs: usize,
    completed_jobs: usize,
    pending_job_list: Vec<UnitId>,
    completed_job_list: Vec<UnitId>,
    timestamp: String,
}

impl IntoResponse for QueueError {
    fn into_response(self) -> Response {
        let status = match &self {
            QueueError::Validation(_) => StatusCode::BAD_REQUEST,
            QueueError::NotFound(_) | QueueError::NoResult(_) => {
                StatusCode::NOT_FOUND
            },
        };

        warn!(error = %self, %status, "request rejected");

        (
            status,
            Json(json!({"success": false, "error": self.to_string()})),
        )
            .into_response()
    }
}

/// Builds the queue's router over `store`.
pub fn router(store: JobStore) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/jobs", post(create_job))
        .route("/jobs/:unit_id", get(poll_job))
        .route("/jobs/:unit_id/complete", post(complete_job))
        .route("/jobs/:unit_id/result", get(job_result))
        // Routes used by already-deployed devices and the operator frontend.
        .route("/lift", post(create_job))
        .route("/lift-up", post(create_raise_job))
        .route("/lift-down", post(create_lower_job))
        .route("/job/:unit_id", get(poll_job))
        .route("/job/:unit_id/complete", post(complete_job))
        .with_state(store)
}

/// Serves the queue on `listener` until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    store: JobStore,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router(store))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

/// Binds `addr` and serves the queue until `cancel` fires.
pub async fn bind_and_serve(
    addr: SocketAddr,
    store: JobStore,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    serve(TcpListener::bind(addr).await?, store, cancel).await
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

async fn index() -> Json<Value> {
    Json(json!({
        "message": "netlift job queue",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "POST /jobs": "create or replace the pending job for a unit",
            "GET /jobs/{unit_id}": "poll for a unit's pending job",
            "POST /jobs/{unit_id}/complete": "report a job as done",
            "GET /jobs/{unit_id}/result": "last completed job for a unit",
            "GET /status": "pending and completed jobs",
            "GET /health": "liveness probe",
        },
    }))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy", "timestamp": now()}))
}

async fn status(State(store): State<JobStore>) -> Json<StatusResponse> {
    let snapshot = store.status().await;

    Json(StatusResponse {
        pending_jobs: snapshot.pending_count,
        completed_jobs: snapshot.completed_count,
        pending_job_list: snapshot.pending_ids,
        completed_job_list: snapshot.completed_ids,
        timestamp: now(),
    })
}

async fn create_job(
    State(store): State<JobStore>,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> Result<Response, QueueError> {
    insert_job(store, payload, None).await
}

async fn create_raise_job(
    State(store): State<JobStore>,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> Result<Response, QueueError> {
    insert_job(store, payload, Some(Action::Raise)).await
}

async fn create_lower_job(
    State(store): State<JobStore>,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> Result<Response, QueueError> {
    insert_job(store, payload, Some(Action::Lower)).await
}

/// Validates a create request and stores it. `forced` overrides whatever
/// action the body names.
async fn insert_job(
    store: JobStore,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
    forced: Option<Action>,
) -> Result<Response, QueueError> {
    let Json(req) =
        payload.map_err(|e| QueueError::Validation(e.body_text()))?;

    let unit_id = UnitId::from_json(&req.unit_id)?;
    let action = match forced {
        Some(action) => action,
        None => match req.action.as_deref() {
            Some(name) => name.parse()?,
            None => Action::RaiseAndCapture,
        },
    };

    let ack = store.create_job(unit_id, action, req.timestamp).await;

    Ok((
        StatusCode::CREATED,
        Json(CreateJobResponse {
            success: true,
            message: format!("{action} job for unit {unit_id} stored"),
            job_id: ack.job_id,
            timestamp: ack.timestamp,
        }),
    )
        .into_response())
}

async fn poll_job(
    State(store): State<JobStore>,
    Path(unit_id): Path<String>,
) -> Result<Json<PollResponse>, QueueError> {
    let unit_id: UnitId = unit_id.parse()?;

    Ok(Json(match store.poll_job(unit_id).await {
        Some(job) => PollResponse {
            has_job: true,
            job_data: Some(job),
            message: format!("job pending for unit {unit_id}"),
        },
        None => PollResponse {
            has_job: false,
            job_data: None,
            message: format!("no job for unit {unit_id}"),
        },
    }))
}

async fn complete_job(
    State(store): State<JobStore>,
    Path(unit_id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<AckResponse>, QueueError> {
    let unit_id: UnitId = unit_id.parse()?;
    let Json(result) =
        payload.map_err(|e| QueueError::Validation(e.body_text()))?;
    if !result.is_object() {
        return Err(QueueError::Validation(
            "completion result must be a JSON object".to_string(),
        ));
    }

    store.complete_job(unit_id, result).await?;

    Ok(Json(AckResponse {
        success: true,
        message: format!("completion recorded for unit {unit_id}"),
    }))
}

async fn job_result(
    State(store): State<JobStore>,
    Path(unit_id): Path<String>,
) -> Result<Json<Job>, QueueError> {
    let unit_id: UnitId = unit_id.parse()?;

    store
        .completed_job(unit_id)
        .await
        .map(Json)
        .ok_or(QueueError::NoResult(unit_id))
}
