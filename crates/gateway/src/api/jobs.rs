//! Scheduled-job endpoints. Thin wrappers over the job engine; the
//! same validation applies as for the `cron.*` tools.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use hearth_domain::job::{JobPatch, JobSpec};

use crate::runtime::jobs::JobValidationError;
use crate::state::AppState;

fn error_response(e: JobValidationError) -> (StatusCode, Json<Value>) {
    let status = match e {
        JobValidationError::NotFound => StatusCode::NOT_FOUND,
        JobValidationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, Json(json!({"error": e.to_string()})))
}

pub async fn list(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    match state.jobs.list(&user_id) {
        Ok(out) => (StatusCode::OK, Json(Value::Object(out))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

pub async fn add(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(spec): Json<JobSpec>,
) -> impl IntoResponse {
    match state.jobs.add(&user_id, spec) {
        Ok(out) => (StatusCode::CREATED, Json(Value::Object(out))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

pub async fn update(
    State(state): State<AppState>,
    Path((user_id, job_id)): Path<(String, String)>,
    Json(patch): Json<JobPatch>,
) -> impl IntoResponse {
    match state.jobs.update(&user_id, &job_id, patch) {
        Ok(out) => (StatusCode::OK, Json(Value::Object(out))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

pub async fn remove(
    State(state): State<AppState>,
    Path((user_id, job_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.jobs.remove(&user_id, &job_id) {
        Ok(out) => (StatusCode::OK, Json(Value::Object(out))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

pub async fn run_now(
    State(state): State<AppState>,
    Path((user_id, job_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.jobs.run_now(&user_id, &job_id).await {
        Ok(out) => (StatusCode::OK, Json(Value::Object(out))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct RunsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

pub async fn runs(
    State(state): State<AppState>,
    Path((user_id, job_id)): Path<(String, String)>,
    Query(query): Query<RunsQuery>,
) -> impl IntoResponse {
    match state.jobs.runs(&user_id, &job_id, query.limit) {
        Ok(out) => (StatusCode::OK, Json(Value::Object(out))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}
