//! Agenda endpoints for the mobile and web clients.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::runtime::agenda::parse_event_time;
use crate::state::AppState;

fn bad_request(message: String) -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message})))
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: String,
    pub end: String,
    #[serde(default = "default_tz")]
    pub timezone: String,
}

fn default_tz() -> String {
    "UTC".into()
}

pub async fn list(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<RangeQuery>,
) -> impl IntoResponse {
    let start = match parse_event_time(&query.start, &query.timezone) {
        Ok(t) => t,
        Err(e) => return bad_request(e).into_response(),
    };
    let end = match parse_event_time(&query.end, &query.timezone) {
        Ok(t) => t,
        Err(e) => return bad_request(e).into_response(),
    };
    if start >= end {
        return bad_request("start must be before end".into()).into_response();
    }
    let events = state.agenda.list_range(&user_id, start, end);
    Json(json!({"count": events.len(), "events": events})).into_response()
}

#[derive(Debug, Deserialize)]
pub struct AddBody {
    pub title: String,
    pub start_at: String,
    #[serde(default)]
    pub end_at: Option<String>,
    #[serde(default)]
    pub all_day: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "default_tz")]
    pub timezone: String,
}

pub async fn add(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<AddBody>,
) -> impl IntoResponse {
    let start_at = match parse_event_time(&body.start_at, &body.timezone) {
        Ok(t) => t,
        Err(e) => return bad_request(e).into_response(),
    };
    let end_at = match &body.end_at {
        Some(raw) => match parse_event_time(raw, &body.timezone) {
            Ok(t) => Some(t),
            Err(e) => return bad_request(e).into_response(),
        },
        None => None,
    };
    match state
        .agenda
        .add(&user_id, &body.title, start_at, end_at, body.all_day, body.notes)
    {
        Ok(event) => (StatusCode::CREATED, Json(json!({"event": event}))).into_response(),
        Err(e) => bad_request(e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateBody {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub start_at: Option<String>,
    #[serde(default)]
    pub end_at: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "default_tz")]
    pub timezone: String,
}

pub async fn update(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(String, String)>,
    Json(body): Json<UpdateBody>,
) -> impl IntoResponse {
    let start_at = match &body.start_at {
        Some(raw) => match parse_event_time(raw, &body.timezone) {
            Ok(t) => Some(t),
            Err(e) => return bad_request(e).into_response(),
        },
        None => None,
    };
    let end_at = match &body.end_at {
        Some(raw) => match parse_event_time(raw, &body.timezone) {
            Ok(t) => Some(t),
            Err(e) => return bad_request(e).into_response(),
        },
        None => None,
    };
    let updated = state.agenda.update(&user_id, &id, |event| {
        if let Some(title) = body.title {
            event.title = title;
        }
        if let Some(start_at) = start_at {
            event.start_at = start_at;
        }
        if let Some(end_at) = end_at {
            event.end_at = Some(end_at);
        }
        if let Some(notes) = body.notes {
            event.notes = Some(notes);
        }
    });
    match updated {
        Ok(Some(event)) => Json(json!({"event": event})).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({"error": "event not found"}))).into_response(),
        Err(e) => bad_request(e.to_string()).into_response(),
    }
}

pub async fn delete(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.agenda.delete(&user_id, &id) {
        Ok(true) => Json(json!({"success": true})).into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, Json(json!({"error": "event not found"}))).into_response(),
        Err(e) => bad_request(e.to_string()).into_response(),
    }
}
