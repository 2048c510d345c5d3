//! Per-user event stream: proactive reminders and scheduled-job
//! results, delivered over SSE. At most one stream per user — a new
//! connection replaces (and closes) the previous one, and any queued
//! messages are flushed on connect.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_core::Stream;

use crate::state::AppState;

pub async fn subscribe(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.connections.register(&user_id);
    state.connections.flush_pending(&user_id);
    tracing::info!(user_id = %user_id, "event stream connected");

    let stream = async_stream::stream! {
        while let Some(value) = rx.recv().await {
            let payload = serde_json::to_string(&value).unwrap_or_else(|_| "{}".into());
            yield Ok(Event::default().data(payload));
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}
