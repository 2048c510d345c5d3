//! Chat endpoints — the primary interface for running agent turns.
//!
//! - `POST /v1/chat`        — blocking: returns the full reply
//! - `POST /v1/chat/stream` — SSE: streams progress events, one `done`

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_core::Stream;
use serde::Deserialize;
use serde_json::json;

use hearth_domain::chat::Message;

use crate::runtime::{history_to_messages, TurnRequest};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub user_id: i64,
    pub household_id: i64,
    pub message: String,
    /// Optional explicit history; when absent the current session
    /// window is loaded from the store.
    #[serde(default)]
    pub conversation_history: Option<Vec<Message>>,
    /// Forces the task path for scheduling-intent messages.
    #[serde(default)]
    pub task_mode: bool,
}

/// Build the turn request, persisting the inbound user message.
fn prepare(state: &AppState, body: &ChatBody) -> TurnRequest {
    let chat_id = body.user_id.to_string();
    let history = match &body.conversation_history {
        Some(history) => history.clone(),
        None => {
            let window = state
                .history
                .session_window(
                    &chat_id,
                    state.config.session.inactivity_minutes,
                    state.config.session.history_max_messages,
                )
                .unwrap_or_default();
            history_to_messages(&window)
        }
    };
    if let Err(e) = state.history.append(&chat_id, "user", &body.message) {
        tracing::warn!(error = %e, "failed to persist user message");
    }
    let preferences = state
        .meta
        .get(&format!("preferences:{chat_id}"))
        .and_then(|v| v.as_str().map(str::to_owned));
    TurnRequest {
        household_id: body.household_id,
        user_id: Some(body.user_id),
        message: body.message.clone(),
        history,
        task_mode: body.task_mode,
        persona: None,
        preferences,
    }
}

fn persist_reply(state: &AppState, user_id: i64, message: &str) {
    if let Err(e) = state
        .history
        .append(&user_id.to_string(), "assistant", message)
    {
        tracing::warn!(error = %e, "failed to persist assistant message");
    }
}

pub async fn chat(State(state): State<AppState>, Json(body): Json<ChatBody>) -> impl IntoResponse {
    let request = prepare(&state, &body);
    let outcome = state.runtime.run_turn(request, None).await;
    persist_reply(&state, body.user_id, &outcome.message);
    Json(json!({
        "message": outcome.message,
        "actions": outcome.actions,
    }))
}

pub async fn chat_stream(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let request = prepare(&state, &body);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    // The turn runs to completion and persists its reply even if the
    // client disconnects mid-stream.
    let turn_state = state.clone();
    let user_id = body.user_id;
    tokio::spawn(async move {
        let outcome = turn_state.runtime.run_streamed(request, tx).await;
        persist_reply(&turn_state, user_id, &outcome.message);
    });

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let done = event.is_done();
            let payload = serde_json::to_string(&event).unwrap_or_else(|_| "{}".into());
            yield Ok(Event::default().data(payload));
            if done {
                break;
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}
