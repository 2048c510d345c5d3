//! HTTP surface: chat (blocking + SSE), jobs, agenda, per-user event
//! streams, and ops endpoints.

pub mod agenda;
pub mod chat;
pub mod events;
pub mod jobs;
pub mod ops;

use axum::middleware;
use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::require_auth;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/chat", post(chat::chat))
        .route("/chat/stream", post(chat::chat_stream))
        .route("/events/:user_id", get(events::subscribe))
        .route("/jobs/:user_id", get(jobs::list).post(jobs::add))
        .route(
            "/jobs/:user_id/:job_id",
            patch(jobs::update).delete(jobs::remove),
        )
        .route("/jobs/:user_id/:job_id/run", post(jobs::run_now))
        .route("/jobs/:user_id/:job_id/runs", get(jobs::runs))
        .route("/agenda/:user_id", get(agenda::list).post(agenda::add))
        .route(
            "/agenda/:user_id/:id",
            patch(agenda::update).delete(agenda::delete),
        )
        .route("/metrics", get(ops::metrics))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(ops::healthz))
        .nest("/v1", v1)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
