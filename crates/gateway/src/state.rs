//! Shared application state passed to all API handlers.

use std::sync::Arc;

use hearth_domain::config::Config;
use hearth_sessions::{HistoryStore, MetaStore};

use crate::runtime::agenda::AgendaStore;
use crate::runtime::connections::ConnectionRegistry;
use crate::runtime::jobs::JobEngine;
use crate::runtime::metrics::Metrics;
use crate::runtime::TurnRuntime;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub meta: Arc<MetaStore>,
    pub history: Arc<HistoryStore>,
    pub jobs: Arc<JobEngine>,
    pub agenda: Arc<AgendaStore>,
    pub connections: Arc<ConnectionRegistry>,
    pub runtime: Arc<TurnRuntime>,
    pub metrics: Arc<Metrics>,
    /// SHA-256 hash of the API bearer token, read once at startup.
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,
}
