//! Built-in tool implementations: workspace-rooted codebase reads and
//! outbound web lookups. Each function returns a structured JSON map
//! that the dispatcher wraps into its result envelope.

pub mod codebase;
pub mod web;
