//! Hearth gateway — a local-first personal assistant server: agent
//! orchestration, scheduled jobs, agenda, and proactive reminders
//! behind a small HTTP surface.

pub mod api;
pub mod auth;
pub mod cli;
pub mod runtime;
pub mod state;
