//! Shared types for the Hearth gateway: chat messages, agent actions,
//! scheduled jobs, task sessions, progress events, configuration.

pub mod agent;
pub mod chat;
pub mod config;
pub mod error;
pub mod event;
pub mod job;
pub mod stream;
pub mod task;

pub use error::{Error, Result};
