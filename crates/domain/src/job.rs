//! Scheduled job wire types.
//!
//! Contract (field names are part of the tool invocation format and
//! must round-trip bit-exact):
//! - schedule: at (ISO8601 with explicit offset) | every (everyMs) | cron (5-field expr + IANA tz)
//! - sessionTarget: "main" | "isolated"
//! - payload: main -> kind=systemEvent + text; isolated -> kind=agentTurn + message + optional delivery
//! - wakeMode: "now" | "next-heartbeat"

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CRON_TZ: &str = "UTC";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Schedule kinds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Schedule {
    /// Run once at a specific instant. Kept as the raw ISO8601 string
    /// so the missing-offset case is a validation error, not a parse
    /// failure, and the stored value round-trips unchanged.
    At { at: String },
    /// Run every N milliseconds (`everyMs >= 60000`).
    Every {
        #[serde(rename = "everyMs")]
        every_ms: u64,
    },
    /// 5-field cron expression evaluated in an IANA timezone.
    Cron {
        expr: String,
        #[serde(default = "default_tz")]
        tz: String,
    },
}

fn default_tz() -> String {
    DEFAULT_CRON_TZ.to_owned()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Target / payload (main <-> systemEvent, isolated <-> agentTurn)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionTarget {
    Main,
    Isolated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Payload {
    /// For sessionTarget=main: a system event injected into the owner's
    /// main conversation.
    #[serde(rename = "systemEvent")]
    SystemEvent { text: String },
    /// For sessionTarget=isolated: an agent turn run in its own
    /// session, with optional delivery routing.
    #[serde(rename = "agentTurn")]
    AgentTurn {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        delivery: Option<serde_json::Value>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WakeMode {
    #[serde(rename = "now")]
    Now,
    #[default]
    #[serde(rename = "next-heartbeat")]
    NextHeartbeat,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job and run records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A persisted scheduled job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub owner_id: String,
    pub schedule: Schedule,
    pub session_target: SessionTarget,
    pub payload: Payload,
    #[serde(default)]
    pub wake_mode: WakeMode,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobRunStatus {
    Ok,
    Error,
}

/// One execution record. Append-only, ordered by timestamp per job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRun {
    pub job_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: JobRunStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

/// Caller-supplied spec for `cron.add` (the add-call invocation format).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub schedule: Schedule,
    pub session_target: SessionTarget,
    pub payload: Payload,
    #[serde(default)]
    pub wake_mode: WakeMode,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub label: Option<String>,
}

/// Partial patch for `cron.update`. Only provided fields change.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPatch {
    #[serde(default)]
    pub schedule: Option<Schedule>,
    #[serde(default)]
    pub session_target: Option<SessionTarget>,
    #[serde(default)]
    pub payload: Option<Payload>,
    #[serde(default)]
    pub wake_mode: Option<WakeMode>,
    #[serde(default)]
    pub label: Option<String>,
}
