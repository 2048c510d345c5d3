//! Task sessions — persistent per-user state for multi-message task
//! flows with explicit budgets.
//!
//! States: IDLE -> NEEDS_INFO -> READY_TO_EXECUTE -> EXECUTING -> DONE | FAILED
//! (EXECUTING may detour through PENDING_CONFIRM). Terminal states are
//! sticky; counters only ever grow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Idle,
    NeedsInfo,
    ReadyToExecute,
    Executing,
    PendingConfirm,
    Done,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Per-user, per-conversation state for multi-turn task mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSession {
    pub task_id: String,
    pub chat_id: String,
    pub state: TaskState,
    pub turn_count: u32,
    pub tool_attempt_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_assistant_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pending_confirm: Option<Value>,
    #[serde(default)]
    pub meta: serde_json::Map<String, Value>,
}

impl TaskSession {
    pub fn new(chat_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4().to_string(),
            chat_id: chat_id.into(),
            state: TaskState::NeedsInfo,
            turn_count: 0,
            tool_attempt_count: 0,
            created_at: now,
            last_message_at: now,
            last_assistant_output: None,
            pending_confirm: None,
            meta: serde_json::Map::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
