//! Progress events streamed to the client during a turn.
//!
//! Ordering contract: plan output precedes all tool events, tool events
//! for step i precede those for step i+1, and exactly one `done` event
//! terminates every streamed turn.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    Plan,
    ToolResult,
    Reflect,
}

/// Events emitted during a single agent turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Short human-readable progress note.
    Status { text: String },

    /// Actual model output for one pipeline step, truncated per phase.
    StepOutput {
        phase: StepPhase,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        tool: Option<String>,
    },

    /// A tool call is starting.
    ToolStart { tool: String },

    /// A tool call finished (success or failure — see step_output).
    ToolDone { tool: String },

    /// Incremental writer output when the model client streams.
    Token { text: String },

    /// Terminal event; exactly one per turn.
    Done {
        message: String,
        actions: Vec<Value>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        error: Option<String>,
    },
}

impl ProgressEvent {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}
