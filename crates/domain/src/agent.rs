//! Per-turn agent types: the planner's `Action`, the executor's
//! `Observation`, the dispatcher's `ToolResult` envelope, and the
//! transient `RunState`/`RunContext` pair that carries one turn.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::task::TaskSession;

/// Object arguments/outputs as they appear on the tool wire.
pub type JsonObject = Map<String, Value>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Decision — parsed structured model output
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One parsed structured-output decision from the model.
///
/// Produced by the structured-output parser and replayed through
/// `RunState::pending_decision` so the planner can skip a redundant
/// model call when the output has already been obtained upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Decision {
    ToolCall { tool: String, args: JsonObject },
    NeedInfo { questions: Vec<String> },
    Final { message: String },
    Invalid,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Action
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The planner's atomic decision. Immutable once produced; exactly one
/// variant per step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    ToolCall { tool: String, args: JsonObject },
    NeedInfo { questions: Vec<String> },
    Final { message: String },
}

impl Action {
    pub fn tool_call(tool: impl Into<String>, args: JsonObject) -> Self {
        Self::ToolCall {
            tool: tool.into(),
            args,
        }
    }

    pub fn need_info(questions: Vec<String>) -> Self {
        Self::NeedInfo { questions }
    }

    pub fn final_message(message: impl Into<String>) -> Self {
        Self::Final {
            message: message.into(),
        }
    }

    /// Tool name when this is a tool call.
    pub fn tool(&self) -> Option<&str> {
        match self {
            Self::ToolCall { tool, .. } => Some(tool),
            _ => None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolResult
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Envelope produced by the tool dispatcher.
///
/// Invariant: exactly one of (`success = true` with `output`) or
/// (`success = false` with `error`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: JsonObject) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }

    /// Wrap a raw handler return value. A map with `"success": false`
    /// becomes an error envelope; anything else is a success, with
    /// non-object values tucked under a `result` key.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => {
                if map.get("success") == Some(&Value::Bool(false)) {
                    let error = map
                        .get("error")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_owned();
                    Self::err(error)
                } else {
                    Self::ok(map)
                }
            }
            other => {
                let mut map = JsonObject::new();
                map.insert("result".into(), other);
                Self::ok(map)
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Observation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Result of executing one `Action`. Created by the executor; never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    pub action: Action,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// For need_info: the joined questions; for final: the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Wall-clock latency of a tool call, when measured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl Observation {
    pub fn from_tool_result(action: Action, result: ToolResult, latency_ms: u64) -> Self {
        Self {
            action,
            success: result.success,
            output: result.output,
            error: result.error,
            message: None,
            latency_ms: Some(latency_ms),
        }
    }

    pub fn need_info(action: Action) -> Self {
        let message = match &action {
            Action::NeedInfo { questions } if !questions.is_empty() => {
                Some(questions.join(" "))
            }
            _ => None,
        };
        Self {
            action,
            success: true,
            output: None,
            error: None,
            message,
            latency_ms: None,
        }
    }

    pub fn final_message(action: Action) -> Self {
        let message = match &action {
            Action::Final { message } => Some(message.clone()),
            _ => None,
        };
        Self {
            action,
            success: true,
            output: None,
            error: None,
            message,
            latency_ms: None,
        }
    }

    pub fn failure(action: Action, error: impl Into<String>) -> Self {
        Self {
            action,
            success: false,
            output: None,
            error: Some(error.into()),
            message: None,
            latency_ms: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Mode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// High-level request modes, in router priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Scheduling,
    Task,
    Research,
    Coding,
    Reflection,
    Chat,
}

impl Mode {
    /// Modes that run the full agentic loop rather than a single call.
    pub fn is_agentic(self) -> bool {
        !matches!(self, Self::Chat | Self::Reflection)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RunState / RunContext
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Inputs for one planning step. Created once per turn.
#[derive(Debug, Clone)]
pub struct RunState {
    pub message: String,
    pub history: Vec<crate::chat::Message>,
    pub task: Option<TaskSession>,
    pub mode: Mode,
    /// When set, the planner translates this directly instead of
    /// calling the model. Consumed on first use.
    pub pending_decision: Option<Decision>,
}

impl RunState {
    pub fn new(message: impl Into<String>, mode: Mode) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
            task: None,
            mode,
            pending_decision: None,
        }
    }

    /// Take the pending decision, leaving the slot empty.
    pub fn take_pending_decision(&mut self) -> Option<Decision> {
        self.pending_decision.take()
    }
}

/// Ambient identifiers for one turn. Lives only for its duration; the
/// dispatcher owns the persistence handles themselves.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub household_id: i64,
    pub user_id: Option<i64>,
    /// Caller identity used to scope tool calls (stringified user id).
    pub caller_id: String,
    /// Optional allow-list of tool names; when set, the dispatcher
    /// rejects any tool outside it.
    pub allowed_tools: Option<HashSet<String>>,
}

impl RunContext {
    pub fn new(household_id: i64, user_id: Option<i64>) -> Self {
        Self {
            household_id,
            user_id,
            caller_id: user_id.map_or_else(|| "0".to_owned(), |id| id.to_string()),
            allowed_tools: None,
        }
    }

    pub fn tool_allowed(&self, tool: &str) -> bool {
        self.allowed_tools
            .as_ref()
            .map_or(true, |set| set.contains(tool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    // ── Action ──────────────────────────────────────────────────────

    #[test]
    fn action_serializes_with_single_tag() {
        let action = Action::tool_call("cron.add", obj(json!({"label": "x"})));
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "tool_call");
        assert_eq!(json["tool"], "cron.add");
        assert!(json.get("questions").is_none());
        assert!(json.get("message").is_none());
    }

    #[test]
    fn action_final_roundtrip() {
        let action = Action::final_message("done");
        let json = serde_json::to_string(&action).unwrap();
        let back: Action = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn action_tool_accessor() {
        assert_eq!(
            Action::tool_call("web.search", JsonObject::new()).tool(),
            Some("web.search")
        );
        assert_eq!(Action::final_message("x").tool(), None);
    }

    // ── ToolResult ──────────────────────────────────────────────────

    #[test]
    fn tool_result_ok_has_output_no_error() {
        let r = ToolResult::ok(obj(json!({"jobId": "abc"})));
        assert!(r.success);
        assert!(r.output.is_some());
        assert!(r.error.is_none());
    }

    #[test]
    fn tool_result_err_has_error_no_output() {
        let r = ToolResult::err("boom");
        assert!(!r.success);
        assert!(r.output.is_none());
        assert_eq!(r.error.as_deref(), Some("boom"));
    }

    #[test]
    fn tool_result_from_value_failure_map() {
        let r = ToolResult::from_value(json!({"success": false, "error": "nope"}));
        assert!(!r.success);
        assert_eq!(r.error.as_deref(), Some("nope"));
    }

    #[test]
    fn tool_result_from_value_scalar_wrapped() {
        let r = ToolResult::from_value(json!(42));
        assert!(r.success);
        assert_eq!(r.output.unwrap()["result"], 42);
    }

    #[test]
    fn tool_result_output_roundtrips_through_json() {
        let r = ToolResult::ok(obj(json!({"count": 3, "items": ["a", "b"]})));
        let json = serde_json::to_string(&r).unwrap();
        let back: ToolResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.output, r.output);
    }

    // ── Observation ─────────────────────────────────────────────────

    #[test]
    fn observation_tool_call_invariant() {
        let action = Action::tool_call("cron.list", JsonObject::new());
        let ok = Observation::from_tool_result(
            action.clone(),
            ToolResult::ok(obj(json!({"jobs": []}))),
            12,
        );
        assert!(ok.success && ok.output.is_some() && ok.error.is_none());

        let failed =
            Observation::from_tool_result(action, ToolResult::err("unknown tool"), 3);
        assert!(!failed.success && failed.output.is_none() && failed.error.is_some());
    }

    #[test]
    fn observation_need_info_joins_questions() {
        let action = Action::need_info(vec!["When?".into(), "Where?".into()]);
        let obs = Observation::need_info(action);
        assert!(obs.success);
        assert_eq!(obs.message.as_deref(), Some("When? Where?"));
    }

    #[test]
    fn observation_final_echoes_message() {
        let obs = Observation::final_message(Action::final_message("all set"));
        assert_eq!(obs.message.as_deref(), Some("all set"));
    }

    // ── RunState / RunContext ───────────────────────────────────────

    #[test]
    fn pending_decision_is_consumed_once() {
        let mut state = RunState::new("hi", Mode::Task);
        state.pending_decision = Some(Decision::Final {
            message: "ok".into(),
        });
        assert!(state.take_pending_decision().is_some());
        assert!(state.take_pending_decision().is_none());
    }

    #[test]
    fn context_allows_all_without_allowlist() {
        let ctx = RunContext::new(1, Some(7));
        assert!(ctx.tool_allowed("anything"));
        assert_eq!(ctx.caller_id, "7");
    }

    #[test]
    fn context_allowlist_filters() {
        let mut ctx = RunContext::new(1, None);
        ctx.allowed_tools = Some(["cron.add".to_owned()].into_iter().collect());
        assert!(ctx.tool_allowed("cron.add"));
        assert!(!ctx.tool_allowed("web.search"));
        assert_eq!(ctx.caller_id, "0");
    }

    #[test]
    fn mode_agentic_split() {
        assert!(Mode::Research.is_agentic());
        assert!(Mode::Scheduling.is_agentic());
        assert!(!Mode::Chat.is_agentic());
        assert!(!Mode::Reflection.is_agentic());
    }
}
