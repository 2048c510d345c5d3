//! Agentic loop plumbing: the turn trace (observation log the model
//! reflects over) and the JSON parsing of plan/reflect step outputs.
//!
//! Every step uses JSON so tool calls parse reliably; the model
//! observes through the serialized trace, not raw tool output.

use serde::Serialize;
use serde_json::Value;

use hearth_domain::agent::JsonObject;

use super::protocol::extract_json_object;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn trace
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One entry in the observation log: a tool call and its outcome.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub event: &'static str,
    pub tool: String,
    pub arguments: JsonObject,
    pub success: bool,
    /// Short, shape-aware summary for model context.
    pub result_summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Structured log of tool calls and results for one turn.
#[derive(Debug, Default)]
pub struct TurnTrace {
    events: Vec<TraceEvent>,
}

impl TurnTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn append_tool_call(
        &mut self,
        tool: &str,
        arguments: JsonObject,
        success: bool,
        result_summary: String,
        error: Option<String>,
    ) {
        tracing::info!(
            tool,
            success,
            summary = %truncate_chars(&result_summary, 80),
            "agent tool call recorded"
        );
        self.events.push(TraceEvent {
            event: "tool_call",
            tool: tool.to_owned(),
            arguments,
            success,
            result_summary,
            error,
        });
    }

    /// Serialize the trace for the reflect step.
    pub fn to_observation_json(&self) -> String {
        serde_json::to_string(&self.events).unwrap_or_else(|_| "[]".into())
    }

    /// Facts for the writer: one line per tool result, no noise.
    pub fn to_facts_list(&self) -> Vec<String> {
        self.events
            .iter()
            .map(|e| {
                if e.success {
                    let summary = if e.result_summary.is_empty() {
                        "ok"
                    } else {
                        &e.result_summary
                    };
                    format!("{}: {}", e.tool, summary)
                } else {
                    format!(
                        "{}: error — {}",
                        e.tool,
                        e.error.as_deref().unwrap_or("unknown")
                    )
                }
            })
            .collect()
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Plan / reflect step parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The step decision carried by plan and reflect outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    Tool,
    Respond,
    AskUser,
    RevisePlan,
}

impl NextAction {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "tool" => Some(Self::Tool),
            "respond" => Some(Self::Respond),
            "ask_user" => Some(Self::AskUser),
            "revise_plan" => Some(Self::RevisePlan),
            _ => None,
        }
    }
}

/// One requested tool invocation from a plan/reflect step.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedCall {
    pub name: String,
    pub arguments: JsonObject,
}

/// Parsed first-step output: goal, plan, and the initial decision.
#[derive(Debug, Clone)]
pub struct PlanStep {
    pub goal: Option<String>,
    pub plan: Vec<String>,
    pub tool_calls: Vec<PlannedCall>,
    pub next_action: NextAction,
    pub response_outline: Vec<String>,
    pub question_to_user: String,
}

/// Parsed reflect-step output.
#[derive(Debug, Clone)]
pub struct ReflectStep {
    pub reflection: Option<String>,
    pub tool_calls: Vec<PlannedCall>,
    pub next_action: NextAction,
    pub response_outline: Vec<String>,
    pub question_to_user: String,
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.trim().to_owned(),
                other => other.to_string(),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn opt_string(obj: &JsonObject, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        obj.get(*k)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    })
}

fn parse_tool_calls(obj: &JsonObject, allowed_tools: Option<&[String]>) -> Vec<PlannedCall> {
    let Some(Value::Array(raw_calls)) = obj.get("tool_calls") else {
        return Vec::new();
    };
    raw_calls
        .iter()
        .filter_map(|item| {
            let item = item.as_object()?;
            let name = item
                .get("name")
                .or_else(|| item.get("tool"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())?;
            if let Some(allowed) = allowed_tools {
                if !allowed.iter().any(|t| t == name) {
                    tracing::warn!(tool = name, "model requested disallowed tool");
                    return None;
                }
            }
            let arguments = item
                .get("arguments")
                .or_else(|| item.get("args"))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            Some(PlannedCall {
                name: name.to_owned(),
                arguments,
            })
        })
        .collect()
}

fn parse_next_action(obj: &JsonObject) -> NextAction {
    obj.get("next_action")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .and_then(|s| NextAction::from_str(&s))
        .unwrap_or(NextAction::Respond)
}

/// Parse the first agent step: goal, plan, next_action, tool_calls,
/// response_outline, question_to_user. Unparseable output degrades to
/// a bare `respond`.
pub fn parse_plan_step(raw: &str, allowed_tools: Option<&[String]>) -> PlanStep {
    let Some(obj) = extract_json_object(raw) else {
        return PlanStep {
            goal: None,
            plan: Vec::new(),
            tool_calls: Vec::new(),
            next_action: NextAction::Respond,
            response_outline: Vec::new(),
            question_to_user: String::new(),
        };
    };

    let tool_calls = parse_tool_calls(&obj, allowed_tools);
    let mut next_action = parse_next_action(&obj);
    if next_action == NextAction::Tool && tool_calls.is_empty() {
        next_action = NextAction::Respond;
    }
    PlanStep {
        goal: opt_string(&obj, &["goal", "goal_summary"]),
        plan: string_list(obj.get("plan")),
        tool_calls,
        next_action,
        response_outline: string_list(obj.get("response_outline")),
        question_to_user: opt_string(&obj, &["question_to_user", "question"]).unwrap_or_default(),
    }
}

/// Parse a reflect step: reflection, next_action, tool_calls,
/// response_outline, question_to_user.
pub fn parse_reflect_step(raw: &str, allowed_tools: Option<&[String]>) -> ReflectStep {
    let Some(obj) = extract_json_object(raw) else {
        return ReflectStep {
            reflection: None,
            tool_calls: Vec::new(),
            next_action: NextAction::Respond,
            response_outline: Vec::new(),
            question_to_user: String::new(),
        };
    };

    let tool_calls = parse_tool_calls(&obj, allowed_tools);
    let mut next_action = parse_next_action(&obj);
    if next_action == NextAction::Tool && tool_calls.is_empty() {
        next_action = NextAction::Respond;
    }
    ReflectStep {
        reflection: opt_string(&obj, &["reflection", "observation_summary"]),
        tool_calls,
        next_action,
        response_outline: string_list(obj.get("response_outline")),
        question_to_user: opt_string(&obj, &["question_to_user", "question"]).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(v: Value) -> JsonObject {
        v.as_object().unwrap().clone()
    }

    // ── TurnTrace ───────────────────────────────────────────────────

    #[test]
    fn empty_trace_serializes_to_empty_array() {
        let trace = TurnTrace::new();
        assert!(trace.is_empty());
        assert_eq!(trace.to_observation_json(), "[]");
        assert!(trace.to_facts_list().is_empty());
    }

    #[test]
    fn trace_facts_include_tool_and_summary() {
        let mut trace = TurnTrace::new();
        trace.append_tool_call(
            "web.search",
            args(json!({"query": "tiles"})),
            true,
            "1) Tile shop | https://example.com/tiles".into(),
            None,
        );
        let facts = trace.to_facts_list();
        assert_eq!(facts.len(), 1);
        assert!(facts[0].starts_with("web.search: "));
        assert!(facts[0].contains("https://example.com/tiles"));
    }

    #[test]
    fn trace_failed_call_becomes_error_fact() {
        let mut trace = TurnTrace::new();
        trace.append_tool_call(
            "cron.add",
            JsonObject::new(),
            false,
            String::new(),
            Some("everyMs must be >= 60000 (1 minute)".into()),
        );
        let facts = trace.to_facts_list();
        assert!(facts[0].contains("error"));
        assert!(facts[0].contains("everyMs"));
    }

    #[test]
    fn trace_observation_json_is_parseable() {
        let mut trace = TurnTrace::new();
        trace.append_tool_call("codebase.search", JsonObject::new(), true, "3 matches".into(), None);
        let value: Value = serde_json::from_str(&trace.to_observation_json()).unwrap();
        assert_eq!(value[0]["tool"], "codebase.search");
        assert_eq!(value[0]["success"], true);
    }

    // ── Plan step ───────────────────────────────────────────────────

    #[test]
    fn plan_step_full_parse() {
        let raw = json!({
            "goal": "find tiles",
            "plan": ["search the web", "summarize"],
            "next_action": "tool",
            "tool_calls": [{"name": "web.search", "arguments": {"query": "garden tiles"}}],
            "response_outline": ["options", "prices"],
        })
        .to_string();
        let step = parse_plan_step(&raw, None);
        assert_eq!(step.goal.as_deref(), Some("find tiles"));
        assert_eq!(step.plan.len(), 2);
        assert_eq!(step.next_action, NextAction::Tool);
        assert_eq!(step.tool_calls[0].name, "web.search");
        assert_eq!(step.response_outline, vec!["options", "prices"]);
    }

    #[test]
    fn plan_step_unparseable_degrades_to_respond() {
        let step = parse_plan_step("no json here at all", None);
        assert_eq!(step.next_action, NextAction::Respond);
        assert!(step.tool_calls.is_empty());
        assert!(step.goal.is_none());
    }

    #[test]
    fn plan_step_tool_without_calls_becomes_respond() {
        let raw = json!({"goal": "x", "next_action": "tool", "tool_calls": []}).to_string();
        assert_eq!(parse_plan_step(&raw, None).next_action, NextAction::Respond);
    }

    #[test]
    fn plan_step_filters_disallowed_tools() {
        let raw = json!({
            "next_action": "tool",
            "tool_calls": [
                {"name": "web.search", "arguments": {"query": "x"}},
                {"name": "codebase.read_file", "arguments": {"path": "a"}},
            ],
        })
        .to_string();
        let allowed = vec!["web.search".to_owned()];
        let step = parse_plan_step(&raw, Some(&allowed));
        assert_eq!(step.tool_calls.len(), 1);
        assert_eq!(step.tool_calls[0].name, "web.search");
    }

    #[test]
    fn plan_step_ask_user_keeps_question() {
        let raw = json!({"next_action": "ask_user", "question_to_user": "Which day?"}).to_string();
        let step = parse_plan_step(&raw, None);
        assert_eq!(step.next_action, NextAction::AskUser);
        assert_eq!(step.question_to_user, "Which day?");
    }

    #[test]
    fn plan_step_accepts_tool_and_args_aliases() {
        let raw = json!({
            "next_action": "tool",
            "tool_calls": [{"tool": "cron.list", "args": {}}],
        })
        .to_string();
        let step = parse_plan_step(&raw, None);
        assert_eq!(step.tool_calls[0].name, "cron.list");
    }

    // ── Reflect step ────────────────────────────────────────────────

    #[test]
    fn reflect_step_parses_reflection_and_next_calls() {
        let raw = json!({
            "reflection": "search found shops, need prices",
            "next_action": "tool",
            "tool_calls": [{"name": "web.shopping_search", "arguments": {"query": "tiles"}}],
        })
        .to_string();
        let step = parse_reflect_step(&raw, None);
        assert_eq!(step.reflection.as_deref(), Some("search found shops, need prices"));
        assert_eq!(step.next_action, NextAction::Tool);
        assert_eq!(step.tool_calls.len(), 1);
    }

    #[test]
    fn reflect_step_respond_ends_loop() {
        let raw = json!({"reflection": "enough data", "next_action": "respond"}).to_string();
        let step = parse_reflect_step(&raw, None);
        assert_eq!(step.next_action, NextAction::Respond);
        assert!(step.tool_calls.is_empty());
    }

    #[test]
    fn reflect_step_invalid_next_action_defaults_to_respond() {
        let raw = json!({"next_action": "explode"}).to_string();
        assert_eq!(parse_reflect_step(&raw, None).next_action, NextAction::Respond);
    }
}
