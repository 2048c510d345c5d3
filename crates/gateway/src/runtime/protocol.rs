//! Structured-output protocol for the model: parse JSON
//! tool_call / need_info / final decisions out of free-form output,
//! with repair and duplicate-intent (anti-loop) detection.
//!
//! Raw model output is never logged here; debug logs carry lengths and
//! kinds only.

use std::collections::HashSet;

use serde_json::Value;

use hearth_domain::agent::{Decision, JsonObject};

/// Instruction returned when the model keeps announcing intent without
/// acting. Breaks the "I will do that now" loop class.
const JSON_ONLY_INSTRUCTION: &str = "Please respond with only a JSON object: \
{\"type\":\"tool_call\",\"tool\":\"cron.add\",\"args\":{...}} or \
{\"type\":\"final\",\"message\":\"...\"}. No other text.";

/// Outputs longer than this are never treated as intention phrases.
const INTENTION_MAX_LEN: usize = 2000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JSON extraction / repair
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Find the first `{ ... }` substring with balanced braces.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    for (i, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + i + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Contents of the first fenced code block (```json ... ``` or ``` ... ```).
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    // Skip an optional "json" language tag up to the first newline.
    let body_start = after_open.find('\n')?;
    let tag = after_open[..body_start].trim();
    if !tag.is_empty() && !tag.eq_ignore_ascii_case("json") {
        return None;
    }
    let body = &after_open[body_start + 1..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

/// Parse one JSON object out of raw model output, trying the whole
/// string, then a fenced code block, then the first balanced object.
pub fn extract_json_object(raw: &str) -> Option<JsonObject> {
    let text = raw.trim();
    let candidates = [
        Some(text),
        fenced_block(text),
        first_balanced_object(text),
    ];
    for candidate in candidates.into_iter().flatten() {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(candidate) {
            return Some(map);
        }
    }
    None
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Intention heuristic
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// True when the text reads as "I will do X" without being a decision.
fn looks_like_intention(text: &str, phrases: &[String]) -> bool {
    if text.is_empty() || text.len() > INTENTION_MAX_LEN {
        return false;
    }
    let lower = text.trim().to_lowercase();
    phrases.iter().any(|p| lower.contains(p.as_str()))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Decision parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parse model output into a [`Decision`].
///
/// `last_assistant_output` enables the anti-loop rule: when both the
/// previous output and this one look like unfulfilled intentions, the
/// result is a `need_info` that demands JSON-only output.
/// When `allowed_tools` is set, a tool_call naming a tool outside the
/// set is `Invalid`.
pub fn parse_model_output(
    raw: &str,
    last_assistant_output: Option<&str>,
    allowed_tools: Option<&HashSet<String>>,
    intention_phrases: &[String],
) -> Decision {
    if let Some(data) = extract_json_object(raw) {
        let kind = data
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        match kind.as_str() {
            "tool_call" => {
                let tool = data
                    .get("tool")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .trim()
                    .to_owned();
                let args = data.get("args").and_then(Value::as_object).cloned();
                if let (false, Some(args)) = (tool.is_empty(), args) {
                    if let Some(allowed) = allowed_tools {
                        if !allowed.contains(&tool) {
                            tracing::debug!(tool = %tool, "tool_call outside allow-list");
                            return Decision::Invalid;
                        }
                    }
                    return Decision::ToolCall { tool, args };
                }
            }
            "need_info" => {
                let questions = match data.get("questions") {
                    Some(Value::Array(items)) => items
                        .iter()
                        .map(|q| match q {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect(),
                    Some(Value::Null) | None => Vec::new(),
                    Some(Value::String(s)) => vec![s.clone()],
                    Some(other) => vec![other.to_string()],
                };
                return Decision::NeedInfo { questions };
            }
            "final" => {
                let message = data
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                return Decision::Final { message };
            }
            _ => {}
        }
    }

    // Duplicate-intent: previous output was intention-like and this one
    // is too — the model is circling without acting.
    if let Some(last) = last_assistant_output {
        if looks_like_intention(last, intention_phrases)
            && looks_like_intention(raw, intention_phrases)
        {
            tracing::debug!(len = raw.len(), "duplicate intention detected, forcing JSON-only");
            return Decision::NeedInfo {
                questions: vec![JSON_ONLY_INSTRUCTION.to_owned()],
            };
        }
    }

    Decision::Invalid
}

/// Extract the final user-facing message: JSON `{"message": ...}` when
/// present, the raw (trimmed) text otherwise.
pub fn parse_final_response(raw: &str) -> String {
    let text = raw.trim();
    if let Some(obj) = extract_json_object(text) {
        if let Some(message) = obj.get("message").and_then(Value::as_str) {
            return message.trim().to_owned();
        }
    }
    text.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn phrases() -> Vec<String> {
        hearth_domain::config::AgentConfig::default().intention_phrases
    }

    fn parse(raw: &str) -> Decision {
        parse_model_output(raw, None, None, &phrases())
    }

    // ── Extraction / repair ─────────────────────────────────────────

    #[test]
    fn bare_object_parses() {
        let d = parse(r#"{"type":"final","message":"done"}"#);
        assert_eq!(d, Decision::Final { message: "done".into() });
    }

    #[test]
    fn fenced_block_parses_same_as_bare() {
        let bare = parse(r#"{"type":"need_info","questions":["when?"]}"#);
        let fenced = parse("```json\n{\"type\":\"need_info\",\"questions\":[\"when?\"]}\n```");
        assert_eq!(bare, fenced);
    }

    #[test]
    fn fenced_block_without_language_tag() {
        let d = parse("```\n{\"type\":\"final\",\"message\":\"ok\"}\n```");
        assert_eq!(d, Decision::Final { message: "ok".into() });
    }

    #[test]
    fn embedded_object_in_prose_parses() {
        let d = parse(r#"Sure thing! {"type":"final","message":"hi"} hope that helps"#);
        assert_eq!(d, Decision::Final { message: "hi".into() });
    }

    #[test]
    fn nested_braces_are_balanced() {
        let d = parse(r#"{"type":"tool_call","tool":"cron.add","args":{"payload":{"kind":"systemEvent","text":"x"}}}"#);
        match d {
            Decision::ToolCall { tool, args } => {
                assert_eq!(tool, "cron.add");
                assert_eq!(args["payload"]["kind"], "systemEvent");
            }
            other => panic!("expected tool_call, got {other:?}"),
        }
    }

    // ── Contract on parsed objects ──────────────────────────────────

    #[test]
    fn empty_string_is_invalid() {
        assert_eq!(parse(""), Decision::Invalid);
    }

    #[test]
    fn unknown_type_is_invalid() {
        assert_eq!(parse(r#"{"type":"banana"}"#), Decision::Invalid);
    }

    #[test]
    fn tool_call_without_tool_is_invalid() {
        assert_eq!(parse(r#"{"type":"tool_call","tool":"","args":{}}"#), Decision::Invalid);
        assert_eq!(parse(r#"{"type":"tool_call","args":{}}"#), Decision::Invalid);
    }

    #[test]
    fn tool_call_with_non_object_args_is_invalid() {
        assert_eq!(
            parse(r#"{"type":"tool_call","tool":"cron.list","args":"nope"}"#),
            Decision::Invalid
        );
    }

    #[test]
    fn need_info_scalar_question_coerced_to_singleton() {
        let d = parse(r#"{"type":"need_info","questions":"what time?"}"#);
        assert_eq!(
            d,
            Decision::NeedInfo { questions: vec!["what time?".into()] }
        );
    }

    #[test]
    fn need_info_missing_questions_is_empty_list() {
        assert_eq!(parse(r#"{"type":"need_info"}"#), Decision::NeedInfo { questions: vec![] });
    }

    #[test]
    fn final_missing_message_is_empty_string() {
        assert_eq!(parse(r#"{"type":"final"}"#), Decision::Final { message: String::new() });
    }

    #[test]
    fn allowlist_rejects_unlisted_tool() {
        let allowed: HashSet<String> = ["cron.add".to_owned()].into_iter().collect();
        let raw = r#"{"type":"tool_call","tool":"web.search","args":{"query":"x"}}"#;
        assert_eq!(
            parse_model_output(raw, None, Some(&allowed), &phrases()),
            Decision::Invalid
        );
        let ok = r#"{"type":"tool_call","tool":"cron.add","args":{}}"#;
        assert!(matches!(
            parse_model_output(ok, None, Some(&allowed), &phrases()),
            Decision::ToolCall { .. }
        ));
    }

    // ── Anti-loop rule ──────────────────────────────────────────────

    #[test]
    fn duplicate_intention_returns_json_only_need_info() {
        let d = parse_model_output(
            "Let me do that for you.",
            Some("I will set that up now."),
            None,
            &phrases(),
        );
        match d {
            Decision::NeedInfo { questions } => {
                assert_eq!(questions.len(), 1);
                assert!(questions[0].contains("only a JSON object"));
            }
            other => panic!("expected need_info, got {other:?}"),
        }
    }

    #[test]
    fn single_intention_without_history_is_invalid() {
        assert_eq!(parse("I will set that up now."), Decision::Invalid);
    }

    #[test]
    fn intention_after_non_intention_is_invalid() {
        let d = parse_model_output(
            "Let me do that for you.",
            Some("The weather is sunny."),
            None,
            &phrases(),
        );
        assert_eq!(d, Decision::Invalid);
    }

    #[test]
    fn oversized_output_is_not_intention() {
        let long = format!("I will {}", "x".repeat(INTENTION_MAX_LEN));
        let d = parse_model_output(&long, Some("I will do it."), None, &phrases());
        assert_eq!(d, Decision::Invalid);
    }

    #[test]
    fn valid_json_wins_over_intention_history() {
        // A parseable decision is never overridden by the loop check.
        let d = parse_model_output(
            r#"{"type":"final","message":"done"}"#,
            Some("I will do it."),
            None,
            &phrases(),
        );
        assert_eq!(d, Decision::Final { message: "done".into() });
    }

    // ── Final extraction ────────────────────────────────────────────

    #[test]
    fn final_response_from_json() {
        assert_eq!(parse_final_response(r#"{"message":" All set. "}"#), "All set.");
    }

    #[test]
    fn final_response_falls_back_to_raw() {
        assert_eq!(parse_final_response("  plain text reply "), "plain text reply");
    }

    #[test]
    fn repair_equivalence_across_embeddings() {
        // The same object embedded raw, fenced, and in prose parses to
        // the same decision.
        let obj = json!({"type": "tool_call", "tool": "agenda.list", "args": {"start": "2026-01-01", "end": "2026-01-02"}});
        let bare = obj.to_string();
        let fenced = format!("```json\n{bare}\n```");
        let prose = format!("Here you go: {bare} — done.");
        let expected = parse(&bare);
        assert!(matches!(expected, Decision::ToolCall { .. }));
        assert_eq!(parse(&fenced), expected);
        assert_eq!(parse(&prose), expected);
    }
}
