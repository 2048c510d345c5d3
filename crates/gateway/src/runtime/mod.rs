//! Agent runtime — the orchestration core: structured-output protocol,
//! tool dispatch, the job engine and its scheduler, task sessions, the
//! planner/executor/validator cycle, and the turn loop itself.

pub mod agenda;
pub mod agentic;
pub mod connections;
pub mod cron;
pub mod delivery;
pub mod dispatcher;
pub mod executor;
pub mod formatters;
pub mod job_runner;
pub mod jobs;
pub mod metrics;
pub mod planner;
pub mod proactive;
pub mod prompts;
pub mod protocol;
pub mod task_store;
pub mod turn;
pub mod validator;

pub use turn::{ProgressSender, TurnOutcome, TurnRequest, TurnRuntime};

use hearth_domain::chat::{Message, Role};
use hearth_sessions::HistoryLine;

/// Truncate to a byte budget on a char boundary, appending an ellipsis
/// when anything was cut.
pub(crate) fn truncate_str(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_owned();
    }
    let mut end = max;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

/// Strip basic markdown emphasis markers from a user-facing reply.
pub(crate) fn strip_markdown_emphasis(s: &str) -> String {
    static BOLD: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    static ITALIC: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let bold = BOLD.get_or_init(|| regex::Regex::new(r"\*\*(.+?)\*\*").unwrap());
    let italic = ITALIC.get_or_init(|| regex::Regex::new(r"\*([^*\n]+)\*").unwrap());
    let without_bold = bold.replace_all(s, "$1");
    italic.replace_all(&without_bold, "$1").into_owned()
}

/// Convert stored history lines to model messages, skipping roles the
/// model never sees.
pub(crate) fn history_to_messages(lines: &[HistoryLine]) -> Vec<Message> {
    lines
        .iter()
        .filter_map(|line| {
            let role = match line.role.as_str() {
                "user" => Role::User,
                "assistant" => Role::Assistant,
                "system" => Role::System,
                _ => return None,
            };
            Some(Message {
                role,
                content: line.content.clone(),
                tool_call_id: None,
            })
        })
        .collect()
}
