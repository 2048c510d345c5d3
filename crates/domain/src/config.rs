//! Gateway configuration, loaded from `hearth.toml` with serde defaults
//! for every key so a missing or empty file yields a working setup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub proactive: ProactiveConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

impl Config {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_bind_addr")]
    pub bind_addr: String,
    /// Environment variable holding the API bearer token. If the env
    /// var is unset, the gateway runs without auth (dev mode).
    #[serde(default = "d_token_env")]
    pub token_env: String,
    /// Root directory for all persisted state.
    #[serde(default = "d_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: d_bind_addr(),
            token_env: d_token_env(),
            data_dir: d_data_dir(),
        }
    }
}

fn d_bind_addr() -> String {
    "127.0.0.1:8787".into()
}

fn d_token_env() -> String {
    "HEARTH_API_TOKEN".into()
}

fn d_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hearth")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// OpenAI-compatible endpoint base (local or remote).
    #[serde(default = "d_model_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key (optional for local models).
    #[serde(default = "d_model_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_model_name")]
    pub model: String,
    /// Token cap for chat-mode replies (keeps latency predictable).
    #[serde(default = "d_chat_max_tokens")]
    pub chat_max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: d_model_base_url(),
            api_key_env: d_model_key_env(),
            model: d_model_name(),
            chat_max_tokens: d_chat_max_tokens(),
        }
    }
}

fn d_model_base_url() -> String {
    "http://127.0.0.1:11434/v1".into()
}

fn d_model_key_env() -> String {
    "HEARTH_MODEL_API_KEY".into()
}

fn d_model_name() -> String {
    "qwen2.5:14b".into()
}

fn d_chat_max_tokens() -> u32 {
    1024
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Display name of the assistant persona.
    #[serde(default = "d_agent_name")]
    pub name: String,
    /// Cap on reflect/act cycles within one turn.
    #[serde(default = "d_max_iterations")]
    pub max_iterations: u32,
    /// Per-task turn budget.
    #[serde(default = "d_max_turns")]
    pub max_turns: u32,
    /// Per-task tool-attempt budget.
    #[serde(default = "d_max_tool_attempts")]
    pub max_tool_attempts: u32,
    /// Phrases that signal "intention without a tool call" for the
    /// anti-loop rule. Heuristic, so configuration rather than code.
    #[serde(default = "d_intention_phrases")]
    pub intention_phrases: Vec<String>,
    /// Optional PII screening in the output validator.
    #[serde(default)]
    pub check_pii: bool,
    /// Streaming-payload truncation limits per phase (bytes).
    #[serde(default = "d_plan_output_max")]
    pub plan_output_max: usize,
    #[serde(default = "d_tool_output_max")]
    pub tool_output_max: usize,
    #[serde(default = "d_reflect_output_max")]
    pub reflect_output_max: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: d_agent_name(),
            max_iterations: d_max_iterations(),
            max_turns: d_max_turns(),
            max_tool_attempts: d_max_tool_attempts(),
            intention_phrases: d_intention_phrases(),
            check_pii: false,
            plan_output_max: d_plan_output_max(),
            tool_output_max: d_tool_output_max(),
            reflect_output_max: d_reflect_output_max(),
        }
    }
}

fn d_agent_name() -> String {
    "hearth".into()
}

fn d_max_iterations() -> u32 {
    8
}

fn d_max_turns() -> u32 {
    4
}

fn d_max_tool_attempts() -> u32 {
    2
}

fn d_intention_phrases() -> Vec<String> {
    [
        "i will",
        "i'll",
        "i am going to",
        "i'm going to",
        "let me",
        "we will",
        "ik zal",
        "we zullen",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

fn d_plan_output_max() -> usize {
    4000
}

fn d_tool_output_max() -> usize {
    3500
}

fn d_reflect_output_max() -> usize {
    2000
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheduler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "d_tick_seconds")]
    pub tick_seconds: u64,
    /// Per-caller creation cap per UTC day.
    #[serde(default = "d_jobs_per_caller_per_day")]
    pub jobs_per_caller_per_day: u32,
    /// Every-minute cron allow-list: "true"/"1" accepts `* * * * *`;
    /// otherwise a comma-separated list of exact expressions. Empty
    /// (the default) rejects every-minute expressions.
    #[serde(default)]
    pub cron_allow_every_minute: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_seconds: d_tick_seconds(),
            jobs_per_caller_per_day: d_jobs_per_caller_per_day(),
            cron_allow_every_minute: String::new(),
        }
    }
}

fn d_tick_seconds() -> u64 {
    30
}

fn d_jobs_per_caller_per_day() -> u32 {
    20
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Proactive reminders
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProactiveConfig {
    #[serde(default = "d_proactive_tick_seconds")]
    pub tick_seconds: u64,
    /// Remind when an event starts within this window (minutes ahead).
    #[serde(default = "d_reminder_window_min")]
    pub reminder_window_min: i64,
    #[serde(default = "d_reminder_window_max")]
    pub reminder_window_max: i64,
}

impl Default for ProactiveConfig {
    fn default() -> Self {
        Self {
            tick_seconds: d_proactive_tick_seconds(),
            reminder_window_min: d_reminder_window_min(),
            reminder_window_max: d_reminder_window_max(),
        }
    }
}

fn d_proactive_tick_seconds() -> u64 {
    60
}

fn d_reminder_window_min() -> i64 {
    12
}

fn d_reminder_window_max() -> i64 {
    18
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions / workspace
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Inactivity gap after which a new conversation session starts.
    #[serde(default = "d_inactivity_minutes")]
    pub inactivity_minutes: i64,
    /// Upper bound on history messages loaded per turn.
    #[serde(default = "d_history_max_messages")]
    pub history_max_messages: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_minutes: d_inactivity_minutes(),
            history_max_messages: d_history_max_messages(),
        }
    }
}

fn d_inactivity_minutes() -> i64 {
    15
}

fn d_history_max_messages() -> usize {
    40
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkspaceConfig {
    /// Root for the codebase.* read tools. Unset disables them.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.agent.max_iterations, 8);
        assert_eq!(cfg.agent.max_turns, 4);
        assert_eq!(cfg.agent.max_tool_attempts, 2);
        assert_eq!(cfg.scheduler.tick_seconds, 30);
        assert_eq!(cfg.scheduler.jobs_per_caller_per_day, 20);
        assert_eq!(cfg.scheduler.cron_allow_every_minute, "");
        assert_eq!(cfg.proactive.tick_seconds, 60);
        assert_eq!(cfg.proactive.reminder_window_min, 12);
        assert_eq!(cfg.proactive.reminder_window_max, 18);
        assert_eq!(cfg.session.inactivity_minutes, 15);
        assert_eq!(cfg.agent.plan_output_max, 4000);
        assert_eq!(cfg.agent.tool_output_max, 3500);
        assert_eq!(cfg.agent.reflect_output_max, 2000);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [agent]
            max_turns = 6

            [scheduler]
            cron_allow_every_minute = "true"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.agent.max_turns, 6);
        assert_eq!(cfg.agent.max_iterations, 8);
        assert_eq!(cfg.scheduler.cron_allow_every_minute, "true");
        assert_eq!(cfg.scheduler.jobs_per_caller_per_day, 20);
    }

    #[test]
    fn intention_phrases_default_nonempty() {
        let cfg = Config::default();
        assert!(cfg
            .agent
            .intention_phrases
            .iter()
            .any(|p| p == "i will"));
    }
}
