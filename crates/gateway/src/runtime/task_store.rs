//! Task session store — file-per-task persistence with a per-chat
//! active pointer, a sticky-terminal state machine, and turn/tool
//! budgets.
//!
//! Layout: `<data>/tasks/<task_id>.json` holds the session;
//! `<data>/tasks/by_chat/<chat_id>.json` points at the active task.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::{json, Value};

use hearth_domain::error::{Error, Result};
use hearth_domain::task::{TaskSession, TaskState};

/// Optional effects applied alongside a state transition.
#[derive(Debug, Default)]
pub struct TransitionOpts {
    pub increment_turn: bool,
    pub increment_tool_attempt: bool,
    pub last_assistant_output: Option<String>,
    pub pending_confirm: Option<Value>,
}

pub struct TaskStore {
    dir: PathBuf,
    max_turns: u32,
    max_tool_attempts: u32,
}

impl TaskStore {
    pub fn open(data_dir: &Path, max_turns: u32, max_tool_attempts: u32) -> Result<Self> {
        let dir = data_dir.join("tasks");
        std::fs::create_dir_all(dir.join("by_chat"))?;
        Ok(Self {
            dir,
            max_turns,
            max_tool_attempts,
        })
    }

    fn task_path(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("{task_id}.json"))
    }

    fn pointer_path(&self, chat_id: &str) -> PathBuf {
        self.dir.join("by_chat").join(format!("{chat_id}.json"))
    }

    // ── Load / save ──────────────────────────────────────────────────

    pub fn load(&self, task_id: &str) -> Option<TaskSession> {
        let raw = std::fs::read_to_string(self.task_path(task_id)).ok()?;
        serde_json::from_str(&raw).ok()
    }

    fn save(&self, task: &TaskSession) -> Result<()> {
        let json = serde_json::to_string_pretty(task)?;
        std::fs::write(self.task_path(&task.task_id), json).map_err(Error::Io)
    }

    /// Active (non-terminal) task id for a chat, if any.
    pub fn active_task_id(&self, chat_id: &str) -> Option<String> {
        let raw = std::fs::read_to_string(self.pointer_path(chat_id)).ok()?;
        let pointer: Value = serde_json::from_str(&raw).ok()?;
        let task_id = pointer.get("task_id")?.as_str()?.to_owned();
        let task = self.load(&task_id)?;
        if task.is_terminal() {
            return None;
        }
        Some(task_id)
    }

    fn set_active(&self, chat_id: &str, task_id: &str) -> Result<()> {
        let pointer = json!({"task_id": task_id, "chat_id": chat_id});
        std::fs::write(self.pointer_path(chat_id), pointer.to_string()).map_err(Error::Io)
    }

    /// Clear the active pointer (task reached a terminal state).
    pub fn clear_active(&self, chat_id: &str) {
        let path = self.pointer_path(chat_id);
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(chat_id, error = %e, "failed to clear active task pointer");
            }
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Resume the chat's open task, or create a fresh one.
    pub fn get_or_create(&self, chat_id: &str) -> Result<TaskSession> {
        if let Some(task_id) = self.active_task_id(chat_id) {
            if let Some(task) = self.load(&task_id) {
                if task.chat_id == chat_id && !task.is_terminal() {
                    return Ok(task);
                }
            }
        }
        let task = TaskSession::new(chat_id);
        self.save(&task)?;
        self.set_active(chat_id, &task.task_id)?;
        tracing::info!(task_id = %task.task_id, chat_id, "task session created");
        Ok(task)
    }

    /// Apply a state transition and persist. Terminal states are
    /// sticky: once DONE or FAILED, nothing changes.
    pub fn transition(
        &self,
        task: &mut TaskSession,
        new_state: TaskState,
        opts: TransitionOpts,
    ) -> Result<()> {
        if task.state.is_terminal() {
            return Ok(());
        }
        task.state = new_state;
        if opts.increment_turn {
            task.turn_count += 1;
        }
        if opts.increment_tool_attempt {
            task.tool_attempt_count += 1;
        }
        if let Some(output) = opts.last_assistant_output {
            task.last_assistant_output = Some(output);
        }
        if let Some(confirm) = opts.pending_confirm {
            task.pending_confirm = Some(confirm);
        }
        task.last_message_at = Utc::now();
        self.save(task)
    }

    // ── Budgets ──────────────────────────────────────────────────────

    pub fn can_make_turn(&self, task: &TaskSession) -> bool {
        task.turn_count < self.max_turns
    }

    pub fn can_execute_tool(&self, task: &TaskSession) -> bool {
        task.tool_attempt_count < self.max_tool_attempts
    }
}
