//! Append-only JSONL conversation history.
//!
//! Each chat gets a `<chat_id>.jsonl` file; every user/assistant/system
//! message is appended as one JSON line. Reads return the current
//! session window: the trailing run of messages with no inactivity gap
//! of `inactivity_minutes` or more between consecutive lines.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use hearth_domain::error::Result;

/// A single history line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryLine {
    pub timestamp: DateTime<Utc>,
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metadata: Option<serde_json::Value>,
}

pub struct HistoryStore {
    base_dir: PathBuf,
}

impl HistoryStore {
    pub fn new(base_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_dir)?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
        })
    }

    fn path(&self, chat_id: &str) -> PathBuf {
        self.base_dir.join(format!("{chat_id}.jsonl"))
    }

    /// Append one message with the current timestamp.
    pub fn append(&self, chat_id: &str, role: &str, content: &str) -> Result<()> {
        self.append_line(
            chat_id,
            &HistoryLine {
                timestamp: Utc::now(),
                role: role.to_owned(),
                content: content.to_owned(),
                metadata: None,
            },
        )
    }

    pub fn append_line(&self, chat_id: &str, line: &HistoryLine) -> Result<()> {
        use std::io::Write;
        let mut buf = serde_json::to_string(line)?;
        buf.push('\n');
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(chat_id))?;
        file.write_all(buf.as_bytes())?;
        Ok(())
    }

    /// Read the full history for a chat, skipping malformed lines.
    pub fn read_all(&self, chat_id: &str) -> Result<Vec<HistoryLine>> {
        let path = self.path(chat_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&path)?;
        let mut lines = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryLine>(line) {
                Ok(l) => lines.push(l),
                Err(e) => {
                    tracing::warn!(chat_id, error = %e, "skipping malformed history line");
                }
            }
        }
        Ok(lines)
    }

    /// Current session window: the trailing messages separated by gaps
    /// shorter than `inactivity_minutes`, capped at `max_messages`.
    pub fn session_window(
        &self,
        chat_id: &str,
        inactivity_minutes: i64,
        max_messages: usize,
    ) -> Result<Vec<HistoryLine>> {
        let all = self.read_all(chat_id)?;
        let gap = Duration::minutes(inactivity_minutes);

        let mut start = 0;
        for i in 1..all.len() {
            if all[i].timestamp - all[i - 1].timestamp >= gap {
                start = i;
            }
        }
        let window = &all[start..];
        let skip = window.len().saturating_sub(max_messages);
        Ok(window[skip..].to_vec())
    }
}
