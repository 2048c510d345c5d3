//! Process-local run and tool counters, exposed on the ops endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Metrics {
    runs_succeeded: AtomicU64,
    runs_failed: AtomicU64,
    tool_calls_succeeded: AtomicU64,
    tool_calls_failed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_run(&self, success: bool) {
        if success {
            self.runs_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.runs_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_tool_call(&self, success: bool) {
        if success {
            self.tool_calls_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tool_calls_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "runs": {
                "succeeded": self.runs_succeeded.load(Ordering::Relaxed),
                "failed": self.runs_failed.load(Ordering::Relaxed),
            },
            "tool_calls": {
                "succeeded": self.tool_calls_succeeded.load(Ordering::Relaxed),
                "failed": self.tool_calls_failed.load(Ordering::Relaxed),
            },
        })
    }
}
