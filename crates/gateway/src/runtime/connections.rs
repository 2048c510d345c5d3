//! Per-user connection registry: at most one active streaming
//! connection per user, plus a pending proactive-message queue drained
//! on (re)connect and a notified-set for reminder debouncing.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;

pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, mpsc::UnboundedSender<Value>>>,
    pending: Mutex<HashMap<String, Vec<Value>>>,
    /// Reminder keys already announced (user + event id + start time).
    notified: Mutex<HashSet<String>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            notified: Mutex::new(HashSet::new()),
        }
    }

    /// Register a connection for a user. Replacing a connection closes
    /// the previous one (its sender is dropped, so the old stream ends).
    pub fn register(&self, user_id: &str) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        let old = self.connections.lock().insert(user_id.to_owned(), tx);
        if old.is_some() {
            tracing::info!(user_id, "replaced existing connection");
        }
        rx
    }

    pub fn unregister(&self, user_id: &str) {
        self.connections.lock().remove(user_id);
    }

    pub fn is_connected(&self, user_id: &str) -> bool {
        self.connections.lock().contains_key(user_id)
    }

    pub fn connected_user_ids(&self) -> Vec<String> {
        self.connections.lock().keys().cloned().collect()
    }

    /// Send to a user's live connection. Returns false (and drops the
    /// dead sender) when the user is gone.
    pub fn send_to_user(&self, user_id: &str, value: Value) -> bool {
        let mut connections = self.connections.lock();
        match connections.get(user_id) {
            Some(tx) => {
                if tx.send(value).is_err() {
                    connections.remove(user_id);
                    false
                } else {
                    true
                }
            }
            None => false,
        }
    }

    /// Queue a proactive message for later delivery.
    pub fn enqueue_proactive(&self, user_id: &str, message: &str) {
        let payload = json!({
            "type": "proactive_message",
            "message": message,
            "ts": Utc::now().to_rfc3339(),
        });
        self.pending
            .lock()
            .entry(user_id.to_owned())
            .or_default()
            .push(payload);
    }

    /// Deliver all pending proactive messages; anything undeliverable
    /// stays queued for the next flush.
    pub fn flush_pending(&self, user_id: &str) {
        let queued = {
            let mut pending = self.pending.lock();
            pending.remove(user_id).unwrap_or_default()
        };
        let mut undelivered = Vec::new();
        let mut delivering = true;
        for item in queued {
            if delivering && self.send_to_user(user_id, item.clone()) {
                continue;
            }
            delivering = false;
            undelivered.push(item);
        }
        if !undelivered.is_empty() {
            self.pending
                .lock()
                .entry(user_id.to_owned())
                .or_default()
                .splice(0..0, undelivered);
        }
    }

    /// Record a reminder key. Returns true only the first time, so a
    /// reminder fires at most once per (user, event, start).
    pub fn mark_notified(&self, key: String) -> bool {
        self.notified.lock().insert(key)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
