//! Proactive reminders: a background loop that checks the agenda for
//! connected users and announces events starting inside the reminder
//! window. Each (user, event, start) is announced at most once.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use hearth_domain::config::ProactiveConfig;

use super::agenda::AgendaStore;
use super::connections::ConnectionRegistry;

pub struct ProactiveService {
    agenda: Arc<AgendaStore>,
    connections: Arc<ConnectionRegistry>,
    config: ProactiveConfig,
}

impl ProactiveService {
    pub fn new(
        agenda: Arc<AgendaStore>,
        connections: Arc<ConnectionRegistry>,
        config: ProactiveConfig,
    ) -> Self {
        Self {
            agenda,
            connections,
            config,
        }
    }

    /// One pass: for each connected user, enqueue reminders for events
    /// starting within the window, then flush their queue.
    pub fn tick(&self) {
        let user_ids = self.connections.connected_user_ids();
        if user_ids.is_empty() {
            return;
        }
        let now = Utc::now();
        let window_start = now + chrono::Duration::minutes(self.config.reminder_window_min);
        let window_end = now + chrono::Duration::minutes(self.config.reminder_window_max);

        for user_id in user_ids {
            let events = self.agenda.list_range(&user_id, window_start, window_end);
            for event in events {
                let key = format!("{user_id}:{}:{}", event.id, event.start_at.to_rfc3339());
                if !self.connections.mark_notified(key) {
                    continue; // already announced across a previous tick
                }
                let minutes = (event.start_at - now).num_minutes().max(0);
                let message = format!("In {minutes} min: {}", event.title);
                tracing::info!(user_id = %user_id, event_id = %event.id, "proactive reminder queued");
                self.connections.enqueue_proactive(&user_id, &message);
            }
            self.connections.flush_pending(&user_id);
        }
    }

    /// Run the reminder loop forever. Spawned as a background task.
    pub async fn run(self) {
        tracing::info!(
            interval_secs = self.config.tick_seconds,
            "proactive service started"
        );
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.tick_seconds));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.tick();
        }
    }
}
