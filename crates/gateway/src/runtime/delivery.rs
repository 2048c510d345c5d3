//! Job payload delivery — what actually happens when a job fires.
//!
//! MAIN jobs inject a system event into the owner's main conversation
//! and their proactive queue. ISOLATED jobs are handed to a background
//! worker that runs a full agent turn in its own session and delivers
//! the final reply to the owner.

use std::sync::Arc;

use tokio::sync::mpsc;

use hearth_domain::job::{Job, Payload, SessionTarget};
use hearth_sessions::HistoryStore;

use super::connections::ConnectionRegistry;
use super::jobs::JobExecutor;
use super::turn::{TurnRequest, TurnRuntime};

pub struct PayloadDelivery {
    history: Arc<HistoryStore>,
    connections: Arc<ConnectionRegistry>,
    agent_turns: mpsc::UnboundedSender<Job>,
}

impl PayloadDelivery {
    pub fn new(
        history: Arc<HistoryStore>,
        connections: Arc<ConnectionRegistry>,
        agent_turns: mpsc::UnboundedSender<Job>,
    ) -> Self {
        Self {
            history,
            connections,
            agent_turns,
        }
    }
}

#[async_trait::async_trait]
impl JobExecutor for PayloadDelivery {
    async fn execute(&self, job: &Job) -> Result<(), String> {
        match (job.session_target, &job.payload) {
            (SessionTarget::Main, Payload::SystemEvent { text }) => {
                self.history
                    .append(&job.owner_id, "system", text)
                    .map_err(|e| e.to_string())?;
                self.connections.enqueue_proactive(&job.owner_id, text);
                self.connections.flush_pending(&job.owner_id);
                Ok(())
            }
            (SessionTarget::Isolated, Payload::AgentTurn { .. }) => self
                .agent_turns
                .send(job.clone())
                .map_err(|_| "agent-turn worker is gone".to_owned()),
            // Unreachable for validated jobs; kept as a guard for
            // hand-edited stores.
            _ => Err("job payload does not match its session target".into()),
        }
    }
}

/// Background worker: drains queued isolated jobs, runs each as an
/// agent turn in its own session, and delivers the reply to the owner.
pub async fn run_agent_turn_worker(
    runtime: Arc<TurnRuntime>,
    history: Arc<HistoryStore>,
    connections: Arc<ConnectionRegistry>,
    mut jobs: mpsc::UnboundedReceiver<Job>,
) {
    tracing::info!("agent-turn worker started");
    while let Some(job) = jobs.recv().await {
        let Payload::AgentTurn { message, delivery } = &job.payload else {
            continue;
        };
        if delivery.is_some() {
            tracing::debug!(job_id = %job.id, "delivery routing metadata present");
        }
        let request = TurnRequest {
            household_id: 0,
            user_id: job.owner_id.parse().ok(),
            message: message.clone(),
            history: Vec::new(),
            task_mode: false,
            persona: None,
            preferences: None,
        };
        let outcome = runtime.run_turn(request, None).await;

        // Isolated session transcript, one file per job.
        let session = format!("job-{}", job.id);
        let _ = history.append(&session, "user", message);
        let _ = history.append(&session, "assistant", &outcome.message);

        connections.enqueue_proactive(&job.owner_id, &outcome.message);
        connections.flush_pending(&job.owner_id);
        tracing::info!(job_id = %job.id, "isolated job turn delivered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hearth_domain::job::WakeMode;

    fn job(target: SessionTarget, payload: Payload) -> Job {
        Job {
            id: "j1".into(),
            owner_id: "7".into(),
            schedule: hearth_domain::job::Schedule::Every { every_ms: 60_000 },
            session_target: target,
            payload,
            wake_mode: WakeMode::NextHeartbeat,
            label: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn main_job_appends_system_event_and_queues_message() {
        let dir = tempfile::tempdir().unwrap();
        let history = Arc::new(HistoryStore::new(dir.path()).unwrap());
        let connections = Arc::new(ConnectionRegistry::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let delivery = PayloadDelivery::new(history.clone(), connections.clone(), tx);

        let mut stream = connections.register("7");
        delivery
            .execute(&job(
                SessionTarget::Main,
                Payload::SystemEvent { text: "time to stretch".into() },
            ))
            .await
            .unwrap();

        let lines = history.read_all("7").unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].role, "system");
        assert_eq!(lines[0].content, "time to stretch");

        let queued = stream.try_recv().unwrap();
        assert_eq!(queued["message"], "time to stretch");
    }

    #[tokio::test]
    async fn isolated_job_is_handed_to_the_worker() {
        let dir = tempfile::tempdir().unwrap();
        let history = Arc::new(HistoryStore::new(dir.path()).unwrap());
        let connections = Arc::new(ConnectionRegistry::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let delivery = PayloadDelivery::new(history, connections, tx);

        delivery
            .execute(&job(
                SessionTarget::Isolated,
                Payload::AgentTurn { message: "summarize the day".into(), delivery: None },
            ))
            .await
            .unwrap();

        let queued = rx.try_recv().unwrap();
        assert_eq!(queued.id, "j1");
    }

    #[tokio::test]
    async fn mismatched_job_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let history = Arc::new(HistoryStore::new(dir.path()).unwrap());
        let connections = Arc::new(ConnectionRegistry::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let delivery = PayloadDelivery::new(history, connections, tx);

        let err = delivery
            .execute(&job(
                SessionTarget::Main,
                Payload::AgentTurn { message: "x".into(), delivery: None },
            ))
            .await
            .unwrap_err();
        assert!(err.contains("does not match"));
    }
}
