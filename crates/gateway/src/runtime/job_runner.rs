//! Scheduler tick loop: wake on a fixed cadence, compute due jobs from
//! the run history, execute them, and append one run record per
//! (job, tick).
//!
//! Restart idempotence: `at` jobs with any recorded run never refire;
//! `every`/`cron` jobs resume from their last recorded run. Missed
//! `every` intervals collapse into a single catch-up firing — the next
//! due time is anchored to the recorded run, so the cadence resumes
//! from the fire time.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use hearth_domain::job::{Job, Schedule};

use super::cron;
use super::jobs::{parse_at_instant, JobEngine};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Due computation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Whether a job should fire at `now`, given its run history.
pub fn is_due(
    job: &Job,
    last_run: Option<DateTime<Utc>>,
    has_any_run: bool,
    now: DateTime<Utc>,
) -> bool {
    match &job.schedule {
        Schedule::At { at } => {
            if has_any_run {
                return false; // one-shot, already fired
            }
            match parse_at_instant(at) {
                Ok(instant) => instant <= now,
                Err(e) => {
                    tracing::warn!(job_id = %job.id, error = %e, "unparseable at instant");
                    false
                }
            }
        }
        Schedule::Every { every_ms } => {
            let base = last_run.unwrap_or(job.created_at);
            base + chrono::Duration::milliseconds(*every_ms as i64) <= now
        }
        Schedule::Cron { expr, tz } => {
            let base = last_run.unwrap_or(job.created_at);
            match cron::next_occurrence(expr, &base, cron::parse_tz(tz)) {
                Some(next) => next <= now,
                None => false,
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheduler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Scheduler {
    engine: Arc<JobEngine>,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(engine: Arc<JobEngine>, tick_seconds: u64) -> Self {
        Self {
            engine,
            tick_interval: Duration::from_secs(tick_seconds),
        }
    }

    /// One pass over all jobs: execute every due job and record a run.
    pub async fn tick(&self) {
        let now = Utc::now();
        for job in self.engine.all_jobs() {
            let last_run = self.engine.last_run_time(&job.id);
            if !is_due(&job, last_run, last_run.is_some(), now) {
                continue;
            }
            tracing::info!(job_id = %job.id, owner = %job.owner_id, "job due, executing");
            self.engine.execute_and_record(&job).await;
        }
    }

    /// Run the tick loop forever. Spawned as a background task.
    pub async fn run(self) {
        tracing::info!(
            interval_secs = self.tick_interval.as_secs(),
            "scheduler started"
        );
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_domain::config::SchedulerConfig;
    use hearth_domain::job::{JobRun, JobRunStatus, JobSpec, Payload, SessionTarget};
    use hearth_sessions::MetaStore;
    use parking_lot::Mutex;

    fn job(schedule: Schedule, created_minutes_ago: i64) -> Job {
        Job {
            id: "j1".into(),
            owner_id: "7".into(),
            schedule,
            session_target: SessionTarget::Main,
            payload: Payload::SystemEvent { text: "ping".into() },
            wake_mode: Default::default(),
            label: None,
            created_at: Utc::now() - chrono::Duration::minutes(created_minutes_ago),
        }
    }

    fn minutes_ago(n: i64) -> DateTime<Utc> {
        Utc::now() - chrono::Duration::minutes(n)
    }

    // ── At ──────────────────────────────────────────────────────────

    #[test]
    fn at_fires_once_reached() {
        let past = (Utc::now() - chrono::Duration::minutes(1)).to_rfc3339();
        let j = job(Schedule::At { at: past }, 10);
        assert!(is_due(&j, None, false, Utc::now()));
    }

    #[test]
    fn at_never_refires_after_any_run() {
        let past = (Utc::now() - chrono::Duration::minutes(1)).to_rfc3339();
        let j = job(Schedule::At { at: past }, 10);
        assert!(!is_due(&j, Some(minutes_ago(1)), true, Utc::now()));
    }

    #[test]
    fn at_in_future_is_not_due() {
        let future = (Utc::now() + chrono::Duration::minutes(5)).to_rfc3339();
        let j = job(Schedule::At { at: future }, 10);
        assert!(!is_due(&j, None, false, Utc::now()));
    }

    // ── Every ───────────────────────────────────────────────────────

    #[test]
    fn every_due_from_created_at_when_never_run() {
        let j = job(Schedule::Every { every_ms: 60_000 }, 2);
        assert!(is_due(&j, None, false, Utc::now()));
    }

    #[test]
    fn every_not_due_before_period_elapses() {
        let j = job(Schedule::Every { every_ms: 600_000 }, 2);
        assert!(!is_due(&j, None, false, Utc::now()));
    }

    #[test]
    fn every_resumes_from_last_run() {
        let j = job(Schedule::Every { every_ms: 60_000 }, 60);
        assert!(!is_due(&j, Some(minutes_ago(0)), true, Utc::now()));
        assert!(is_due(&j, Some(minutes_ago(2)), true, Utc::now()));
    }

    #[test]
    fn every_collapses_missed_intervals_into_one_firing() {
        // Last run an hour ago on a 1-minute cadence: due now, but the
        // next due time after firing anchors to the new run record, so
        // exactly one catch-up run happens.
        let j = job(Schedule::Every { every_ms: 60_000 }, 120);
        assert!(is_due(&j, Some(minutes_ago(60)), true, Utc::now()));
        assert!(!is_due(&j, Some(Utc::now()), true, Utc::now()));
    }

    // ── Cron ────────────────────────────────────────────────────────

    #[test]
    fn cron_due_when_occurrence_passed_since_last_run() {
        // Hourly at minute 0; last run 2 hours ago means at least one
        // occurrence has passed.
        let j = job(
            Schedule::Cron { expr: "0 * * * *".into(), tz: "UTC".into() },
            600,
        );
        assert!(is_due(&j, Some(minutes_ago(120)), true, Utc::now()));
    }

    #[test]
    fn cron_not_due_right_after_firing() {
        let j = job(
            Schedule::Cron { expr: "0 * * * *".into(), tz: "UTC".into() },
            600,
        );
        // Ran moments ago; next top of hour is in the future.
        assert!(!is_due(&j, Some(Utc::now()), true, Utc::now()));
    }

    // ── Tick loop ───────────────────────────────────────────────────

    struct CountingExecutor(Mutex<u32>);

    #[async_trait::async_trait]
    impl super::super::jobs::JobExecutor for CountingExecutor {
        async fn execute(&self, _job: &Job) -> Result<(), String> {
            *self.0.lock() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn tick_fires_due_at_job_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let meta = MetaStore::new(dir.path()).unwrap();
        let executor = Arc::new(CountingExecutor(Mutex::new(0)));
        let engine = Arc::new(
            JobEngine::open(dir.path(), SchedulerConfig::default(), executor.clone(), &meta)
                .unwrap(),
        );

        let past = (Utc::now() - chrono::Duration::minutes(1)).to_rfc3339();
        engine
            .add(
                "7",
                JobSpec {
                    schedule: Schedule::At { at: past },
                    session_target: SessionTarget::Main,
                    payload: Payload::SystemEvent { text: "now".into() },
                    wake_mode: Default::default(),
                    label: None,
                },
            )
            .unwrap();

        let scheduler = Scheduler::new(engine.clone(), 30);
        scheduler.tick().await;
        scheduler.tick().await;

        // One run record across the job's lifetime.
        assert_eq!(*executor.0.lock(), 1);
        let job_id = engine.all_jobs()[0].id.clone();
        assert_eq!(engine.load_runs(&job_id, 100).len(), 1);
    }

    #[tokio::test]
    async fn tick_records_error_runs() {
        struct FailingExecutor;
        #[async_trait::async_trait]
        impl super::super::jobs::JobExecutor for FailingExecutor {
            async fn execute(&self, _job: &Job) -> Result<(), String> {
                Err("delivery failed".into())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let meta = MetaStore::new(dir.path()).unwrap();
        let engine = Arc::new(
            JobEngine::open(
                dir.path(),
                SchedulerConfig::default(),
                Arc::new(FailingExecutor),
                &meta,
            )
            .unwrap(),
        );
        let past = (Utc::now() - chrono::Duration::minutes(1)).to_rfc3339();
        engine
            .add(
                "7",
                JobSpec {
                    schedule: Schedule::At { at: past },
                    session_target: SessionTarget::Main,
                    payload: Payload::SystemEvent { text: "x".into() },
                    wake_mode: Default::default(),
                    label: None,
                },
            )
            .unwrap();

        Scheduler::new(engine.clone(), 30).tick().await;
        let job_id = engine.all_jobs()[0].id.clone();
        let runs = engine.load_runs(&job_id, 10);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, JobRunStatus::Error);
        assert_eq!(runs[0].error.as_deref(), Some("delivery failed"));
    }

    #[tokio::test]
    async fn restart_resumes_every_job_from_run_log() {
        let dir = tempfile::tempdir().unwrap();
        let meta = MetaStore::new(dir.path()).unwrap();
        let executor = Arc::new(CountingExecutor(Mutex::new(0)));
        let engine = Arc::new(
            JobEngine::open(dir.path(), SchedulerConfig::default(), executor.clone(), &meta)
                .unwrap(),
        );
        engine
            .add(
                "7",
                JobSpec {
                    schedule: Schedule::Every { every_ms: 3_600_000 },
                    session_target: SessionTarget::Main,
                    payload: Payload::SystemEvent { text: "hourly".into() },
                    wake_mode: Default::default(),
                    label: None,
                },
            )
            .unwrap();
        let job_id = engine.all_jobs()[0].id.clone();
        // Simulate a run recorded before a restart, minutes ago.
        engine.append_run(&JobRun {
            job_id: job_id.clone(),
            timestamp: minutes_ago(5),
            status: JobRunStatus::Ok,
            error: None,
        });

        Scheduler::new(engine.clone(), 30).tick().await;
        // The hour has not elapsed since the recorded run.
        assert_eq!(*executor.0.lock(), 0);
    }
}
