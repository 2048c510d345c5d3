//! Job engine: validated add/update/remove/list/run_now/runs over a
//! keyed job set plus an append-only run log per job.
//!
//! Persistence: `<data>/jobs/jobs.json` and `<data>/jobs/runs/<id>.jsonl`.
//! A one-time migration from the legacy `<data>/cron/` layout runs at
//! open, gated by a metadata-store flag.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::json;
use uuid::Uuid;

use hearth_domain::agent::JsonObject;
use hearth_domain::config::SchedulerConfig;
use hearth_domain::job::{
    Job, JobPatch, JobRun, JobRunStatus, JobSpec, Payload, Schedule, SessionTarget,
};
use hearth_sessions::MetaStore;

use super::cron;

const MIGRATION_FLAG: &str = "jobs_store_migrated";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum JobValidationError {
    #[error("sessionTarget 'main' requires payload.kind 'systemEvent'")]
    MainRequiresSystemEvent,
    #[error("sessionTarget 'isolated' requires payload.kind 'agentTurn'")]
    IsolatedRequiresAgentTurn,
    #[error("everyMs must be >= 60000 (1 minute)")]
    PeriodTooShort,
    #[error("schedule.at must be ISO8601 with explicit offset (e.g. +01:00 or Z)")]
    MissingOffset,
    #[error("schedule.at is not a valid ISO8601 instant: {0}")]
    BadInstant(String),
    #[error("{0}")]
    BadCron(String),
    #[error("cron expression runs every minute; not allowed unless in the every-minute allow-list")]
    EveryMinuteNotAllowed,
    #[error("max {limit} jobs per caller per day; current count is {current}")]
    DailyCapReached { limit: u32, current: u32 },
    #[error("job not found or not owned by caller")]
    NotFound,
    #[error("store: {0}")]
    Store(String),
}

/// main <-> systemEvent, isolated <-> agentTurn. The payload enum makes
/// `delivery` structurally impossible outside agentTurn.
pub fn validate_target_payload(
    target: SessionTarget,
    payload: &Payload,
) -> Result<(), JobValidationError> {
    match (target, payload) {
        (SessionTarget::Main, Payload::SystemEvent { .. }) => Ok(()),
        (SessionTarget::Isolated, Payload::AgentTurn { .. }) => Ok(()),
        (SessionTarget::Main, _) => Err(JobValidationError::MainRequiresSystemEvent),
        (SessionTarget::Isolated, _) => Err(JobValidationError::IsolatedRequiresAgentTurn),
    }
}

/// Parse an `at` instant, requiring an explicit UTC offset.
pub fn parse_at_instant(at: &str) -> Result<DateTime<Utc>, JobValidationError> {
    let trimmed = at.trim();
    if trimmed.is_empty() {
        return Err(JobValidationError::MissingOffset);
    }
    static OFFSET_RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let offset_re =
        OFFSET_RE.get_or_init(|| regex::Regex::new(r"(Z|[+-]\d{2}:\d{2})$").unwrap());
    if !offset_re.is_match(trimmed) {
        return Err(JobValidationError::MissingOffset);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| JobValidationError::BadInstant(e.to_string()))
}

/// Allow-list for every-minute expressions: "true"/"1" accepts the
/// canonical `* * * * *`; otherwise a comma-separated list of exact
/// expressions.
fn allowlist_expressions(raw: &str) -> Vec<String> {
    let trimmed = raw.trim().to_lowercase();
    if trimmed == "true" || trimmed == "1" {
        return vec!["* * * * *".to_owned()];
    }
    raw.split(',')
        .map(|s| cron::normalize_expr(s))
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn validate_schedule(
    schedule: &Schedule,
    config: &SchedulerConfig,
) -> Result<(), JobValidationError> {
    match schedule {
        Schedule::At { at } => {
            parse_at_instant(at)?;
            Ok(())
        }
        Schedule::Every { every_ms } => {
            if *every_ms < 60_000 {
                return Err(JobValidationError::PeriodTooShort);
            }
            Ok(())
        }
        Schedule::Cron { expr, .. } => {
            cron::validate_expr(expr).map_err(JobValidationError::BadCron)?;
            if cron::runs_every_minute(expr) {
                let allowed = allowlist_expressions(&config.cron_allow_every_minute);
                if !allowed.contains(&cron::normalize_expr(expr)) {
                    return Err(JobValidationError::EveryMinuteNotAllowed);
                }
            }
            Ok(())
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Execution hook
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Delivers a fired job's payload. The engine records the outcome;
/// delivery is at-least-once and idempotency sits with the payload
/// consumer.
#[async_trait::async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &Job) -> Result<(), String>;
}

/// Logs and discards payloads. Used in tests and as a safe default.
pub struct NullExecutor;

#[async_trait::async_trait]
impl JobExecutor for NullExecutor {
    async fn execute(&self, job: &Job) -> Result<(), String> {
        tracing::info!(job_id = %job.id, "job fired (null executor)");
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JobEngine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct JobEngine {
    dir: PathBuf,
    jobs: RwLock<Vec<Job>>,
    config: SchedulerConfig,
    executor: Arc<dyn JobExecutor>,
}

impl JobEngine {
    /// Open the canonical store, migrating any legacy layout first.
    pub fn open(
        data_dir: &Path,
        config: SchedulerConfig,
        executor: Arc<dyn JobExecutor>,
        meta: &MetaStore,
    ) -> Result<Self, JobValidationError> {
        let dir = data_dir.join("jobs");
        std::fs::create_dir_all(dir.join("runs")).map_err(|e| JobValidationError::Store(e.to_string()))?;

        if !meta.get_bool(MIGRATION_FLAG) {
            migrate_legacy(data_dir, &dir);
            let _ = meta.set(MIGRATION_FLAG, json!(true));
        }

        let jobs = load_jobs(&dir.join("jobs.json"));
        tracing::info!(count = jobs.len(), "loaded jobs from disk");
        Ok(Self {
            dir,
            jobs: RwLock::new(jobs),
            config,
            executor,
        })
    }

    fn persist(&self) -> Result<(), JobValidationError> {
        let json = {
            let jobs = self.jobs.read();
            serde_json::to_string_pretty(&*jobs).map_err(|e| JobValidationError::Store(e.to_string()))?
        };
        std::fs::write(self.dir.join("jobs.json"), json)
            .map_err(|e| JobValidationError::Store(e.to_string()))
    }

    fn run_file(&self, job_id: &str) -> PathBuf {
        self.dir.join("runs").join(format!("{job_id}.jsonl"))
    }

    pub fn all_jobs(&self) -> Vec<Job> {
        self.jobs.read().clone()
    }

    pub fn get(&self, caller_id: &str, job_id: &str) -> Option<Job> {
        self.jobs
            .read()
            .iter()
            .find(|j| j.id == job_id && j.owner_id == caller_id)
            .cloned()
    }

    fn count_created_today(&self, caller_id: &str) -> u32 {
        let today = Utc::now().date_naive();
        self.jobs
            .read()
            .iter()
            .filter(|j| j.owner_id == caller_id && j.created_at.date_naive() == today)
            .count() as u32
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Add a new job. Enforces the daily per-caller creation cap.
    /// Returns `{"jobId": ..., "job": {...}}`.
    pub fn add(&self, caller_id: &str, spec: JobSpec) -> Result<JsonObject, JobValidationError> {
        validate_target_payload(spec.session_target, &spec.payload)?;
        validate_schedule(&spec.schedule, &self.config)?;

        let current = self.count_created_today(caller_id);
        let limit = self.config.jobs_per_caller_per_day;
        if current >= limit {
            return Err(JobValidationError::DailyCapReached { limit, current });
        }

        let job = Job {
            id: Uuid::new_v4().to_string(),
            owner_id: caller_id.to_owned(),
            schedule: spec.schedule,
            session_target: spec.session_target,
            payload: spec.payload,
            wake_mode: spec.wake_mode,
            label: spec.label,
            created_at: Utc::now(),
        };
        self.jobs.write().push(job.clone());
        self.persist()?;
        tracing::info!(job_id = %job.id, owner = caller_id, "job added");

        let mut out = JsonObject::new();
        out.insert("jobId".into(), json!(job.id));
        out.insert("job".into(), serde_json::to_value(&job).unwrap_or_default());
        Ok(out)
    }

    /// Update an existing job. Only provided fields change; the patched
    /// combination is re-validated.
    pub fn update(
        &self,
        caller_id: &str,
        job_id: &str,
        patch: JobPatch,
    ) -> Result<JsonObject, JobValidationError> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id && j.owner_id == caller_id)
            .ok_or(JobValidationError::NotFound)?;

        let target = patch.session_target.unwrap_or(job.session_target);
        let payload = patch.payload.clone().unwrap_or_else(|| job.payload.clone());
        validate_target_payload(target, &payload)?;
        if let Some(schedule) = &patch.schedule {
            validate_schedule(schedule, &self.config)?;
        }

        if let Some(schedule) = patch.schedule {
            job.schedule = schedule;
        }
        job.session_target = target;
        job.payload = payload;
        if let Some(wake_mode) = patch.wake_mode {
            job.wake_mode = wake_mode;
        }
        if let Some(label) = patch.label {
            job.label = Some(label);
        }
        let updated = job.clone();
        drop(jobs);
        self.persist()?;

        let mut out = JsonObject::new();
        out.insert("job".into(), serde_json::to_value(&updated).unwrap_or_default());
        Ok(out)
    }

    /// Remove a job. Returns `{"success": true}`.
    pub fn remove(&self, caller_id: &str, job_id: &str) -> Result<JsonObject, JobValidationError> {
        {
            let mut jobs = self.jobs.write();
            let before = jobs.len();
            jobs.retain(|j| !(j.id == job_id && j.owner_id == caller_id));
            if jobs.len() == before {
                return Err(JobValidationError::NotFound);
            }
        }
        self.persist()?;
        let mut out = JsonObject::new();
        out.insert("success".into(), json!(true));
        Ok(out)
    }

    /// List the caller's jobs. Returns `{"jobs": [...]}`.
    pub fn list(&self, caller_id: &str) -> Result<JsonObject, JobValidationError> {
        let jobs: Vec<Job> = self
            .jobs
            .read()
            .iter()
            .filter(|j| j.owner_id == caller_id)
            .cloned()
            .collect();
        let mut out = JsonObject::new();
        out.insert("jobs".into(), serde_json::to_value(jobs).unwrap_or_default());
        Ok(out)
    }

    /// Run a job immediately and append a run record.
    /// Returns `{"success": true, "run": {...}}`.
    pub async fn run_now(
        &self,
        caller_id: &str,
        job_id: &str,
    ) -> Result<JsonObject, JobValidationError> {
        let job = self.get(caller_id, job_id).ok_or(JobValidationError::NotFound)?;
        let run = self.execute_and_record(&job).await;
        let mut out = JsonObject::new();
        out.insert("success".into(), json!(true));
        out.insert("run".into(), serde_json::to_value(&run).unwrap_or_default());
        Ok(out)
    }

    /// Run history for a job, newest last. Returns `{"runs": [...]}`.
    pub fn runs(
        &self,
        caller_id: &str,
        job_id: &str,
        limit: usize,
    ) -> Result<JsonObject, JobValidationError> {
        if self.get(caller_id, job_id).is_none() {
            return Err(JobValidationError::NotFound);
        }
        let runs = self.load_runs(job_id, limit);
        let mut out = JsonObject::new();
        out.insert("runs".into(), serde_json::to_value(runs).unwrap_or_default());
        Ok(out)
    }

    // ── Run log ──────────────────────────────────────────────────────

    pub fn load_runs(&self, job_id: &str, limit: usize) -> Vec<JobRun> {
        let path = self.run_file(job_id);
        let Ok(raw) = std::fs::read_to_string(&path) else {
            return Vec::new();
        };
        let mut runs: Vec<JobRun> = raw
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect();
        if limit > 0 && runs.len() > limit {
            runs.drain(..runs.len() - limit);
        }
        runs
    }

    pub fn last_run_time(&self, job_id: &str) -> Option<DateTime<Utc>> {
        self.load_runs(job_id, 1).last().map(|r| r.timestamp)
    }

    pub fn append_run(&self, run: &JobRun) {
        use std::io::Write;
        let path = self.run_file(&run.job_id);
        let Ok(mut line) = serde_json::to_string(run) else {
            return;
        };
        line.push('\n');
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = result {
            tracing::warn!(job_id = %run.job_id, error = %e, "failed to append run record");
        }
    }

    /// Execute a job through the payload executor and record the run.
    pub async fn execute_and_record(&self, job: &Job) -> JobRun {
        let run = match self.executor.execute(job).await {
            Ok(()) => JobRun {
                job_id: job.id.clone(),
                timestamp: Utc::now(),
                status: JobRunStatus::Ok,
                error: None,
            },
            Err(e) => {
                tracing::warn!(job_id = %job.id, error = %e, "job execution failed");
                JobRun {
                    job_id: job.id.clone(),
                    timestamp: Utc::now(),
                    status: JobRunStatus::Error,
                    error: Some(e),
                }
            }
        };
        self.append_run(&run);
        run
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Loading / migration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn load_jobs(path: &Path) -> Vec<Job> {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "jobs.json unreadable, starting empty");
        Vec::new()
    })
}

/// Move the legacy `<data>/cron/` layout into the canonical store.
fn migrate_legacy(data_dir: &Path, dir: &Path) {
    let legacy = data_dir.join("cron");
    let legacy_jobs = legacy.join("jobs.json");
    if legacy_jobs.exists() && !dir.join("jobs.json").exists() {
        if let Err(e) = std::fs::rename(&legacy_jobs, dir.join("jobs.json")) {
            tracing::warn!(error = %e, "legacy jobs.json migration failed");
        } else {
            tracing::info!("migrated legacy jobs.json");
        }
    }
    let legacy_runs = legacy.join("runs");
    if legacy_runs.is_dir() {
        if let Ok(entries) = std::fs::read_dir(&legacy_runs) {
            for entry in entries.flatten() {
                let target = dir.join("runs").join(entry.file_name());
                if !target.exists() {
                    let _ = std::fs::rename(entry.path(), target);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine(dir: &Path) -> JobEngine {
        engine_with_config(dir, SchedulerConfig::default())
    }

    fn engine_with_config(dir: &Path, config: SchedulerConfig) -> JobEngine {
        let meta = MetaStore::new(dir).unwrap();
        JobEngine::open(dir, config, Arc::new(NullExecutor), &meta).unwrap()
    }

    fn main_spec(schedule: Schedule) -> JobSpec {
        JobSpec {
            schedule,
            session_target: SessionTarget::Main,
            payload: Payload::SystemEvent { text: "ping".into() },
            wake_mode: Default::default(),
            label: None,
        }
    }

    fn every(ms: u64) -> Schedule {
        Schedule::Every { every_ms: ms }
    }

    // ── Validation rules ────────────────────────────────────────────

    #[test]
    fn target_payload_pairing_enforced() {
        let system = Payload::SystemEvent { text: "x".into() };
        let agent = Payload::AgentTurn { message: "y".into(), delivery: None };
        assert!(validate_target_payload(SessionTarget::Main, &system).is_ok());
        assert!(validate_target_payload(SessionTarget::Isolated, &agent).is_ok());
        assert_eq!(
            validate_target_payload(SessionTarget::Main, &agent),
            Err(JobValidationError::MainRequiresSystemEvent)
        );
        assert_eq!(
            validate_target_payload(SessionTarget::Isolated, &system),
            Err(JobValidationError::IsolatedRequiresAgentTurn)
        );
    }

    #[test]
    fn every_boundary_at_one_minute() {
        let cfg = SchedulerConfig::default();
        assert!(validate_schedule(&every(60_000), &cfg).is_ok());
        assert_eq!(
            validate_schedule(&every(59_999), &cfg),
            Err(JobValidationError::PeriodTooShort)
        );
    }

    #[test]
    fn at_requires_explicit_offset() {
        let cfg = SchedulerConfig::default();
        let ok_z = Schedule::At { at: "2026-03-01T09:00:00Z".into() };
        let ok_offset = Schedule::At { at: "2026-03-01T09:00:00+02:00".into() };
        let naive = Schedule::At { at: "2026-03-01T09:00:00".into() };
        assert!(validate_schedule(&ok_z, &cfg).is_ok());
        assert!(validate_schedule(&ok_offset, &cfg).is_ok());
        assert_eq!(
            validate_schedule(&naive, &cfg),
            Err(JobValidationError::MissingOffset)
        );
    }

    #[test]
    fn at_garbage_with_offset_shape_is_bad_instant() {
        assert!(matches!(
            parse_at_instant("not-a-date+01:00"),
            Err(JobValidationError::BadInstant(_))
        ));
    }

    #[test]
    fn every_minute_cron_rejected_by_default() {
        let cfg = SchedulerConfig::default();
        let s = Schedule::Cron { expr: "* * * * *".into(), tz: "UTC".into() };
        assert_eq!(
            validate_schedule(&s, &cfg),
            Err(JobValidationError::EveryMinuteNotAllowed)
        );
    }

    #[test]
    fn every_minute_cron_allowed_by_flag() {
        let cfg = SchedulerConfig {
            cron_allow_every_minute: "true".into(),
            ..Default::default()
        };
        let s = Schedule::Cron { expr: "* * * * *".into(), tz: "UTC".into() };
        assert!(validate_schedule(&s, &cfg).is_ok());
    }

    #[test]
    fn every_minute_cron_allowed_by_exact_listing() {
        let cfg = SchedulerConfig {
            cron_allow_every_minute: "* * * * *, * 1 * * *".into(),
            ..Default::default()
        };
        let s = Schedule::Cron { expr: "*  * * * *".into(), tz: "UTC".into() };
        assert!(validate_schedule(&s, &cfg).is_ok());
    }

    #[test]
    fn malformed_cron_is_rejected() {
        let cfg = SchedulerConfig::default();
        let s = Schedule::Cron { expr: "61 * * * *".into(), tz: "UTC".into() };
        assert!(matches!(
            validate_schedule(&s, &cfg),
            Err(JobValidationError::BadCron(_))
        ));
    }

    #[test]
    fn validation_survives_serialization_roundtrip() {
        let cfg = SchedulerConfig::default();
        let spec = main_spec(every(90_000));
        validate_target_payload(spec.session_target, &spec.payload).unwrap();
        validate_schedule(&spec.schedule, &cfg).unwrap();
        let json = serde_json::to_string(&spec).unwrap();
        let back: JobSpec = serde_json::from_str(&json).unwrap();
        validate_target_payload(back.session_target, &back.payload).unwrap();
        validate_schedule(&back.schedule, &cfg).unwrap();
    }

    // ── Engine operations ───────────────────────────────────────────

    #[test]
    fn add_then_list_round_trips_normalized_fields() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let added = engine.add("7", main_spec(every(120_000))).unwrap();
        let job_id = added["jobId"].as_str().unwrap().to_owned();

        let listed = engine.list("7").unwrap();
        let jobs = listed["jobs"].as_array().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0]["id"], json!(job_id));
        assert_eq!(jobs[0]["schedule"], json!({"kind": "every", "everyMs": 120000}));
        assert_eq!(jobs[0]["sessionTarget"], "main");
        assert_eq!(jobs[0]["payload"], json!({"kind": "systemEvent", "text": "ping"}));
        assert_eq!(jobs[0]["wakeMode"], "next-heartbeat");
    }

    #[test]
    fn list_is_scoped_to_caller() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine.add("7", main_spec(every(60_000))).unwrap();
        engine.add("8", main_spec(every(60_000))).unwrap();
        assert_eq!(engine.list("7").unwrap()["jobs"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn add_rejects_invalid_without_writing_state() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let spec = main_spec(Schedule::Cron { expr: "* * * * *".into(), tz: "UTC".into() });
        assert_eq!(
            engine.add("7", spec).unwrap_err(),
            JobValidationError::EveryMinuteNotAllowed
        );
        assert!(engine.list("7").unwrap()["jobs"].as_array().unwrap().is_empty());
    }

    #[test]
    fn daily_cap_twentieth_succeeds_twenty_first_fails() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        for _ in 0..20 {
            engine.add("7", main_spec(every(60_000))).unwrap();
        }
        let err = engine.add("7", main_spec(every(60_000))).unwrap_err();
        assert_eq!(err, JobValidationError::DailyCapReached { limit: 20, current: 20 });
        // Other callers are unaffected.
        assert!(engine.add("8", main_spec(every(60_000))).is_ok());
    }

    #[test]
    fn update_patches_fields_and_revalidates() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let added = engine.add("7", main_spec(every(60_000))).unwrap();
        let job_id = added["jobId"].as_str().unwrap();

        let updated = engine
            .update(
                "7",
                job_id,
                JobPatch {
                    label: Some("water the plants".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated["job"]["label"], "water the plants");

        // Patching to a mismatched target/payload pair fails.
        let err = engine
            .update(
                "7",
                job_id,
                JobPatch {
                    session_target: Some(SessionTarget::Isolated),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err, JobValidationError::IsolatedRequiresAgentTurn);
    }

    #[test]
    fn update_rejects_foreign_job() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let added = engine.add("7", main_spec(every(60_000))).unwrap();
        let job_id = added["jobId"].as_str().unwrap();
        assert_eq!(
            engine.update("8", job_id, JobPatch::default()).unwrap_err(),
            JobValidationError::NotFound
        );
    }

    #[test]
    fn remove_deletes_and_errors_on_missing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let added = engine.add("7", main_spec(every(60_000))).unwrap();
        let job_id = added["jobId"].as_str().unwrap();
        assert_eq!(engine.remove("7", job_id).unwrap()["success"], true);
        assert_eq!(engine.remove("7", job_id).unwrap_err(), JobValidationError::NotFound);
    }

    #[tokio::test]
    async fn run_now_appends_a_record() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let added = engine.add("7", main_spec(every(60_000))).unwrap();
        let job_id = added["jobId"].as_str().unwrap();

        let out = engine.run_now("7", job_id).await.unwrap();
        assert_eq!(out["success"], true);
        assert_eq!(out["run"]["status"], "ok");

        let runs = engine.runs("7", job_id, 100).unwrap();
        assert_eq!(runs["runs"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn runs_limit_returns_newest() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let added = engine.add("7", main_spec(every(60_000))).unwrap();
        let job_id = added["jobId"].as_str().unwrap().to_owned();
        for i in 0..5 {
            engine.append_run(&JobRun {
                job_id: job_id.clone(),
                timestamp: Utc::now() + chrono::Duration::seconds(i),
                status: JobRunStatus::Ok,
                error: None,
            });
        }
        let out = engine.runs("7", &job_id, 2).unwrap();
        assert_eq!(out["runs"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn jobs_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let engine = engine(dir.path());
            engine.add("7", main_spec(every(60_000))).unwrap();
        }
        let reopened = engine(dir.path());
        assert_eq!(reopened.all_jobs().len(), 1);
    }

    #[test]
    fn legacy_layout_migrates_once() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("cron");
        std::fs::create_dir_all(legacy.join("runs")).unwrap();
        let legacy_job = Job {
            id: "legacy-1".into(),
            owner_id: "7".into(),
            schedule: every(60_000),
            session_target: SessionTarget::Main,
            payload: Payload::SystemEvent { text: "old".into() },
            wake_mode: Default::default(),
            label: None,
            created_at: Utc::now(),
        };
        std::fs::write(
            legacy.join("jobs.json"),
            serde_json::to_string(&vec![&legacy_job]).unwrap(),
        )
        .unwrap();
        std::fs::write(legacy.join("runs").join("legacy-1.jsonl"), "").unwrap();

        let engine = engine(dir.path());
        assert_eq!(engine.all_jobs().len(), 1);
        assert_eq!(engine.all_jobs()[0].id, "legacy-1");
        assert!(dir.path().join("jobs/jobs.json").exists());

        // The meta flag prevents a second migration pass.
        let meta = MetaStore::new(dir.path()).unwrap();
        assert!(meta.get_bool(MIGRATION_FLAG));
    }
}
