//! In-app agenda: per-user events backing the `agenda.*` tools and the
//! proactive reminder loop. One JSON file, rewritten on change.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hearth_domain::error::{Error, Result};

use super::cron::parse_tz;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgendaEvent {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub start_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub all_day: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub notes: Option<String>,
}

/// Parse an ISO date or datetime into UTC. Date-only values become
/// midnight in `tz`; naive datetimes are interpreted in `tz`; values
/// with an explicit offset are converted directly. DST overlaps take
/// the earliest mapping.
pub fn parse_event_time(value: &str, tz_name: &str) -> std::result::Result<DateTime<Utc>, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("empty date/datetime".into());
    }
    let tz = parse_tz(tz_name);

    if value.len() <= 10 {
        let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map_err(|_| format!("invalid date: {value}"))?;
        let naive = date.and_hms_opt(0, 0, 0).unwrap();
        return local_to_utc(&tz, naive).ok_or_else(|| format!("invalid date: {value}"));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return local_to_utc(&tz, naive).ok_or_else(|| format!("invalid datetime: {value}"));
        }
    }
    Err(format!("invalid date/datetime: {value}"))
}

fn local_to_utc(tz: &chrono_tz::Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        chrono::LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        chrono::LocalResult::None => None,
    }
}

pub struct AgendaStore {
    path: PathBuf,
    inner: RwLock<Vec<AgendaEvent>>,
}

impl AgendaStore {
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join("agenda.json");
        let inner = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "agenda.json unreadable, starting empty");
                Vec::new()
            })
        } else {
            Vec::new()
        };
        Ok(Self {
            path,
            inner: RwLock::new(inner),
        })
    }

    fn persist(&self) -> Result<()> {
        let json = {
            let events = self.inner.read();
            serde_json::to_string_pretty(&*events)?
        };
        std::fs::write(&self.path, json).map_err(Error::Io)
    }

    /// Events for a user with `start_at` inside `[start, end)`, sorted.
    pub fn list_range(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<AgendaEvent> {
        let mut events: Vec<AgendaEvent> = self
            .inner
            .read()
            .iter()
            .filter(|e| e.user_id == user_id && e.start_at >= start && e.start_at < end)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.start_at);
        events
    }

    pub fn add(
        &self,
        user_id: &str,
        title: &str,
        start_at: DateTime<Utc>,
        end_at: Option<DateTime<Utc>>,
        all_day: bool,
        notes: Option<String>,
    ) -> Result<AgendaEvent> {
        let event = AgendaEvent {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_owned(),
            title: title.to_owned(),
            start_at,
            end_at,
            all_day,
            notes,
        };
        self.inner.write().push(event.clone());
        self.persist()?;
        Ok(event)
    }

    /// Patch an event in place. Returns the updated event, or None when
    /// the id does not exist for this user.
    pub fn update(
        &self,
        user_id: &str,
        id: &str,
        f: impl FnOnce(&mut AgendaEvent),
    ) -> Result<Option<AgendaEvent>> {
        let updated = {
            let mut events = self.inner.write();
            match events.iter_mut().find(|e| e.id == id && e.user_id == user_id) {
                Some(event) => {
                    f(event);
                    Some(event.clone())
                }
                None => None,
            }
        };
        if updated.is_some() {
            self.persist()?;
        }
        Ok(updated)
    }

    pub fn delete(&self, user_id: &str, id: &str) -> Result<bool> {
        let removed = {
            let mut events = self.inner.write();
            let before = events.len();
            events.retain(|e| !(e.id == id && e.user_id == user_id));
            events.len() != before
        };
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }
}
