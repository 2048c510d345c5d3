//! JSON metadata key/value store.
//!
//! Small process-wide facts: migration flags, counters, preferences.
//! The whole map is rewritten on every set; values are arbitrary JSON.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde_json::{Map, Value};

use hearth_domain::error::{Error, Result};

pub struct MetaStore {
    path: PathBuf,
    inner: RwLock<Map<String, Value>>,
}

impl MetaStore {
    pub fn new(base_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_dir)?;
        let path = base_dir.join("meta.json");
        let inner = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "meta store unreadable, starting empty");
                Map::new()
            })
        } else {
            Map::new()
        };
        Ok(Self {
            path,
            inner: RwLock::new(inner),
        })
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        {
            let mut map = self.inner.write();
            map.insert(key.to_owned(), value);
        }
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let json = {
            let map = self.inner.read();
            serde_json::to_string_pretty(&*map)?
        };
        std::fs::write(&self.path, json).map_err(|e| Error::Store(e.to_string()))
    }
}
