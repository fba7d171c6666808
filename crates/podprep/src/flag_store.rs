//! Persistent flag store.
//!
//! Generic JSON key/value store backed by a single file, written
//! atomically (temp file + rename). The engine uses exactly one key,
//! [`SETUP_COMPLETE_KEY`], plus a timestamp recorded alongside it; the
//! external UI collaborator reads the same key at startup to skip
//! re-provisioning.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The single key this engine writes: setup verified complete.
pub const SETUP_COMPLETE_KEY: &str = "setup_complete";

/// RFC 3339 timestamp of when setup completed.
pub const SETUP_COMPLETED_AT_KEY: &str = "setup_completed_at";

/// File-backed key/value store.
#[derive(Debug)]
pub struct FlagStore {
    path: PathBuf,
    entries: BTreeMap<String, Value>,
}

impl FlagStore {
    /// Default store location.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("podprep")
            .join("flags.json")
    }

    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e),
        };
        Ok(Self { path, entries })
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Is the value under `key` exactly `true`?
    pub fn is_true(&self, key: &str) -> bool {
        matches!(self.get(key), Some(Value::Bool(true)))
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> io::Result<()> {
        self.entries.insert(key.into(), value.into());
        self.persist()
    }

    /// Insert several entries, persisting once after all of them. Either
    /// the whole batch lands on disk or none of it does.
    pub fn set_many<K, V>(&mut self, entries: impl IntoIterator<Item = (K, V)>) -> io::Result<()>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        for (key, value) in entries {
            self.entries.insert(key.into(), value.into());
        }
        self.persist()
    }

    /// Remove a key. Returns whether it was present.
    pub fn delete(&mut self, key: &str) -> io::Result<bool> {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    fn persist(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let contents = serde_json::to_vec_pretty(&self.entries)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;
        debug!("Persisted {} flag(s) to {}", self.entries.len(), self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
