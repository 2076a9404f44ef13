//! Session persistence
//!
//! The file store keeps one JSON document keyed by session id and replaces
//! it atomically (write to a temp file in the same directory, then rename).

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::session::SessionRecord;

/// Backing storage for sessions
pub trait SessionStore: Send + Sync + Debug {
    /// Every stored session
    ///
    /// # Errors
    /// Returns error if storage cannot be read.
    fn load_all(&self) -> Result<Vec<SessionRecord>, StoreError>;

    /// Replace the stored set
    ///
    /// # Errors
    /// Returns error if storage cannot be written.
    fn save_all(&self, sessions: &[SessionRecord]) -> Result<(), StoreError>;

    /// Insert or replace one session
    ///
    /// # Errors
    /// Returns error if storage cannot be written.
    fn upsert(&self, session: &SessionRecord) -> Result<(), StoreError>;

    /// Drop one session; unknown ids are ignored
    ///
    /// # Errors
    /// Returns error if storage cannot be written.
    fn remove(&self, session_id: &str) -> Result<(), StoreError>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<BTreeMap<String, SessionRecord>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn load_all(&self) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(self.sessions.lock().values().cloned().collect())
    }

    fn save_all(&self, sessions: &[SessionRecord]) -> Result<(), StoreError> {
        let mut map = self.sessions.lock();
        map.clear();
        map.extend(sessions.iter().map(|s| (s.session_id.clone(), s.clone())));
        Ok(())
    }

    fn upsert(&self, session: &SessionRecord) -> Result<(), StoreError> {
        self.sessions
            .lock()
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    fn remove(&self, session_id: &str) -> Result<(), StoreError> {
        self.sessions.lock().remove(session_id);
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    #[serde(default)]
    sessions: BTreeMap<String, SessionRecord>,
}

/// JSON file store
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<SessionFile, StoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SessionFile::default()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if text.trim().is_empty() {
            return Ok(SessionFile::default());
        }
        serde_json::from_str(&text).map_err(|source| StoreError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    fn write(&self, file: &SessionFile) -> Result<(), StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        let body = serde_json::to_vec_pretty(file)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(&body).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

impl SessionStore for JsonFileStore {
    fn load_all(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let _guard = self.lock.lock();
        Ok(self.read()?.sessions.into_values().collect())
    }

    fn save_all(&self, sessions: &[SessionRecord]) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let file = SessionFile {
            sessions: sessions
                .iter()
                .map(|s| (s.session_id.clone(), s.clone()))
                .collect(),
        };
        self.write(&file)
    }

    fn upsert(&self, session: &SessionRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut file = self.read()?;
        file.sessions
            .insert(session.session_id.clone(), session.clone());
        self.write(&file)
    }

    fn remove(&self, session_id: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut file = self.read()?;
        if file.sessions.remove(session_id).is_some() {
            self.write(&file)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenSigner;
    use chrono::{Duration, Utc};

    fn record(id: &str) -> SessionRecord {
        let now = Utc::now();
        let token = TokenSigner::new("k")
            .unwrap()
            .sign(format!("snap-mcp-{id}"), id, now, now + Duration::minutes(30), vec![])
            .unwrap();
        SessionRecord {
            session_id: id.to_string(),
            user_id: "u".to_string(),
            token,
            display_token: id.to_uppercase(),
            created_at: now,
            connected: false,
            connected_at: None,
            last_activity: None,
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("sessions.json"));
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn upsert_remove_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sessions.json");
        let store = JsonFileStore::new(&path);
        store.upsert(&record("a")).unwrap();
        store.upsert(&record("b")).unwrap();
        store.remove("a").unwrap();
        store.remove("missing").unwrap();

        let reopened = JsonFileStore::new(&path);
        let ids: Vec<String> = reopened
            .load_all()
            .unwrap()
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(ids, vec!["b".to_string()]);
    }

    #[test]
    fn malformed_file_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = JsonFileStore::new(&path).load_all().unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
    }

    #[test]
    fn memory_store_save_all_replaces() {
        let store = MemoryStore::new();
        store.upsert(&record("a")).unwrap();
        store.save_all(&[record("b"), record("c")]).unwrap();
        assert_eq!(store.load_all().unwrap().len(), 2);
    }
}
