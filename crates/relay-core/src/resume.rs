use crate::error::Result;
use crate::io::atomic_write;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

type Entries = BTreeMap<String, String>;

/// Durable map from tracker session id to the agent's conversation id.
///
/// The backing file is read on first access and cached for the life of the
/// store. Every mutation rewrites the whole file through [`atomic_write`].
/// An unreadable or corrupt file is treated as empty.
#[derive(Debug)]
pub struct ResumptionStore {
    path: PathBuf,
    cache: Mutex<Option<Entries>>,
}

impl ResumptionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, session_id: &str) -> Option<String> {
        self.with_entries(|entries| entries.get(session_id).cloned())
    }

    /// Record the conversation for a session. If the file cannot be written
    /// the session has no entry afterwards, in memory or on disk.
    pub fn set(&self, session_id: &str, conversation_id: &str) -> Result<()> {
        self.with_entries(|entries| {
            entries.insert(session_id.to_string(), conversation_id.to_string());
            self.persist(entries).inspect_err(|_| {
                entries.remove(session_id);
            })
        })
    }

    /// Remove an entry. Returns whether one existed.
    pub fn delete(&self, session_id: &str) -> Result<bool> {
        self.with_entries(|entries| {
            if entries.remove(session_id).is_none() {
                return Ok(false);
            }
            self.persist(entries)?;
            Ok(true)
        })
    }

    pub fn clear(&self) -> Result<usize> {
        self.with_entries(|entries| {
            let count = entries.len();
            entries.clear();
            self.persist(entries)?;
            Ok(count)
        })
    }

    /// Snapshot of every entry, ordered by session id.
    pub fn list(&self) -> Vec<(String, String)> {
        self.with_entries(|entries| {
            entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
    }

    /// Run `f` on the cached map, loading it from disk on first use.
    fn with_entries<R>(&self, f: impl FnOnce(&mut Entries) -> R) -> R {
        let mut guard = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let entries = guard.get_or_insert_with(|| load(&self.path));
        f(entries)
    }

    fn persist(&self, entries: &Entries) -> Result<()> {
        let data = serde_json::to_vec_pretty(entries)?;
        atomic_write(&self.path, &data)
    }
}

fn load(path: &Path) -> Entries {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Entries::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read resumption file; starting empty");
            return Entries::new();
        }
    };
    match serde_json::from_str(&data) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupt resumption file; starting empty");
            Entries::new()
        }
    }
}
