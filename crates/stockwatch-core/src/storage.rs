//! Persistent key-value storage for watch-list state.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;
use thiserror::Error;

/// Stored local watch-list.
pub const FAVORITES_KEY: &str = "favorite_stocks";
/// One-time migration flag.
pub const MIGRATION_COMPLETED_KEY: &str = "favorites_migration_completed";
/// Result of the most recent sync.
pub const LAST_SYNC_KEY: &str = "favorites_last_sync";
/// Local entries kept aside instead of being overwritten: uploads that failed
/// during migration and stored entries that could not be read.
pub const PREMIGRATION_BACKUP_KEY: &str = "favorite_stocks_premigration";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access store file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("store file '{path}' is not a JSON object: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// JSON key-value store. Implementations must be safe to share across tasks.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Appends `entries` to the array under [`PREMIGRATION_BACKUP_KEY`], skipping
/// entries already backed up. A non-array value found there is kept as the
/// first element.
pub(crate) fn append_backup(
    store: &dyn KeyValueStore,
    entries: impl IntoIterator<Item = Value>,
) -> Result<(), StoreError> {
    let mut backup = match store.get(PREMIGRATION_BACKUP_KEY)? {
        Some(Value::Array(existing)) => existing,
        Some(other) => vec![other],
        None => Vec::new(),
    };
    let before = backup.len();
    for entry in entries {
        if !backup.contains(&entry) {
            backup.push(entry);
        }
    }
    if backup.len() == before {
        return Ok(());
    }
    store.set(PREMIGRATION_BACKUP_KEY, Value::Array(backup))
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .entries
            .lock()
            .expect("memory store lock is not poisoned")
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries
            .lock()
            .expect("memory store lock is not poisoned")
            .insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .expect("memory store lock is not poisoned")
            .remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object on disk.
///
/// Every write rewrites the document through a sibling temp file and a rename.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<BTreeMap<String, Value>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn write_document(&self, document: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        let io_error = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let serialized = serde_json::to_string_pretty(document).map_err(|source| {
            StoreError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, serialized).map_err(io_error)?;
        fs::rename(&temp_path, &self.path).map_err(io_error)
    }

    fn update(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, Value>),
    ) -> Result<(), StoreError> {
        let _guard = self.lock.lock().expect("file store lock is not poisoned");
        let mut document = self.read_document()?;
        apply(&mut document);
        self.write_document(&document)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let _guard = self.lock.lock().expect("file store lock is not poisoned");
        Ok(self.read_document()?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.update(|document| {
            document.insert(key.to_owned(), value);
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update(|document| {
            document.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();

        store.set(FAVORITES_KEY, json!([])).expect("set");
        assert_eq!(store.get(FAVORITES_KEY).expect("get"), Some(json!([])));

        store.remove(FAVORITES_KEY).expect("remove");
        assert_eq!(store.get(FAVORITES_KEY).expect("get"), None);
    }

    #[test]
    fn backup_appends_without_duplicates() {
        let store = MemoryStore::new();
        store
            .set(PREMIGRATION_BACKUP_KEY, json!({"legacy": true}))
            .expect("set");

        append_backup(&store, vec![json!({"symbol": "AAA"})]).expect("first append");
        append_backup(&store, vec![json!({"symbol": "AAA"})]).expect("second append");

        assert_eq!(
            store.get(PREMIGRATION_BACKUP_KEY).expect("get"),
            Some(json!([{"legacy": true}, {"symbol": "AAA"}]))
        );
    }

    #[test]
    fn file_store_persists_between_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state").join("store.json");

        JsonFileStore::new(&path)
            .set(MIGRATION_COMPLETED_KEY, json!(true))
            .expect("set");

        let reopened = JsonFileStore::new(&path);
        assert_eq!(
            reopened.get(MIGRATION_COMPLETED_KEY).expect("get"),
            Some(json!(true))
        );
        assert_eq!(reopened.get(LAST_SYNC_KEY).expect("get"), None);
    }

    #[test]
    fn file_store_missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path().join("absent.json"));

        assert_eq!(store.get(FAVORITES_KEY).expect("get"), None);
    }

    #[test]
    fn file_store_reports_corrupt_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        fs::write(&path, "not json").expect("write");

        let error = JsonFileStore::new(&path)
            .get(FAVORITES_KEY)
            .expect_err("must fail");

        assert!(matches!(error, StoreError::Corrupt { .. }));
    }
}
