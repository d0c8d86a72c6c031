use std::time::Duration;

use serde_json::Value;

use crate::cache::CachePolicy;
use crate::retry::RetryConfig;
use crate::storage::{KeyValueStore, StoreError, LAST_SYNC_KEY, MIGRATION_COMPLETED_KEY};
use crate::sync::SyncResult;

/// Default per-attempt timeout for service calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3_000);
/// Default pause between sequential uploads during migration.
pub const DEFAULT_UPLOAD_DELAY: Duration = Duration::from_millis(200);

/// Client construction options.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub retry: RetryConfig,
    pub upload_delay: Duration,
    pub cache_policy: CachePolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry: RetryConfig::default(),
            upload_delay: DEFAULT_UPLOAD_DELAY,
            cache_policy: CachePolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_upload_delay(mut self, upload_delay: Duration) -> Self {
        self.upload_delay = upload_delay;
        self
    }
}

/// Persisted synchronization state, read once at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    pub migration_completed: bool,
    pub last_sync: Option<SyncResult>,
}

impl SyncState {
    /// Reads the state from `store`. A malformed last-sync record is ignored.
    pub fn load(store: &dyn KeyValueStore) -> Result<Self, StoreError> {
        let migration_completed = match store.get(MIGRATION_COMPLETED_KEY)? {
            Some(Value::Bool(flag)) => flag,
            Some(Value::String(flag)) => flag == "true",
            _ => false,
        };

        let last_sync = match store.get(LAST_SYNC_KEY)? {
            Some(value) => match serde_json::from_value(value) {
                Ok(result) => Some(result),
                Err(error) => {
                    tracing::warn!(%error, "ignoring malformed last sync record");
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            migration_completed,
            last_sync,
        })
    }

    pub fn mark_migrated(&mut self, store: &dyn KeyValueStore) -> Result<(), StoreError> {
        self.migration_completed = true;
        store.set(MIGRATION_COMPLETED_KEY, Value::Bool(true))
    }

    pub fn record_sync(
        &mut self,
        store: &dyn KeyValueStore,
        result: SyncResult,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(&result).unwrap_or(Value::Null);
        self.last_sync = Some(result);
        store.set(LAST_SYNC_KEY, value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn defaults_match_service_contract() {
        let config = ClientConfig::default();

        assert_eq!(config.timeout, Duration::from_millis(3_000));
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.upload_delay, Duration::from_millis(200));
    }

    #[test]
    fn load_reads_flag_and_last_sync() {
        let store = MemoryStore::new();
        store.set(MIGRATION_COMPLETED_KEY, json!("true")).expect("set");
        store
            .set(
                LAST_SYNC_KEY,
                json!({"uploaded": 2, "failed": 1, "total": 3, "error": null, "fallback_to_local": false}),
            )
            .expect("set");

        let state = SyncState::load(&store).expect("load");

        assert!(state.migration_completed);
        assert_eq!(state.last_sync.map(|result| result.uploaded), Some(2));
    }

    #[test]
    fn malformed_last_sync_is_ignored() {
        let store = MemoryStore::new();
        store.set(LAST_SYNC_KEY, json!("garbage")).expect("set");

        let state = SyncState::load(&store).expect("load");

        assert_eq!(state, SyncState::default());
    }

    #[test]
    fn mark_migrated_persists_flag() {
        let store = MemoryStore::new();
        let mut state = SyncState::default();

        state.mark_migrated(&store).expect("persist");

        assert!(SyncState::load(&store).expect("load").migration_completed);
    }
}
