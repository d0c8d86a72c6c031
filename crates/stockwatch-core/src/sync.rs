//! Reconciles the local watch-list with the server-authoritative one.
//!
//! The first successful reconciliation is a one-time migration that uploads
//! local-only entries; later runs simply adopt the server list.
//!
//! ```text
//! Uninitialized ──(migrated)──────────────► FetchingServer ──► Ready
//!       │
//!       └──► FetchingServer ──► Diffing ──► Uploading ──► Ready
//!                  │ (fetch failed)            ▲
//!                  └──► Ready, local fallback  └── skipped when nothing to upload
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api_error::ApiError;
use crate::cache::CacheStore;
use crate::config::SyncState;
use crate::executor::RequestExecutor;
use crate::request::RequestDescriptor;
use crate::storage::{append_backup, KeyValueStore};
use crate::telemetry::{emit, TelemetrySink};
use crate::watchlist::{WatchListState, FAVORITES_PATH};
use crate::wire::parse_favorites;
use crate::{Provenance, WatchList, WatchListItem};

/// Reconciliation progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Uninitialized,
    FetchingServer,
    Diffing,
    Uploading,
    Ready,
}

/// Outcome counters of one reconciliation, persisted as the last sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub uploaded: usize,
    pub failed: usize,
    pub total: usize,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub fallback_to_local: bool,
}

impl SyncResult {
    fn fallback(error: &ApiError) -> Self {
        Self {
            error: Some(error.to_string()),
            fallback_to_local: true,
            ..Self::default()
        }
    }
}

/// What a caller sees after `sync_favorites`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub favorites: WatchList,
    pub result: SyncResult,
    /// Whether this run performed the one-time migration.
    pub migrated: bool,
}

pub struct SyncReconciler {
    executor: Arc<RequestExecutor>,
    cache: CacheStore,
    watch_list: WatchListState,
    store: Arc<dyn KeyValueStore>,
    telemetry: Arc<dyn TelemetrySink>,
    upload_delay: Duration,
    state: tokio::sync::Mutex<SyncState>,
    phase: Mutex<SyncPhase>,
}

impl SyncReconciler {
    pub fn new(
        executor: Arc<RequestExecutor>,
        cache: CacheStore,
        watch_list: WatchListState,
        store: Arc<dyn KeyValueStore>,
        telemetry: Arc<dyn TelemetrySink>,
        upload_delay: Duration,
        state: SyncState,
    ) -> Self {
        Self {
            executor,
            cache,
            watch_list,
            store,
            telemetry,
            upload_delay,
            state: tokio::sync::Mutex::new(state),
            phase: Mutex::new(SyncPhase::Uninitialized),
        }
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.lock().expect("sync phase lock is not poisoned")
    }

    pub async fn state(&self) -> SyncState {
        self.state.lock().await.clone()
    }

    /// Runs one reconciliation. Never fails: network errors degrade to the
    /// local list with `fallback_to_local` set.
    pub async fn sync(&self) -> SyncOutcome {
        let mut state = self.state.lock().await;
        self.enter(SyncPhase::Uninitialized);

        let outcome = if state.migration_completed {
            self.refresh_from_server().await
        } else {
            self.migrate(&mut state).await
        };

        if let Err(error) = state.record_sync(self.store.as_ref(), outcome.result.clone()) {
            tracing::warn!(%error, "failed to persist sync result");
        }
        self.enter(SyncPhase::Ready);

        emit(
            self.telemetry.as_ref(),
            "favorites_sync",
            json!({
                "uploaded": outcome.result.uploaded,
                "failed": outcome.result.failed,
                "total": outcome.result.total,
                "fallback_to_local": outcome.result.fallback_to_local,
                "migrated": outcome.migrated,
                "count": outcome.favorites.len(),
            }),
        );
        outcome
    }

    async fn refresh_from_server(&self) -> SyncOutcome {
        self.enter(SyncPhase::FetchingServer);
        match self.fetch_server_list().await {
            Ok(server) => {
                self.watch_list.publish(Arc::new(server.clone()));
                SyncOutcome {
                    favorites: server,
                    result: SyncResult::default(),
                    migrated: false,
                }
            }
            Err(error) => self.fall_back(&error),
        }
    }

    async fn migrate(&self, state: &mut SyncState) -> SyncOutcome {
        self.enter(SyncPhase::FetchingServer);
        let local = self.watch_list.current();
        let server = match self.fetch_server_list().await {
            Ok(server) => server,
            Err(error) => return self.fall_back(&error),
        };

        self.enter(SyncPhase::Diffing);
        let need_upload: Vec<WatchListItem> = local
            .missing_from(&server)
            .filter(|item| item.provenance == Provenance::LocalOnly)
            .cloned()
            .collect();
        let total = need_upload.len();

        let mut uploaded = Vec::with_capacity(total);
        let mut failed = Vec::new();
        if !need_upload.is_empty() {
            self.enter(SyncPhase::Uploading);
            for (index, item) in need_upload.into_iter().enumerate() {
                if index > 0 {
                    tokio::time::sleep(self.upload_delay).await;
                }
                let descriptor = RequestDescriptor::post(
                    FAVORITES_PATH,
                    json!({ "stock_code": item.symbol.as_str() }),
                );
                match self.executor.execute(&descriptor).await {
                    Ok(_) => uploaded.push(item.confirmed()),
                    Err(error) => {
                        tracing::warn!(symbol = %item.symbol, %error, "migration upload failed");
                        failed.push(item);
                    }
                }
            }
            self.cache.invalidate(FAVORITES_PATH).await;
        }

        let merged = server.merged_with(uploaded.iter().cloned());
        self.watch_list.publish(Arc::new(merged.clone()));

        if !failed.is_empty() {
            let entries = failed
                .iter()
                .filter_map(|item| serde_json::to_value(item).ok());
            if let Err(error) = append_backup(self.store.as_ref(), entries) {
                tracing::warn!(%error, "failed to back up unsynced favorites");
            }
        }
        if let Err(error) = state.mark_migrated(self.store.as_ref()) {
            tracing::warn!(%error, "failed to persist migration flag");
        }
        tracing::info!(
            uploaded = uploaded.len(),
            failed = failed.len(),
            total,
            "favorites migration finished"
        );

        SyncOutcome {
            favorites: merged,
            result: SyncResult {
                uploaded: uploaded.len(),
                failed: failed.len(),
                total,
                error: None,
                fallback_to_local: false,
            },
            migrated: true,
        }
    }

    fn fall_back(&self, error: &ApiError) -> SyncOutcome {
        tracing::warn!(%error, "server watch-list unavailable, using local data");
        SyncOutcome {
            favorites: self.watch_list.current().as_ref().clone(),
            result: SyncResult::fallback(error),
            migrated: false,
        }
    }

    async fn fetch_server_list(&self) -> Result<WatchList, ApiError> {
        let response = self
            .executor
            .execute(&RequestDescriptor::get(FAVORITES_PATH))
            .await?;
        let list = parse_favorites(&response.body)?;
        self.cache.set(FAVORITES_PATH, response.body).await;
        Ok(list)
    }

    fn enter(&self, phase: SyncPhase) {
        tracing::debug!(?phase, "sync phase");
        *self.phase.lock().expect("sync phase lock is not poisoned") = phase;
    }
}
