//! The data access façade.
//!
//! [`StockClient`] owns every stateful component (cache, in-flight map,
//! watch-list, sync state). Build one per process, or one per test.

use std::sync::Arc;

use tokio::sync::watch;

use crate::api_error::ApiError;
use crate::cache::{CacheStats, CacheStore};
use crate::coalescer::RequestCoalescer;
use crate::config::{ClientConfig, SyncState};
use crate::executor::RequestExecutor;
use crate::http_client::HttpClient;
use crate::request::RequestDescriptor;
use crate::storage::{KeyValueStore, MemoryStore};
use crate::sync::{SyncOutcome, SyncPhase, SyncReconciler};
use crate::telemetry::{TelemetrySink, TracingTelemetry};
use crate::watchlist::{MutationController, WatchListState, FAVORITES_PATH};
use crate::wire::{parse_favorites, parse_instruments, parse_series};
use crate::{
    AddOutcome, CoreError, Favorites, HistoryPoint, Instrument, Period, Provenance, Symbol,
    UtcDateTime, ValidationError, WatchList,
};

const MARKET_CAP_PATH: &str = "/market_cap";
const TURNOVER_PATH: &str = "/turnover";
const SEARCH_PATH: &str = "/search";
const HOT_PATH: &str = "/hot";

/// Builder for [`StockClient`].
pub struct StockClientBuilder {
    transport: Arc<dyn HttpClient>,
    store: Option<Arc<dyn KeyValueStore>>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
    config: ClientConfig,
    sync_state: Option<SyncState>,
}

impl StockClientBuilder {
    /// Defaults to a [`MemoryStore`].
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to [`TracingTelemetry`].
    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the sync state otherwise loaded from the store.
    pub fn sync_state(mut self, state: SyncState) -> Self {
        self.sync_state = Some(state);
        self
    }

    pub fn build(self) -> Result<StockClient, CoreError> {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>);
        let telemetry = self
            .telemetry
            .unwrap_or_else(|| Arc::new(TracingTelemetry) as Arc<dyn TelemetrySink>);
        let sync_state = match self.sync_state {
            Some(state) => state,
            None => SyncState::load(store.as_ref())?,
        };

        let executor = Arc::new(RequestExecutor::new(
            self.transport,
            self.config.retry.clone(),
            self.config.timeout,
            Arc::clone(&telemetry),
        ));
        let cache =
            CacheStore::new(self.config.cache_policy.clone()).with_telemetry(Arc::clone(&telemetry));
        let watch_list = WatchListState::load(Arc::clone(&store));
        let mutations =
            MutationController::new(watch_list.clone(), Arc::clone(&executor), cache.clone());
        let reconciler = SyncReconciler::new(
            Arc::clone(&executor),
            cache.clone(),
            watch_list.clone(),
            store,
            telemetry,
            self.config.upload_delay,
            sync_state,
        );

        Ok(StockClient {
            executor,
            cache,
            coalescer: RequestCoalescer::new(),
            watch_list,
            mutations,
            reconciler,
        })
    }
}

/// Stock service client: cached reads, coalesced fetches, optimistic
/// watch-list mutations and one-time favorites migration.
pub struct StockClient {
    executor: Arc<RequestExecutor>,
    cache: CacheStore,
    coalescer: RequestCoalescer,
    watch_list: WatchListState,
    mutations: MutationController,
    reconciler: SyncReconciler,
}

impl StockClient {
    pub fn builder(transport: Arc<dyn HttpClient>) -> StockClientBuilder {
        StockClientBuilder {
            transport,
            store: None,
            telemetry: None,
            config: ClientConfig::default(),
            sync_state: None,
        }
    }

    /// Server-authoritative watch-list.
    ///
    /// The first call in a session with no completed migration reconciles
    /// first. When the service is unreachable the local list is returned.
    /// Local additions still awaiting confirmation stay visible.
    pub async fn get_favorites(&self) -> Result<Favorites, CoreError> {
        if !self.reconciler.state().await.migration_completed {
            let outcome = self.reconciler.sync().await;
            return Ok(Favorites::from(&outcome.favorites));
        }

        match self.fetch_cached(RequestDescriptor::get(FAVORITES_PATH)).await {
            Ok(body) => {
                let server = parse_favorites(&body)?;
                let current = self.watch_list.current();
                let pending = current
                    .missing_from(&server)
                    .filter(|item| item.provenance == Provenance::LocalOnly)
                    .cloned();
                let merged = Arc::new(server.merged_with(pending));
                self.watch_list.publish(Arc::clone(&merged));
                Ok(Favorites::from(merged.as_ref()))
            }
            Err(error) => {
                tracing::warn!(%error, "favorites unavailable, serving local list");
                Ok(Favorites::from(self.watch_list.current().as_ref()))
            }
        }
    }

    /// Local watch-list without any network access.
    pub fn current_favorites(&self) -> Arc<WatchList> {
        self.watch_list.current()
    }

    /// Receiver that observes every published watch-list.
    pub fn subscribe_favorites(&self) -> watch::Receiver<Arc<WatchList>> {
        self.watch_list.subscribe()
    }

    pub async fn add_favorite(&self, symbol: &str) -> Result<AddOutcome, CoreError> {
        self.add_favorite_named(symbol, "").await
    }

    pub async fn add_favorite_named(
        &self,
        symbol: &str,
        name: &str,
    ) -> Result<AddOutcome, CoreError> {
        let (symbol, market) = Symbol::parse_with_market(symbol)?;
        Ok(self.mutations.add_item(symbol, name, market).await?)
    }

    pub async fn remove_favorite(&self, symbol: &str) -> Result<(), CoreError> {
        let symbol = Symbol::parse(symbol)?;
        Ok(self.mutations.remove_item(symbol).await?)
    }

    /// Runs the reconciler. Never fails; see [`SyncOutcome::result`].
    pub async fn sync_favorites(&self) -> SyncOutcome {
        self.reconciler.sync().await
    }

    pub fn sync_phase(&self) -> SyncPhase {
        self.reconciler.phase()
    }

    pub async fn sync_state(&self) -> SyncState {
        self.reconciler.state().await
    }

    /// Weekly market capitalisation, oldest first.
    pub async fn get_history(
        &self,
        symbol: &str,
        period: Period,
    ) -> Result<Vec<HistoryPoint>, CoreError> {
        self.series(MARKET_CAP_PATH, symbol, period).await
    }

    /// Weekly turnover, oldest first.
    pub async fn get_turnover(
        &self,
        symbol: &str,
        period: Period,
    ) -> Result<Vec<HistoryPoint>, CoreError> {
        self.series(TURNOVER_PATH, symbol, period).await
    }

    pub async fn search(&self, keyword: &str) -> Result<Vec<Instrument>, CoreError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(ValidationError::EmptyKeyword.into());
        }
        let descriptor = RequestDescriptor::get(SEARCH_PATH).with_param("keyword", keyword);
        let body = self.fetch_cached(descriptor).await?;
        Ok(parse_instruments(&body)?)
    }

    pub async fn hot_list(&self) -> Result<Vec<Instrument>, CoreError> {
        let body = self.fetch_cached(RequestDescriptor::get(HOT_PATH)).await?;
        Ok(parse_instruments(&body)?)
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Number of service calls currently shared by concurrent callers.
    pub fn in_flight_len(&self) -> usize {
        self.coalescer.in_flight_len()
    }

    async fn series(
        &self,
        path: &str,
        symbol: &str,
        period: Period,
    ) -> Result<Vec<HistoryPoint>, CoreError> {
        let symbol = Symbol::parse(symbol)?;
        let descriptor = RequestDescriptor::get(path)
            .with_param("symbol", symbol.as_str())
            .with_param("period", period.as_str());
        let body = self.fetch_cached(descriptor).await?;
        Ok(parse_series(&body, UtcDateTime::now().date())?)
    }

    /// Cache, then in-flight request, then network.
    async fn fetch_cached(&self, descriptor: RequestDescriptor) -> Result<String, ApiError> {
        let key = descriptor.cache_key().to_owned();
        if let Some(body) = self.cache.get(&key).await {
            return Ok(body);
        }

        let cache = self.cache.clone();
        let executor = Arc::clone(&self.executor);
        self.coalescer
            .fetch(&key, move || async move {
                let key = descriptor.cache_key();
                if let Some(body) = cache.peek(key).await {
                    return Ok(body);
                }
                let response = executor.execute(&descriptor).await?;
                cache.set(key, response.body.clone()).await;
                Ok(response.body)
            })
            .await
    }
}
