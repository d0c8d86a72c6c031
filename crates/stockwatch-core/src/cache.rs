//! In-memory caching for service responses.
//!
//! Entries are keyed by [`RequestDescriptor::cache_key`](crate::RequestDescriptor::cache_key)
//! and expire according to a per-endpoint [`CachePolicy`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::time::Instant;

use crate::telemetry::{emit, NoopTelemetry, TelemetrySink};

const MINUTE: Duration = Duration::from_secs(60);

/// Endpoint-specific freshness table, matched on the key's path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    rules: Vec<(String, Duration)>,
    default_ttl: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            rules: vec![
                ("/favorites".to_owned(), 5 * MINUTE),
                ("/market_cap".to_owned(), 30 * MINUTE),
                ("/turnover".to_owned(), 60 * MINUTE),
                ("/search".to_owned(), 10 * MINUTE),
                ("/hot".to_owned(), 15 * MINUTE),
                ("/stable_shareholders".to_owned(), 7 * 24 * 60 * MINUTE),
            ],
            default_ttl: 5 * MINUTE,
        }
    }
}

impl CachePolicy {
    /// Policy with no endpoint rules.
    pub fn uniform(ttl: Duration) -> Self {
        Self {
            rules: Vec::new(),
            default_ttl: ttl,
        }
    }

    /// Adds or replaces the TTL for one endpoint path.
    pub fn with_rule(mut self, path: impl Into<String>, ttl: Duration) -> Self {
        let path = path.into();
        self.rules.retain(|(existing, _)| existing != &path);
        self.rules.push((path, ttl));
        self
    }

    pub fn ttl_for(&self, key: &str) -> Duration {
        let path = key_path(key);
        self.rules
            .iter()
            .filter(|(prefix, _)| path_matches(path, prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, ttl)| *ttl)
            .unwrap_or(self.default_ttl)
    }
}

fn key_path(key: &str) -> &str {
    key.split_once('?').map_or(key, |(path, _)| path)
}

fn path_matches(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Hit/miss counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Fraction of lookups served from cache; `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    body: String,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) > self.ttl
    }
}

#[derive(Debug, Default)]
struct CacheInner {
    map: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

impl CacheInner {
    /// Returns the live body and its age, evicting the entry if it expired.
    fn lookup(&mut self, key: &str, now: Instant) -> Option<(String, Duration)> {
        let expired = self.map.get(key)?.is_expired(now);
        if expired {
            self.map.remove(key);
            return None;
        }
        self.map
            .get(key)
            .map(|entry| (entry.body.clone(), now.duration_since(entry.stored_at)))
    }

    fn sweep(&mut self, now: Instant) {
        self.map.retain(|_, entry| !entry.is_expired(now));
    }
}

/// Thread-safe response cache with per-endpoint TTLs.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<tokio::sync::RwLock<CacheInner>>,
    policy: Arc<CachePolicy>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl CacheStore {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(CacheInner::default())),
            policy: Arc::new(policy),
            telemetry: Arc::new(NoopTelemetry),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Live value for `key`. Counts a hit or miss and reports `cache_hit_rate`.
    pub async fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let found = {
            let mut store = self.inner.write().await;
            let found = store.lookup(key, now);
            if found.is_some() {
                store.hits += 1;
            } else {
                store.misses += 1;
            }
            found
        };

        emit(
            self.telemetry.as_ref(),
            "cache_hit_rate",
            json!({
                "key": key,
                "hit": found.is_some(),
                "age_ms": found.as_ref().map(|(_, age)| age.as_millis() as u64),
            }),
        );

        found.map(|(body, _)| body)
    }

    /// Like [`get`](Self::get) without touching statistics or telemetry.
    pub async fn peek(&self, key: &str) -> Option<String> {
        let mut store = self.inner.write().await;
        store.lookup(key, Instant::now()).map(|(body, _)| body)
    }

    /// Stores `body` with the TTL the policy assigns to `key`, then sweeps
    /// every expired entry.
    pub async fn set(&self, key: impl Into<String>, body: impl Into<String>) {
        let key = key.into();
        let ttl = self.policy.ttl_for(&key);
        let now = Instant::now();
        let mut store = self.inner.write().await;
        store.map.insert(
            key,
            CacheEntry {
                body: body.into(),
                stored_at: now,
                ttl,
            },
        );
        store.sweep(now);
    }

    pub async fn invalidate(&self, key: &str) {
        self.inner.write().await.map.remove(key);
    }

    /// Removes the entry for `path` and every parameterised variant of it.
    pub async fn invalidate_prefix(&self, path: &str) {
        let mut store = self.inner.write().await;
        store.map.retain(|key, _| key_path(key) != path);
    }

    pub async fn clear(&self) {
        self.inner.write().await.map.clear();
    }

    /// Number of stored entries, expired ones included until the next sweep.
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> CacheStats {
        let store = self.inner.read().await;
        CacheStats {
            hits: store.hits,
            misses: store.misses,
            entries: store.map.len(),
        }
    }
}
