//! Collapses concurrent identical requests into one in-flight load.
//!
//! The first caller for a key registers a shared future before its loader
//! starts; later callers join it and receive the same result. The map only
//! holds weak handles, and each load owns an [`InFlightGuard`] that removes
//! its entry when the load settles or every caller has gone away.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};

use crate::api_error::ApiError;

type LoadResult = Result<String, ApiError>;
type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

struct InFlightEntry {
    id: u64,
    load: WeakShared<BoxFuture<'static, LoadResult>>,
}

#[derive(Default)]
struct InFlightMap {
    next_id: u64,
    entries: HashMap<String, InFlightEntry>,
}

/// RAII guard removing one in-flight entry on drop.
///
/// Only removes the entry it registered; a newer load for the same key is
/// left alone.
struct InFlightGuard {
    map: Arc<Mutex<InFlightMap>>,
    key: String,
    id: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut map = self.map.lock().expect("in-flight lock is not poisoned");
        if map.entries.get(&self.key).is_some_and(|entry| entry.id == self.id) {
            map.entries.remove(&self.key);
        }
    }
}

/// In-flight request registry keyed by cache key.
#[derive(Clone, Default)]
pub struct RequestCoalescer {
    in_flight: Arc<Mutex<InFlightMap>>,
}

impl std::fmt::Debug for RequestCoalescer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCoalescer")
            .field("in_flight", &self.in_flight_len())
            .finish()
    }
}

impl RequestCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins the in-flight load for `key`, or starts `loader` and shares it.
    pub async fn fetch<F, Fut>(&self, key: &str, loader: F) -> LoadResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LoadResult> + Send + 'static,
    {
        self.join_or_start(key, loader).await
    }

    fn join_or_start<F, Fut>(&self, key: &str, loader: F) -> SharedLoad
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LoadResult> + Send + 'static,
    {
        let mut map = self.in_flight.lock().expect("in-flight lock is not poisoned");

        if let Some(existing) = map.entries.get(key).and_then(|entry| entry.load.upgrade()) {
            tracing::debug!(key, "joining in-flight request");
            return existing;
        }

        map.next_id += 1;
        let id = map.next_id;
        let guard = InFlightGuard {
            map: Arc::clone(&self.in_flight),
            key: key.to_owned(),
            id,
        };
        let pending = loader();
        let load = async move {
            let _guard = guard;
            pending.await
        }
        .boxed()
        .shared();

        if let Some(weak) = load.downgrade() {
            map.entries.insert(key.to_owned(), InFlightEntry { id, load: weak });
        }
        load
    }

    /// Number of loads currently registered.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight
            .lock()
            .expect("in-flight lock is not poisoned")
            .entries
            .len()
    }
}
