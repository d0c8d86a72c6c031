//! Watch-list state and optimistic mutations.
//!
//! The current list is an immutable [`WatchList`] published through a
//! `tokio::sync::watch` channel and mirrored to the key-value store.
//! Mutations publish their local effect first, then confirm with the
//! service; a failed confirmation rolls the local effect back.
//!
//! ```text
//!   add/remove ──► publish new list ──► per-symbol FIFO lock ──► remote call
//!                                                                  │
//!                        ┌─────────────── ok ──────────────────────┤
//!                        ▼                                         ▼ err
//!               invalidate /favorites                  republish pre-mutation list
//! ```

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::sync::watch;

use crate::api_error::{ApiError, ApiErrorKind};
use crate::cache::CacheStore;
use crate::executor::RequestExecutor;
use crate::request::RequestDescriptor;
use crate::storage::{append_backup, KeyValueStore, FAVORITES_KEY};
use crate::{AddOutcome, Market, Provenance, Symbol, WatchList, WatchListItem};

pub(crate) const FAVORITES_PATH: &str = "/favorites";

/// Shared, persisted current watch-list.
#[derive(Clone)]
pub struct WatchListState {
    sender: Arc<watch::Sender<Arc<WatchList>>>,
    store: Arc<dyn KeyValueStore>,
}

impl WatchListState {
    /// Loads the persisted list from `store`.
    ///
    /// Entries that cannot be decoded are skipped and copied to
    /// [`crate::storage::PREMIGRATION_BACKUP_KEY`] before anything can overwrite them; a value
    /// that is not a list at all is backed up whole and the list starts empty.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let initial = match store.get(FAVORITES_KEY) {
            Ok(Some(value)) => decode_stored(store.as_ref(), value),
            Ok(None) => WatchList::empty(),
            Err(error) => {
                tracing::warn!(%error, "failed to read stored watch-list, starting empty");
                WatchList::empty()
            }
        };
        let (sender, _) = watch::channel(Arc::new(initial));
        Self {
            sender: Arc::new(sender),
            store,
        }
    }

    pub fn current(&self) -> Arc<WatchList> {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<WatchList>> {
        self.sender.subscribe()
    }

    /// Swaps in `list` and persists it. Store failures are logged only.
    pub fn publish(&self, list: Arc<WatchList>) {
        let value = serde_json::to_value(list.as_ref()).unwrap_or_else(|_| json!([]));
        self.sender.send_replace(list);
        if let Err(error) = self.store.set(FAVORITES_KEY, value) {
            tracing::warn!(%error, "failed to persist watch-list");
        }
    }
}

fn decode_stored(store: &dyn KeyValueStore, value: Value) -> WatchList {
    let entries = match value {
        Value::Array(entries) => entries,
        other => {
            tracing::warn!("stored watch-list is not a list, starting empty");
            if let Err(error) = append_backup(store, [other]) {
                tracing::warn!(%error, "failed to back up stored watch-list");
            }
            return WatchList::empty();
        }
    };

    let mut unreadable = Vec::new();
    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        match serde_json::from_value::<WatchListItem>(entry.clone()) {
            Ok(item) => items.push(item),
            Err(error) => {
                tracing::warn!(%error, "skipping unreadable stored watch-list entry");
                unreadable.push(entry);
            }
        }
    }
    if !unreadable.is_empty() {
        if let Err(error) = append_backup(store, unreadable) {
            tracing::warn!(%error, "failed to back up unreadable watch-list entries");
        }
    }
    WatchList::new(items)
}

/// Why a mutation failed after rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationErrorKind {
    NotFound,
    Timeout,
    Generic,
}

/// Failed add/remove, reported after the local list was restored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationError {
    kind: MutationErrorKind,
    symbol: Symbol,
    source: ApiError,
}

impl MutationError {
    pub fn new(symbol: Symbol, source: ApiError) -> Self {
        let kind = if source.is_not_found() {
            MutationErrorKind::NotFound
        } else if source.kind() == ApiErrorKind::Timeout {
            MutationErrorKind::Timeout
        } else {
            MutationErrorKind::Generic
        };
        Self {
            kind,
            symbol,
            source,
        }
    }

    pub const fn kind(&self) -> MutationErrorKind {
        self.kind
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn api_error(&self) -> &ApiError {
        &self.source
    }

    /// Short message suitable for an end user.
    pub fn user_message(&self) -> String {
        match self.kind {
            MutationErrorKind::NotFound => {
                format!("{} was not found on the server", self.symbol)
            }
            MutationErrorKind::Timeout => "the request timed out, please try again".to_owned(),
            MutationErrorKind::Generic => {
                format!("could not update the watch-list for {}", self.symbol)
            }
        }
    }
}

impl Display for MutationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "watch-list update for {} failed: {}", self.symbol, self.source)
    }
}

impl std::error::Error for MutationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[derive(Default)]
struct SymbolSlot {
    turn: Arc<tokio::sync::Mutex<()>>,
    latest: u64,
}

#[derive(Default)]
struct SymbolTable {
    next_seq: u64,
    slots: HashMap<Symbol, SymbolSlot>,
}

/// Apply-then-confirm add/remove with rollback.
///
/// Remote calls for one symbol run one at a time in the order the mutations
/// were issued. Local publication never waits for them. When a confirmation
/// arrives for the most recent mutation of its symbol, its effect is applied
/// again so that a read published in the meantime cannot undo it.
pub struct MutationController {
    state: WatchListState,
    executor: Arc<RequestExecutor>,
    cache: CacheStore,
    symbols: Mutex<SymbolTable>,
}

impl MutationController {
    pub fn new(state: WatchListState, executor: Arc<RequestExecutor>, cache: CacheStore) -> Self {
        Self {
            state,
            executor,
            cache,
            symbols: Mutex::new(SymbolTable::default()),
        }
    }

    pub async fn add_item(
        &self,
        symbol: Symbol,
        name: &str,
        market: Market,
    ) -> Result<AddOutcome, MutationError> {
        let (turn, seq) = self.begin(&symbol);
        let before = self.state.current();
        let is_new = !before.contains(&symbol);
        let item = WatchListItem::local(symbol.clone(), name, market);
        let applied = if is_new {
            let after = Arc::new(before.with_front(item.clone()));
            self.state.publish(Arc::clone(&after));
            Some(after)
        } else {
            None
        };

        let _turn = turn.lock().await;

        let descriptor =
            RequestDescriptor::post(FAVORITES_PATH, json!({ "stock_code": symbol.as_str() }));
        match self.executor.execute(&descriptor).await {
            Ok(_) => {
                if self.is_latest(&symbol, seq) {
                    self.confirm(item);
                }
                self.cache.invalidate(FAVORITES_PATH).await;
                tracing::info!(%symbol, is_new, "favorite added");
                Ok(AddOutcome { is_new })
            }
            Err(error) => {
                if let Some(after) = applied {
                    let current = self.state.current();
                    if Arc::ptr_eq(&current, &after) {
                        self.state.publish(before);
                    } else {
                        self.state.publish(Arc::new(current.without(&symbol)));
                    }
                }
                tracing::warn!(%symbol, error = %error, "add failed, rolled back");
                Err(MutationError::new(symbol, error))
            }
        }
    }

    pub async fn remove_item(&self, symbol: Symbol) -> Result<(), MutationError> {
        let (turn, seq) = self.begin(&symbol);
        let before = self.state.current();
        let removed = before
            .position(&symbol)
            .and_then(|index| before.get(&symbol).map(|item| (index, item.clone())));
        let applied = removed.as_ref().map(|_| {
            let after = Arc::new(before.without(&symbol));
            self.state.publish(Arc::clone(&after));
            after
        });

        let _turn = turn.lock().await;

        let path = format!("{}/{}", FAVORITES_PATH, urlencoding::encode(symbol.as_str()));
        match self.executor.execute(&RequestDescriptor::delete(path)).await {
            Ok(_) => {
                let current = self.state.current();
                if self.is_latest(&symbol, seq) && current.contains(&symbol) {
                    self.state.publish(Arc::new(current.without(&symbol)));
                }
                self.cache.invalidate(FAVORITES_PATH).await;
                tracing::info!(%symbol, "favorite removed");
                Ok(())
            }
            Err(error) => {
                if let (Some(after), Some((index, item))) = (applied, removed) {
                    let current = self.state.current();
                    if Arc::ptr_eq(&current, &after) {
                        self.state.publish(before);
                    } else if !current.contains(&symbol) {
                        self.state
                            .publish(Arc::new(current.with_inserted(index, item)));
                    }
                }
                tracing::warn!(%symbol, error = %error, "remove failed, rolled back");
                Err(MutationError::new(symbol, error))
            }
        }
    }

    /// Registers a mutation of `symbol`: returns its FIFO turn lock and its
    /// sequence number, which becomes the symbol's latest.
    fn begin(&self, symbol: &Symbol) -> (Arc<tokio::sync::Mutex<()>>, u64) {
        let mut table = self.symbols.lock().expect("symbol table is not poisoned");
        table
            .slots
            .retain(|_, slot| Arc::strong_count(&slot.turn) > 1);
        table.next_seq += 1;
        let seq = table.next_seq;
        let slot = table.slots.entry(symbol.clone()).or_default();
        slot.latest = seq;
        (Arc::clone(&slot.turn), seq)
    }

    fn is_latest(&self, symbol: &Symbol, seq: u64) -> bool {
        let table = self.symbols.lock().expect("symbol table is not poisoned");
        table.slots.get(symbol).is_some_and(|slot| slot.latest == seq)
    }

    /// Marks the entry server-confirmed, re-inserting it at the front when a
    /// concurrent publication dropped it.
    fn confirm(&self, item: WatchListItem) {
        let current = self.state.current();
        let confirmed = match current.get(&item.symbol) {
            Some(existing) if existing.provenance == Provenance::ServerConfirmed => return,
            Some(existing) => {
                let index = current.position(&item.symbol).unwrap_or(0);
                current.with_inserted(index, existing.clone().confirmed())
            }
            None => current.with_front(item.confirmed()),
        };
        self.state.publish(Arc::new(confirmed));
    }
}
