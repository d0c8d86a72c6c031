//! # Stockwatch Core
//!
//! Data access layer for the Stockwatch watch-list and chart client.
//!
//! ## Overview
//!
//! - **Request executor** with a fixed per-attempt timeout and linear retry backoff
//! - **Response cache** with per-endpoint TTLs and hit/miss statistics
//! - **Request coalescing** so concurrent identical reads share one network call
//! - **Watch-list reconciliation** with a one-time migration of local entries
//! - **Optimistic watch-list mutations** with rollback on failure
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`api_error`] | Structured service-call errors |
//! | [`cache`] | Response cache and TTL policy |
//! | [`client`] | [`StockClient`] façade and builder |
//! | [`coalescer`] | In-flight request sharing |
//! | [`config`] | Client options and persisted sync state |
//! | [`domain`] | Domain models (Symbol, WatchList, HistoryPoint) |
//! | [`error`] | Core error types |
//! | [`executor`] | Timeout and retry around the transport |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`request`] | Request descriptors and cache keys |
//! | [`retry`] | Retry policy |
//! | [`storage`] | Key-value persistence |
//! | [`sync`] | Server reconciliation |
//! | [`telemetry`] | Telemetry sinks |
//! | [`watchlist`] | Watch-list state and optimistic mutations |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stockwatch_core::{Period, ReqwestHttpClient, StockClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = ReqwestHttpClient::new("https://stock.example.com").with_service("stock");
//!     let client = StockClient::builder(Arc::new(transport)).build()?;
//!
//!     client.add_favorite("000001.SZ").await?;
//!     for point in client.get_history("000001", Period::OneYear).await? {
//!         println!("{} {:.1}", point.date, point.value);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / Caller   │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  StockClient    │────▶│ Mutation / Sync  │
//! └────────┬────────┘     └────────┬─────────┘
//!          │                       │
//!          ▼                       │
//! ┌─────────────────┐              │
//! │ Cache Store     │              │
//! └────────┬────────┘              │
//!          ▼                       │
//! ┌─────────────────┐              │
//! │ Coalescer       │              │
//! └────────┬────────┘              │
//!          ▼                       ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Executor        │────▶│ HTTP Client      │
//! │ (timeout/retry) │     │ (reqwest/mock)   │
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use stockwatch_core::{CoreError, MutationErrorKind};
//!
//! fn describe(error: &CoreError) -> String {
//!     match error {
//!         CoreError::Mutation(failure) if failure.kind() == MutationErrorKind::Timeout => {
//!             "try again".to_owned()
//!         }
//!         CoreError::Mutation(failure) => failure.user_message(),
//!         other => other.to_string(),
//!     }
//! }
//! ```

pub mod api_error;
pub mod cache;
pub mod client;
pub mod coalescer;
pub mod config;
pub mod domain;
pub mod error;
pub mod executor;
pub mod http_client;
pub mod request;
pub mod retry;
pub mod storage;
pub mod sync;
pub mod telemetry;
pub mod watchlist;
mod wire;

pub use api_error::{ApiError, ApiErrorKind};

pub use cache::{CachePolicy, CacheStats, CacheStore};

pub use client::{StockClient, StockClientBuilder};

pub use coalescer::RequestCoalescer;

pub use config::{ClientConfig, SyncState, DEFAULT_TIMEOUT, DEFAULT_UPLOAD_DELAY};

pub use domain::{
    AddOutcome, Favorites, HistoryPoint, Instrument, Market, Period, Provenance, Symbol,
    UtcDateTime, WatchList, WatchListItem,
};

pub use error::{CoreError, ValidationError};

pub use executor::RequestExecutor;

pub use http_client::{
    HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, MockHttpClient, MockReply,
    ReqwestHttpClient, TransportFailure,
};

pub use request::RequestDescriptor;

pub use retry::{Backoff, RetryConfig};

pub use storage::{
    JsonFileStore, KeyValueStore, MemoryStore, StoreError, FAVORITES_KEY, LAST_SYNC_KEY,
    MIGRATION_COMPLETED_KEY, PREMIGRATION_BACKUP_KEY,
};

pub use sync::{SyncOutcome, SyncPhase, SyncReconciler, SyncResult};

pub use telemetry::{
    NoopTelemetry, RecordingTelemetry, TelemetryError, TelemetrySink, TracingTelemetry,
};

pub use watchlist::{MutationController, MutationError, MutationErrorKind, WatchListState};
