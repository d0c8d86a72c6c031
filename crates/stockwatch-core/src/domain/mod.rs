//! # Domain Models
//!
//! Canonical types shared by the data access layer.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Canonical instrument code, market suffix stripped |
//! | [`Market`] | Market classification derived from a raw code |
//! | [`Period`] | History look-back window (1y, 3y, 5y, 10y, max) |
//! | [`WatchListItem`] | One watch-list entry with provenance |
//! | [`WatchList`] | Immutable newest-first watch-list value |
//! | [`HistoryPoint`] | One `{date, value}` observation |
//! | [`Instrument`] | Search / hot-list entry |
//! | [`UtcDateTime`] | UTC timestamp |

mod models;
mod period;
mod symbol;
mod timestamp;

pub use models::{
    AddOutcome, Favorites, HistoryPoint, Instrument, Provenance, WatchList, WatchListItem,
};
pub use period::Period;
pub use symbol::{Market, Symbol};
pub use timestamp::UtcDateTime;
