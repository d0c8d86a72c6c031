use thiserror::Error;

use crate::api_error::ApiError;
use crate::storage::StoreError;
use crate::watchlist::MutationError;

/// Validation errors for user-supplied identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("invalid period '{value}', expected one of 1y, 3y, 5y, 10y, max")]
    InvalidPeriod { value: String },

    #[error("search keyword must not be empty")]
    EmptyKeyword,

    #[error("timestamp must be RFC3339 UTC or 'YYYY-MM-DD HH:MM:SS': '{value}'")]
    InvalidTimestamp { value: String },
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
