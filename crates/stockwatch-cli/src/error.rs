use stockwatch_core::{ApiError, CoreError, MutationError, StoreError, ValidationError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Remote(#[from] ApiError),

    #[error("{}", .0.user_message())]
    Mutation(#[from] MutationError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<CoreError> for CliError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::Validation(error) => Self::Validation(error),
            CoreError::Api(error) => Self::Remote(error),
            CoreError::Mutation(error) => Self::Mutation(error),
            CoreError::Store(error) => Self::Store(error),
        }
    }
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Command(_) => 2,
            Self::Remote(_) => 3,
            Self::Mutation(_) => 3,
            Self::Serialization(_) => 4,
            Self::Store(_) => 10,
            Self::Io(_) => 10,
        }
    }
}
