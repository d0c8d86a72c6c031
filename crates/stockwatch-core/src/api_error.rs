use std::fmt::{Display, Formatter};

use crate::http_client::{HttpError, TransportFailure};

/// Classification of a failed service call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    Timeout,
    NetworkFailure,
    HttpClientError,
    HttpServerError,
    ParseError,
}

impl ApiErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::NetworkFailure => "network_failure",
            Self::HttpClientError => "http_client_error",
            Self::HttpServerError => "http_server_error",
            Self::ParseError => "parse_error",
        }
    }
}

/// Structured error produced by the request executor and response parsers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    kind: ApiErrorKind,
    message: String,
    status: Option<u16>,
    attempts: u32,
    retryable: bool,
}

impl ApiError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Timeout,
            message: message.into(),
            status: None,
            attempts: 1,
            retryable: true,
        }
    }

    pub fn network_failure(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::NetworkFailure,
            message: message.into(),
            status: None,
            attempts: 1,
            retryable: true,
        }
    }

    /// Non-success HTTP status. `retryable` is decided by the caller's retry policy.
    pub fn http_status(status: u16, message: impl Into<String>, retryable: bool) -> Self {
        let kind = if status >= 500 {
            ApiErrorKind::HttpServerError
        } else {
            ApiErrorKind::HttpClientError
        };
        Self {
            kind,
            message: message.into(),
            status: Some(status),
            attempts: 1,
            retryable,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::ParseError,
            message: message.into(),
            status: None,
            attempts: 1,
            retryable: false,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub const fn kind(&self) -> ApiErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    /// Number of transport attempts made before giving up.
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self.status, Some(404))
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            ApiErrorKind::Timeout => "api.timeout",
            ApiErrorKind::NetworkFailure => "api.network_failure",
            ApiErrorKind::HttpClientError => "api.http_client_error",
            ApiErrorKind::HttpServerError => "api.http_server_error",
            ApiErrorKind::ParseError => "api.parse_error",
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {}, {})", self.message, status, self.code()),
            None => write!(f, "{} ({})", self.message, self.code()),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<HttpError> for ApiError {
    fn from(value: HttpError) -> Self {
        match value.kind() {
            TransportFailure::Timeout => Self::timeout(value.message()),
            TransportFailure::Connect | TransportFailure::Other => {
                Self::network_failure(value.message())
            }
        }
    }
}
