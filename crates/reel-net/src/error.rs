#![forbid(unsafe_code)]

use thiserror::Error;

/// Centralized error type for reel-net.
#[derive(Debug, Error, Clone)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("resource not found: {url}")]
    NotFound { url: String },

    #[error("HTTP {status} for URL: {url}")]
    Rejected { status: u16, url: String },

    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}

impl FetchError {
    pub fn rejected(status: u16, url: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            url: url.into(),
        }
    }

    pub fn not_found(url: impl Into<String>) -> Self {
        Self::NotFound { url: url.into() }
    }

    /// Checks if this error is considered transient and worth retrying.
    ///
    /// Timeouts and connection failures are always transient. HTTP statuses
    /// are retried only for server errors (5xx); any 4xx means the request
    /// itself is wrong and retrying cannot help.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::ConnectionFailed(_) => true,
            FetchError::Rejected { status, .. } => *status >= 500,
            FetchError::NotFound { .. } => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout)
    }

    /// Gets the HTTP status code if this is a status rejection.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::Rejected { status, .. } => Some(*status),
            FetchError::NotFound { .. } => Some(404),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::ConnectionFailed(error.to_string())
        }
    }
}

pub type NetResult<T> = Result<T, FetchError>;
