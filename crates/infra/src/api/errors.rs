//! API-specific error types
//!
//! Provides error classification for remote catalog calls with retry
//! metadata. The transport maps every wire-level failure into `ApiError`;
//! conversion into the domain taxonomy happens at the port boundary.

use std::time::Duration;

use skubridge_domain::SyncError;
use thiserror::Error;

/// Categories of API errors for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCategory {
    /// Authentication errors (401, 403) - fatal for the run
    Authentication,
    /// Rate limiting errors (429) - handled by the rate budget
    RateLimit,
    /// Server errors (5xx) - retryable
    Server,
    /// Client errors (4xx except auth/429) - non-retryable
    Client,
    /// Network/connection errors - retryable
    Network,
    /// Configuration errors - non-retryable
    Config,
}

/// Remote catalog API errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        /// Parsed `Retry-After` hint, when the response carried one
        retry_after: Option<Duration>,
    },

    #[error("Server error: {0}")]
    Server(String),

    #[error("Client error: {0}")]
    Client(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),
}

impl ApiError {
    /// Get the error category for this error
    pub fn category(&self) -> ApiErrorCategory {
        match self {
            Self::Auth(_) => ApiErrorCategory::Authentication,
            Self::RateLimit { .. } => ApiErrorCategory::RateLimit,
            Self::Server(_) => ApiErrorCategory::Server,
            Self::Client(_) => ApiErrorCategory::Client,
            Self::Network(_) | Self::Timeout(_) => ApiErrorCategory::Network,
            Self::Config(_) => ApiErrorCategory::Config,
        }
    }

    /// Check if this error is worth retrying at the transport level
    pub fn should_retry(&self) -> bool {
        matches!(
            self.category(),
            ApiErrorCategory::RateLimit | ApiErrorCategory::Server | ApiErrorCategory::Network
        )
    }

    /// Retry hint carried by a rate-limit response, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<ApiError> for SyncError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Auth(message) => SyncError::Auth(message),
            ApiError::RateLimit { message, retry_after } => SyncError::RateLimited {
                message,
                retry_after_secs: retry_after.map(|d| d.as_secs()),
            },
            ApiError::Server(message) => SyncError::Network(message),
            ApiError::Network(message) => SyncError::Network(message),
            ApiError::Timeout(timeout) => {
                SyncError::Network(format!("request timed out after {timeout:?}"))
            }
            ApiError::Client(message) => SyncError::InvalidInput(message),
            ApiError::Config(message) => SyncError::Internal(message),
        }
    }
}
