//! Error types used throughout the sync engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for SkuBridge
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail")]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        /// Retry hint from the remote, in seconds, when one was provided.
        retry_after_secs: Option<u64>,
    },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Classification of an error for retry and run-control decisions.
///
/// The fetch/push client and the dispatcher act on the class, never on the
/// concrete variant: transient errors retry with backoff, rate limits feed
/// the budget controller, validation failures mark the item and move on,
/// auth failures abort the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient network/API failure, retry with backoff
    Transient,
    /// Remote throttling signal, handled by the rate budget
    RateLimit,
    /// Malformed item, fail the item without retrying
    Validation,
    /// Authentication/authorization failure, fatal for the run
    Auth,
    /// Staged change superseded by a newer diff, excluded from push
    Conflict,
    /// Not retryable and not fatal for the run
    Permanent,
}

impl SyncError {
    /// Classify this error for retry handling
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Network(_) => ErrorClass::Transient,
            Self::RateLimited { .. } => ErrorClass::RateLimit,
            Self::Validation(_) => ErrorClass::Validation,
            Self::Auth(_) => ErrorClass::Auth,
            Self::Conflict(_) => ErrorClass::Conflict,
            Self::NotFound(_)
            | Self::InvalidInput(_)
            | Self::Storage(_)
            | Self::Cancelled
            | Self::Internal(_) => ErrorClass::Permanent,
        }
    }

    /// Check if the error is fatal for the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self.class(), ErrorClass::Auth)
    }

    /// Retry hint carried by a rate-limit response, if any
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs, .. } => *retry_after_secs,
            _ => None,
        }
    }
}

/// Result type alias for SkuBridge operations
pub type Result<T> = std::result::Result<T, SyncError>;
