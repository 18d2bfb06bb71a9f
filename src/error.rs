//! Error types.
//!
//! `execute` has exactly three observable results: a value, the empty
//! sentinel after rate-limit exhaustion, or an [`OrchestratorError`].
//! Persistence failures never reach callers; they surface only as
//! [`StoreError`] from the store adapters and are logged by the orchestrator.

use std::sync::Arc;

use thiserror::Error;

/// Result alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors returned from [`crate::Orchestrator::execute`].
///
/// Cloneable so a single settled in-flight request can hand the identical
/// error to every caller that joined it.
#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    /// Keys identify logical requests and must not be empty.
    #[error("request key must not be empty")]
    EmptyKey,

    /// The producer failed with an error that is not rate limiting.
    #[error("{0}")]
    Producer(Arc<anyhow::Error>),

    /// A call joined an in-flight request that produces a different type.
    #[error("request '{key}' is already in flight with value type {in_flight}, not {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        in_flight: &'static str,
    },

    /// The producer task panicked before settling.
    #[error("producer for '{key}' aborted before settling")]
    Aborted { key: String },
}

impl OrchestratorError {
    /// The producer's own error, if this is a producer failure.
    pub fn producer_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Producer(err) => Some(err),
            _ => None,
        }
    }
}

/// Errors raised by [`crate::PersistentStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("store backend failed: {0}")]
    Backend(String),
}

/// A transport failure carrying its status code.
///
/// Producers return this (directly or anywhere in an `anyhow` context chain)
/// so the retry policy can recognise HTTP 429 without parsing messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("request failed with status {status}: {message}")]
pub struct StatusError {
    pub status: u16,
    pub message: String,
}

impl StatusError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// HTTP 429 Too Many Requests.
    pub fn too_many_requests() -> Self {
        Self::new(429, "Too Many Requests")
    }

    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_error_displays_verbatim() {
        let err = OrchestratorError::Producer(Arc::new(anyhow::anyhow!("company not found")));
        assert_eq!(err.to_string(), "company not found");
        assert!(err.producer_error().is_some());
        assert!(OrchestratorError::EmptyKey.producer_error().is_none());
    }

    #[test]
    fn test_status_error() {
        assert!(StatusError::too_many_requests().is_rate_limited());
        assert!(!StatusError::new(503, "unavailable").is_rate_limited());
        assert_eq!(
            StatusError::new(404, "missing").to_string(),
            "request failed with status 404: missing"
        );
    }
}
