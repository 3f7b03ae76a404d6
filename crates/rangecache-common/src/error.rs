//! Error types for range descriptor resolution
//!
//! Provider failures, resolution failures and configuration problems all
//! share one enum so that a provider error can be handed back to the caller
//! of a lookup unchanged.

use crate::keys::Key;
use thiserror::Error;

/// Common result type
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // Provider / backend errors
    #[error("request timeout")]
    Timeout,

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("no range found for meta key \"{key}\"")]
    RangeNotFound { key: Key },

    // Resolution errors
    #[error("lookup for \"{key}\" violated the provider contract: {detail}")]
    ProtocolViolation { key: Key, detail: String },

    #[error("resolving \"{key}\" needed more than {depth} meta levels")]
    MetaDepthExceeded { key: Key, depth: usize },

    // Input errors
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("cannot split at \"{key}\": {reason}")]
    InvalidSplit { key: Key, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a protocol violation for a lookup of `key`
    pub fn protocol_violation(key: &Key, detail: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            key: key.clone(),
            detail: detail.into(),
        }
    }

    /// Check if this is a retryable error
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::ServiceUnavailable(_))
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::RangeNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(Error::Timeout.is_retryable());
        assert!(Error::ServiceUnavailable("test".into()).is_retryable());
        assert!(!Error::protocol_violation(&Key::from("a"), "empty response").is_retryable());
    }

    #[test]
    fn test_error_not_found() {
        assert!(Error::RangeNotFound { key: Key::from("a") }.is_not_found());
        assert!(!Error::Timeout.is_not_found());
    }

    #[test]
    fn test_error_display_escapes_keys() {
        let err = Error::MetaDepthExceeded {
            key: Key::from("\x00\x00meta1a"),
            depth: 2,
        };
        assert_eq!(
            err.to_string(),
            "resolving \"\\x00\\x00meta1a\" needed more than 2 meta levels"
        );
    }
}
