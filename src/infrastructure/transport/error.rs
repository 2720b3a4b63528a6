//! # Transport Errors
//!
//! Error types for channel transport calls.
//!
//! A transport error never escapes the dispatch worker as a system failure:
//! it becomes a `failed` outcome on the attempt, and the retry path decides
//! what happens next.
//!
//! # Examples
//!
//! ```
//! use rfq_dispatch::infrastructure::transport::TransportError;
//!
//! let error = TransportError::timeout("no answer after 10000ms");
//! assert!(error.is_retryable());
//!
//! let error = TransportError::rejected("unknown recipient");
//! assert!(!error.is_retryable());
//! ```

use crate::domain::value_objects::Channel;
use thiserror::Error;

/// Error type for transport operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Request timed out.
    #[error("transport timeout: {message}")]
    Timeout {
        /// Error message.
        message: String,
    },

    /// Network or connection error.
    #[error("transport connection error: {message}")]
    Connection {
        /// Error message.
        message: String,
    },

    /// Credentials refused by the provider.
    #[error("transport authentication error: {message}")]
    Authentication {
        /// Error message.
        message: String,
    },

    /// Provider rate limit.
    #[error("transport rate limited: {message}")]
    RateLimited {
        /// Error message.
        message: String,
        /// Retry after duration in milliseconds.
        retry_after_ms: Option<u64>,
    },

    /// Provider refused the message (bad recipient, bad payload).
    #[error("transport rejected message: {message}")]
    Rejected {
        /// Error message.
        message: String,
    },

    /// No transport is configured for the channel.
    #[error("no transport configured for channel {0}")]
    Unsupported(Channel),

    /// Provider answered with something unparseable.
    #[error("transport protocol error: {message}")]
    Protocol {
        /// Error message.
        message: String,
    },

    /// Local failure building the request.
    #[error("transport internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl TransportError {
    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates an authentication error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates a rate limited error.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>, retry_after_ms: Option<u64>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after_ms,
        }
    }

    /// Creates a rejection error.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if the failure is transient and a retry may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Connection { .. } | Self::RateLimited { .. }
        )
    }

    /// Returns the retry delay in milliseconds, if the provider sent one.
    #[must_use]
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(TransportError::timeout("t").is_retryable());
        assert!(TransportError::connection("c").is_retryable());
        assert!(TransportError::rate_limited("r", Some(500)).is_retryable());
    }

    #[test]
    fn permanent_errors_are_not_retryable() {
        assert!(!TransportError::authentication("a").is_retryable());
        assert!(!TransportError::rejected("r").is_retryable());
        assert!(!TransportError::Unsupported(Channel::Broker).is_retryable());
        assert!(!TransportError::protocol("p").is_retryable());
    }

    #[test]
    fn retry_after() {
        assert_eq!(
            TransportError::rate_limited("slow down", Some(1000)).retry_after_ms(),
            Some(1000)
        );
        assert_eq!(TransportError::timeout("t").retry_after_ms(), None);
    }

    #[test]
    fn display_format() {
        assert_eq!(
            TransportError::Unsupported(Channel::WhatsApp).to_string(),
            "no transport configured for channel whatsapp"
        );
    }
}
