//! # Application Errors
//!
//! Error types for the application layer.
//!
//! # Error Hierarchy
//!
//! ```text
//! ApplicationError
//! ├── Domain(DomainError)          - Business rule violations
//! ├── Repository(RepositoryError)  - Storage failures
//! ├── Transport(TransportError)    - Channel failures outside the retry path
//! ├── Validation(String)           - Input validation failures
//! ├── NotFound { .. }              - Resource not found
//! └── Internal(String)             - Invariant broken at runtime
//! ```
//!
//! # Examples
//!
//! ```
//! use rfq_dispatch::application::error::ApplicationError;
//! use rfq_dispatch::domain::errors::DomainError;
//!
//! let err = ApplicationError::validation("message_text must not be empty");
//! assert!(err.is_validation());
//!
//! let err: ApplicationError = DomainError::not_found("rfq", 7).into();
//! assert!(err.is_not_found());
//! ```

use crate::domain::errors::DomainError;
use crate::infrastructure::persistence::RepositoryError;
use crate::infrastructure::transport::TransportError;
use thiserror::Error;

/// Application layer error.
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// Domain error from business logic.
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    /// Storage error.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Request validation failed.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("not found: {resource_type} with id {id}")]
    NotFound {
        /// Type of resource.
        resource_type: String,
        /// Resource identifier.
        id: String,
    },

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApplicationError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(resource_type: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.to_string(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns the wrapped domain error, if any.
    #[must_use]
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            Self::Domain(e) => Some(e),
            _ => None,
        }
    }

    /// Returns true if retrying the whole operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            Self::Repository(e) => {
                e.is_version_conflict() || matches!(e, RepositoryError::Connection(_))
            }
            _ => false,
        }
    }

    /// Returns true if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Domain(e) => e.is_not_found(),
            Self::Repository(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        match self {
            Self::Validation(_) => true,
            Self::Domain(e) => e.is_invalid_argument(),
            _ => false,
        }
    }

    /// Returns true if a lifecycle transition was illegal.
    #[must_use]
    pub fn is_invalid_transition(&self) -> bool {
        self.as_domain().is_some_and(DomainError::is_invalid_transition)
    }

    /// Returns true if a retry chain would exceed its bound.
    #[must_use]
    pub fn is_retry_budget_exceeded(&self) -> bool {
        self.as_domain()
            .is_some_and(DomainError::is_retry_budget_exceeded)
    }

    /// Returns true if two outcome reports contradict each other.
    #[must_use]
    pub fn is_conflicting_outcome(&self) -> bool {
        self.as_domain().is_some_and(DomainError::is_conflicting_outcome)
    }

    /// Returns true if the caller's role may not perform the operation.
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        self.as_domain().is_some_and(DomainError::is_forbidden)
    }

    /// Returns true if a concurrent writer changed the row first.
    #[must_use]
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::Repository(e) if e.is_version_conflict())
    }
}

/// Result type for application operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{AttemptId, RfqStatus, SendStatus};

    #[test]
    fn validation_error() {
        let err = ApplicationError::validation("empty");
        assert!(err.is_validation());
        assert!(err.to_string().contains("validation"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn domain_invalid_argument_is_validation() {
        let err: ApplicationError = DomainError::invalid_argument("bad").into();
        assert!(err.is_validation());
    }

    #[test]
    fn not_found_from_every_layer() {
        assert!(ApplicationError::not_found("RFQ", 1).is_not_found());
        assert!(ApplicationError::from(DomainError::not_found("rfq", 1)).is_not_found());
        assert!(ApplicationError::from(RepositoryError::not_found("rfq", 1)).is_not_found());
    }

    #[test]
    fn domain_predicates() {
        let err: ApplicationError =
            DomainError::invalid_transition(RfqStatus::Draft, RfqStatus::Awarded).into();
        assert!(err.is_invalid_transition());

        let err: ApplicationError = DomainError::ConflictingOutcome {
            attempt_id: AttemptId::new(1),
            existing: SendStatus::Delivered,
            reported: SendStatus::Failed,
        }
        .into();
        assert!(err.is_conflicting_outcome());
        assert!(!err.is_retryable());
    }

    #[test]
    fn retryable() {
        assert!(ApplicationError::from(TransportError::timeout("t")).is_retryable());
        assert!(!ApplicationError::from(TransportError::rejected("r")).is_retryable());
        let conflict: ApplicationError = RepositoryError::version_conflict("rfq", 1, 1, 2).into();
        assert!(conflict.is_retryable());
        assert!(conflict.is_version_conflict());
    }
}
