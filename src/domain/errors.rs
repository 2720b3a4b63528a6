//! # Domain Errors
//!
//! Business rule violations raised by the dispatch core.
//!
//! # Error Taxonomy
//!
//! ```text
//! DomainError
//! ├── InvalidTransition       - lifecycle move from an illegal source state
//! ├── RetryBudgetExceeded     - retry chain would exceed max_retries + 1
//! ├── RetryChainConflict      - malformed retry link (wrong parent, fork)
//! ├── AttemptAlreadyTerminal  - outcome reported for a finished attempt
//! ├── ConflictingOutcome      - different terminal status reported twice
//! ├── InvalidArgument         - malformed input rejected at the boundary
//! ├── Forbidden               - role may not write at this visibility
//! └── NotFound                - referenced entity does not exist
//! ```

use crate::domain::value_objects::{AttemptId, ParseEnumError, RfqStatus, SendStatus};
use thiserror::Error;

/// Domain-level error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Lifecycle transition attempted from an illegal source state.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: RfqStatus,
        /// Requested status.
        to: RfqStatus,
    },

    /// A retry chain would exceed its bound.
    #[error("retry budget exceeded for attempt {attempt_id} (max_retries {max_retries})")]
    RetryBudgetExceeded {
        /// Attempt the retry would follow.
        attempt_id: AttemptId,
        /// The chain's retry bound.
        max_retries: u32,
    },

    /// Retry link does not fit the chain.
    #[error("retry chain conflict: {0}")]
    RetryChainConflict(String),

    /// Outcome reported for an attempt that is already terminal.
    #[error("attempt {attempt_id} is already terminal ({status})")]
    AttemptAlreadyTerminal {
        /// The attempt.
        attempt_id: AttemptId,
        /// Its terminal status.
        status: SendStatus,
    },

    /// A different terminal status was reported for a terminal attempt.
    #[error("conflicting outcome for attempt {attempt_id}: stored {existing}, reported {reported}")]
    ConflictingOutcome {
        /// The attempt.
        attempt_id: AttemptId,
        /// Stored terminal status.
        existing: SendStatus,
        /// Newly reported status.
        reported: SendStatus,
    },

    /// Malformed input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Write not permitted for the actor's role.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// Identifier.
        id: String,
    },
}

impl DomainError {
    /// Creates an invalid transition error.
    #[must_use]
    pub fn invalid_transition(from: RfqStatus, to: RfqStatus) -> Self {
        Self::InvalidTransition { from, to }
    }

    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Creates a forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Creates a retry chain conflict error.
    #[must_use]
    pub fn retry_chain_conflict(message: impl Into<String>) -> Self {
        Self::RetryChainConflict(message.into())
    }

    /// Returns true if this is an invalid transition error.
    #[must_use]
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }

    /// Returns true if this is a retry budget error.
    #[must_use]
    pub fn is_retry_budget_exceeded(&self) -> bool {
        matches!(self, Self::RetryBudgetExceeded { .. })
    }

    /// Returns true if this error indicates a non-idempotent outcome source.
    #[must_use]
    pub fn is_conflicting_outcome(&self) -> bool {
        matches!(self, Self::ConflictingOutcome { .. })
    }

    /// Returns true if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if the input was rejected at the boundary.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    /// Returns true if this is a forbidden error.
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden(_))
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

impl From<ParseEnumError> for DomainError {
    fn from(err: ParseEnumError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = DomainError::invalid_transition(RfqStatus::Draft, RfqStatus::Awarded);
        assert_eq!(err.to_string(), "invalid transition: draft -> awarded");

        let err = DomainError::ConflictingOutcome {
            attempt_id: AttemptId::new(4),
            existing: SendStatus::Delivered,
            reported: SendStatus::Failed,
        };
        assert!(err.to_string().contains("stored delivered, reported failed"));

        let err = DomainError::not_found("rfq", 9);
        assert_eq!(err.to_string(), "rfq not found: 9");
    }

    #[test]
    fn predicates() {
        assert!(DomainError::invalid_transition(RfqStatus::Sent, RfqStatus::Draft).is_invalid_transition());
        assert!(DomainError::invalid_argument("x").is_invalid_argument());
        assert!(DomainError::forbidden("x").is_forbidden());
        assert!(DomainError::not_found("attempt", 1).is_not_found());
        assert!(
            DomainError::RetryBudgetExceeded {
                attempt_id: AttemptId::new(1),
                max_retries: 2
            }
            .is_retry_budget_exceeded()
        );
        assert!(!DomainError::forbidden("x").is_conflicting_outcome());
    }
}
