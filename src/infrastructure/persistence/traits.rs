//! # Repository Traits
//!
//! Port definitions for persistence abstraction.
//!
//! This module defines the repository traits (ports) that abstract
//! persistence operations. Implementations can use different backends
//! like PostgreSQL or in-memory storage.
//!
//! # Available Repositories
//!
//! - [`RfqRepository`]: Persistence for RFQ aggregates
//! - [`SendAttemptRepository`]: Persistence for send attempts
//! - [`TimelineEventStore`]: Append-only timeline storage
//!
//! # Check-and-insert
//!
//! Storage does not enforce uniqueness of idempotency keys. Both
//! [`SendAttemptRepository::insert_if_absent`] and
//! [`TimelineEventStore::append_if_absent`] perform the key lookup and the
//! insert as one serialized step, and report whether the row was created
//! or already existed.

use crate::domain::entities::{NewSendAttempt, Rfq, SendAttempt, TimelineEvent};
use crate::domain::events::NewTimelineEvent;
use crate::domain::value_objects::{
    AttemptId, CorrelationId, EventId, IdempotencyKey, RfqId, SendStatus, UserId, Visibility,
};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Error type for repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Entity not found.
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        /// Type of entity.
        entity_type: &'static str,
        /// Entity identifier.
        id: String,
    },

    /// Duplicate entity.
    #[error("Duplicate entity: {entity_type} with id {id} already exists")]
    Duplicate {
        /// Type of entity.
        entity_type: &'static str,
        /// Entity identifier.
        id: String,
    },

    /// Optimistic locking conflict.
    #[error("Version conflict: {entity_type} with id {id} has been modified")]
    VersionConflict {
        /// Type of entity.
        entity_type: &'static str,
        /// Entity identifier.
        id: String,
        /// Expected version.
        expected: u64,
        /// Actual version.
        actual: u64,
    },

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query error.
    #[error("Query error: {0}")]
    Query(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RepositoryError {
    /// Creates a not found error.
    #[must_use]
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    /// Creates a duplicate error.
    #[must_use]
    pub fn duplicate(entity_type: &'static str, id: impl ToString) -> Self {
        Self::Duplicate {
            entity_type,
            id: id.to_string(),
        }
    }

    /// Creates a version conflict error.
    #[must_use]
    pub fn version_conflict(
        entity_type: &'static str,
        id: impl ToString,
        expected: u64,
        actual: u64,
    ) -> Self {
        Self::VersionConflict {
            entity_type,
            id: id.to_string(),
            expected,
            actual,
        }
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error.
    #[must_use]
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if this is a duplicate error.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }

    /// Returns true if this is a version conflict error.
    #[must_use]
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Result of a check-and-insert.
#[derive(Debug, Clone, PartialEq)]
pub enum Insertion<T> {
    /// A new row was inserted.
    Created(T),
    /// A row with the same idempotency key already existed; it is returned
    /// unchanged.
    Existing(T),
}

impl<T> Insertion<T> {
    /// Returns true if a new row was inserted.
    #[must_use]
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    /// Returns a reference to the row.
    #[must_use]
    pub fn get(&self) -> &T {
        match self {
            Self::Created(value) | Self::Existing(value) => value,
        }
    }

    /// Returns the row.
    #[must_use]
    pub fn into_inner(self) -> T {
        match self {
            Self::Created(value) | Self::Existing(value) => value,
        }
    }
}

/// Repository for RFQ aggregates.
#[async_trait]
pub trait RfqRepository: Send + Sync + fmt::Debug {
    /// Creates a draft RFQ and assigns its id.
    async fn create(&self, message_text: &str, created_by: Option<UserId>)
    -> RepositoryResult<Rfq>;

    /// Gets an RFQ by ID.
    ///
    /// Returns `None` if the RFQ does not exist.
    async fn get(&self, id: RfqId) -> RepositoryResult<Option<Rfq>>;

    /// Stores a mutated RFQ.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::VersionConflict` if the stored version is
    /// not `expected_version`, and `RepositoryError::NotFound` if the RFQ
    /// does not exist.
    async fn update(&self, rfq: &Rfq, expected_version: u64) -> RepositoryResult<()>;

    /// Counts all RFQs.
    async fn count(&self) -> RepositoryResult<u64>;
}

/// Repository for send attempts.
#[async_trait]
pub trait SendAttemptRepository: Send + Sync + fmt::Debug {
    /// Inserts an attempt unless one with the same `(rfq_id, idempotency_key)`
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Duplicate` if `retry_of_attempt_id` already
    /// has a successor with a different key.
    async fn insert_if_absent(
        &self,
        new: NewSendAttempt,
    ) -> RepositoryResult<Insertion<SendAttempt>>;

    /// Gets an attempt by ID.
    async fn get(&self, id: AttemptId) -> RepositoryResult<Option<SendAttempt>>;

    /// Finds the attempt with the given key for an RFQ.
    async fn find_by_key(
        &self,
        rfq_id: RfqId,
        key: &IdempotencyKey,
    ) -> RepositoryResult<Option<SendAttempt>>;

    /// Lists the attempts of an RFQ in creation order.
    async fn find_by_rfq(&self, rfq_id: RfqId) -> RepositoryResult<Vec<SendAttempt>>;

    /// Finds the retry successor of an attempt.
    async fn find_successor(&self, id: AttemptId) -> RepositoryResult<Option<SendAttempt>>;

    /// Lists attempts in a status, oldest first.
    async fn find_by_status(
        &self,
        status: SendStatus,
        limit: usize,
    ) -> RepositoryResult<Vec<SendAttempt>>;

    /// Stores a mutated attempt.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::VersionConflict` if the stored version is
    /// not `expected_version`.
    async fn update(&self, attempt: &SendAttempt, expected_version: u64) -> RepositoryResult<()>;
}

/// Append-only timeline storage.
///
/// Rows are never updated or deleted.
#[async_trait]
pub trait TimelineEventStore: Send + Sync + fmt::Debug {
    /// Appends an event unless one with the same idempotency key exists.
    ///
    /// Events without a key are always inserted.
    async fn append_if_absent(
        &self,
        event: NewTimelineEvent,
    ) -> RepositoryResult<Insertion<TimelineEvent>>;

    /// Gets an event by ID.
    async fn get(&self, id: EventId) -> RepositoryResult<Option<TimelineEvent>>;

    /// Finds the event stored under a key.
    async fn find_by_key(&self, key: &IdempotencyKey) -> RepositoryResult<Option<TimelineEvent>>;

    /// Lists events of a subject with one of `visibilities`, oldest first.
    async fn list_for_subject(
        &self,
        subject_type: &str,
        subject_id: i64,
        visibilities: &[Visibility],
    ) -> RepositoryResult<Vec<TimelineEvent>>;

    /// Lists the latest events with one of `visibilities`, newest first.
    async fn recent(
        &self,
        visibilities: &[Visibility],
        limit: usize,
    ) -> RepositoryResult<Vec<TimelineEvent>>;

    /// Lists events of a causal chain, oldest first.
    async fn list_by_correlation(
        &self,
        correlation_id: &CorrelationId,
    ) -> RepositoryResult<Vec<TimelineEvent>>;

    /// Counts all events.
    async fn count(&self) -> RepositoryResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_predicates() {
        assert!(RepositoryError::not_found("rfq", 1).is_not_found());
        assert!(RepositoryError::duplicate("send_attempt", 2).is_duplicate());
        assert!(RepositoryError::version_conflict("rfq", 1, 2, 3).is_version_conflict());
        assert!(!RepositoryError::query("boom").is_not_found());
    }

    #[test]
    fn error_display() {
        let err = RepositoryError::not_found("rfq", 42);
        assert_eq!(err.to_string(), "Entity not found: rfq with id 42");
    }

    #[test]
    fn insertion_accessors() {
        let created = Insertion::Created(5);
        let existing = Insertion::Existing(6);
        assert!(created.is_created());
        assert!(!existing.is_created());
        assert_eq!(*existing.get(), 6);
        assert_eq!(created.into_inner(), 5);
    }
}
