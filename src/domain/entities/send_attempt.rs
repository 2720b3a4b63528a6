//! # Send Attempt
//!
//! One concrete try to deliver an RFQ to one target over one channel.
//!
//! Attempts are never reset: a failed attempt is followed by a new attempt
//! that points back at it through `retry_of_attempt_id`. Each attempt
//! stores its depth in the chain (root = 1), so the retry bound is checked
//! without walking the chain.
//!
//! ```text
//! #10 failed  ←  #14 failed  ←  #19 delivered
//! depth 1        depth 2        depth 3          (max_retries = 2)
//! ```

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::timestamp::Timestamp;
use crate::domain::value_objects::{
    AttemptId, Channel, CounterpartyId, IdempotencyKey, RfqId, SendStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Delivery target of an attempt: a channel, optionally narrowed to one
/// counterparty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DispatchTarget {
    /// Delivery channel.
    pub channel: Channel,
    /// Counterparty, if the channel addresses one.
    pub counterparty_id: Option<CounterpartyId>,
}

impl DispatchTarget {
    /// Creates a target.
    #[must_use]
    pub const fn new(channel: Channel, counterparty_id: Option<CounterpartyId>) -> Self {
        Self {
            channel,
            counterparty_id,
        }
    }
}

impl fmt::Display for DispatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.counterparty_id {
            Some(cp) => write!(f, "{}/{}", self.channel, cp),
            None => write!(f, "{}", self.channel),
        }
    }
}

/// Effect of applying an outcome report to an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeEffect {
    /// The attempt moved to the reported status.
    Applied,
    /// The attempt already had the reported status; nothing changed.
    Duplicate,
}

/// Input for a new attempt row; the id is assigned by storage.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSendAttempt {
    /// The RFQ being dispatched.
    pub rfq_id: RfqId,
    /// Delivery target.
    pub target: DispatchTarget,
    /// Deterministic attempt key.
    pub idempotency_key: IdempotencyKey,
    /// Predecessor in the retry chain.
    pub retry_of_attempt_id: Option<AttemptId>,
    /// Position in the retry chain, root = 1.
    pub chain_depth: u32,
    /// Retry bound of the chain.
    pub max_retries: u32,
    /// Initial transport metadata.
    pub metadata: Value,
}

/// A delivery attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendAttempt {
    id: AttemptId,
    rfq_id: RfqId,
    target: DispatchTarget,
    status: SendStatus,
    idempotency_key: IdempotencyKey,
    retry_of_attempt_id: Option<AttemptId>,
    chain_depth: u32,
    max_retries: u32,
    provider_message_id: Option<String>,
    error: Option<String>,
    metadata: Value,
    version: u64,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl SendAttempt {
    /// Materializes a queued attempt from its creation input.
    #[must_use]
    pub fn from_new(id: AttemptId, new: NewSendAttempt) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            rfq_id: new.rfq_id,
            target: new.target,
            status: SendStatus::Queued,
            idempotency_key: new.idempotency_key,
            retry_of_attempt_id: new.retry_of_attempt_id,
            chain_depth: new.chain_depth,
            max_retries: new.max_retries,
            provider_message_id: None,
            error: None,
            metadata: new.metadata,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates an attempt from stored parts (for reconstruction from storage).
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: AttemptId,
        rfq_id: RfqId,
        target: DispatchTarget,
        status: SendStatus,
        idempotency_key: IdempotencyKey,
        retry_of_attempt_id: Option<AttemptId>,
        chain_depth: u32,
        max_retries: u32,
        provider_message_id: Option<String>,
        error: Option<String>,
        metadata: Value,
        version: u64,
        created_at: Timestamp,
        updated_at: Timestamp,
    ) -> Self {
        Self {
            id,
            rfq_id,
            target,
            status,
            idempotency_key,
            retry_of_attempt_id,
            chain_depth,
            max_retries,
            provider_message_id,
            error,
            metadata,
            version,
            created_at,
            updated_at,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> AttemptId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn rfq_id(&self) -> RfqId {
        self.rfq_id
    }

    #[inline]
    #[must_use]
    pub fn target(&self) -> DispatchTarget {
        self.target
    }

    #[inline]
    #[must_use]
    pub fn channel(&self) -> Channel {
        self.target.channel
    }

    #[inline]
    #[must_use]
    pub fn status(&self) -> SendStatus {
        self.status
    }

    #[inline]
    #[must_use]
    pub fn idempotency_key(&self) -> &IdempotencyKey {
        &self.idempotency_key
    }

    #[inline]
    #[must_use]
    pub fn retry_of_attempt_id(&self) -> Option<AttemptId> {
        self.retry_of_attempt_id
    }

    #[inline]
    #[must_use]
    pub fn chain_depth(&self) -> u32 {
        self.chain_depth
    }

    #[inline]
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    #[inline]
    #[must_use]
    pub fn provider_message_id(&self) -> Option<&str> {
        self.provider_message_id.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn metadata(&self) -> &Value {
        &self.metadata
    }

    /// Returns the version for optimistic locking.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    #[must_use]
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    #[inline]
    #[must_use]
    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Returns true if the attempt reached `delivered` or `failed`.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns true if a retry successor may still be created.
    ///
    /// Only failed attempts are retried, and a chain holds at most
    /// `max_retries + 1` attempts.
    #[must_use]
    pub fn has_retry_budget(&self) -> bool {
        self.status == SendStatus::Failed && self.chain_depth <= self.max_retries
    }

    /// Claims a queued attempt for a worker.
    ///
    /// Transitions: Queued → Sent
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AttemptAlreadyTerminal` for terminal attempts
    /// and `DomainError::InvalidArgument` if the attempt was already claimed.
    pub fn claim(&mut self) -> DomainResult<()> {
        match self.status {
            SendStatus::Queued => {
                self.touch(SendStatus::Sent);
                Ok(())
            }
            SendStatus::Sent => Err(DomainError::invalid_argument(format!(
                "attempt {} already claimed",
                self.id
            ))),
            status => Err(DomainError::AttemptAlreadyTerminal {
                attempt_id: self.id,
                status,
            }),
        }
    }

    /// Stores the provider's acknowledgement of a claimed attempt whose
    /// final outcome arrives later by callback.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidArgument` unless the attempt is `sent`.
    pub fn acknowledge(
        &mut self,
        provider_message_id: String,
        metadata: Option<Value>,
    ) -> DomainResult<()> {
        if self.status != SendStatus::Sent {
            return Err(DomainError::invalid_argument(format!(
                "attempt {} is {}, only sent attempts can be acknowledged",
                self.id, self.status
            )));
        }
        self.provider_message_id = Some(provider_message_id);
        if let Some(extra) = metadata {
            merge_metadata(&mut self.metadata, extra);
        }
        self.touch(SendStatus::Sent);
        Ok(())
    }

    /// Applies a transport outcome.
    ///
    /// Reporting the status the attempt already has is absorbed as
    /// [`OutcomeEffect::Duplicate`].
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidArgument` if `reported` is `queued`
    /// - `DomainError::ConflictingOutcome` if the attempt is terminal with a
    ///   different terminal status
    /// - `DomainError::AttemptAlreadyTerminal` if a non-terminal status is
    ///   reported for a terminal attempt
    pub fn apply_outcome(
        &mut self,
        reported: SendStatus,
        provider_message_id: Option<String>,
        error: Option<String>,
        metadata: Option<Value>,
    ) -> DomainResult<OutcomeEffect> {
        if reported == SendStatus::Queued {
            return Err(DomainError::invalid_argument(
                "queued is not a reportable outcome",
            ));
        }
        if reported == self.status {
            return Ok(OutcomeEffect::Duplicate);
        }
        if self.status.is_terminal() {
            return Err(if reported.is_terminal() {
                DomainError::ConflictingOutcome {
                    attempt_id: self.id,
                    existing: self.status,
                    reported,
                }
            } else {
                DomainError::AttemptAlreadyTerminal {
                    attempt_id: self.id,
                    status: self.status,
                }
            });
        }
        if !self.status.can_transition_to(reported) {
            return Err(DomainError::invalid_argument(format!(
                "attempt {} cannot move {} -> {}",
                self.id, self.status, reported
            )));
        }

        if provider_message_id.is_some() {
            self.provider_message_id = provider_message_id;
        }
        if error.is_some() {
            self.error = error;
        }
        if let Some(extra) = metadata {
            merge_metadata(&mut self.metadata, extra);
        }
        self.touch(reported);
        Ok(OutcomeEffect::Applied)
    }

    fn touch(&mut self, status: SendStatus) {
        self.status = status;
        self.updated_at = Timestamp::now();
        self.version = self.version.saturating_add(1);
    }
}

fn merge_metadata(current: &mut Value, extra: Value) {
    match (current, extra) {
        (Value::Object(existing), Value::Object(incoming)) => existing.extend(incoming),
        (slot, incoming) => *slot = incoming,
    }
}

impl fmt::Display for SendAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Attempt({} rfq={} {} [{}] depth {}/{})",
            self.id,
            self.rfq_id,
            self.target,
            self.status,
            self.chain_depth,
            self.max_retries.saturating_add(1)
        )
    }
}
