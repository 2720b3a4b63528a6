//! # Send-Attempt Ledger
//!
//! Owns the delivery attempts of every RFQ.
//!
//! Retries are new rows linked to their failed predecessor, never in-place
//! resets, so the full history stays readable. The ledger enforces:
//!
//! - lookup-before-insert on `(rfq_id, idempotency_key)` (storage does not)
//! - retry links only to a failed attempt of the same RFQ and target
//! - chain depth ≤ `max_retries + 1`
//! - at most one terminal status per attempt, duplicates absorbed
//!
//! Every created attempt and every status change is recorded on the
//! timeline with a key derived from the attempt id, so a crash between the
//! row write and the event append is repaired by simply repeating the call.

use crate::application::error::{ApplicationError, ApplicationResult};
use crate::application::services::timeline::TimelineLog;
use crate::domain::entities::{DispatchTarget, NewSendAttempt, OutcomeEffect, SendAttempt};
use crate::domain::errors::DomainError;
use crate::domain::events::{SendAttemptCreated, SendAttemptStatusUpdated};
use crate::domain::value_objects::{
    AttemptId, CorrelationId, IdempotencyKey, Operation, RfqId, SendStatus,
};
use crate::infrastructure::persistence::{
    Insertion, RfqRepository, SendAttemptRepository,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Optimistic-lock retries before a concurrent writer wins for good.
const MAX_WRITE_RETRIES: usize = 3;

/// Input of [`SendAttemptLedger::create_attempt`].
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRequest {
    /// The RFQ being dispatched.
    pub rfq_id: RfqId,
    /// Delivery target.
    pub target: DispatchTarget,
    /// Retry bound of the chain.
    pub max_retries: u32,
    /// Deterministic attempt key.
    pub idempotency_key: IdempotencyKey,
    /// Failed attempt this one retries.
    pub retry_of_attempt_id: Option<AttemptId>,
    /// Transport options.
    pub metadata: Value,
}

impl AttemptRequest {
    /// Creates the root attempt of a chain for a send request.
    #[must_use]
    pub fn root(rfq_id: RfqId, target: DispatchTarget, request_key: &str, max_retries: u32) -> Self {
        Self {
            rfq_id,
            target,
            max_retries,
            idempotency_key: attempt_key(rfq_id, target, request_key, 1),
            retry_of_attempt_id: None,
            metadata: Value::Object(serde_json::Map::new()),
        }
    }

    /// Sets transport options.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A reported transport outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Reported status, `sent`, `delivered` or `failed`.
    pub status: SendStatus,
    /// Provider message id.
    pub provider_message_id: Option<String>,
    /// Provider error text.
    pub error: Option<String>,
    /// Provider response data, merged into the attempt metadata.
    pub metadata: Option<Value>,
}

impl Outcome {
    /// A delivery confirmation.
    #[must_use]
    pub fn delivered(provider_message_id: impl Into<String>) -> Self {
        Self {
            status: SendStatus::Delivered,
            provider_message_id: Some(provider_message_id.into()),
            error: None,
            metadata: None,
        }
    }

    /// A delivery failure.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: SendStatus::Failed,
            provider_message_id: None,
            error: Some(error.into()),
            metadata: None,
        }
    }

    /// Attaches provider response data.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Result of [`SendAttemptLedger::record_outcome`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedOutcome {
    /// The attempt after the report.
    pub attempt: SendAttempt,
    /// Whether the report changed anything.
    pub effect: OutcomeEffect,
}

/// Effective state of one delivery target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    /// The latest attempt is queued or sent.
    Pending,
    /// The latest attempt was delivered.
    Delivered,
    /// The latest attempt failed and the chain may still grow.
    RetryPending,
    /// The latest attempt failed with the retry budget spent.
    Exhausted,
}

/// Outcome of one target, decided by the latest attempt of its chain.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetOutcome {
    /// The target.
    pub target: DispatchTarget,
    /// Latest attempt.
    pub attempt_id: AttemptId,
    /// Status of the latest attempt.
    pub status: SendStatus,
    /// Depth of the latest attempt.
    pub chain_depth: u32,
    /// Effective state.
    pub state: TargetState,
}

/// RFQ-level delivery verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverallOutcome {
    /// No attempt was ever created.
    NoAttempts,
    /// Some target is still pending or retrying.
    InProgress,
    /// Every target delivered.
    AllDelivered,
    /// At least one target failed with its retry budget spent.
    Exhausted,
}

/// Aggregated delivery state of an RFQ.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelOutcome {
    /// The RFQ.
    pub rfq_id: RfqId,
    /// One entry per target, in target order.
    pub targets: Vec<TargetOutcome>,
    /// Verdict.
    pub overall: OverallOutcome,
}

impl ChannelOutcome {
    /// Returns the targets in a given state.
    pub fn in_state(&self, state: TargetState) -> impl Iterator<Item = &TargetOutcome> {
        self.targets.iter().filter(move |t| t.state == state)
    }
}

/// Key of the root attempt (`attempt_no = 1`) or of a later position
/// created from a send request.
#[must_use]
pub fn attempt_key(
    rfq_id: RfqId,
    target: DispatchTarget,
    request_key: &str,
    attempt_no: u32,
) -> IdempotencyKey {
    IdempotencyKey::resolve(&Operation::SendAttempt {
        rfq_id,
        channel: target.channel,
        counterparty_id: target.counterparty_id,
        request_key,
        attempt_no,
    })
}

/// Key of the retry successor of `failed`.
#[must_use]
pub fn retry_key(failed: &SendAttempt) -> IdempotencyKey {
    IdempotencyKey::resolve(&Operation::RetryAttempt {
        rfq_id: failed.rfq_id(),
        channel: failed.channel(),
        counterparty_id: failed.target().counterparty_id,
        retry_of: failed.id(),
        attempt_no: failed.chain_depth().saturating_add(1),
    })
}

/// Send-attempt ledger service.
#[derive(Debug, Clone)]
pub struct SendAttemptLedger {
    rfqs: Arc<dyn RfqRepository>,
    attempts: Arc<dyn SendAttemptRepository>,
    timeline: TimelineLog,
}

impl SendAttemptLedger {
    /// Creates a ledger.
    #[must_use]
    pub fn new(
        rfqs: Arc<dyn RfqRepository>,
        attempts: Arc<dyn SendAttemptRepository>,
        timeline: TimelineLog,
    ) -> Self {
        Self {
            rfqs,
            attempts,
            timeline,
        }
    }

    /// Gets an attempt.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` if the attempt does not exist.
    pub async fn get(&self, attempt_id: AttemptId) -> ApplicationResult<SendAttempt> {
        self.attempts
            .get(attempt_id)
            .await?
            .ok_or_else(|| DomainError::not_found("send_attempt", attempt_id).into())
    }

    /// Lists the attempts of an RFQ in creation order.
    ///
    /// # Errors
    ///
    /// Returns `ApplicationError::Repository` on storage failure.
    pub async fn list(&self, rfq_id: RfqId) -> ApplicationResult<Vec<SendAttempt>> {
        Ok(self.attempts.find_by_rfq(rfq_id).await?)
    }

    /// Creates an attempt, or returns the one already stored under the key.
    ///
    /// # Errors
    ///
    /// - `DomainError::NotFound` - the RFQ or the retried attempt is missing
    /// - `DomainError::RetryChainConflict` - the retried attempt belongs to
    ///   another RFQ or target, is not failed, already has a successor, or
    ///   has a different `max_retries`
    /// - `DomainError::RetryBudgetExceeded` - the chain would exceed
    ///   `max_retries + 1` attempts
    /// - `DomainError::InvalidArgument` - blank key
    pub async fn create_attempt(
        &self,
        request: AttemptRequest,
        correlation_id: &CorrelationId,
    ) -> ApplicationResult<Insertion<SendAttempt>> {
        if request.idempotency_key.is_blank() {
            return Err(DomainError::invalid_argument("attempt idempotency_key must not be blank").into());
        }
        if self.rfqs.get(request.rfq_id).await?.is_none() {
            return Err(DomainError::not_found("rfq", request.rfq_id).into());
        }

        // A replayed call must see its own row before the chain checks,
        // which the parent may no longer pass (it has a successor now).
        if let Some(existing) = self
            .attempts
            .find_by_key(request.rfq_id, &request.idempotency_key)
            .await?
        {
            debug!(attempt_id = %existing.id(), key = %existing.idempotency_key(), "attempt reused");
            self.record_created(&existing, correlation_id).await?;
            return Ok(Insertion::Existing(existing));
        }

        let chain_depth = match request.retry_of_attempt_id {
            None => 1,
            Some(parent_id) => self.check_retry_link(&request, parent_id).await?,
        };

        let new = NewSendAttempt {
            rfq_id: request.rfq_id,
            target: request.target,
            idempotency_key: request.idempotency_key,
            retry_of_attempt_id: request.retry_of_attempt_id,
            chain_depth,
            max_retries: request.max_retries,
            metadata: request.metadata,
        };
        let inserted = self.attempts.insert_if_absent(new).await.map_err(|e| {
            if e.is_duplicate() {
                ApplicationError::from(DomainError::retry_chain_conflict(e.to_string()))
            } else {
                e.into()
            }
        })?;

        let attempt = inserted.get();
        if inserted.is_created() {
            info!(
                attempt_id = %attempt.id(),
                rfq_id = %attempt.rfq_id(),
                target = %attempt.target(),
                chain_depth = attempt.chain_depth(),
                "send attempt created"
            );
        }
        self.record_created(attempt, correlation_id).await?;
        Ok(inserted)
    }

    /// Creates the retry successor of a failed attempt. The successor
    /// inherits target, retry bound and transport options.
    ///
    /// # Errors
    ///
    /// Same as [`create_attempt`](Self::create_attempt).
    pub async fn create_retry(
        &self,
        failed: &SendAttempt,
        correlation_id: &CorrelationId,
    ) -> ApplicationResult<Insertion<SendAttempt>> {
        let request = AttemptRequest {
            rfq_id: failed.rfq_id(),
            target: failed.target(),
            max_retries: failed.max_retries(),
            idempotency_key: retry_key(failed),
            retry_of_attempt_id: Some(failed.id()),
            metadata: failed.metadata().clone(),
        };
        self.create_attempt(request, correlation_id).await
    }

    /// Moves a queued attempt to `sent` for exactly one worker.
    ///
    /// Returns `None` if the attempt is no longer queued or another worker
    /// claimed it first.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` if the attempt does not exist.
    pub async fn claim(
        &self,
        attempt_id: AttemptId,
        correlation_id: &CorrelationId,
    ) -> ApplicationResult<Option<SendAttempt>> {
        let mut attempt = self.get(attempt_id).await?;
        if attempt.status() != SendStatus::Queued {
            debug!(%attempt_id, status = %attempt.status(), "attempt not claimable");
            return Ok(None);
        }

        let expected = attempt.version();
        attempt.claim()?;
        match self.attempts.update(&attempt, expected).await {
            Ok(()) => {}
            Err(e) if e.is_version_conflict() => {
                debug!(%attempt_id, "attempt claimed by another worker");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        self.record_status(&attempt, correlation_id).await?;
        Ok(Some(attempt))
    }

    /// Stores the provider message id of an attempt the provider accepted
    /// but has not delivered yet. The attempt stays `sent`.
    ///
    /// # Errors
    ///
    /// - `DomainError::NotFound` - unknown attempt
    /// - `DomainError::InvalidArgument` - the attempt is not `sent`
    pub async fn acknowledge(
        &self,
        attempt_id: AttemptId,
        provider_message_id: String,
        metadata: Option<Value>,
    ) -> ApplicationResult<SendAttempt> {
        for _ in 0..MAX_WRITE_RETRIES {
            let mut attempt = self.get(attempt_id).await?;
            let expected = attempt.version();
            attempt.acknowledge(provider_message_id.clone(), metadata.clone())?;
            match self.attempts.update(&attempt, expected).await {
                Ok(()) => {
                    debug!(%attempt_id, provider_message_id = ?attempt.provider_message_id(), "attempt acknowledged");
                    return Ok(attempt);
                }
                Err(e) if e.is_version_conflict() => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(write_contention("send_attempt", attempt_id))
    }

    /// Records a transport outcome.
    ///
    /// Reporting the status the attempt already has is a no-op
    /// ([`OutcomeEffect::Duplicate`]).
    ///
    /// # Errors
    ///
    /// - `DomainError::ConflictingOutcome` - a different terminal status was
    ///   already recorded
    /// - `DomainError::AttemptAlreadyTerminal` - a non-terminal status was
    ///   reported for a terminal attempt
    /// - `DomainError::InvalidArgument` - `queued` was reported
    /// - `DomainError::NotFound` - unknown attempt
    pub async fn record_outcome(
        &self,
        attempt_id: AttemptId,
        outcome: Outcome,
        correlation_id: &CorrelationId,
    ) -> ApplicationResult<RecordedOutcome> {
        for _ in 0..MAX_WRITE_RETRIES {
            let mut attempt = self.get(attempt_id).await?;
            let expected = attempt.version();
            let effect = match attempt.apply_outcome(
                outcome.status,
                outcome.provider_message_id.clone(),
                outcome.error.clone(),
                outcome.metadata.clone(),
            ) {
                Ok(effect) => effect,
                Err(e @ DomainError::ConflictingOutcome { .. }) => {
                    error!(
                        %attempt_id,
                        rfq_id = %attempt.rfq_id(),
                        stored = %attempt.status(),
                        reported = %outcome.status,
                        "conflicting outcome reported"
                    );
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            };

            if effect == OutcomeEffect::Duplicate {
                debug!(%attempt_id, status = %attempt.status(), "duplicate outcome absorbed");
                self.record_status(&attempt, correlation_id).await?;
                return Ok(RecordedOutcome { attempt, effect });
            }

            match self.attempts.update(&attempt, expected).await {
                Ok(()) => {
                    info!(
                        %attempt_id,
                        rfq_id = %attempt.rfq_id(),
                        status = %attempt.status(),
                        error = ?attempt.error(),
                        "attempt outcome recorded"
                    );
                    self.record_status(&attempt, correlation_id).await?;
                    return Ok(RecordedOutcome { attempt, effect });
                }
                Err(e) if e.is_version_conflict() => {
                    debug!(%attempt_id, "attempt changed concurrently, reapplying outcome");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(write_contention("send_attempt", attempt_id))
    }

    /// Records an outcome correlated by the attempt key instead of its id.
    ///
    /// # Errors
    ///
    /// Same as [`record_outcome`](Self::record_outcome).
    pub async fn record_outcome_by_key(
        &self,
        rfq_id: RfqId,
        key: &IdempotencyKey,
        outcome: Outcome,
        correlation_id: &CorrelationId,
    ) -> ApplicationResult<RecordedOutcome> {
        let attempt = self
            .attempts
            .find_by_key(rfq_id, key)
            .await?
            .ok_or_else(|| DomainError::not_found("send_attempt", key))?;
        self.record_outcome(attempt.id(), outcome, correlation_id).await
    }

    /// Lists attempts still waiting for a worker, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `ApplicationError::Repository` on storage failure.
    pub async fn queued(&self, limit: usize) -> ApplicationResult<Vec<SendAttempt>> {
        Ok(self.attempts.find_by_status(SendStatus::Queued, limit).await?)
    }

    /// Aggregates the delivery state of an RFQ. For each target the most
    /// recently created attempt decides.
    ///
    /// # Errors
    ///
    /// Returns `ApplicationError::Repository` on storage failure.
    pub async fn aggregate_outcome(&self, rfq_id: RfqId) -> ApplicationResult<ChannelOutcome> {
        let attempts = self.attempts.find_by_rfq(rfq_id).await?;
        Ok(aggregate(rfq_id, &attempts))
    }

    async fn check_retry_link(
        &self,
        request: &AttemptRequest,
        parent_id: AttemptId,
    ) -> ApplicationResult<u32> {
        let parent = self
            .attempts
            .get(parent_id)
            .await?
            .ok_or_else(|| DomainError::not_found("send_attempt", parent_id))?;

        if parent.rfq_id() != request.rfq_id || parent.target() != request.target {
            return Err(DomainError::retry_chain_conflict(format!(
                "attempt {parent_id} belongs to rfq {} target {}",
                parent.rfq_id(),
                parent.target()
            ))
            .into());
        }
        if parent.status() != SendStatus::Failed {
            return Err(DomainError::retry_chain_conflict(format!(
                "attempt {parent_id} is {}, only failed attempts can be retried",
                parent.status()
            ))
            .into());
        }

        // The root fixes the bound for the whole chain.
        if request.max_retries != parent.max_retries() {
            return Err(DomainError::retry_chain_conflict(format!(
                "attempt {parent_id} allows {} retries, request asks for {}",
                parent.max_retries(),
                request.max_retries
            ))
            .into());
        }

        let depth = parent.chain_depth().saturating_add(1);
        if depth > parent.max_retries().saturating_add(1) {
            warn!(
                attempt_id = %parent_id,
                rfq_id = %request.rfq_id,
                max_retries = parent.max_retries(),
                "retry budget exceeded"
            );
            return Err(DomainError::RetryBudgetExceeded {
                attempt_id: parent_id,
                max_retries: parent.max_retries(),
            }
            .into());
        }
        Ok(depth)
    }

    async fn record_created(
        &self,
        attempt: &SendAttempt,
        correlation_id: &CorrelationId,
    ) -> ApplicationResult<()> {
        let payload = SendAttemptCreated {
            attempt_id: attempt.id(),
            rfq_id: attempt.rfq_id(),
            channel: attempt.channel(),
            counterparty_id: attempt.target().counterparty_id,
            retry_of_attempt_id: attempt.retry_of_attempt_id(),
            idempotency_key: attempt.idempotency_key().clone(),
        };
        let key = IdempotencyKey::resolve(&Operation::AttemptCreated {
            attempt_id: attempt.id(),
        });
        self.timeline
            .emit_rfq(&payload, attempt.rfq_id().get(), correlation_id, key, None)
            .await?;
        Ok(())
    }

    async fn record_status(
        &self,
        attempt: &SendAttempt,
        correlation_id: &CorrelationId,
    ) -> ApplicationResult<()> {
        let payload = SendAttemptStatusUpdated {
            attempt_id: attempt.id(),
            rfq_id: attempt.rfq_id(),
            channel: attempt.channel(),
            status: attempt.status(),
            provider_message_id: attempt.provider_message_id().map(str::to_string),
            error: attempt.error().map(str::to_string),
        };
        let key = IdempotencyKey::resolve(&Operation::AttemptStatus {
            attempt_id: attempt.id(),
            status: attempt.status(),
        });
        self.timeline
            .emit_rfq(&payload, attempt.rfq_id().get(), correlation_id, key, None)
            .await?;
        Ok(())
    }
}

fn aggregate(rfq_id: RfqId, attempts: &[SendAttempt]) -> ChannelOutcome {
    let mut order: Vec<DispatchTarget> = Vec::new();
    let mut latest: HashMap<DispatchTarget, &SendAttempt> = HashMap::new();
    for attempt in attempts {
        let target = attempt.target();
        match latest.get(&target) {
            None => {
                order.push(target);
                latest.insert(target, attempt);
            }
            Some(current) if attempt.id() > current.id() => {
                latest.insert(target, attempt);
            }
            Some(_) => {}
        }
    }

    let targets: Vec<TargetOutcome> = order
        .into_iter()
        .filter_map(|target| latest.get(&target).copied())
        .map(|tip| TargetOutcome {
            target: tip.target(),
            attempt_id: tip.id(),
            status: tip.status(),
            chain_depth: tip.chain_depth(),
            state: target_state(tip),
        })
        .collect();

    let overall = if targets.is_empty() {
        OverallOutcome::NoAttempts
    } else if targets.iter().any(|t| t.state == TargetState::Exhausted) {
        OverallOutcome::Exhausted
    } else if targets.iter().all(|t| t.state == TargetState::Delivered) {
        OverallOutcome::AllDelivered
    } else {
        OverallOutcome::InProgress
    };

    ChannelOutcome {
        rfq_id,
        targets,
        overall,
    }
}

fn target_state(tip: &SendAttempt) -> TargetState {
    match tip.status() {
        SendStatus::Queued | SendStatus::Sent => TargetState::Pending,
        SendStatus::Delivered => TargetState::Delivered,
        SendStatus::Failed if tip.has_retry_budget() => TargetState::RetryPending,
        SendStatus::Failed => TargetState::Exhausted,
    }
}

fn write_contention(entity: &str, id: impl std::fmt::Display) -> ApplicationError {
    ApplicationError::internal(format!(
        "{entity} {id} kept changing after {MAX_WRITE_RETRIES} attempts"
    ))
}
