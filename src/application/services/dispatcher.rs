//! # RFQ Dispatcher
//!
//! Inbound surface of the dispatch core: send requests, transport
//! callbacks, award and cancellation.
//!
//! A send request creates (or, by key, reuses) one root attempt per
//! target, moves the RFQ `draft -> sent`, records `RFQ_SEND_REQUESTED` and
//! hands the queued attempts to the worker queue. Outcomes reported later,
//! by a worker or by a provider callback, are settled here: a failed
//! attempt with budget left gets its retry successor, and an exhausted
//! target fails the RFQ.

use crate::application::error::ApplicationResult;
use crate::application::services::ledger::{
    AttemptRequest, ChannelOutcome, Outcome, OverallOutcome, RecordedOutcome, SendAttemptLedger,
};
use crate::application::services::pool::{DispatchJob, DispatchQueue};
use crate::application::services::state_machine::{
    RfqStateMachine, Transition, TransitionContext,
};
use crate::application::services::timeline::TimelineLog;
use crate::config::DispatchConfig;
use crate::domain::entities::{DispatchTarget, OutcomeEffect, Rfq, SendAttempt};
use crate::domain::errors::DomainError;
use crate::domain::events::{RfqAwarded, RfqSendRequested};
use crate::domain::value_objects::{
    AttemptId, CorrelationId, IdempotencyKey, Operation, QuoteId, RfqId, RfqStatus, SendStatus,
    UserId,
};
use crate::infrastructure::persistence::{RfqRepository, SendAttemptRepository};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Failure reason of an RFQ sent to no target.
pub const NO_VALID_CHANNEL: &str = "no_valid_channel";

/// Failure reason of an RFQ whose target ran out of retries.
pub const RETRY_BUDGET_EXHAUSTED: &str = "retry_budget_exhausted";

/// Request to send an RFQ.
#[derive(Debug, Clone, PartialEq)]
pub struct SendRequest {
    /// The RFQ.
    pub rfq_id: RfqId,
    /// Channels and counterparties to reach.
    pub targets: Vec<DispatchTarget>,
    /// Replacement text, only allowed while the RFQ is a draft.
    pub message_text: Option<String>,
    /// Caller key making the request replay-safe.
    pub request_key: Option<String>,
    /// Retry bound, the configured default when absent.
    pub max_retries: Option<u32>,
    /// Transport options copied onto every attempt.
    pub metadata: Option<Value>,
    /// Requesting user.
    pub actor: Option<UserId>,
    /// Causal chain of the request.
    pub correlation_id: CorrelationId,
}

impl SendRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(rfq_id: RfqId, targets: Vec<DispatchTarget>, correlation_id: CorrelationId) -> Self {
        Self {
            rfq_id,
            targets,
            message_text: None,
            request_key: None,
            max_retries: None,
            metadata: None,
            actor: None,
            correlation_id,
        }
    }

    /// Sets the message text.
    #[must_use]
    pub fn with_message_text(mut self, text: impl Into<String>) -> Self {
        self.message_text = Some(text.into());
        self
    }

    /// Sets the request key.
    #[must_use]
    pub fn with_request_key(mut self, key: impl Into<String>) -> Self {
        self.request_key = Some(key.into());
        self
    }

    /// Sets the retry bound.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets transport options.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Sets the requesting user.
    #[must_use]
    pub fn with_actor(mut self, actor: UserId) -> Self {
        self.actor = Some(actor);
        self
    }
}

/// Result of a send request.
#[derive(Debug, Clone, PartialEq)]
pub struct SendReceipt {
    /// The RFQ after the request.
    pub rfq: Rfq,
    /// One attempt per distinct target, new or reused.
    pub attempts: Vec<SendAttempt>,
    /// How many of them this call created.
    pub created: usize,
    /// Attempts handed to the worker queue.
    pub enqueued: Vec<AttemptId>,
}

/// How a callback names its attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptRef {
    /// By id.
    Id(AttemptId),
    /// By the attempt key within an RFQ.
    Key {
        /// The RFQ.
        rfq_id: RfqId,
        /// Attempt key.
        idempotency_key: IdempotencyKey,
    },
}

/// Asynchronous delivery report from a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportCallback {
    /// The attempt reported on.
    pub attempt: AttemptRef,
    /// Reported outcome.
    pub outcome: Outcome,
    /// Causal chain.
    pub correlation_id: CorrelationId,
}

/// What settling an outcome changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    /// Aggregated delivery state after the outcome.
    pub outcome: ChannelOutcome,
    /// Retry successor scheduled for a failed attempt.
    pub retry: Option<SendAttempt>,
    /// True if this settlement moved the RFQ to `failed`.
    pub rfq_failed: bool,
}

/// Result of a transport callback.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackReport {
    /// The attempt after the callback.
    pub attempt: SendAttempt,
    /// Whether the callback changed the attempt.
    pub effect: OutcomeEffect,
    /// Follow-up, when the callback finished the attempt.
    pub settlement: Option<Settlement>,
}

/// Dispatch core facade.
#[derive(Debug, Clone)]
pub struct RfqDispatcher {
    rfqs: Arc<dyn RfqRepository>,
    ledger: SendAttemptLedger,
    state_machine: RfqStateMachine,
    timeline: TimelineLog,
    config: DispatchConfig,
    queue: Option<DispatchQueue>,
}

impl RfqDispatcher {
    /// Wires the dispatcher over its storage ports.
    #[must_use]
    pub fn new(
        rfqs: Arc<dyn RfqRepository>,
        attempts: Arc<dyn SendAttemptRepository>,
        timeline: TimelineLog,
        config: DispatchConfig,
    ) -> Self {
        let ledger = SendAttemptLedger::new(Arc::clone(&rfqs), Arc::clone(&attempts), timeline.clone());
        let state_machine = RfqStateMachine::new(Arc::clone(&rfqs), attempts, timeline.clone());
        Self {
            rfqs,
            ledger,
            state_machine,
            timeline,
            config,
            queue: None,
        }
    }

    /// Hands queued attempts to a worker queue.
    #[must_use]
    pub fn with_queue(mut self, queue: DispatchQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Returns the ledger.
    #[inline]
    #[must_use]
    pub fn ledger(&self) -> &SendAttemptLedger {
        &self.ledger
    }

    /// Returns the state machine.
    #[inline]
    #[must_use]
    pub fn state_machine(&self) -> &RfqStateMachine {
        &self.state_machine
    }

    /// Returns the timeline log.
    #[inline]
    #[must_use]
    pub fn timeline(&self) -> &TimelineLog {
        &self.timeline
    }

    /// Returns the dispatch settings.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Creates a draft RFQ.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidArgument` for a blank message.
    pub async fn create_rfq(
        &self,
        message_text: &str,
        created_by: Option<UserId>,
    ) -> ApplicationResult<Rfq> {
        if message_text.trim().is_empty() {
            return Err(DomainError::invalid_argument("message_text must not be empty").into());
        }
        let rfq = self.rfqs.create(message_text, created_by).await?;
        info!(rfq_id = %rfq.id(), "rfq created");
        Ok(rfq)
    }

    /// Sends an RFQ to its targets.
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidTransition` - the RFQ is terminal
    /// - `DomainError::InvalidArgument` - blank text or request key, text
    ///   change after send, no target on a sent RFQ
    /// - `DomainError::NotFound` - unknown RFQ
    pub async fn request_send(&self, request: SendRequest) -> ApplicationResult<SendReceipt> {
        let rfq_id = request.rfq_id;
        let ctx = TransitionContext::new(request.actor, &request.correlation_id);
        let mut rfq = self.state_machine.get(rfq_id).await?;
        if rfq.is_terminal() {
            return Err(DomainError::invalid_transition(rfq.status(), RfqStatus::Sent).into());
        }

        let request_key = request.request_key.as_deref();
        let requested_key = IdempotencyKey::rfq_send_requested(rfq_id, request_key);
        if request_key.is_some_and(|k| k.trim().is_empty()) {
            return Err(DomainError::invalid_argument("request_key must not be blank").into());
        }
        if requested_key.len() > self.timeline.config().max_idempotency_key_len {
            return Err(DomainError::invalid_argument("request_key is too long").into());
        }

        if let Some(text) = &request.message_text
            && text != rfq.message_text()
        {
            let expected = rfq.version();
            rfq.set_message_text(text.clone())?;
            self.rfqs.update(&rfq, expected).await?;
        }
        if rfq.message_text().trim().is_empty() {
            return Err(DomainError::invalid_argument("message_text must not be empty").into());
        }

        let mut targets = request.targets.clone();
        let mut seen = HashSet::new();
        targets.retain(|t| seen.insert(*t));

        if targets.is_empty() {
            if rfq.status() == RfqStatus::Sent {
                return Err(DomainError::invalid_argument("send request has no targets").into());
            }
            warn!(%rfq_id, "no dispatch target, failing rfq");
            let failed = self
                .state_machine
                .transition_to_failed(rfq_id, NO_VALID_CHANNEL, ctx)
                .await?;
            return Ok(SendReceipt {
                rfq: failed.rfq,
                attempts: Vec::new(),
                created: 0,
                enqueued: Vec::new(),
            });
        }

        let max_retries = request.max_retries.unwrap_or(self.config.default_max_retries);
        let metadata = request
            .metadata
            .clone()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        let mut attempts = Vec::with_capacity(targets.len());
        let mut created = 0;
        for target in &targets {
            let attempt_request = AttemptRequest::root(
                rfq_id,
                *target,
                request_key.unwrap_or("none"),
                max_retries,
            )
            .with_metadata(metadata.clone());
            let inserted = self
                .ledger
                .create_attempt(attempt_request, &request.correlation_id)
                .await?;
            if inserted.is_created() {
                created += 1;
            }
            attempts.push(inserted.into_inner());
        }

        if rfq.status() == RfqStatus::Draft {
            rfq = self.state_machine.transition_to_sent(rfq_id, ctx).await?.rfq;
        }

        let payload = RfqSendRequested {
            rfq_id,
            channels: targets.iter().map(|t| t.channel).collect(),
            attempt_ids: attempts.iter().map(SendAttempt::id).collect(),
            message_length: rfq.message_text().chars().count(),
        };
        self.timeline
            .emit_rfq(&payload, rfq_id.get(), &request.correlation_id, requested_key, request.actor)
            .await?;

        let mut enqueued = Vec::new();
        for attempt in attempts.iter().filter(|a| a.status() == SendStatus::Queued) {
            if self
                .enqueue(attempt.id(), &request.correlation_id, None)
                .await
            {
                enqueued.push(attempt.id());
            }
        }

        info!(
            %rfq_id,
            targets = targets.len(),
            created,
            enqueued = enqueued.len(),
            "send requested"
        );
        Ok(SendReceipt {
            rfq,
            attempts,
            created,
            enqueued,
        })
    }

    /// Records a provider callback and settles its consequences.
    ///
    /// A report for an already-terminal attempt is absorbed; a contradicting
    /// terminal report is not. Settlement runs for every terminal attempt,
    /// replays included, so a callback replayed after a crash still
    /// schedules the retry the first delivery never got to.
    ///
    /// # Errors
    ///
    /// - `DomainError::ConflictingOutcome` - contradicting terminal report
    /// - `DomainError::NotFound` - unknown attempt
    pub async fn handle_callback(
        &self,
        callback: TransportCallback,
    ) -> ApplicationResult<CallbackReport> {
        let correlation_id = &callback.correlation_id;
        let recorded = match &callback.attempt {
            AttemptRef::Id(id) => {
                self.ledger
                    .record_outcome(*id, callback.outcome.clone(), correlation_id)
                    .await
            }
            AttemptRef::Key {
                rfq_id,
                idempotency_key,
            } => {
                self.ledger
                    .record_outcome_by_key(
                        *rfq_id,
                        idempotency_key,
                        callback.outcome.clone(),
                        correlation_id,
                    )
                    .await
            }
        };

        let recorded = match recorded {
            Ok(recorded) => recorded,
            Err(e) if matches!(e.as_domain(), Some(DomainError::AttemptAlreadyTerminal { .. })) => {
                debug!(attempt = ?callback.attempt, error = %e, "late callback absorbed");
                let attempt = self.resolve(&callback.attempt).await?;
                RecordedOutcome {
                    attempt,
                    effect: OutcomeEffect::Duplicate,
                }
            }
            Err(e) => return Err(e),
        };

        let settlement = if recorded.attempt.is_terminal() {
            let delay = Duration::from_millis(self.config.retry_backoff_ms);
            Some(self.settle(&recorded.attempt, correlation_id, delay).await?)
        } else {
            None
        };

        Ok(CallbackReport {
            attempt: recorded.attempt,
            effect: recorded.effect,
            settlement,
        })
    }

    /// Awards a quote: `sent -> awarded` plus `RFQ_AWARDED`.
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidTransition` - not in `sent`, or awarded to
    ///   another quote
    /// - `DomainError::NotFound` - unknown RFQ
    pub async fn award(
        &self,
        rfq_id: RfqId,
        quote_id: QuoteId,
        actor: Option<UserId>,
        correlation_id: &CorrelationId,
    ) -> ApplicationResult<Transition> {
        let ctx = TransitionContext::new(actor, correlation_id);
        let transition = self
            .state_machine
            .transition_to_awarded(rfq_id, quote_id, ctx)
            .await?;

        let awarded_at = transition
            .rfq
            .awarded_at()
            .unwrap_or_else(|| transition.rfq.updated_at());
        let payload = RfqAwarded {
            rfq_id,
            quote_id,
            awarded_at,
        };
        let key = IdempotencyKey::resolve(&Operation::RfqAwarded { rfq_id });
        self.timeline
            .emit_rfq(&payload, rfq_id.get(), correlation_id, key, actor)
            .await?;
        Ok(transition)
    }

    /// Cancels an RFQ: `draft|sent -> failed`. Attempts in flight keep
    /// reporting into the ledger but can no longer move the RFQ.
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidTransition` - already awarded
    /// - `DomainError::InvalidArgument` - blank reason
    pub async fn cancel(
        &self,
        rfq_id: RfqId,
        reason: &str,
        actor: Option<UserId>,
        correlation_id: &CorrelationId,
    ) -> ApplicationResult<Transition> {
        if reason.trim().is_empty() {
            return Err(DomainError::invalid_argument("cancellation reason must not be empty").into());
        }
        let ctx = TransitionContext::new(actor, correlation_id);
        let transition = self
            .state_machine
            .transition_to_failed(rfq_id, reason, ctx)
            .await?;
        if transition.applied {
            info!(%rfq_id, reason, "rfq cancelled");
        }
        Ok(transition)
    }

    /// Follows up a finished attempt: schedules its retry successor while
    /// budget remains, and fails the RFQ once a target is exhausted.
    ///
    /// # Errors
    ///
    /// Propagates ledger and state machine errors.
    pub async fn settle(
        &self,
        attempt: &SendAttempt,
        correlation_id: &CorrelationId,
        retry_delay: Duration,
    ) -> ApplicationResult<Settlement> {
        let rfq_id = attempt.rfq_id();
        let rfq = self.state_machine.get(rfq_id).await?;

        let mut retry = None;
        if attempt.has_retry_budget() && !rfq.is_terminal() {
            let successor = self.ledger.create_retry(attempt, correlation_id).await?;
            let successor = successor.into_inner();
            if successor.status() == SendStatus::Queued {
                self.enqueue(successor.id(), correlation_id, Some(retry_delay))
                    .await;
            }
            debug!(
                attempt_id = %attempt.id(),
                retry_id = %successor.id(),
                chain_depth = successor.chain_depth(),
                "retry scheduled"
            );
            retry = Some(successor);
        }

        let outcome = self.ledger.aggregate_outcome(rfq_id).await?;
        let mut rfq_failed = false;
        if outcome.overall == OverallOutcome::Exhausted && !rfq.is_terminal() {
            let ctx = TransitionContext::new(None, correlation_id);
            match self
                .state_machine
                .transition_to_failed(rfq_id, RETRY_BUDGET_EXHAUSTED, ctx)
                .await
            {
                Ok(transition) => rfq_failed = transition.applied,
                // Awarded concurrently; the award stands.
                Err(e) if e.is_invalid_transition() => {
                    debug!(%rfq_id, "rfq finished before exhaustion was settled");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Settlement {
            outcome,
            retry,
            rfq_failed,
        })
    }

    async fn resolve(&self, attempt: &AttemptRef) -> ApplicationResult<SendAttempt> {
        match attempt {
            AttemptRef::Id(id) => self.ledger.get(*id).await,
            AttemptRef::Key {
                rfq_id,
                idempotency_key,
            } => self
                .ledger
                .list(*rfq_id)
                .await?
                .into_iter()
                .find(|a| a.idempotency_key() == idempotency_key)
                .ok_or_else(|| DomainError::not_found("send_attempt", idempotency_key).into()),
        }
    }

    // Returns false when no queue is attached or it is closed; the attempt
    // stays queued in storage and is picked up by recovery. Retries are
    // always handed over from a detached task so a worker never blocks on
    // its own full queue.
    async fn enqueue(
        &self,
        attempt_id: AttemptId,
        correlation_id: &CorrelationId,
        delay: Option<Duration>,
    ) -> bool {
        let Some(queue) = &self.queue else {
            return false;
        };
        let job = DispatchJob::new(attempt_id, correlation_id.clone());
        let result = match delay {
            None => queue.enqueue(job).await,
            Some(delay) => queue.enqueue_after(job, delay),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(%attempt_id, error = %e, "attempt not enqueued");
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::TimelineConfig;
    use crate::domain::events::TimelineEventType;
    use crate::domain::value_objects::{Channel, CounterpartyId, Role};
    use crate::infrastructure::persistence::in_memory::{
        InMemoryRfqRepository, InMemorySendAttemptRepository, InMemoryTimelineEventStore,
    };

    const EMAIL: DispatchTarget = DispatchTarget::new(Channel::Email, Some(CounterpartyId::new(1)));
    const WHATSAPP: DispatchTarget =
        DispatchTarget::new(Channel::WhatsApp, Some(CounterpartyId::new(2)));

    fn dispatcher() -> RfqDispatcher {
        let timeline = TimelineLog::new(
            Arc::new(InMemoryTimelineEventStore::new()),
            Arc::new(TimelineConfig::default()),
        );
        RfqDispatcher::new(
            Arc::new(InMemoryRfqRepository::new()),
            Arc::new(InMemorySendAttemptRepository::new()),
            timeline,
            DispatchConfig::default().with_retry_backoff_ms(0),
        )
    }

    fn corr() -> CorrelationId {
        CorrelationId::new("corr-dispatch")
    }

    async fn events(d: &RfqDispatcher, rfq_id: RfqId, event_type: TimelineEventType) -> usize {
        d.timeline()
            .list_for_subject("rfq", rfq_id.get(), Role::Financeiro)
            .await
            .unwrap()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }

    mod send {
        use super::*;

        #[tokio::test]
        async fn creates_attempts_and_sends() {
            let d = dispatcher();
            let rfq = d.create_rfq("Al 500t Dec", Some(UserId::new(1))).await.unwrap();
            let receipt = d
                .request_send(
                    SendRequest::new(rfq.id(), vec![EMAIL, WHATSAPP, EMAIL], corr())
                        .with_request_key("req-1")
                        .with_actor(UserId::new(1)),
                )
                .await
                .unwrap();

            assert_eq!(receipt.rfq.status(), RfqStatus::Sent);
            assert_eq!(receipt.attempts.len(), 2);
            assert_eq!(receipt.created, 2);
            assert!(receipt.enqueued.is_empty());
            assert!(receipt.attempts.iter().all(|a| a.max_retries() == 2));
            assert_eq!(events(&d, rfq.id(), TimelineEventType::RfqSendRequested).await, 1);
            assert_eq!(events(&d, rfq.id(), TimelineEventType::RfqSendAttemptCreated).await, 2);
            assert_eq!(events(&d, rfq.id(), TimelineEventType::RfqStateChanged).await, 1);
        }

        #[tokio::test]
        async fn replay_reuses_everything() {
            let d = dispatcher();
            let rfq = d.create_rfq("Al", None).await.unwrap();
            let request = SendRequest::new(rfq.id(), vec![EMAIL], corr()).with_request_key("req-1");
            let first = d.request_send(request.clone()).await.unwrap();
            let second = d.request_send(request).await.unwrap();

            assert_eq!(second.created, 0);
            assert_eq!(first.attempts[0].id(), second.attempts[0].id());
            assert_eq!(d.ledger().list(rfq.id()).await.unwrap().len(), 1);
            assert_eq!(events(&d, rfq.id(), TimelineEventType::RfqSendRequested).await, 1);
            assert_eq!(events(&d, rfq.id(), TimelineEventType::RfqStateChanged).await, 1);
        }

        #[tokio::test]
        async fn new_request_key_on_sent_rfq_adds_attempts() {
            let d = dispatcher();
            let rfq = d.create_rfq("Al", None).await.unwrap();
            d.request_send(SendRequest::new(rfq.id(), vec![EMAIL], corr()).with_request_key("a"))
                .await
                .unwrap();
            let second = d
                .request_send(SendRequest::new(rfq.id(), vec![EMAIL], corr()).with_request_key("b"))
                .await
                .unwrap();
            assert_eq!(second.created, 1);
            assert_eq!(d.ledger().list(rfq.id()).await.unwrap().len(), 2);
        }

        #[tokio::test]
        async fn no_targets_fails_draft() {
            let d = dispatcher();
            let rfq = d.create_rfq("Al", None).await.unwrap();
            let receipt = d
                .request_send(SendRequest::new(rfq.id(), vec![], corr()))
                .await
                .unwrap();
            assert_eq!(receipt.rfq.status(), RfqStatus::Failed);
            assert_eq!(receipt.rfq.failure_reason(), Some(NO_VALID_CHANNEL));
            assert!(receipt.rfq.sent_at().is_none());
        }

        #[tokio::test]
        async fn text_frozen_after_send() {
            let d = dispatcher();
            let rfq = d.create_rfq("Al", None).await.unwrap();
            let receipt = d
                .request_send(SendRequest::new(rfq.id(), vec![EMAIL], corr()).with_message_text("Al 10t"))
                .await
                .unwrap();
            assert_eq!(receipt.rfq.message_text(), "Al 10t");

            let err = d
                .request_send(
                    SendRequest::new(rfq.id(), vec![EMAIL], corr()).with_message_text("Cu 10t"),
                )
                .await
                .unwrap_err();
            assert!(err.is_validation());
        }

        #[tokio::test]
        async fn terminal_rfq_rejected() {
            let d = dispatcher();
            let rfq = d.create_rfq("Al", None).await.unwrap();
            d.cancel(rfq.id(), "client withdrew", None, &corr()).await.unwrap();
            let err = d
                .request_send(SendRequest::new(rfq.id(), vec![EMAIL], corr()))
                .await
                .unwrap_err();
            assert!(err.is_invalid_transition());
        }

        #[tokio::test]
        async fn blank_inputs_rejected() {
            let d = dispatcher();
            assert!(d.create_rfq("  ", None).await.unwrap_err().is_validation());
            let rfq = d.create_rfq("Al", None).await.unwrap();
            let err = d
                .request_send(SendRequest::new(rfq.id(), vec![EMAIL], corr()).with_request_key(" "))
                .await
                .unwrap_err();
            assert!(err.is_validation());
            let err = d
                .request_send(
                    SendRequest::new(rfq.id(), vec![EMAIL], corr()).with_request_key("k".repeat(200)),
                )
                .await
                .unwrap_err();
            assert!(err.is_validation());
            assert!(d.ledger().list(rfq.id()).await.unwrap().is_empty());
        }
    }

    mod callbacks {
        use super::*;

        async fn sent(d: &RfqDispatcher, max_retries: u32) -> (RfqId, SendAttempt) {
            let rfq = d.create_rfq("Al", None).await.unwrap();
            let receipt = d
                .request_send(SendRequest::new(rfq.id(), vec![EMAIL], corr()).with_max_retries(max_retries))
                .await
                .unwrap();
            (rfq.id(), receipt.attempts[0].clone())
        }

        fn callback(attempt: &SendAttempt, outcome: Outcome) -> TransportCallback {
            TransportCallback {
                attempt: AttemptRef::Id(attempt.id()),
                outcome,
                correlation_id: corr(),
            }
        }

        #[tokio::test]
        async fn failure_schedules_retry() {
            let d = dispatcher();
            let (rfq_id, attempt) = sent(&d, 1).await;
            let report = d
                .handle_callback(callback(&attempt, Outcome::failed("bounced")))
                .await
                .unwrap();
            let settlement = report.settlement.unwrap();
            let retry = settlement.retry.unwrap();
            assert_eq!(retry.retry_of_attempt_id(), Some(attempt.id()));
            assert!(!settlement.rfq_failed);
            assert_eq!(settlement.outcome.overall, OverallOutcome::InProgress);

            let report = d
                .handle_callback(callback(&retry, Outcome::failed("bounced")))
                .await
                .unwrap();
            let settlement = report.settlement.unwrap();
            assert!(settlement.retry.is_none());
            assert!(settlement.rfq_failed);
            let rfq = d.state_machine().get(rfq_id).await.unwrap();
            assert_eq!(rfq.status(), RfqStatus::Failed);
            assert_eq!(rfq.failure_reason(), Some(RETRY_BUDGET_EXHAUSTED));
        }

        #[tokio::test]
        async fn replayed_failure_schedules_missing_retry() {
            let d = dispatcher();
            let (rfq_id, attempt) = sent(&d, 1).await;
            // Outcome stored, process gone before the retry was created.
            d.ledger()
                .record_outcome(attempt.id(), Outcome::failed("bounced"), &corr())
                .await
                .unwrap();
            assert_eq!(d.ledger().list(rfq_id).await.unwrap().len(), 1);

            let report = d
                .handle_callback(callback(&attempt, Outcome::failed("bounced")))
                .await
                .unwrap();
            assert_eq!(report.effect, OutcomeEffect::Duplicate);
            let retry = report.settlement.unwrap().retry.unwrap();
            assert_eq!(retry.retry_of_attempt_id(), Some(attempt.id()));
            assert_eq!(retry.status(), SendStatus::Queued);

            let again = d
                .handle_callback(callback(&attempt, Outcome::failed("bounced")))
                .await
                .unwrap();
            assert_eq!(again.settlement.unwrap().retry.unwrap().id(), retry.id());
            assert_eq!(d.ledger().list(rfq_id).await.unwrap().len(), 2);
            assert_eq!(
                d.ledger().aggregate_outcome(rfq_id).await.unwrap().overall,
                OverallOutcome::InProgress
            );
        }

        #[tokio::test]
        async fn by_key_and_duplicates() {
            let d = dispatcher();
            let (rfq_id, attempt) = sent(&d, 2).await;
            let by_key = TransportCallback {
                attempt: AttemptRef::Key {
                    rfq_id,
                    idempotency_key: attempt.idempotency_key().clone(),
                },
                outcome: Outcome::delivered("m-1"),
                correlation_id: corr(),
            };
            let first = d.handle_callback(by_key.clone()).await.unwrap();
            assert_eq!(first.effect, OutcomeEffect::Applied);
            assert_eq!(
                first.settlement.unwrap().outcome.overall,
                OverallOutcome::AllDelivered
            );

            let again = d.handle_callback(by_key).await.unwrap();
            assert_eq!(again.effect, OutcomeEffect::Duplicate);
            let settlement = again.settlement.unwrap();
            assert!(settlement.retry.is_none());
            assert_eq!(settlement.outcome.overall, OverallOutcome::AllDelivered);

            // A late "sent" after delivery is absorbed.
            let late = Outcome {
                status: SendStatus::Sent,
                provider_message_id: None,
                error: None,
                metadata: None,
            };
            let late = d.handle_callback(callback(&attempt, late)).await.unwrap();
            assert_eq!(late.attempt.status(), SendStatus::Delivered);

            let conflict = d
                .handle_callback(callback(&attempt, Outcome::failed("x")))
                .await
                .unwrap_err();
            assert!(conflict.is_conflicting_outcome());
        }

        #[tokio::test]
        async fn late_outcome_never_resurrects() {
            let d = dispatcher();
            let (rfq_id, attempt) = sent(&d, 2).await;
            d.cancel(rfq_id, "client withdrew", None, &corr()).await.unwrap();

            let report = d
                .handle_callback(callback(&attempt, Outcome::failed("late")))
                .await
                .unwrap();
            assert_eq!(report.attempt.status(), SendStatus::Failed);
            let settlement = report.settlement.unwrap();
            assert!(settlement.retry.is_none());
            assert!(!settlement.rfq_failed);
            assert_eq!(d.state_machine().get(rfq_id).await.unwrap().status(), RfqStatus::Failed);
            assert_eq!(d.ledger().get(attempt.id()).await.unwrap().status(), SendStatus::Failed);
        }
    }

    mod award {
        use super::*;

        #[tokio::test]
        async fn award_emits_awarded_once() {
            let d = dispatcher();
            let rfq = d.create_rfq("Al", None).await.unwrap();
            d.request_send(SendRequest::new(rfq.id(), vec![EMAIL], corr()))
                .await
                .unwrap();
            let t = d.award(rfq.id(), QuoteId::new(5), None, &corr()).await.unwrap();
            assert_eq!(t.rfq.status(), RfqStatus::Awarded);
            d.award(rfq.id(), QuoteId::new(5), None, &corr()).await.unwrap();
            assert_eq!(events(&d, rfq.id(), TimelineEventType::RfqAwarded).await, 1);

            assert!(d.cancel(rfq.id(), "late", None, &corr()).await.unwrap_err().is_invalid_transition());
        }

        #[tokio::test]
        async fn draft_cannot_be_awarded() {
            let d = dispatcher();
            let rfq = d.create_rfq("Al", None).await.unwrap();
            let err = d.award(rfq.id(), QuoteId::new(5), None, &corr()).await.unwrap_err();
            assert!(err.is_invalid_transition());
            assert!(d.cancel(rfq.id(), " ", None, &corr()).await.unwrap_err().is_validation());
        }
    }
}
