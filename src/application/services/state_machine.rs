//! # RFQ State Machine
//!
//! Owns the RFQ lifecycle:
//!
//! ```text
//! draft ──► sent ──► awarded
//!   │         │
//!   └────┬────┘
//!        ▼
//!      failed
//! ```
//!
//! Every transition is a load, a domain mutation and an optimistic write
//! (`expected_version`), followed by exactly one `RFQ_STATE_CHANGED` event
//! keyed by `(rfq_id, from, to)`. Repeating a transition that already
//! happened re-appends the same event, which the timeline collapses, and
//! reports [`Transition::applied`] as `false`. Terminal states never move.

use crate::application::error::{ApplicationError, ApplicationResult};
use crate::application::services::timeline::TimelineLog;
use crate::domain::entities::Rfq;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::events::RfqStateChanged;
use crate::domain::value_objects::{
    CorrelationId, IdempotencyKey, QuoteId, RfqId, RfqStatus, UserId,
};
use crate::infrastructure::persistence::{RfqRepository, SendAttemptRepository};
use std::sync::Arc;
use tracing::{debug, info};

const MAX_WRITE_RETRIES: usize = 3;

/// Result of a transition request.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// The RFQ after the call.
    pub rfq: Rfq,
    /// Status the transition started from.
    pub from: RfqStatus,
    /// False if the RFQ was already in the target status.
    pub applied: bool,
}

/// Who asked for a transition, and in which causal chain.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext<'a> {
    /// Acting user, `None` for workers.
    pub actor: Option<UserId>,
    /// Correlation of the emitted event.
    pub correlation_id: &'a CorrelationId,
}

impl<'a> TransitionContext<'a> {
    /// Creates a context.
    #[must_use]
    pub const fn new(actor: Option<UserId>, correlation_id: &'a CorrelationId) -> Self {
        Self {
            actor,
            correlation_id,
        }
    }
}

/// RFQ lifecycle service.
#[derive(Debug, Clone)]
pub struct RfqStateMachine {
    rfqs: Arc<dyn RfqRepository>,
    attempts: Arc<dyn SendAttemptRepository>,
    timeline: TimelineLog,
}

impl RfqStateMachine {
    /// Creates a state machine.
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

    /// Loads an RFQ.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` if it does not exist.
    pub async fn get(&self, rfq_id: RfqId) -> ApplicationResult<Rfq> {
        self.rfqs
            .get(rfq_id)
            .await?
            .ok_or_else(|| DomainError::not_found("rfq", rfq_id).into())
    }

    /// `draft -> sent`. Requires at least one send attempt.
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidTransition` - the RFQ is terminal
    /// - `DomainError::InvalidArgument` - no attempt exists
    /// - `DomainError::NotFound` - unknown RFQ
    pub async fn transition_to_sent(
        &self,
        rfq_id: RfqId,
        ctx: TransitionContext<'_>,
    ) -> ApplicationResult<Transition> {
        if self.attempts.find_by_rfq(rfq_id).await?.is_empty() {
            // Report the missing RFQ first.
            self.get(rfq_id).await?;
            return Err(DomainError::invalid_argument(format!(
                "rfq {rfq_id} has no send attempts"
            ))
            .into());
        }
        self.apply(rfq_id, RfqStatus::Sent, ctx, |_| true, Rfq::mark_sent, |event| event)
            .await
    }

    /// `sent -> awarded`. Replaying with the awarded quote is a no-op,
    /// with another quote an `InvalidTransition`.
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidTransition` - not in `sent`
    /// - `DomainError::NotFound` - unknown RFQ
    pub async fn transition_to_awarded(
        &self,
        rfq_id: RfqId,
        quote_id: QuoteId,
        ctx: TransitionContext<'_>,
    ) -> ApplicationResult<Transition> {
        self.apply(
            rfq_id,
            RfqStatus::Awarded,
            ctx,
            |rfq| rfq.awarded_quote_id() == Some(quote_id),
            |rfq| rfq.mark_awarded(quote_id),
            |event| event.with_quote(quote_id),
        )
        .await
    }

    /// `draft|sent -> failed`.
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidTransition` - already awarded
    /// - `DomainError::NotFound` - unknown RFQ
    pub async fn transition_to_failed(
        &self,
        rfq_id: RfqId,
        reason: &str,
        ctx: TransitionContext<'_>,
    ) -> ApplicationResult<Transition> {
        self.apply(
            rfq_id,
            RfqStatus::Failed,
            ctx,
            |_| true,
            |rfq| rfq.mark_failed(reason),
            |event| event.with_reason(reason),
        )
        .await
    }

    async fn apply<R, M, E>(
        &self,
        rfq_id: RfqId,
        to: RfqStatus,
        ctx: TransitionContext<'_>,
        is_replay: R,
        mutate: M,
        describe: E,
    ) -> ApplicationResult<Transition>
    where
        R: Fn(&Rfq) -> bool + Send + Sync,
        M: Fn(&mut Rfq) -> DomainResult<()> + Send + Sync,
        E: Fn(RfqStateChanged) -> RfqStateChanged + Send + Sync,
    {
        for _ in 0..MAX_WRITE_RETRIES {
            let mut rfq = self.get(rfq_id).await?;

            if rfq.status() == to {
                if !is_replay(&rfq) {
                    return Err(DomainError::invalid_transition(to, to).into());
                }
                let from = replayed_from(&rfq);
                debug!(%rfq_id, %from, %to, "transition already applied");
                self.emit(&rfq, from, ctx, &describe).await?;
                return Ok(Transition {
                    rfq,
                    from,
                    applied: false,
                });
            }

            let from = rfq.status();
            let expected = rfq.version();
            mutate(&mut rfq)?;
            match self.rfqs.update(&rfq, expected).await {
                Ok(()) => {
                    info!(%rfq_id, %from, %to, "rfq transitioned");
                    self.emit(&rfq, from, ctx, &describe).await?;
                    return Ok(Transition {
                        rfq,
                        from,
                        applied: true,
                    });
                }
                Err(e) if e.is_version_conflict() => {
                    debug!(%rfq_id, "rfq changed concurrently, re-evaluating transition");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ApplicationError::internal(format!(
            "rfq {rfq_id} kept changing after {MAX_WRITE_RETRIES} attempts"
        )))
    }

    async fn emit<E>(
        &self,
        rfq: &Rfq,
        from: RfqStatus,
        ctx: TransitionContext<'_>,
        describe: &E,
    ) -> ApplicationResult<()>
    where
        E: Fn(RfqStateChanged) -> RfqStateChanged + Send + Sync,
    {
        let to = rfq.status();
        let payload = describe(RfqStateChanged::new(rfq.id(), from, to));
        let key = IdempotencyKey::rfq_state_changed(rfq.id(), from, to);
        self.timeline
            .emit_rfq(&payload, rfq.id().get(), ctx.correlation_id, key, ctx.actor)
            .await?;
        Ok(())
    }
}

fn replayed_from(rfq: &Rfq) -> RfqStatus {
    match rfq.status() {
        RfqStatus::Sent => RfqStatus::Draft,
        RfqStatus::Awarded => RfqStatus::Sent,
        RfqStatus::Failed => rfq.failed_from().unwrap_or(RfqStatus::Draft),
        RfqStatus::Draft => RfqStatus::Draft,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::TimelineConfig;
    use crate::domain::entities::{DispatchTarget, NewSendAttempt};
    use crate::domain::events::TimelineEventType;
    use crate::domain::value_objects::{Channel, Role};
    use crate::infrastructure::persistence::in_memory::{
        InMemoryRfqRepository, InMemorySendAttemptRepository, InMemoryTimelineEventStore,
    };
    use serde_json::json;

    struct Fixture {
        machine: RfqStateMachine,
        rfqs: InMemoryRfqRepository,
        attempts: InMemorySendAttemptRepository,
        timeline: TimelineLog,
    }

    fn fixture() -> Fixture {
        let rfqs = InMemoryRfqRepository::new();
        let attempts = InMemorySendAttemptRepository::new();
        let timeline = TimelineLog::new(
            Arc::new(InMemoryTimelineEventStore::new()),
            Arc::new(TimelineConfig::default()),
        );
        let machine = RfqStateMachine::new(
            Arc::new(rfqs.clone()),
            Arc::new(attempts.clone()),
            timeline.clone(),
        );
        Fixture {
            machine,
            rfqs,
            attempts,
            timeline,
        }
    }

    fn corr() -> CorrelationId {
        CorrelationId::new("corr-sm")
    }

    fn ctx(corr: &CorrelationId) -> TransitionContext<'_> {
        TransitionContext::new(Some(UserId::new(4)), corr)
    }

    async fn draft_with_attempt(f: &Fixture) -> RfqId {
        let rfq = f.rfqs.create("Cu 25t Mar", Some(UserId::new(4))).await.unwrap();
        f.attempts
            .insert_if_absent(NewSendAttempt {
                rfq_id: rfq.id(),
                target: DispatchTarget::new(Channel::WhatsApp, None),
                idempotency_key: IdempotencyKey::new("k"),
                retry_of_attempt_id: None,
                chain_depth: 1,
                max_retries: 2,
                metadata: json!({}),
            })
            .await
            .unwrap();
        rfq.id()
    }

    async fn state_events(f: &Fixture, rfq_id: RfqId) -> Vec<crate::domain::entities::TimelineEvent> {
        f.timeline
            .list_for_subject("rfq", rfq_id.get(), Role::Admin)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.event_type() == TimelineEventType::RfqStateChanged)
            .collect()
    }

    mod sent {
        use super::*;

        #[tokio::test]
        async fn requires_an_attempt() {
            let f = fixture();
            let rfq = f.rfqs.create("x", None).await.unwrap();
            let c = corr();
            let err = f.machine.transition_to_sent(rfq.id(), ctx(&c)).await.unwrap_err();
            assert!(err.is_validation());
            assert_eq!(f.machine.get(rfq.id()).await.unwrap().status(), RfqStatus::Draft);
        }

        #[tokio::test]
        async fn sets_sent_at_and_emits_once() {
            let f = fixture();
            let rfq_id = draft_with_attempt(&f).await;
            let c = corr();
            let first = f.machine.transition_to_sent(rfq_id, ctx(&c)).await.unwrap();
            assert!(first.applied);
            assert_eq!(first.from, RfqStatus::Draft);
            assert!(first.rfq.sent_at().is_some());

            let replay = f.machine.transition_to_sent(rfq_id, ctx(&c)).await.unwrap();
            assert!(!replay.applied);
            assert_eq!(replay.rfq.sent_at(), first.rfq.sent_at());

            let events = state_events(&f, rfq_id).await;
            assert_eq!(events.len(), 1);
            assert_eq!(
                events[0].idempotency_key().unwrap().as_str(),
                format!("rfq:{rfq_id}:state_changed:draft->sent")
            );
            assert_eq!(events[0].actor_user_id(), Some(UserId::new(4)));
        }

        #[tokio::test]
        async fn unknown_rfq() {
            let f = fixture();
            let c = corr();
            let err = f.machine.transition_to_sent(RfqId::new(404), ctx(&c)).await.unwrap_err();
            assert!(err.is_not_found());
        }
    }

    mod awarded {
        use super::*;

        #[tokio::test]
        async fn draft_cannot_be_awarded() {
            let f = fixture();
            let rfq_id = draft_with_attempt(&f).await;
            let c = corr();
            let err = f
                .machine
                .transition_to_awarded(rfq_id, QuoteId::new(1), ctx(&c))
                .await
                .unwrap_err();
            assert!(err.is_invalid_transition());
        }

        #[tokio::test]
        async fn sent_is_awarded_once() {
            let f = fixture();
            let rfq_id = draft_with_attempt(&f).await;
            let c = corr();
            f.machine.transition_to_sent(rfq_id, ctx(&c)).await.unwrap();
            assert!(f.machine.get(rfq_id).await.unwrap().awarded_at().is_none());

            let awarded = f
                .machine
                .transition_to_awarded(rfq_id, QuoteId::new(9), ctx(&c))
                .await
                .unwrap();
            assert!(awarded.applied);
            assert!(awarded.rfq.awarded_at().is_some());
            assert_eq!(awarded.rfq.awarded_quote_id(), Some(QuoteId::new(9)));

            let replay = f
                .machine
                .transition_to_awarded(rfq_id, QuoteId::new(9), ctx(&c))
                .await
                .unwrap();
            assert!(!replay.applied);

            let other = f
                .machine
                .transition_to_awarded(rfq_id, QuoteId::new(10), ctx(&c))
                .await
                .unwrap_err();
            assert!(other.is_invalid_transition());

            let events = state_events(&f, rfq_id).await;
            assert_eq!(events.len(), 2);
            assert_eq!(events[1].payload()["quote_id"], 9);
        }
    }

    mod failed {
        use super::*;

        #[tokio::test]
        async fn draft_fails_directly() {
            let f = fixture();
            let rfq = f.rfqs.create("x", None).await.unwrap();
            let c = corr();
            let t = f
                .machine
                .transition_to_failed(rfq.id(), "no_valid_channel", ctx(&c))
                .await
                .unwrap();
            assert_eq!(t.from, RfqStatus::Draft);
            assert_eq!(t.rfq.failure_reason(), Some("no_valid_channel"));
            assert!(t.rfq.sent_at().is_none());

            let replay = f
                .machine
                .transition_to_failed(rfq.id(), "no_valid_channel", ctx(&c))
                .await
                .unwrap();
            assert_eq!(replay.from, RfqStatus::Draft);
            assert_eq!(state_events(&f, rfq.id()).await.len(), 1);
        }

        #[tokio::test]
        async fn failed_never_resurrects() {
            let f = fixture();
            let rfq_id = draft_with_attempt(&f).await;
            let c = corr();
            f.machine.transition_to_sent(rfq_id, ctx(&c)).await.unwrap();
            f.machine.transition_to_failed(rfq_id, "cancelled", ctx(&c)).await.unwrap();

            let awarded = f
                .machine
                .transition_to_awarded(rfq_id, QuoteId::new(1), ctx(&c))
                .await
                .unwrap_err();
            assert!(awarded.is_invalid_transition());
            let sent = f.machine.transition_to_sent(rfq_id, ctx(&c)).await.unwrap_err();
            assert!(sent.is_invalid_transition());
            assert_eq!(f.machine.get(rfq_id).await.unwrap().status(), RfqStatus::Failed);
        }

        #[tokio::test]
        async fn awarded_cannot_fail() {
            let f = fixture();
            let rfq_id = draft_with_attempt(&f).await;
            let c = corr();
            f.machine.transition_to_sent(rfq_id, ctx(&c)).await.unwrap();
            f.machine
                .transition_to_awarded(rfq_id, QuoteId::new(1), ctx(&c))
                .await
                .unwrap();
            let err = f
                .machine
                .transition_to_failed(rfq_id, "late", ctx(&c))
                .await
                .unwrap_err();
            assert!(err.is_invalid_transition());
        }
    }

    #[tokio::test]
    async fn concurrent_transitions_emit_one_event() {
        let f = fixture();
        let rfq_id = draft_with_attempt(&f).await;
        let mut handles = Vec::new();
        for _ in 0..8 {
            let machine = f.machine.clone();
            handles.push(tokio::spawn(async move {
                let c = corr();
                machine.transition_to_sent(rfq_id, ctx(&c)).await
            }));
        }
        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().applied {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(state_events(&f, rfq_id).await.len(), 1);
    }
}
