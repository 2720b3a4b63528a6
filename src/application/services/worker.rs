//! # Dispatch Worker
//!
//! Processes one queued attempt: claim, send through the channel
//! transport, record the outcome, settle.
//!
//! The claim is an optimistic `queued -> sent` write, so when several
//! workers race for the same attempt exactly one of them sends. An attempt
//! whose RFQ finished while it waited is recorded as failed without being
//! sent.

use crate::application::error::ApplicationResult;
use crate::application::services::dispatcher::{RfqDispatcher, Settlement};
use crate::application::services::ledger::Outcome;
use crate::application::services::pool::DispatchJob;
use crate::domain::entities::SendAttempt;
use crate::infrastructure::transport::{ChannelTransport, DeliveryState, OutboundMessage};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Error recorded on attempts whose RFQ finished before they were sent.
pub const SEND_ABANDONED: &str = "send abandoned: rfq is terminal";

/// What processing a job did.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Nothing to do: the attempt was not queued or another worker took it.
    Skipped,
    /// The provider confirmed delivery.
    Delivered(SendAttempt),
    /// The provider accepted the message; the outcome arrives by callback.
    Accepted(SendAttempt),
    /// The send failed.
    Failed {
        /// The failed attempt.
        attempt: SendAttempt,
        /// Retry or RFQ failure that followed.
        settlement: Settlement,
    },
    /// The RFQ was terminal; the attempt was failed without sending.
    Abandoned(SendAttempt),
}

impl ProcessOutcome {
    /// Returns the attempt after processing, unless the job was skipped.
    #[must_use]
    pub fn attempt(&self) -> Option<&SendAttempt> {
        match self {
            Self::Skipped => None,
            Self::Delivered(a) | Self::Accepted(a) | Self::Abandoned(a) => Some(a),
            Self::Failed { attempt, .. } => Some(attempt),
        }
    }

    /// Returns the settlement of a failed send.
    #[must_use]
    pub fn settlement(&self) -> Option<&Settlement> {
        match self {
            Self::Failed { settlement, .. } => Some(settlement),
            _ => None,
        }
    }
}

/// Sends attempts through a channel transport.
#[derive(Debug, Clone)]
pub struct DispatchWorker {
    dispatcher: Arc<RfqDispatcher>,
    transport: Arc<dyn ChannelTransport>,
    retry_backoff: Duration,
}

impl DispatchWorker {
    /// Creates a worker; the retry backoff comes from the dispatch settings.
    #[must_use]
    pub fn new(dispatcher: Arc<RfqDispatcher>, transport: Arc<dyn ChannelTransport>) -> Self {
        let retry_backoff = Duration::from_millis(dispatcher.config().retry_backoff_ms);
        Self {
            dispatcher,
            transport,
            retry_backoff,
        }
    }

    /// Returns the dispatcher.
    #[inline]
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<RfqDispatcher> {
        &self.dispatcher
    }

    /// Processes one job.
    ///
    /// # Errors
    ///
    /// Returns storage and timeline errors. Transport errors are recorded
    /// on the attempt, not returned.
    #[instrument(skip(self), fields(attempt_id = %job.attempt_id, correlation_id = %job.correlation_id))]
    pub async fn process(&self, job: &DispatchJob) -> ApplicationResult<ProcessOutcome> {
        let ledger = self.dispatcher.ledger();
        let corr = &job.correlation_id;

        let Some(attempt) = ledger.claim(job.attempt_id, corr).await? else {
            return Ok(ProcessOutcome::Skipped);
        };

        let rfq = self.dispatcher.state_machine().get(attempt.rfq_id()).await?;
        if rfq.is_terminal() {
            info!(rfq_id = %rfq.id(), status = %rfq.status(), "rfq finished, send abandoned");
            let recorded = ledger
                .record_outcome(attempt.id(), Outcome::failed(SEND_ABANDONED), corr)
                .await?;
            return Ok(ProcessOutcome::Abandoned(recorded.attempt));
        }

        let message = OutboundMessage::for_attempt(&attempt, rfq.message_text());
        match self.transport.send(&message).await {
            Ok(receipt) => match receipt.state {
                DeliveryState::Delivered => {
                    let mut outcome = Outcome::delivered(receipt.provider_message_id);
                    outcome.metadata = receipt.metadata;
                    let recorded = ledger.record_outcome(attempt.id(), outcome, corr).await?;
                    self.dispatcher
                        .settle(&recorded.attempt, corr, self.retry_backoff)
                        .await?;
                    debug!(transport = self.transport.name(), "attempt delivered");
                    Ok(ProcessOutcome::Delivered(recorded.attempt))
                }
                DeliveryState::Accepted => {
                    let acknowledged = ledger
                        .acknowledge(attempt.id(), receipt.provider_message_id, receipt.metadata)
                        .await?;
                    debug!(transport = self.transport.name(), "attempt accepted");
                    Ok(ProcessOutcome::Accepted(acknowledged))
                }
            },
            Err(e) => {
                warn!(
                    transport = self.transport.name(),
                    channel = %attempt.channel(),
                    error = %e,
                    retryable = e.is_retryable(),
                    "send failed"
                );
                let recorded = ledger
                    .record_outcome(attempt.id(), Outcome::failed(e.to_string()), corr)
                    .await?;
                let delay = e
                    .retry_after_ms()
                    .map(Duration::from_millis)
                    .map_or(self.retry_backoff, |after| after.max(self.retry_backoff));
                let settlement = self.dispatcher.settle(&recorded.attempt, corr, delay).await?;
                Ok(ProcessOutcome::Failed {
                    attempt: recorded.attempt,
                    settlement,
                })
            }
        }
    }
}
