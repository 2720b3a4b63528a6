//! # RFQ Events
//!
//! Payloads of the timeline events emitted by the dispatch core.
//!
//! # Event Flow
//!
//! ```text
//! RFQ_SEND_REQUESTED -> RFQ_SEND_ATTEMPT_CREATED* -> RFQ_STATE_CHANGED(draft->sent)
//!     -> RFQ_SEND_ATTEMPT_STATUS_UPDATED*
//!     -> RFQ_STATE_CHANGED(sent->awarded) + RFQ_AWARDED
//!      | RFQ_STATE_CHANGED(sent->failed)
//! ```

use crate::domain::events::domain_event::TimelinePayload;
use crate::domain::events::event_type::TimelineEventType;
use crate::domain::value_objects::{
    AttemptId, Channel, CounterpartyId, IdempotencyKey, QuoteId, RfqId, RfqStatus, SendStatus,
    Timestamp,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Subject type used by every RFQ event.
pub const RFQ_SUBJECT: &str = "rfq";

/// Emitted on every RFQ status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RfqStateChanged {
    /// The RFQ.
    pub rfq_id: RfqId,
    /// Status before the transition.
    pub from_status: RfqStatus,
    /// Status after the transition.
    pub to_status: RfqStatus,
    /// Reason, for failures.
    pub reason: Option<String>,
    /// Awarded quote, for awards.
    pub quote_id: Option<QuoteId>,
}

impl RfqStateChanged {
    /// Creates a new payload.
    #[must_use]
    pub fn new(rfq_id: RfqId, from_status: RfqStatus, to_status: RfqStatus) -> Self {
        Self {
            rfq_id,
            from_status,
            to_status,
            reason: None,
            quote_id: None,
        }
    }

    /// Sets the failure reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the awarded quote.
    #[must_use]
    pub fn with_quote(mut self, quote_id: QuoteId) -> Self {
        self.quote_id = Some(quote_id);
        self
    }
}

impl TimelinePayload for RfqStateChanged {
    const EVENT_TYPE: TimelineEventType = TimelineEventType::RfqStateChanged;
}

/// Emitted when a caller requests dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RfqSendRequested {
    /// The RFQ.
    pub rfq_id: RfqId,
    /// Requested channels, in request order.
    pub channels: Vec<Channel>,
    /// Attempts created or reused for the request.
    pub attempt_ids: Vec<AttemptId>,
    /// Length of the message in characters.
    pub message_length: usize,
}

impl TimelinePayload for RfqSendRequested {
    const EVENT_TYPE: TimelineEventType = TimelineEventType::RfqSendRequested;
}

/// Emitted when a send attempt row is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SendAttemptCreated {
    /// The attempt.
    pub attempt_id: AttemptId,
    /// Its RFQ.
    pub rfq_id: RfqId,
    /// Delivery channel.
    pub channel: Channel,
    /// Target counterparty.
    pub counterparty_id: Option<CounterpartyId>,
    /// Predecessor in the retry chain.
    pub retry_of_attempt_id: Option<AttemptId>,
    /// Attempt key.
    pub idempotency_key: IdempotencyKey,
}

impl TimelinePayload for SendAttemptCreated {
    const EVENT_TYPE: TimelineEventType = TimelineEventType::RfqSendAttemptCreated;
}

/// Emitted when a send attempt changes status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SendAttemptStatusUpdated {
    /// The attempt.
    pub attempt_id: AttemptId,
    /// Its RFQ.
    pub rfq_id: RfqId,
    /// Delivery channel.
    pub channel: Channel,
    /// New status.
    pub status: SendStatus,
    /// Provider message id, when known.
    pub provider_message_id: Option<String>,
    /// Transport error, for failures.
    pub error: Option<String>,
}

impl TimelinePayload for SendAttemptStatusUpdated {
    const EVENT_TYPE: TimelineEventType = TimelineEventType::RfqSendAttemptStatusUpdated;
}

/// Emitted when a quote is awarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RfqAwarded {
    /// The RFQ.
    pub rfq_id: RfqId,
    /// Winning quote.
    pub quote_id: QuoteId,
    /// Award time.
    #[schemars(with = "String")]
    pub awarded_at: Timestamp,
}

impl TimelinePayload for RfqAwarded {
    const EVENT_TYPE: TimelineEventType = TimelineEventType::RfqAwarded;
}
