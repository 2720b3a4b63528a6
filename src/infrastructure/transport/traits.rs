//! # Channel Transport Trait
//!
//! Port definition for the outbound delivery of an RFQ message to a
//! counterparty over one channel (e-mail, API, WhatsApp, broker).
//!
//! A transport is an opaque, possibly failing RPC. It receives the
//! attempt's idempotency key so providers that support deduplication can
//! collapse repeated sends of the same logical attempt.

use crate::domain::entities::SendAttempt;
use crate::domain::value_objects::{
    AttemptId, Channel, CounterpartyId, IdempotencyKey, RfqId, SendStatus,
};
use crate::infrastructure::transport::error::TransportResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The message handed to a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Delivery channel.
    pub channel: Channel,
    /// RFQ being sent.
    pub rfq_id: RfqId,
    /// Attempt carrying the send.
    pub attempt_id: AttemptId,
    /// Recipient, if the channel addresses a specific counterparty.
    pub counterparty_id: Option<CounterpartyId>,
    /// Message body.
    pub message_text: String,
    /// Key of the attempt.
    pub idempotency_key: IdempotencyKey,
    /// Channel-specific options stored on the attempt.
    pub metadata: Value,
}

impl OutboundMessage {
    /// Builds the message for an attempt.
    #[must_use]
    pub fn for_attempt(attempt: &SendAttempt, message_text: impl Into<String>) -> Self {
        Self {
            channel: attempt.channel(),
            rfq_id: attempt.rfq_id(),
            attempt_id: attempt.id(),
            counterparty_id: attempt.target().counterparty_id,
            message_text: message_text.into(),
            idempotency_key: attempt.idempotency_key().clone(),
            metadata: attempt.metadata().clone(),
        }
    }
}

/// What the provider did with an accepted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Delivered synchronously.
    Delivered,
    /// Accepted for asynchronous delivery; the outcome arrives by callback.
    Accepted,
}

impl DeliveryState {
    /// Returns the attempt status this state maps to.
    #[must_use]
    pub const fn send_status(self) -> SendStatus {
        match self {
            Self::Delivered => SendStatus::Delivered,
            Self::Accepted => SendStatus::Sent,
        }
    }
}

/// Provider acknowledgement of a successful send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportReceipt {
    /// Provider-side message id.
    pub provider_message_id: String,
    /// Delivery state.
    pub state: DeliveryState,
    /// Raw provider response fields worth keeping.
    pub metadata: Option<Value>,
}

impl TransportReceipt {
    /// Creates a receipt for a synchronously delivered message.
    #[must_use]
    pub fn delivered(provider_message_id: impl Into<String>) -> Self {
        Self {
            provider_message_id: provider_message_id.into(),
            state: DeliveryState::Delivered,
            metadata: None,
        }
    }

    /// Creates a receipt for a message accepted for later delivery.
    #[must_use]
    pub fn accepted(provider_message_id: impl Into<String>) -> Self {
        Self {
            provider_message_id: provider_message_id.into(),
            state: DeliveryState::Accepted,
            metadata: None,
        }
    }

    /// Attaches provider metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Trait for channel transports.
#[async_trait]
pub trait ChannelTransport: Send + Sync + fmt::Debug {
    /// Returns a short name for logs.
    fn name(&self) -> &str;

    /// Sends a message.
    ///
    /// # Errors
    ///
    /// Any [`TransportError`](crate::infrastructure::transport::TransportError);
    /// the caller records it as a failed outcome.
    async fn send(&self, message: &OutboundMessage) -> TransportResult<TransportReceipt>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_state_maps_to_status() {
        assert_eq!(DeliveryState::Delivered.send_status(), SendStatus::Delivered);
        assert_eq!(DeliveryState::Accepted.send_status(), SendStatus::Sent);
    }

    #[test]
    fn receipt_builders() {
        let receipt = TransportReceipt::accepted("wa-1").with_metadata(serde_json::json!({"q": 1}));
        assert_eq!(receipt.state, DeliveryState::Accepted);
        assert_eq!(receipt.provider_message_id, "wa-1");
        assert!(receipt.metadata.is_some());
    }
}
