//! # Simulated Transport
//!
//! In-process transport used for channels without a real integration and
//! in tests.
//!
//! Provider message ids are deterministic: the same channel and attempt key
//! always yield the same id, so a re-sent attempt is recognizable on the
//! provider side.
//!
//! Behaviour is scripted through the attempt metadata:
//!
//! | key | effect |
//! |-----|--------|
//! | `force_failure: true` | every send fails |
//! | `failures_before_success: n` | the first `n` sends for the RFQ target fail |
//! | `async_mode: true` | the message is accepted, the outcome arrives later |

use crate::domain::value_objects::{Channel, CounterpartyId, IdempotencyKey, RfqId};
use crate::infrastructure::transport::error::{TransportError, TransportResult};
use crate::infrastructure::transport::traits::{
    ChannelTransport, OutboundMessage, TransportReceipt,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Builds the provider message id for a channel and attempt key.
///
/// # Examples
///
/// ```
/// use rfq_dispatch::domain::value_objects::{Channel, IdempotencyKey};
/// use rfq_dispatch::infrastructure::transport::simulated::provider_message_id;
///
/// let key = IdempotencyKey::new("rfq:1:send:email:-:none:1");
/// let a = provider_message_id(Channel::Email, &key);
/// assert_eq!(a, provider_message_id(Channel::Email, &key));
/// assert!(a.starts_with("email-"));
/// ```
#[must_use]
pub fn provider_message_id(channel: Channel, key: &IdempotencyKey) -> String {
    let name = format!("rfq:{channel}:{key}");
    format!(
        "{channel}-{}",
        Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes())
    )
}

type TargetKey = (RfqId, Channel, Option<CounterpartyId>);

/// Simulated channel transport.
#[derive(Debug, Clone, Default)]
pub struct SimulatedTransport {
    latency: Option<Duration>,
    calls: Arc<Mutex<HashMap<TargetKey, u32>>>,
}

impl SimulatedTransport {
    /// Creates a transport that answers immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every send.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Returns how many sends were made for a target.
    pub async fn calls_for(
        &self,
        rfq_id: RfqId,
        channel: Channel,
        counterparty_id: Option<CounterpartyId>,
    ) -> u32 {
        self.calls
            .lock()
            .await
            .get(&(rfq_id, channel, counterparty_id))
            .copied()
            .unwrap_or(0)
    }

    async fn record_call(&self, message: &OutboundMessage) -> u32 {
        let mut calls = self.calls.lock().await;
        let count = calls
            .entry((message.rfq_id, message.channel, message.counterparty_id))
            .or_insert(0);
        *count = count.saturating_add(1);
        *count
    }
}

fn flag(message: &OutboundMessage, key: &str) -> bool {
    message
        .metadata
        .get(key)
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
}

fn failure_budget(message: &OutboundMessage) -> u32 {
    message
        .metadata
        .get("failures_before_success")
        .and_then(serde_json::Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

#[async_trait]
impl ChannelTransport for SimulatedTransport {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn send(&self, message: &OutboundMessage) -> TransportResult<TransportReceipt> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let call_no = self.record_call(message).await;
        debug!(
            rfq_id = %message.rfq_id,
            attempt_id = %message.attempt_id,
            channel = %message.channel,
            call_no,
            "simulated send"
        );

        if flag(message, "force_failure") || call_no <= failure_budget(message) {
            return Err(TransportError::connection(format!(
                "{} send failed",
                message.channel
            )));
        }

        let provider_id = provider_message_id(message.channel, &message.idempotency_key);
        if flag(message, "async_mode") {
            Ok(TransportReceipt::accepted(provider_id))
        } else {
            Ok(TransportReceipt::delivered(provider_id))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::value_objects::AttemptId;
    use crate::infrastructure::transport::traits::DeliveryState;
    use serde_json::{Value, json};

    fn message(channel: Channel, key: &str, metadata: Value) -> OutboundMessage {
        OutboundMessage {
            channel,
            rfq_id: RfqId::new(1),
            attempt_id: AttemptId::new(1),
            counterparty_id: Some(CounterpartyId::new(5)),
            message_text: "Cu 100t Q3".to_string(),
            idempotency_key: IdempotencyKey::new(key),
            metadata,
        }
    }

    #[test]
    fn provider_ids_differ_by_channel_and_key() {
        let key = IdempotencyKey::new("k1");
        assert_ne!(
            provider_message_id(Channel::Email, &key),
            provider_message_id(Channel::Api, &key)
        );
        assert_ne!(
            provider_message_id(Channel::Email, &key),
            provider_message_id(Channel::Email, &IdempotencyKey::new("k2"))
        );
    }

    #[tokio::test]
    async fn delivers_by_default() {
        let transport = SimulatedTransport::new();
        let receipt = transport
            .send(&message(Channel::Email, "k", json!({})))
            .await
            .unwrap();
        assert_eq!(receipt.state, DeliveryState::Delivered);
        assert_eq!(
            receipt.provider_message_id,
            provider_message_id(Channel::Email, &IdempotencyKey::new("k"))
        );
    }

    #[tokio::test]
    async fn force_failure() {
        let transport = SimulatedTransport::new();
        let err = transport
            .send(&message(Channel::WhatsApp, "k", json!({"force_failure": true})))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("whatsapp send failed"));
    }

    #[tokio::test]
    async fn failures_before_success_counts_per_target() {
        let transport = SimulatedTransport::new();
        let meta = json!({"failures_before_success": 2});
        assert!(transport.send(&message(Channel::Api, "a1", meta.clone())).await.is_err());
        assert!(transport.send(&message(Channel::Api, "a2", meta.clone())).await.is_err());
        assert!(transport.send(&message(Channel::Api, "a3", meta.clone())).await.is_ok());
        assert_eq!(
            transport
                .calls_for(RfqId::new(1), Channel::Api, Some(CounterpartyId::new(5)))
                .await,
            3
        );
        // Other channels have their own counter.
        assert!(transport.send(&message(Channel::Email, "e1", meta)).await.is_err());
    }

    #[tokio::test]
    async fn async_mode_is_accepted() {
        let transport = SimulatedTransport::new();
        let receipt = transport
            .send(&message(Channel::Broker, "k", json!({"async_mode": true})))
            .await
            .unwrap();
        assert_eq!(receipt.state, DeliveryState::Accepted);
    }
}
