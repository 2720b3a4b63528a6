//! # Timeline Event Input
//!
//! The [`TimelinePayload`] trait binding each payload struct to its event
//! type, and [`NewTimelineEvent`], the not-yet-stored form of an event
//! handed to the timeline log.
//!
//! # Examples
//!
//! ```
//! use rfq_dispatch::domain::events::{NewTimelineEvent, RfqStateChanged, TimelineEventType};
//! use rfq_dispatch::domain::value_objects::{CorrelationId, RfqId, RfqStatus, Visibility};
//!
//! let payload = RfqStateChanged::new(RfqId::new(1), RfqStatus::Draft, RfqStatus::Sent);
//! let event = NewTimelineEvent::for_payload(&payload, "rfq", 1, CorrelationId::generate())
//!     .unwrap()
//!     .with_visibility(Visibility::Finance);
//!
//! assert_eq!(event.event_type, TimelineEventType::RfqStateChanged);
//! assert_eq!(event.payload["to_status"], "sent");
//! ```

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::events::event_type::TimelineEventType;
use crate::domain::value_objects::{CorrelationId, IdempotencyKey, UserId, Visibility};
use serde::Serialize;
use serde_json::Value;

/// A typed event payload bound to exactly one event type.
pub trait TimelinePayload: Serialize {
    /// The event type this payload is stored under.
    const EVENT_TYPE: TimelineEventType;
}

/// An event to be appended to the timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTimelineEvent {
    /// Event type.
    pub event_type: TimelineEventType,
    /// Kind of entity the event concerns (`"rfq"`, `"contract"`, ...).
    pub subject_type: String,
    /// Id of the entity the event concerns.
    pub subject_id: i64,
    /// Causal chain the event belongs to.
    pub correlation_id: CorrelationId,
    /// Deduplication key; `None` always inserts.
    pub idempotency_key: Option<IdempotencyKey>,
    /// Read gate.
    pub visibility: Visibility,
    /// Author, `None` for system events.
    pub actor_user_id: Option<UserId>,
    /// Event-type-specific data.
    pub payload: Value,
    /// Request metadata (client ip, user agent, ...).
    pub meta: Option<Value>,
}

impl NewTimelineEvent {
    /// Creates an event with an empty payload and `all` visibility.
    #[must_use]
    pub fn new(
        event_type: TimelineEventType,
        subject_type: impl Into<String>,
        subject_id: i64,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            event_type,
            subject_type: subject_type.into(),
            subject_id,
            correlation_id,
            idempotency_key: None,
            visibility: Visibility::All,
            actor_user_id: None,
            payload: Value::Object(serde_json::Map::new()),
            meta: None,
        }
    }

    /// Creates an event from a typed payload.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidArgument` if the payload cannot be
    /// serialized.
    pub fn for_payload<P: TimelinePayload>(
        payload: &P,
        subject_type: impl Into<String>,
        subject_id: i64,
        correlation_id: CorrelationId,
    ) -> DomainResult<Self> {
        let value = serde_json::to_value(payload)
            .map_err(|e| DomainError::invalid_argument(format!("unserializable payload: {e}")))?;
        Ok(Self::new(P::EVENT_TYPE, subject_type, subject_id, correlation_id).with_payload(value))
    }

    /// Sets the idempotency key.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: IdempotencyKey) -> Self {
        self.idempotency_key = Some(key);
        self
    }

    /// Sets the visibility.
    #[must_use]
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Sets the author.
    #[must_use]
    pub fn with_actor(mut self, actor: Option<UserId>) -> Self {
        self.actor_user_id = actor;
        self
    }

    /// Replaces the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Sets request metadata.
    #[must_use]
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::events::rfq_events::RfqAwarded;
    use crate::domain::value_objects::{QuoteId, RfqId, Timestamp};
    use serde_json::json;

    #[test]
    fn defaults() {
        let event = NewTimelineEvent::new(
            TimelineEventType::SoCreated,
            "sales_order",
            10,
            CorrelationId::new("c"),
        );
        assert_eq!(event.visibility, Visibility::All);
        assert!(event.idempotency_key.is_none());
        assert!(event.actor_user_id.is_none());
        assert_eq!(event.payload, json!({}));
    }

    #[test]
    fn for_payload_binds_type() {
        let payload = RfqAwarded {
            rfq_id: RfqId::new(4),
            quote_id: QuoteId::new(9),
            awarded_at: Timestamp::from_secs(1_700_000_000).unwrap(),
        };
        let event =
            NewTimelineEvent::for_payload(&payload, "rfq", 4, CorrelationId::new("c")).unwrap();
        assert_eq!(event.event_type, TimelineEventType::RfqAwarded);
        assert_eq!(event.payload["quote_id"], 9);
    }

    #[test]
    fn builder_methods() {
        let event = NewTimelineEvent::new(
            TimelineEventType::PoCreated,
            "purchase_order",
            1,
            CorrelationId::new("c"),
        )
        .with_idempotency_key(IdempotencyKey::new("po:1:created"))
        .with_actor(Some(UserId::new(7)))
        .with_meta(json!({"ip": "10.0.0.1"}));
        assert_eq!(event.idempotency_key.unwrap().as_str(), "po:1:created");
        assert_eq!(event.actor_user_id, Some(UserId::new(7)));
        assert!(event.meta.is_some());
    }
}
