//! # Timeline Event
//!
//! A stored, immutable timeline row. Insertion order (`id`) is the
//! canonical read order.

use crate::domain::events::{NewTimelineEvent, TimelineEventType};
use crate::domain::value_objects::timestamp::Timestamp;
use crate::domain::value_objects::{CorrelationId, EventId, IdempotencyKey, UserId, Visibility};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored timeline event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    id: EventId,
    event_type: TimelineEventType,
    subject_type: String,
    subject_id: i64,
    correlation_id: CorrelationId,
    idempotency_key: Option<IdempotencyKey>,
    visibility: Visibility,
    actor_user_id: Option<UserId>,
    payload: Value,
    meta: Option<Value>,
    occurred_at: Timestamp,
}

impl TimelineEvent {
    /// Materializes an event from its input with a storage-assigned id.
    #[must_use]
    pub fn from_new(id: EventId, new: NewTimelineEvent, occurred_at: Timestamp) -> Self {
        Self {
            id,
            event_type: new.event_type,
            subject_type: new.subject_type,
            subject_id: new.subject_id,
            correlation_id: new.correlation_id,
            idempotency_key: new.idempotency_key,
            visibility: new.visibility,
            actor_user_id: new.actor_user_id,
            payload: new.payload,
            meta: new.meta,
            occurred_at,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> EventId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn event_type(&self) -> TimelineEventType {
        self.event_type
    }

    #[inline]
    #[must_use]
    pub fn subject_type(&self) -> &str {
        &self.subject_type
    }

    #[inline]
    #[must_use]
    pub fn subject_id(&self) -> i64 {
        self.subject_id
    }

    #[inline]
    #[must_use]
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    #[inline]
    #[must_use]
    pub fn idempotency_key(&self) -> Option<&IdempotencyKey> {
        self.idempotency_key.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    #[inline]
    #[must_use]
    pub fn actor_user_id(&self) -> Option<UserId> {
        self.actor_user_id
    }

    #[inline]
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    #[inline]
    #[must_use]
    pub fn meta(&self) -> Option<&Value> {
        self.meta.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn occurred_at(&self) -> Timestamp {
        self.occurred_at
    }

    /// Returns true if the event concerns the given subject.
    #[must_use]
    pub fn is_about(&self, subject_type: &str, subject_id: i64) -> bool {
        self.subject_type == subject_type && self.subject_id == subject_id
    }
}
