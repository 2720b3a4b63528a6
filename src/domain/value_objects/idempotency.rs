//! # Idempotency Keys
//!
//! Deterministic keys identifying a logical operation.
//!
//! [`IdempotencyKey::resolve`] is a pure function from an [`Operation`] to
//! a key. The ledger and the timeline log call it with the same inputs and
//! therefore agree on the key no matter which worker computed it, so
//! repeated or concurrent execution of one operation collapses onto one
//! stored row without a distributed lock.
//!
//! Segments are joined with `:`. Caller-supplied free text (request keys,
//! mentions) is escaped so that a `:` inside a value can never produce the
//! same key as a different split of the segments.
//!
//! # Examples
//!
//! ```
//! use rfq_dispatch::domain::value_objects::{
//!     AttemptId, IdempotencyKey, Operation, RfqId, SendStatus,
//! };
//!
//! let key = IdempotencyKey::resolve(&Operation::AttemptStatus {
//!     attempt_id: AttemptId::new(9),
//!     status: SendStatus::Delivered,
//! });
//! assert_eq!(key.as_str(), "rfq_send_attempt:9:status:delivered");
//!
//! let a = IdempotencyKey::rfq_send_requested(RfqId::new(1), Some("a:b"));
//! let b = IdempotencyKey::rfq_send_requested(RfqId::new(1), Some("a%3Ab"));
//! assert_ne!(a, b);
//! ```

use crate::domain::value_objects::enums::Channel;
use crate::domain::value_objects::ids::{AttemptId, CounterpartyId, EventId, RfqId};
use crate::domain::value_objects::rfq_status::RfqStatus;
use crate::domain::value_objects::send_status::SendStatus;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A logical operation whose repeated execution must be collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation<'a> {
    /// RFQ status transition.
    RfqStateChanged {
        /// The RFQ.
        rfq_id: RfqId,
        /// Status before the transition.
        from: RfqStatus,
        /// Status after the transition.
        to: RfqStatus,
    },
    /// A caller request to send an RFQ.
    RfqSendRequested {
        /// The RFQ.
        rfq_id: RfqId,
        /// Caller-supplied request key, if any.
        request_key: Option<&'a str>,
    },
    /// RFQ award.
    RfqAwarded {
        /// The RFQ.
        rfq_id: RfqId,
    },
    /// One delivery attempt of an RFQ to one counterparty over one channel.
    SendAttempt {
        /// The RFQ.
        rfq_id: RfqId,
        /// Delivery channel.
        channel: Channel,
        /// Target counterparty, if the channel is counterparty-specific.
        counterparty_id: Option<CounterpartyId>,
        /// Key of the send request that spawned the chain.
        request_key: &'a str,
        /// 1-based position in the retry chain.
        attempt_no: u32,
    },
    /// Retry successor of a failed attempt. One parent has at most one
    /// successor, so the parent id identifies the logical attempt.
    RetryAttempt {
        /// The RFQ.
        rfq_id: RfqId,
        /// Delivery channel.
        channel: Channel,
        /// Target counterparty, if any.
        counterparty_id: Option<CounterpartyId>,
        /// The failed attempt being retried.
        retry_of: AttemptId,
        /// 1-based position in the retry chain.
        attempt_no: u32,
    },
    /// Timeline record of an attempt being created.
    AttemptCreated {
        /// The attempt.
        attempt_id: AttemptId,
    },
    /// Timeline record of an attempt status change.
    AttemptStatus {
        /// The attempt.
        attempt_id: AttemptId,
        /// The reported status.
        status: SendStatus,
    },
    /// A mention derived from a comment carrying its own key.
    Mention {
        /// Key of the comment event.
        comment_key: &'a IdempotencyKey,
        /// Normalized mention.
        mention: &'a str,
    },
    /// A mention derived from a comment that had no key.
    CommentMention {
        /// Stored id of the comment event.
        comment_event_id: EventId,
        /// Normalized mention.
        mention: &'a str,
    },
}

/// Deterministic operation key.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Wraps a caller-supplied key verbatim.
    ///
    /// Length and emptiness are validated by the component that stores it.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Resolves the key of a logical operation.
    #[must_use]
    pub fn resolve(operation: &Operation<'_>) -> Self {
        let key = match *operation {
            Operation::RfqStateChanged { rfq_id, from, to } => {
                format!("rfq:{rfq_id}:state_changed:{from}->{to}")
            }
            Operation::RfqSendRequested {
                rfq_id,
                request_key,
            } => format!(
                "rfq:{rfq_id}:send_requested:{}",
                request_key.map_or_else(|| "none".to_string(), escape)
            ),
            Operation::RfqAwarded { rfq_id } => format!("rfq:{rfq_id}:awarded"),
            Operation::SendAttempt {
                rfq_id,
                channel,
                counterparty_id,
                request_key,
                attempt_no,
            } => format!(
                "rfq:{rfq_id}:send:{channel}:{}:{}:{attempt_no}",
                counterparty_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
                escape(request_key)
            ),
            Operation::RetryAttempt {
                rfq_id,
                channel,
                counterparty_id,
                retry_of,
                attempt_no,
            } => format!(
                "rfq:{rfq_id}:send:{channel}:{}:retry:{retry_of}:{attempt_no}",
                counterparty_id.map_or_else(|| "-".to_string(), |id| id.to_string())
            ),
            Operation::AttemptCreated { attempt_id } => {
                format!("rfq_send_attempt:{attempt_id}:created")
            }
            Operation::AttemptStatus { attempt_id, status } => {
                format!("rfq_send_attempt:{attempt_id}:status:{status}")
            }
            Operation::Mention {
                comment_key,
                mention,
            } => format!("{}:mention:{}", comment_key.as_str(), escape(mention)),
            Operation::CommentMention {
                comment_event_id,
                mention,
            } => format!("comment:{comment_event_id}:mention:{}", escape(mention)),
        };
        Self(key)
    }

    /// Key of an RFQ status transition.
    #[must_use]
    pub fn rfq_state_changed(rfq_id: RfqId, from: RfqStatus, to: RfqStatus) -> Self {
        Self::resolve(&Operation::RfqStateChanged { rfq_id, from, to })
    }

    /// Key of a send request.
    #[must_use]
    pub fn rfq_send_requested(rfq_id: RfqId, request_key: Option<&str>) -> Self {
        Self::resolve(&Operation::RfqSendRequested {
            rfq_id,
            request_key,
        })
    }

    /// Returns the key as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the key length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key is empty or only whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn escape(segment: &str) -> String {
    segment.replace('%', "%25").replace(':', "%3A")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn state_changed_format() {
        let key = IdempotencyKey::rfq_state_changed(RfqId::new(42), RfqStatus::Draft, RfqStatus::Sent);
        assert_eq!(key.as_str(), "rfq:42:state_changed:draft->sent");
    }

    #[test]
    fn send_requested_without_key_uses_none() {
        let key = IdempotencyKey::rfq_send_requested(RfqId::new(3), None);
        assert_eq!(key.as_str(), "rfq:3:send_requested:none");
    }

    #[test]
    fn send_attempt_format() {
        let key = IdempotencyKey::resolve(&Operation::SendAttempt {
            rfq_id: RfqId::new(7),
            channel: Channel::WhatsApp,
            counterparty_id: Some(CounterpartyId::new(11)),
            request_key: "req-1",
            attempt_no: 2,
        });
        assert_eq!(key.as_str(), "rfq:7:send:whatsapp:11:req-1:2");
    }

    #[test]
    fn retry_key_never_matches_a_request_key() {
        let retry = IdempotencyKey::resolve(&Operation::RetryAttempt {
            rfq_id: RfqId::new(7),
            channel: Channel::Email,
            counterparty_id: None,
            retry_of: AttemptId::new(5),
            attempt_no: 2,
        });
        assert_eq!(retry.as_str(), "rfq:7:send:email:-:retry:5:2");

        let lookalike = IdempotencyKey::resolve(&Operation::SendAttempt {
            rfq_id: RfqId::new(7),
            channel: Channel::Email,
            counterparty_id: None,
            request_key: "retry:5",
            attempt_no: 2,
        });
        assert_ne!(retry, lookalike);
    }

    #[test]
    fn attempt_keys() {
        let created = IdempotencyKey::resolve(&Operation::AttemptCreated {
            attempt_id: AttemptId::new(5),
        });
        assert_eq!(created.as_str(), "rfq_send_attempt:5:created");
    }

    #[test]
    fn mention_keys() {
        let base = IdempotencyKey::new("c-1");
        let key = IdempotencyKey::resolve(&Operation::Mention {
            comment_key: &base,
            mention: "user@test.com",
        });
        assert_eq!(key.as_str(), "c-1:mention:user@test.com");

        let key = IdempotencyKey::resolve(&Operation::CommentMention {
            comment_event_id: EventId::new(8),
            mention: "2",
        });
        assert_eq!(key.as_str(), "comment:8:mention:2");
    }

    #[test]
    fn blank_detection() {
        assert!(IdempotencyKey::new("  ").is_blank());
        assert!(!IdempotencyKey::new("k").is_blank());
    }

    proptest! {
        #[test]
        fn resolve_is_deterministic(rfq in 1i64..1_000_000, attempt_no in 1u32..10, req in ".{0,24}") {
            let op = Operation::SendAttempt {
                rfq_id: RfqId::new(rfq),
                channel: Channel::Email,
                counterparty_id: None,
                request_key: &req,
                attempt_no,
            };
            prop_assert_eq!(IdempotencyKey::resolve(&op), IdempotencyKey::resolve(&op));
        }

        #[test]
        fn distinct_request_keys_never_collide(a in ".{0,16}", b in ".{0,16}") {
            prop_assume!(a != b);
            let ka = IdempotencyKey::rfq_send_requested(RfqId::new(1), Some(&a));
            let kb = IdempotencyKey::rfq_send_requested(RfqId::new(1), Some(&b));
            prop_assert_ne!(ka, kb);
        }

        #[test]
        fn distinct_attempt_positions_never_collide(n in 1u32..1000, m in 1u32..1000, req in "[a-z:%]{0,8}") {
            prop_assume!(n != m);
            let key = |attempt_no| IdempotencyKey::resolve(&Operation::SendAttempt {
                rfq_id: RfqId::new(1),
                channel: Channel::Api,
                counterparty_id: Some(CounterpartyId::new(2)),
                request_key: &req,
                attempt_no,
            });
            prop_assert_ne!(key(n), key(m));
        }
    }
}
