//! # Identifiers
//!
//! Strongly typed identifiers for the dispatch domain.
//!
//! Entity identities are storage-assigned integers; wrapping them keeps an
//! attempt id from being passed where an RFQ id is expected.
//! [`CorrelationId`] is the one string identifier: it groups timeline
//! events produced by a single causal business action.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! integer_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw storage identifier.
            #[inline]
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw identifier.
            #[inline]
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }

            /// Returns true if the identifier is a positive integer.
            #[inline]
            #[must_use]
            pub const fn is_positive(self) -> bool {
                self.0 > 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

integer_id!(
    /// Identifier of an RFQ.
    RfqId
);
integer_id!(
    /// Identifier of a send attempt.
    AttemptId
);
integer_id!(
    /// Identifier of a stored timeline event.
    EventId
);
integer_id!(
    /// Identifier of a counterparty quote selected on award.
    QuoteId
);
integer_id!(
    /// Identifier of a back-office user.
    UserId
);
integer_id!(
    /// Identifier of a counterparty (broker, bank) receiving the RFQ.
    CounterpartyId
);

/// Groups timeline events belonging to one causal chain.
///
/// # Examples
///
/// ```
/// use rfq_dispatch::domain::value_objects::CorrelationId;
///
/// let id = CorrelationId::from_request_id(Some("6F9619FF-8B86-D011-B42D-00C04FC964FF"));
/// assert_eq!(id.as_str(), "6f9619ff-8b86-d011-b42d-00c04fc964ff");
///
/// let fresh = CorrelationId::from_request_id(Some("not-a-uuid"));
/// assert_eq!(fresh.as_str().len(), 36);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Creates a correlation id from an arbitrary string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a fresh random correlation id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Resolves a correlation id from an inbound request id.
    ///
    /// A request id that parses as a UUID is reused in canonical form;
    /// anything else (including `None`) yields a fresh UUIDv4.
    #[must_use]
    pub fn from_request_id(request_id: Option<&str>) -> Self {
        request_id
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .map(|uuid| Self(uuid.to_string()))
            .unwrap_or_else(Self::generate)
    }

    /// Returns the string value.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
