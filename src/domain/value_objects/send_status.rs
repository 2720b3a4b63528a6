//! # Send Status
//!
//! Channel-level status of a single send attempt, independent of the RFQ
//! status.
//!
//! ```text
//! Queued → Sent → Delivered
//!   ↓        ↓
//!   └────────┴──→ Failed
//! ```
//!
//! `Sent` means the transport accepted the message; `Delivered` and
//! `Failed` are terminal and are written exactly once.

use crate::domain::value_objects::enums::ParseEnumError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    /// Created, waiting for a worker.
    #[default]
    Queued,
    /// Handed to the transport; delivery not yet confirmed.
    Sent,
    /// Provider confirmed delivery (terminal).
    Delivered,
    /// Transport or provider reported failure (terminal).
    Failed,
}

impl SendStatus {
    /// Returns true if this is a terminal status.
    #[inline]
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }

    /// Returns true if an outcome report may move the attempt from this
    /// status to `target`.
    #[must_use]
    pub const fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Queued, Self::Sent)
                | (Self::Queued, Self::Delivered)
                | (Self::Queued, Self::Failed)
                | (Self::Sent, Self::Delivered)
                | (Self::Sent, Self::Failed)
        )
    }

    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SendStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queued" => Ok(Self::Queued),
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseEnumError::InvalidValue("SendStatus", s.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn terminal() {
        assert!(!SendStatus::Queued.is_terminal());
        assert!(!SendStatus::Sent.is_terminal());
        assert!(SendStatus::Delivered.is_terminal());
        assert!(SendStatus::Failed.is_terminal());
    }

    #[test]
    fn terminal_statuses_never_move() {
        for to in [
            SendStatus::Queued,
            SendStatus::Sent,
            SendStatus::Delivered,
            SendStatus::Failed,
        ] {
            assert!(!SendStatus::Delivered.can_transition_to(to));
            assert!(!SendStatus::Failed.can_transition_to(to));
        }
    }

    #[test]
    fn nothing_returns_to_queued() {
        assert!(!SendStatus::Sent.can_transition_to(SendStatus::Queued));
    }

    #[test]
    fn parse() {
        assert_eq!("Delivered".parse::<SendStatus>().unwrap(), SendStatus::Delivered);
        assert!("bounced".parse::<SendStatus>().is_err());
    }
}
