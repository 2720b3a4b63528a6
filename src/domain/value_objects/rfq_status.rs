//! # RFQ Status
//!
//! RFQ lifecycle state machine.
//!
//! # State Machine
//!
//! ```text
//! Draft → Sent → Awarded
//!   ↓       ↓
//!   └───────┴──→ Failed
//! ```
//!
//! `Awarded` and `Failed` are terminal. `Draft → Failed` is the only path
//! that skips `Sent`, used when dispatch cannot even be attempted.
//!
//! # Examples
//!
//! ```
//! use rfq_dispatch::domain::value_objects::RfqStatus;
//!
//! assert!(RfqStatus::Draft.can_transition_to(RfqStatus::Sent));
//! assert!(!RfqStatus::Draft.can_transition_to(RfqStatus::Awarded));
//! assert!(RfqStatus::Failed.is_terminal());
//! ```

use crate::domain::value_objects::enums::ParseEnumError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// RFQ lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RfqStatus {
    /// Created, message being prepared; nothing sent yet.
    #[default]
    Draft,
    /// At least one send attempt exists; awaiting quotes.
    Sent,
    /// A quote was awarded (terminal).
    Awarded,
    /// Dispatch failed or the RFQ was abandoned (terminal).
    Failed,
}

impl RfqStatus {
    /// Returns true if this is a terminal state.
    #[inline]
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Awarded | Self::Failed)
    }

    /// Returns true if this state can transition to the target state.
    ///
    /// - Draft → Sent, Failed
    /// - Sent → Awarded, Failed
    /// - Terminal states → (none)
    #[must_use]
    pub const fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Draft, Self::Sent)
                | (Self::Draft, Self::Failed)
                | (Self::Sent, Self::Awarded)
                | (Self::Sent, Self::Failed)
        )
    }

    /// Returns the valid next states from this state.
    #[must_use]
    pub fn valid_transitions(&self) -> Vec<Self> {
        match self {
            Self::Draft => vec![Self::Sent, Self::Failed],
            Self::Sent => vec![Self::Awarded, Self::Failed],
            Self::Awarded | Self::Failed => vec![],
        }
    }

    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Awarded => "awarded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RfqStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RfqStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "sent" => Ok(Self::Sent),
            "awarded" => Ok(Self::Awarded),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseEnumError::InvalidValue("RfqStatus", s.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ALL: [RfqStatus; 4] = [
        RfqStatus::Draft,
        RfqStatus::Sent,
        RfqStatus::Awarded,
        RfqStatus::Failed,
    ];

    #[test]
    fn terminal_states() {
        assert!(!RfqStatus::Draft.is_terminal());
        assert!(!RfqStatus::Sent.is_terminal());
        assert!(RfqStatus::Awarded.is_terminal());
        assert!(RfqStatus::Failed.is_terminal());
    }

    #[test]
    fn draft_cannot_skip_to_awarded() {
        assert!(!RfqStatus::Draft.can_transition_to(RfqStatus::Awarded));
    }

    #[test]
    fn draft_may_fail_directly() {
        assert!(RfqStatus::Draft.can_transition_to(RfqStatus::Failed));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in [RfqStatus::Awarded, RfqStatus::Failed] {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn valid_transitions_agree_with_predicate() {
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    from.valid_transitions().contains(&to)
                );
            }
        }
    }

    #[test]
    fn no_self_transitions() {
        for s in ALL {
            assert!(!s.can_transition_to(s));
        }
    }

    #[test]
    fn parse_display_agree() {
        for s in ALL {
            assert_eq!(s.to_string().parse::<RfqStatus>().unwrap(), s);
        }
        assert!("pending".parse::<RfqStatus>().is_err());
    }
}
