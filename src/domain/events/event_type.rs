//! # Timeline Event Types
//!
//! The closed set of event types the timeline accepts.
//!
//! The set is frozen: adding a type is a reviewed code change, and parsing
//! an unknown string fails instead of storing it.
//!
//! # Examples
//!
//! ```
//! use rfq_dispatch::domain::events::TimelineEventType;
//!
//! let t: TimelineEventType = "RFQ_STATE_CHANGED".parse().unwrap();
//! assert_eq!(t, TimelineEventType::RfqStateChanged);
//! assert!("RFQ_DELETED".parse::<TimelineEventType>().is_err());
//! assert_eq!(TimelineEventType::HumanMentioned.as_str(), "human.mentioned");
//! ```

use crate::domain::value_objects::ParseEnumError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category of a timeline event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    /// Emitted by the dispatch core.
    Rfq,
    /// Produced by collaborating back-office modules (v1 set).
    Collaborator,
    /// Human-authored collaboration.
    Human,
}

/// Timeline event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum TimelineEventType {
    /// RFQ status transition.
    #[serde(rename = "RFQ_STATE_CHANGED")]
    RfqStateChanged,
    /// Caller requested dispatch.
    #[serde(rename = "RFQ_SEND_REQUESTED")]
    RfqSendRequested,
    /// A send attempt row was created.
    #[serde(rename = "RFQ_SEND_ATTEMPT_CREATED")]
    RfqSendAttemptCreated,
    /// A send attempt changed status.
    #[serde(rename = "RFQ_SEND_ATTEMPT_STATUS_UPDATED")]
    RfqSendAttemptStatusUpdated,
    /// A quote was awarded.
    #[serde(rename = "RFQ_AWARDED")]
    RfqAwarded,
    /// Sales order created.
    #[serde(rename = "SO_CREATED")]
    SoCreated,
    /// Purchase order created.
    #[serde(rename = "PO_CREATED")]
    PoCreated,
    /// Contract created.
    #[serde(rename = "CONTRACT_CREATED")]
    ContractCreated,
    /// Exposure recalculated.
    #[serde(rename = "EXPOSURE_UPDATED")]
    ExposureUpdated,
    /// Mark-to-market run required.
    #[serde(rename = "MTM_REQUIRED")]
    MtmRequired,
    /// Human comment.
    #[serde(rename = "human.comment.created")]
    HumanCommentCreated,
    /// Correction superseding an earlier comment.
    #[serde(rename = "human.comment.corrected")]
    HumanCommentCorrected,
    /// A user was mentioned in a comment.
    #[serde(rename = "human.mentioned")]
    HumanMentioned,
    /// A file was attached to a subject's thread.
    #[serde(rename = "human.attachment.added")]
    HumanAttachmentAdded,
}

impl TimelineEventType {
    /// Every accepted event type.
    pub const ALL: [Self; 14] = [
        Self::RfqStateChanged,
        Self::RfqSendRequested,
        Self::RfqSendAttemptCreated,
        Self::RfqSendAttemptStatusUpdated,
        Self::RfqAwarded,
        Self::SoCreated,
        Self::PoCreated,
        Self::ContractCreated,
        Self::ExposureUpdated,
        Self::MtmRequired,
        Self::HumanCommentCreated,
        Self::HumanCommentCorrected,
        Self::HumanMentioned,
        Self::HumanAttachmentAdded,
    ];

    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RfqStateChanged => "RFQ_STATE_CHANGED",
            Self::RfqSendRequested => "RFQ_SEND_REQUESTED",
            Self::RfqSendAttemptCreated => "RFQ_SEND_ATTEMPT_CREATED",
            Self::RfqSendAttemptStatusUpdated => "RFQ_SEND_ATTEMPT_STATUS_UPDATED",
            Self::RfqAwarded => "RFQ_AWARDED",
            Self::SoCreated => "SO_CREATED",
            Self::PoCreated => "PO_CREATED",
            Self::ContractCreated => "CONTRACT_CREATED",
            Self::ExposureUpdated => "EXPOSURE_UPDATED",
            Self::MtmRequired => "MTM_REQUIRED",
            Self::HumanCommentCreated => "human.comment.created",
            Self::HumanCommentCorrected => "human.comment.corrected",
            Self::HumanMentioned => "human.mentioned",
            Self::HumanAttachmentAdded => "human.attachment.added",
        }
    }

    /// Returns the category of this type.
    #[must_use]
    pub const fn category(self) -> EventCategory {
        match self {
            Self::RfqStateChanged
            | Self::RfqSendRequested
            | Self::RfqSendAttemptCreated
            | Self::RfqSendAttemptStatusUpdated
            | Self::RfqAwarded => EventCategory::Rfq,
            Self::SoCreated
            | Self::PoCreated
            | Self::ContractCreated
            | Self::ExposureUpdated
            | Self::MtmRequired => EventCategory::Collaborator,
            Self::HumanCommentCreated
            | Self::HumanCommentCorrected
            | Self::HumanMentioned
            | Self::HumanAttachmentAdded => EventCategory::Human,
        }
    }

    /// Returns true for human-authored collaboration events.
    #[inline]
    #[must_use]
    pub const fn is_human(self) -> bool {
        matches!(self.category(), EventCategory::Human)
    }

    /// Returns true for events that may be superseded by a correction.
    #[inline]
    #[must_use]
    pub const fn is_comment(self) -> bool {
        matches!(self, Self::HumanCommentCreated | Self::HumanCommentCorrected)
    }
}

impl fmt::Display for TimelineEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimelineEventType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == raw)
            .ok_or_else(|| ParseEnumError::InvalidValue("TimelineEventType", s.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_display_agree() {
        for t in TimelineEventType::ALL {
            assert_eq!(t.to_string().parse::<TimelineEventType>().unwrap(), t);
        }
    }

    #[test]
    fn parsing_is_exact() {
        assert!("rfq_state_changed".parse::<TimelineEventType>().is_err());
        assert!("HUMAN.COMMENT.CREATED".parse::<TimelineEventType>().is_err());
    }

    #[test]
    fn serde_uses_storage_form() {
        let json = serde_json::to_string(&TimelineEventType::HumanCommentCorrected).unwrap();
        assert_eq!(json, "\"human.comment.corrected\"");
        let back: TimelineEventType = serde_json::from_str("\"MTM_REQUIRED\"").unwrap();
        assert_eq!(back, TimelineEventType::MtmRequired);
    }

    #[test]
    fn categories() {
        assert_eq!(
            TimelineEventType::RfqAwarded.category(),
            EventCategory::Rfq
        );
        assert_eq!(
            TimelineEventType::PoCreated.category(),
            EventCategory::Collaborator
        );
        assert!(TimelineEventType::HumanMentioned.is_human());
        assert!(!TimelineEventType::HumanMentioned.is_comment());
        assert!(TimelineEventType::HumanCommentCorrected.is_comment());
        assert!(TimelineEventType::HumanAttachmentAdded.is_human());
        assert!(!TimelineEventType::HumanAttachmentAdded.is_comment());
    }
}
