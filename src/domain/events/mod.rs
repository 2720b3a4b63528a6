//! # Timeline Events
//!
//! Event types and payloads recorded on the append-only timeline.
//!
//! ## RFQ Events
//!
//! - [`RfqStateChanged`]: status transition
//! - [`RfqSendRequested`]: caller requested dispatch
//! - [`SendAttemptCreated`]: attempt row created
//! - [`SendAttemptStatusUpdated`]: attempt status change
//! - [`RfqAwarded`]: quote awarded
//!
//! ## Human Collaboration Events
//!
//! - [`CommentCreated`], [`CommentCorrected`], [`Mentioned`]
//! - [`AttachmentAdded`]: file attached to a thread
//!
//! Collaborator events (`SO_CREATED`, `PO_CREATED`, ...) carry free-form
//! payloads and have no struct here.

pub mod domain_event;
pub mod event_type;
pub mod human_events;
pub mod rfq_events;

pub use domain_event::{NewTimelineEvent, TimelinePayload};
pub use event_type::{EventCategory, TimelineEventType};
pub use human_events::{
    Attachment, AttachmentAdded, CommentCorrected, CommentCreated, Mentioned,
};
pub use rfq_events::{
    RFQ_SUBJECT, RfqAwarded, RfqSendRequested, RfqStateChanged, SendAttemptCreated,
    SendAttemptStatusUpdated,
};
