//! # Human Collaboration Events
//!
//! Payloads of comments, corrections, mentions and file attachments
//! authored by back-office users on any timeline subject.

use crate::domain::events::domain_event::TimelinePayload;
use crate::domain::events::event_type::TimelineEventType;
use crate::domain::value_objects::EventId;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A file attached to a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Attachment {
    /// Storage key of the uploaded file.
    pub file_id: String,
    /// Display name.
    pub name: String,
}

/// Payload of `human.comment.created`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CommentCreated {
    /// Comment text.
    pub body: String,
    /// Conversation the comment belongs to.
    pub thread_key: String,
    /// Normalized mentions.
    pub mentions: Vec<String>,
    /// Attachments.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl TimelinePayload for CommentCreated {
    const EVENT_TYPE: TimelineEventType = TimelineEventType::HumanCommentCreated;
}

/// Payload of `human.comment.corrected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CommentCorrected {
    /// The comment event being superseded.
    pub supersedes_event_id: EventId,
    /// Corrected text.
    pub body: String,
    /// Conversation the comment belongs to.
    pub thread_key: String,
    /// Normalized mentions.
    pub mentions: Vec<String>,
    /// Attachments.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl TimelinePayload for CommentCorrected {
    const EVENT_TYPE: TimelineEventType = TimelineEventType::HumanCommentCorrected;
}

/// Payload of `human.mentioned`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Mentioned {
    /// Normalized mention.
    pub mention: String,
    /// The comment carrying the mention.
    pub comment_event_id: EventId,
    /// Conversation the comment belongs to.
    pub thread_key: String,
}

impl TimelinePayload for Mentioned {
    const EVENT_TYPE: TimelineEventType = TimelineEventType::HumanMentioned;
}

/// Payload of `human.attachment.added`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AttachmentAdded {
    /// Conversation the file belongs to.
    pub thread_key: String,
    /// Storage key of the uploaded file.
    pub file_id: String,
    /// Display name.
    pub file_name: String,
    /// MIME type.
    pub mime: String,
    /// Size in bytes.
    pub size: u64,
    /// Content checksum, when the uploader computed one.
    pub checksum: Option<String>,
    /// Where the file is stored.
    pub storage_uri: String,
}

impl TimelinePayload for AttachmentAdded {
    const EVENT_TYPE: TimelineEventType = TimelineEventType::HumanAttachmentAdded;
}
