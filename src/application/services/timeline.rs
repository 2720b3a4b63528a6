//! # Timeline Log
//!
//! Append-only, idempotent audit trail with role-based read visibility.
//!
//! [`TimelineLog::append`] is the single place where "exactly once" is
//! decided: an event carrying an idempotency key that is already stored
//! resolves to the stored row, unchanged. Everything that must not be
//! recorded twice (state transitions, attempt status changes, mentions)
//! goes through it with a key from
//! [`IdempotencyKey::resolve`](crate::domain::value_objects::IdempotencyKey::resolve).
//!
//! Limits (subject type, key and correlation id lengths, comment size)
//! come from the [`TimelineConfig`] built at startup.

use crate::application::error::{ApplicationError, ApplicationResult};
use crate::config::TimelineConfig;
use crate::domain::entities::TimelineEvent;
use crate::domain::errors::DomainError;
use crate::domain::events::{
    Attachment, AttachmentAdded, CommentCorrected, CommentCreated, EventCategory, Mentioned,
    NewTimelineEvent, RFQ_SUBJECT, TimelinePayload,
};
use crate::domain::services::{can_read, can_write, normalize_mentions, readable_visibilities, thread_key_for};
use crate::domain::value_objects::{
    CorrelationId, EventId, IdempotencyKey, Operation, Role, UserId, Visibility,
};
use crate::infrastructure::persistence::{Insertion, TimelineEventStore};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// The user performing a write or read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    /// User id, `None` for service accounts.
    pub user_id: Option<UserId>,
    /// Role.
    pub role: Role,
}

impl Actor {
    /// Creates an actor.
    #[must_use]
    pub const fn new(user_id: Option<UserId>, role: Role) -> Self {
        Self { user_id, role }
    }
}

/// A new human comment on a timeline subject.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentRequest {
    /// Subject kind (`"rfq"`, `"contract"`, ...).
    pub subject_type: String,
    /// Subject id.
    pub subject_id: i64,
    /// Comment text.
    pub body: String,
    /// Read gate of the comment and its mentions.
    pub visibility: Visibility,
    /// Raw mentions, normalized before storage.
    pub mentions: Vec<String>,
    /// Attached files.
    pub attachments: Vec<Attachment>,
    /// Client key making the post replay-safe.
    pub idempotency_key: Option<IdempotencyKey>,
    /// Request metadata.
    pub meta: Option<Value>,
}

/// A correction of an earlier comment.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionRequest {
    /// The comment being corrected.
    pub supersedes_event_id: EventId,
    /// Replacement text.
    pub body: String,
    /// Raw mentions.
    pub mentions: Vec<String>,
    /// Attached files.
    pub attachments: Vec<Attachment>,
    /// Client key.
    pub idempotency_key: Option<IdempotencyKey>,
    /// Request metadata.
    pub meta: Option<Value>,
}

/// A file attached to a subject's thread. The upload itself happens
/// elsewhere; this records where the file is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRequest {
    /// Subject kind.
    pub subject_type: String,
    /// Subject id.
    pub subject_id: i64,
    /// Storage key of the uploaded file.
    pub file_id: String,
    /// Display name.
    pub file_name: String,
    /// MIME type.
    pub mime: String,
    /// Size in bytes.
    pub size: u64,
    /// Content checksum.
    pub checksum: Option<String>,
    /// Where the file is stored.
    pub storage_uri: String,
    /// Read gate.
    pub visibility: Visibility,
    /// Client key making the post replay-safe.
    pub idempotency_key: Option<IdempotencyKey>,
    /// Request metadata.
    pub meta: Option<Value>,
}

const MAX_FILE_ID_LEN: usize = 128;
const MAX_FILE_FIELD_LEN: usize = 255;
const MAX_STORAGE_URI_LEN: usize = 2_048;

/// A stored comment and the mention events derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct PostedComment {
    /// The comment (or correction) event.
    pub comment: Insertion<TimelineEvent>,
    /// One `human.mentioned` event per normalized mention.
    pub mentions: Vec<TimelineEvent>,
}

/// Timeline event log service.
#[derive(Debug, Clone)]
pub struct TimelineLog {
    store: Arc<dyn TimelineEventStore>,
    config: Arc<TimelineConfig>,
}

impl TimelineLog {
    /// Creates a log over a store.
    #[must_use]
    pub fn new(store: Arc<dyn TimelineEventStore>, config: Arc<TimelineConfig>) -> Self {
        Self { store, config }
    }

    /// Returns the limits in force.
    #[must_use]
    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    /// Appends an event, or returns the stored event with the same key.
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidArgument` - a field violates the configured
    ///   limits or the payload is not a JSON object
    /// - `ApplicationError::Repository` - storage failure
    pub async fn append(
        &self,
        event: NewTimelineEvent,
    ) -> ApplicationResult<Insertion<TimelineEvent>> {
        self.validate(&event)?;

        let inserted = self.store.append_if_absent(event).await?;
        let stored = inserted.get();
        if inserted.is_created() {
            debug!(
                event_id = %stored.id(),
                event_type = %stored.event_type(),
                subject_type = stored.subject_type(),
                subject_id = stored.subject_id(),
                "timeline event appended"
            );
        } else {
            debug!(
                event_id = %stored.id(),
                idempotency_key = ?stored.idempotency_key().map(IdempotencyKey::as_str),
                "timeline append deduplicated"
            );
        }
        Ok(inserted)
    }

    /// Appends a system event about an RFQ with the configured core
    /// visibility.
    ///
    /// # Errors
    ///
    /// Same as [`append`](Self::append).
    pub async fn emit_rfq<P: TimelinePayload + Sync>(
        &self,
        payload: &P,
        rfq_id: i64,
        correlation_id: &CorrelationId,
        key: IdempotencyKey,
        actor: Option<UserId>,
    ) -> ApplicationResult<Insertion<TimelineEvent>> {
        let event = NewTimelineEvent::for_payload(payload, RFQ_SUBJECT, rfq_id, correlation_id.clone())?
            .with_idempotency_key(key)
            .with_visibility(self.config.state_change_visibility)
            .with_actor(actor);
        self.append(event).await
    }

    /// Appends a collaborator event (`SO_CREATED`, `EXPOSURE_UPDATED`, ...)
    /// on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// - `DomainError::Forbidden` - the role may not write the visibility
    /// - `DomainError::InvalidArgument` - the type is not a collaborator
    ///   type, or validation fails
    pub async fn append_authored(
        &self,
        actor: Actor,
        event: NewTimelineEvent,
    ) -> ApplicationResult<Insertion<TimelineEvent>> {
        ensure_can_write(actor, event.visibility)?;
        if event.event_type.category() != EventCategory::Collaborator {
            return Err(DomainError::invalid_argument(format!(
                "{} cannot be authored directly",
                event.event_type
            ))
            .into());
        }
        self.append(event.with_actor(actor.user_id)).await
    }

    /// Posts a human comment and its mention events.
    ///
    /// # Errors
    ///
    /// - `DomainError::Forbidden` - the role may not write the visibility
    /// - `DomainError::InvalidArgument` - bad subject, empty or oversized
    ///   body, or a field over its limit
    pub async fn add_comment(
        &self,
        actor: Actor,
        request: CommentRequest,
        correlation_id: CorrelationId,
    ) -> ApplicationResult<PostedComment> {
        ensure_can_write(actor, request.visibility)?;
        let thread_key = thread_key_for(&request.subject_type, request.subject_id)?;
        self.validate_body(&request.body)?;
        let mentions = normalize_mentions(&request.mentions);
        self.validate_mention_keys(request.idempotency_key.as_ref(), &mentions)?;

        let payload = CommentCreated {
            body: request.body,
            thread_key: thread_key.clone(),
            mentions: mentions.clone(),
            attachments: request.attachments,
        };
        let mut event = NewTimelineEvent::for_payload(
            &payload,
            request.subject_type.clone(),
            request.subject_id,
            correlation_id.clone(),
        )?
        .with_visibility(request.visibility)
        .with_actor(actor.user_id);
        event.idempotency_key = request.idempotency_key;
        event.meta = request.meta;

        let comment = self.append(event).await?;
        info!(
            event_id = %comment.get().id(),
            subject_type = %request.subject_type,
            subject_id = request.subject_id,
            mentions = mentions.len(),
            "comment posted"
        );

        let mentions = self
            .emit_mentions(actor, comment.get(), &thread_key, &mentions, &correlation_id)
            .await?;
        Ok(PostedComment { comment, mentions })
    }

    /// Corrects an earlier comment. The correction inherits the subject and
    /// visibility of the corrected event.
    ///
    /// # Errors
    ///
    /// - `DomainError::NotFound` - the corrected event does not exist
    /// - `DomainError::InvalidArgument` - the event is not a comment, or
    ///   validation fails
    /// - `DomainError::Forbidden` - the role may not write the inherited
    ///   visibility
    pub async fn correct_comment(
        &self,
        actor: Actor,
        request: CorrectionRequest,
        correlation_id: CorrelationId,
    ) -> ApplicationResult<PostedComment> {
        let superseded = self
            .store
            .get(request.supersedes_event_id)
            .await?
            .ok_or_else(|| DomainError::not_found("timeline_event", request.supersedes_event_id))?;
        if !superseded.event_type().is_comment() {
            return Err(DomainError::invalid_argument("only human comments can be corrected").into());
        }

        let visibility = superseded.visibility();
        ensure_can_write(actor, visibility)?;
        let thread_key = thread_key_for(superseded.subject_type(), superseded.subject_id())?;
        self.validate_body(&request.body)?;
        let mentions = normalize_mentions(&request.mentions);
        self.validate_mention_keys(request.idempotency_key.as_ref(), &mentions)?;

        let payload = CommentCorrected {
            supersedes_event_id: superseded.id(),
            body: request.body,
            thread_key: thread_key.clone(),
            mentions: mentions.clone(),
            attachments: request.attachments,
        };
        let mut event = NewTimelineEvent::for_payload(
            &payload,
            superseded.subject_type(),
            superseded.subject_id(),
            correlation_id.clone(),
        )?
        .with_visibility(visibility)
        .with_actor(actor.user_id);
        event.idempotency_key = request.idempotency_key;
        event.meta = request.meta;

        let comment = self.append(event).await?;
        info!(
            event_id = %comment.get().id(),
            supersedes = %superseded.id(),
            "comment corrected"
        );

        let mentions = self
            .emit_mentions(actor, comment.get(), &thread_key, &mentions, &correlation_id)
            .await?;
        Ok(PostedComment { comment, mentions })
    }

    /// Records a file attached to a subject's thread.
    ///
    /// # Errors
    ///
    /// - `DomainError::Forbidden` - the role may not write the visibility
    /// - `DomainError::InvalidArgument` - bad subject, or a file field is
    ///   empty or over its limit
    pub async fn add_attachment(
        &self,
        actor: Actor,
        request: AttachmentRequest,
        correlation_id: CorrelationId,
    ) -> ApplicationResult<Insertion<TimelineEvent>> {
        ensure_can_write(actor, request.visibility)?;
        let thread_key = thread_key_for(&request.subject_type, request.subject_id)?;
        validate_file_field("file_id", &request.file_id, MAX_FILE_ID_LEN)?;
        validate_file_field("file_name", &request.file_name, MAX_FILE_FIELD_LEN)?;
        validate_file_field("mime", &request.mime, MAX_FILE_FIELD_LEN)?;
        validate_file_field("storage_uri", &request.storage_uri, MAX_STORAGE_URI_LEN)?;
        if let Some(checksum) = &request.checksum
            && checksum.len() > MAX_FILE_FIELD_LEN
        {
            return Err(invalid(format!("checksum exceeds {MAX_FILE_FIELD_LEN} characters")));
        }

        let payload = AttachmentAdded {
            thread_key,
            file_id: request.file_id,
            file_name: request.file_name,
            mime: request.mime,
            size: request.size,
            checksum: request.checksum,
            storage_uri: request.storage_uri,
        };
        let mut event = NewTimelineEvent::for_payload(
            &payload,
            request.subject_type.clone(),
            request.subject_id,
            correlation_id,
        )?
        .with_visibility(request.visibility)
        .with_actor(actor.user_id);
        event.idempotency_key = request.idempotency_key;
        event.meta = request.meta;

        let attached = self.append(event).await?;
        if attached.is_created() {
            info!(
                event_id = %attached.get().id(),
                subject_type = %request.subject_type,
                subject_id = request.subject_id,
                file_id = %payload.file_id,
                "attachment added"
            );
        }
        Ok(attached)
    }

    /// Lists the events of a subject readable by `viewer`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `ApplicationError::Repository` on storage failure.
    pub async fn list_for_subject(
        &self,
        subject_type: &str,
        subject_id: i64,
        viewer: Role,
    ) -> ApplicationResult<Vec<TimelineEvent>> {
        let visibilities = readable_visibilities(viewer);
        Ok(self
            .store
            .list_for_subject(subject_type, subject_id, &visibilities)
            .await?)
    }

    /// Lists the latest events readable by `viewer`, newest first. `limit`
    /// is capped by the configured `recent_limit`.
    ///
    /// # Errors
    ///
    /// Returns `ApplicationError::Repository` on storage failure.
    pub async fn recent(&self, viewer: Role, limit: usize) -> ApplicationResult<Vec<TimelineEvent>> {
        let limit = limit.clamp(1, self.config.recent_limit);
        let visibilities = readable_visibilities(viewer);
        Ok(self.store.recent(&visibilities, limit).await?)
    }

    /// Lists the events of one causal chain readable by `viewer`.
    ///
    /// # Errors
    ///
    /// Returns `ApplicationError::Repository` on storage failure.
    pub async fn list_by_correlation(
        &self,
        correlation_id: &CorrelationId,
        viewer: Role,
    ) -> ApplicationResult<Vec<TimelineEvent>> {
        let events = self.store.list_by_correlation(correlation_id).await?;
        Ok(events
            .into_iter()
            .filter(|e| can_read(viewer, e.visibility()))
            .collect())
    }

    async fn emit_mentions(
        &self,
        actor: Actor,
        comment: &TimelineEvent,
        thread_key: &str,
        mentions: &[String],
        correlation_id: &CorrelationId,
    ) -> ApplicationResult<Vec<TimelineEvent>> {
        let mut emitted = Vec::with_capacity(mentions.len());
        for mention in mentions {
            let key = mention_key(comment.idempotency_key(), comment.id(), mention);
            let payload = Mentioned {
                mention: mention.clone(),
                comment_event_id: comment.id(),
                thread_key: thread_key.to_string(),
            };
            let event = NewTimelineEvent::for_payload(
                &payload,
                comment.subject_type(),
                comment.subject_id(),
                correlation_id.clone(),
            )?
            .with_idempotency_key(key)
            .with_visibility(comment.visibility())
            .with_actor(actor.user_id);
            emitted.push(self.append(event).await?.into_inner());
        }
        Ok(emitted)
    }

    fn validate(&self, event: &NewTimelineEvent) -> ApplicationResult<()> {
        let limits = &self.config;
        if event.subject_type.trim().is_empty() {
            return Err(invalid("subject_type must not be empty"));
        }
        if event.subject_type.len() > limits.max_subject_type_len {
            return Err(invalid(format!(
                "subject_type exceeds {} characters",
                limits.max_subject_type_len
            )));
        }
        if event.subject_id <= 0 {
            return Err(invalid("subject_id must be a positive integer"));
        }
        let correlation = event.correlation_id.as_str();
        if correlation.is_empty() || correlation.len() > limits.max_correlation_id_len {
            return Err(invalid(format!(
                "correlation_id must be 1..={} characters",
                limits.max_correlation_id_len
            )));
        }
        if let Some(key) = &event.idempotency_key {
            self.validate_key(key)?;
        }
        if !event.payload.is_object() {
            return Err(invalid("payload must be a JSON object"));
        }
        Ok(())
    }

    fn validate_key(&self, key: &IdempotencyKey) -> ApplicationResult<()> {
        if key.is_blank() {
            return Err(invalid("idempotency_key must not be blank"));
        }
        if key.len() > self.config.max_idempotency_key_len {
            return Err(invalid(format!(
                "idempotency_key exceeds {} characters",
                self.config.max_idempotency_key_len
            )));
        }
        Ok(())
    }

    fn validate_body(&self, body: &str) -> ApplicationResult<()> {
        if body.trim().is_empty() {
            return Err(invalid("comment body must not be empty"));
        }
        if body.chars().count() > self.config.max_comment_len {
            return Err(invalid(format!(
                "comment body exceeds {} characters",
                self.config.max_comment_len
            )));
        }
        Ok(())
    }

    // Mention keys are derived from the comment, so they are checked before
    // the comment is written. Keyless comments are checked against the
    // widest possible event id.
    fn validate_mention_keys(
        &self,
        comment_key: Option<&IdempotencyKey>,
        mentions: &[String],
    ) -> ApplicationResult<()> {
        if let Some(key) = comment_key {
            self.validate_key(key)?;
        }
        for mention in mentions {
            self.validate_key(&mention_key(comment_key, EventId::new(i64::MAX), mention))?;
        }
        Ok(())
    }
}

fn mention_key(
    comment_key: Option<&IdempotencyKey>,
    comment_event_id: EventId,
    mention: &str,
) -> IdempotencyKey {
    match comment_key {
        Some(comment_key) => IdempotencyKey::resolve(&Operation::Mention {
            comment_key,
            mention,
        }),
        None => IdempotencyKey::resolve(&Operation::CommentMention {
            comment_event_id,
            mention,
        }),
    }
}

fn ensure_can_write(actor: Actor, visibility: Visibility) -> ApplicationResult<()> {
    if can_write(actor.role, visibility) {
        Ok(())
    } else {
        Err(DomainError::forbidden(format!(
            "role {} cannot write {} timeline events",
            actor.role, visibility
        ))
        .into())
    }
}

fn validate_file_field(name: &str, value: &str, max: usize) -> ApplicationResult<()> {
    if value.trim().is_empty() {
        return Err(invalid(format!("{name} must not be empty")));
    }
    if value.len() > max {
        return Err(invalid(format!("{name} exceeds {max} characters")));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> ApplicationError {
    DomainError::invalid_argument(message).into()
}
