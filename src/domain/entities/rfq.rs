//! # RFQ Aggregate Root
//!
//! The RFQ (Request-for-Quote) aggregate manages the dispatch lifecycle of a
//! quote request sent to one or more counterparties.
//!
//! # State Machine
//!
//! ```text
//! Draft → Sent → Awarded
//!   ↓       ↓
//!   └───────┴──→ Failed
//! ```
//!
//! `sent_at` is set on the transition into `Sent` and `awarded_at` on the
//! transition into `Awarded`; neither is ever overwritten.
//!
//! # Examples
//!
//! ```
//! use rfq_dispatch::domain::entities::Rfq;
//! use rfq_dispatch::domain::value_objects::{QuoteId, RfqId, RfqStatus};
//!
//! let mut rfq = Rfq::new(RfqId::new(1), "Cotação LME Cu 25t", None);
//! rfq.mark_sent().unwrap();
//! rfq.mark_awarded(QuoteId::new(5)).unwrap();
//!
//! assert_eq!(rfq.status(), RfqStatus::Awarded);
//! assert!(rfq.awarded_at().is_some());
//! ```

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::timestamp::Timestamp;
use crate::domain::value_objects::{QuoteId, RfqId, RfqStatus, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// RFQ aggregate root.
///
/// # Invariants
///
/// - Valid state transitions only (FSM enforced)
/// - `sent_at` is set iff the RFQ passed through `Sent`
/// - `awarded_at` is set iff the status is `Awarded`
/// - `message_text` is immutable once the RFQ left `Draft`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rfq {
    /// Storage-assigned identifier.
    id: RfqId,
    /// Text sent to counterparties.
    message_text: String,
    /// Current lifecycle status.
    status: RfqStatus,
    /// When the RFQ entered `Sent`.
    sent_at: Option<Timestamp>,
    /// When the RFQ was awarded.
    awarded_at: Option<Timestamp>,
    /// The winning quote.
    awarded_quote_id: Option<QuoteId>,
    /// Reason for failure, if failed.
    failure_reason: Option<String>,
    /// Creator.
    created_by: Option<UserId>,
    /// Version for optimistic locking.
    version: u64,
    /// When this RFQ was created.
    created_at: Timestamp,
    /// When this RFQ was last updated.
    updated_at: Timestamp,
}

impl Rfq {
    /// Creates a draft RFQ with a storage-assigned id.
    #[must_use]
    pub fn new(id: RfqId, message_text: impl Into<String>, created_by: Option<UserId>) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            message_text: message_text.into(),
            status: RfqStatus::Draft,
            sent_at: None,
            awarded_at: None,
            awarded_quote_id: None,
            failure_reason: None,
            created_by,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates an RFQ from stored parts (for reconstruction from storage).
    ///
    /// Bypasses validation; only use with trusted storage.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: RfqId,
        message_text: String,
        status: RfqStatus,
        sent_at: Option<Timestamp>,
        awarded_at: Option<Timestamp>,
        awarded_quote_id: Option<QuoteId>,
        failure_reason: Option<String>,
        created_by: Option<UserId>,
        version: u64,
        created_at: Timestamp,
        updated_at: Timestamp,
    ) -> Self {
        Self {
            id,
            message_text,
            status,
            sent_at,
            awarded_at,
            awarded_quote_id,
            failure_reason,
            created_by,
            version,
            created_at,
            updated_at,
        }
    }

    fn transition_to(&mut self, target: RfqStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(target) {
            return Err(DomainError::invalid_transition(self.status, target));
        }
        self.status = target;
        self.updated_at = Timestamp::now();
        self.version = self.version.saturating_add(1);
        Ok(())
    }

    // ========== Accessors ==========

    /// Returns the RFQ ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> RfqId {
        self.id
    }

    /// Returns the message text.
    #[inline]
    #[must_use]
    pub fn message_text(&self) -> &str {
        &self.message_text
    }

    /// Returns the current status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> RfqStatus {
        self.status
    }

    /// Returns when the RFQ was sent.
    #[inline]
    #[must_use]
    pub fn sent_at(&self) -> Option<Timestamp> {
        self.sent_at
    }

    /// Returns when the RFQ was awarded.
    #[inline]
    #[must_use]
    pub fn awarded_at(&self) -> Option<Timestamp> {
        self.awarded_at
    }

    /// Returns the awarded quote.
    #[inline]
    #[must_use]
    pub fn awarded_quote_id(&self) -> Option<QuoteId> {
        self.awarded_quote_id
    }

    /// Returns the failure reason.
    #[inline]
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Returns the creator.
    #[inline]
    #[must_use]
    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    /// Returns the version for optimistic locking.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns when this RFQ was created.
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Returns when this RFQ was last updated.
    #[inline]
    #[must_use]
    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Returns true if the RFQ reached a terminal status.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns the status the RFQ had before entering `Failed`.
    ///
    /// Derived from `sent_at`, which is only set by passing through `Sent`.
    #[must_use]
    pub fn failed_from(&self) -> Option<RfqStatus> {
        (self.status == RfqStatus::Failed).then(|| {
            if self.sent_at.is_some() {
                RfqStatus::Sent
            } else {
                RfqStatus::Draft
            }
        })
    }

    // ========== State Transitions ==========

    /// Replaces the message text.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidArgument` once the RFQ left `Draft` or if
    /// the text is blank.
    pub fn set_message_text(&mut self, text: impl Into<String>) -> DomainResult<()> {
        if self.status != RfqStatus::Draft {
            return Err(DomainError::invalid_argument(format!(
                "message_text is immutable in status {}",
                self.status
            )));
        }
        let text = text.into();
        if text.trim().is_empty() {
            return Err(DomainError::invalid_argument("message_text must not be empty"));
        }
        self.message_text = text;
        self.updated_at = Timestamp::now();
        self.version = self.version.saturating_add(1);
        Ok(())
    }

    /// Marks the RFQ as sent.
    ///
    /// Transitions: Draft → Sent
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` if not in Draft.
    pub fn mark_sent(&mut self) -> DomainResult<()> {
        self.transition_to(RfqStatus::Sent)?;
        self.sent_at = Some(self.updated_at);
        Ok(())
    }

    /// Awards a quote.
    ///
    /// Transitions: Sent → Awarded
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` if not in Sent.
    pub fn mark_awarded(&mut self, quote_id: QuoteId) -> DomainResult<()> {
        self.transition_to(RfqStatus::Awarded)?;
        self.awarded_at = Some(self.updated_at);
        self.awarded_quote_id = Some(quote_id);
        Ok(())
    }

    /// Marks the RFQ as failed.
    ///
    /// Transitions: Draft/Sent → Failed
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` if already terminal.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> DomainResult<()> {
        self.transition_to(RfqStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }
}

impl fmt::Display for Rfq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RFQ({} [{}] v{})", self.id, self.status, self.version)
    }
}
