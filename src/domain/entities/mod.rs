//! # Domain Entities
//!
//! Aggregate roots and entities of the dispatch core.
//!
//! ## Aggregates
//!
//! - [`Rfq`]: Request-for-Quote aggregate with state machine
//! - [`SendAttempt`]: one delivery attempt, linked into retry chains
//!
//! ## Entities
//!
//! - [`TimelineEvent`]: immutable audit record

pub mod rfq;
pub mod send_attempt;
pub mod timeline_event;

pub use rfq::Rfq;
pub use send_attempt::{DispatchTarget, NewSendAttempt, OutcomeEffect, SendAttempt};
pub use timeline_event::TimelineEvent;
