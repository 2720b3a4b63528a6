//! # Value Objects
//!
//! Immutable types with validation and domain semantics.
//!
//! ## Identity Types
//!
//! - [`RfqId`], [`AttemptId`], [`EventId`]: storage-assigned integer ids
//! - [`QuoteId`], [`UserId`], [`CounterpartyId`]: collaborator ids
//! - [`CorrelationId`]: causal-chain grouping id
//! - [`IdempotencyKey`]: deterministic operation key and its resolver
//!
//! ## Lifecycle Enums
//!
//! - [`RfqStatus`]: RFQ lifecycle states
//! - [`SendStatus`]: channel-level attempt status
//!
//! ## Domain Enums
//!
//! - [`Channel`]: delivery transport
//! - [`Role`]: back-office role
//! - [`Visibility`]: timeline read gate

pub mod enums;
pub mod idempotency;
pub mod ids;
pub mod rfq_status;
pub mod send_status;
pub mod timestamp;

pub use enums::{Channel, ParseEnumError, Role, Visibility};
pub use idempotency::{IdempotencyKey, Operation};
pub use ids::{AttemptId, CorrelationId, CounterpartyId, EventId, QuoteId, RfqId, UserId};
pub use rfq_status::RfqStatus;
pub use send_status::SendStatus;
pub use timestamp::Timestamp;
