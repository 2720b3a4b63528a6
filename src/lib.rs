//! # RFQ Dispatch Engine
//!
//! Lifecycle engine for Request-for-Quote dispatch in a commodities-hedging
//! back office.
//!
//! The crate owns three tightly coupled concerns:
//!
//! - the **send-attempt ledger**, which tracks every delivery attempt of an
//!   RFQ to a counterparty over a channel, including retry chains;
//! - the **RFQ state machine** (`draft -> sent -> {awarded, failed}`),
//!   driven by aggregated attempt outcomes;
//! - the **timeline event log**, an append-only, idempotent audit trail
//!   with role-based read visibility.
//!
//! Correctness under retries and concurrent workers comes from
//! deterministic idempotency keys rather than locks: the same logical
//! operation always resolves to the same key, and the stores resolve key
//! collisions to the row that already exists.
//!
//! # Architecture
//!
//! ```text
//! domain/          entities, value objects, events, pure services
//! application/     ledger, state machine, timeline log, dispatcher, workers
//! infrastructure/  persistence adapters (in-memory, PostgreSQL), transports
//! ```
//!
//! # Examples
//!
//! ```
//! use rfq_dispatch::domain::value_objects::{IdempotencyKey, RfqId, RfqStatus};
//!
//! let key = IdempotencyKey::rfq_state_changed(RfqId::new(42), RfqStatus::Draft, RfqStatus::Sent);
//! assert_eq!(key.as_str(), "rfq:42:state_changed:draft->sent");
//! ```

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod logging;
pub mod shutdown;
