//! # Persistence Layer
//!
//! Repository ports and their implementations.
//!
//! ## Repository Traits (Ports)
//!
//! - [`RfqRepository`]: Persistence for RFQ aggregates
//! - [`SendAttemptRepository`]: Persistence for send attempts
//! - [`TimelineEventStore`]: Append-only timeline storage
//!
//! ## Implementations
//!
//! - `in_memory`: In-memory implementations for tests and single-process use
//! - `postgres`: PostgreSQL implementations (sqlx)

pub mod in_memory;
pub mod postgres;
pub mod traits;

pub use traits::{
    Insertion, RepositoryError, RepositoryResult, RfqRepository, SendAttemptRepository,
    TimelineEventStore,
};
