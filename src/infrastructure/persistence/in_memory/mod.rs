//! # In-Memory Repositories
//!
//! In-memory implementations for tests and single-process deployments.
//!
//! ## Available Repositories
//!
//! - [`InMemoryRfqRepository`]: RFQ persistence
//! - [`InMemorySendAttemptRepository`]: send attempt persistence
//! - [`InMemoryTimelineEventStore`]: timeline storage
//!
//! ## Thread Safety
//!
//! All implementations keep their rows behind `Arc<RwLock<_>>`; clones share
//! storage. Check-and-insert runs under a single write lock.

pub mod rfq_repository;
pub mod send_attempt_repository;
pub mod timeline_event_store;

pub use rfq_repository::InMemoryRfqRepository;
pub use send_attempt_repository::InMemorySendAttemptRepository;
pub use timeline_event_store::InMemoryTimelineEventStore;
