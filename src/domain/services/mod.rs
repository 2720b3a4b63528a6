//! # Domain Services
//!
//! Pure functions that don't naturally belong to a single entity.
//!
//! ## Services
//!
//! - [`access`]: role × visibility read and write decisions
//! - [`mentions`]: mention normalization for comments
//! - [`thread`]: conversation key derivation

pub mod access;
pub mod mentions;
pub mod thread;

pub use access::{can_read, can_write, readable_visibilities};
pub use mentions::normalize_mentions;
pub use thread::thread_key_for;
