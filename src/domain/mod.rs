//! # Domain Layer
//!
//! Entities, value objects, timeline event definitions and pure services.
//! Nothing in this layer performs I/O.

pub mod entities;
pub mod errors;
pub mod events;
pub mod services;
pub mod value_objects;
