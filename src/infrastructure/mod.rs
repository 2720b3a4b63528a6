//! # Infrastructure Layer
//!
//! Adapters for the ports the application layer depends on.
//!
//! - [`persistence`]: repositories (in-memory, PostgreSQL)
//! - [`transport`]: channel transports

pub mod persistence;
pub mod transport;
