//! # Application Layer
//!
//! Use cases over the domain: the send-attempt ledger, the RFQ state
//! machine, the timeline log, the dispatcher and the dispatch workers.

pub mod error;
pub mod services;
