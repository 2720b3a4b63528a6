//! # Channel Transports
//!
//! Outbound delivery of RFQ messages.
//!
//! - [`ChannelTransport`]: the port
//! - [`SimulatedTransport`]: deterministic in-process transport
//! - [`WebhookTransport`]: HTTP POST to a messaging gateway
//! - [`TransportRouter`]: per-channel selection

pub mod error;
pub mod router;
pub mod simulated;
pub mod traits;
pub mod webhook;

pub use error::{TransportError, TransportResult};
pub use router::TransportRouter;
pub use simulated::SimulatedTransport;
pub use traits::{ChannelTransport, DeliveryState, OutboundMessage, TransportReceipt};
pub use webhook::WebhookTransport;
