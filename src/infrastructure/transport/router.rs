//! # Transport Router
//!
//! Picks the transport for each message by channel, with a fallback for
//! channels that have no dedicated integration.

use crate::config::TransportConfig;
use crate::domain::value_objects::Channel;
use crate::infrastructure::transport::error::{TransportError, TransportResult};
use crate::infrastructure::transport::simulated::SimulatedTransport;
use crate::infrastructure::transport::traits::{
    ChannelTransport, OutboundMessage, TransportReceipt,
};
use crate::infrastructure::transport::webhook::WebhookTransport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Routes messages to per-channel transports.
#[derive(Debug, Clone, Default)]
pub struct TransportRouter {
    routes: HashMap<Channel, Arc<dyn ChannelTransport>>,
    fallback: Option<Arc<dyn ChannelTransport>>,
}

impl TransportRouter {
    /// Creates an empty router. Every send fails with
    /// `TransportError::Unsupported` until routes are added.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the router described by configuration: a webhook per
    /// configured channel, the simulated transport for the rest.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Internal` if an endpoint or the HTTP client
    /// is invalid.
    pub fn from_config(config: &TransportConfig) -> TransportResult<Self> {
        let endpoints = config
            .endpoints()
            .map_err(|e| TransportError::internal(e.to_string()))?;

        let mut router = Self::new().with_fallback(Arc::new(SimulatedTransport::new()));
        for (channel, url) in endpoints {
            let mut webhook = WebhookTransport::new(url, config.timeout_ms)?;
            if let Some(token) = &config.webhook_token {
                webhook = webhook.with_token(token.clone());
            }
            info!(%channel, endpoint = webhook.endpoint(), "webhook transport configured");
            router = router.with_route(channel, Arc::new(webhook));
        }
        Ok(router)
    }

    /// Routes a channel to a transport.
    #[must_use]
    pub fn with_route(mut self, channel: Channel, transport: Arc<dyn ChannelTransport>) -> Self {
        self.routes.insert(channel, transport);
        self
    }

    /// Sets the transport for unrouted channels.
    #[must_use]
    pub fn with_fallback(mut self, transport: Arc<dyn ChannelTransport>) -> Self {
        self.fallback = Some(transport);
        self
    }

    /// Returns the transport serving a channel.
    #[must_use]
    pub fn transport_for(&self, channel: Channel) -> Option<&Arc<dyn ChannelTransport>> {
        self.routes.get(&channel).or(self.fallback.as_ref())
    }
}

#[async_trait]
impl ChannelTransport for TransportRouter {
    fn name(&self) -> &str {
        "router"
    }

    async fn send(&self, message: &OutboundMessage) -> TransportResult<TransportReceipt> {
        let transport = self
            .transport_for(message.channel)
            .ok_or(TransportError::Unsupported(message.channel))?;
        transport.send(message).await
    }
}
