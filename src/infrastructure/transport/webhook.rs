//! # Webhook Transport
//!
//! Delivers RFQ messages by POSTing JSON to a per-channel HTTP endpoint
//! (a messaging gateway, a broker bridge).
//!
//! Request body:
//!
//! ```json
//! {"channel": "whatsapp", "rfq_id": 7, "attempt_id": 31, "counterparty_id": 4,
//!  "message_text": "...", "idempotency_key": "rfq:7:send:whatsapp:4:none:1"}
//! ```
//!
//! The attempt key is also sent as the `Idempotency-Key` header. `200`
//! means delivered, `202` means accepted for asynchronous delivery. The
//! response may carry `provider_message_id`; otherwise the deterministic id
//! of [`provider_message_id`](super::simulated::provider_message_id) is used.

use crate::domain::value_objects::{AttemptId, Channel, CounterpartyId, RfqId};
use crate::infrastructure::transport::error::{TransportError, TransportResult};
use crate::infrastructure::transport::simulated::provider_message_id;
use crate::infrastructure::transport::traits::{
    ChannelTransport, OutboundMessage, TransportReceipt,
};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct WebhookRequest<'a> {
    channel: Channel,
    rfq_id: RfqId,
    attempt_id: AttemptId,
    counterparty_id: Option<CounterpartyId>,
    message_text: &'a str,
    idempotency_key: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookResponse {
    provider_message_id: Option<String>,
}

/// HTTP webhook transport.
#[derive(Debug, Clone)]
pub struct WebhookTransport {
    client: Client,
    endpoint: String,
    token: Option<String>,
    timeout_ms: u64,
}

impl WebhookTransport {
    /// Creates a transport posting to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Internal` if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, timeout_ms: u64) -> TransportResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| TransportError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token: None,
            timeout_ms,
        })
    }

    /// Sends a bearer token with every request.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Returns the endpoint URL.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the configured timeout in milliseconds.
    #[inline]
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    fn map_reqwest_error(&self, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::timeout(format!("no answer after {}ms", self.timeout_ms))
        } else if error.is_connect() {
            TransportError::connection(format!("Connection failed: {error}"))
        } else {
            TransportError::connection(format!("HTTP request failed: {error}"))
        }
    }

    async fn handle_response(
        &self,
        message: &OutboundMessage,
        response: Response,
    ) -> TransportResult<TransportReceipt> {
        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(|secs| secs.saturating_mul(1000));
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &body, retry_after_ms));
        }

        let text = response
            .text()
            .await
            .map_err(|e| TransportError::protocol(format!("Failed to read response: {e}")))?;
        let parsed: WebhookResponse = if text.trim().is_empty() {
            WebhookResponse::default()
        } else {
            serde_json::from_str(&text)
                .map_err(|e| TransportError::protocol(format!("Failed to parse response: {e}")))?
        };

        let provider_id = parsed
            .provider_message_id
            .unwrap_or_else(|| provider_message_id(message.channel, &message.idempotency_key));

        if status == StatusCode::ACCEPTED {
            Ok(TransportReceipt::accepted(provider_id))
        } else {
            Ok(TransportReceipt::delivered(provider_id))
        }
    }
}

fn map_status_error(status: StatusCode, body: &str, retry_after_ms: Option<u64>) -> TransportError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
            TransportError::rejected(format!("HTTP {status}: {body}"))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            TransportError::authentication(format!("Authentication failed: {body}"))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            TransportError::rate_limited("Rate limit exceeded", retry_after_ms)
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            TransportError::timeout(format!("HTTP {status}"))
        }
        s if s.is_server_error() => {
            TransportError::connection(format!("Server error ({status}): {body}"))
        }
        _ => TransportError::protocol(format!("HTTP error ({status}): {body}")),
    }
}

#[async_trait]
impl ChannelTransport for WebhookTransport {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, message: &OutboundMessage) -> TransportResult<TransportReceipt> {
        let body = WebhookRequest {
            channel: message.channel,
            rfq_id: message.rfq_id,
            attempt_id: message.attempt_id,
            counterparty_id: message.counterparty_id,
            message_text: &message.message_text,
            idempotency_key: message.idempotency_key.as_str(),
        };

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Idempotency-Key", message.idempotency_key.as_str())
            .json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        debug!(endpoint = %self.endpoint, attempt_id = %message.attempt_id, "posting webhook");
        let response = request.send().await.map_err(|e| self.map_reqwest_error(e))?;
        let result = self.handle_response(message, response).await;
        if let Err(e) = &result {
            warn!(endpoint = %self.endpoint, attempt_id = %message.attempt_id, error = %e, "webhook send failed");
        }
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::value_objects::IdempotencyKey;
    use crate::infrastructure::transport::traits::DeliveryState;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> OutboundMessage {
        OutboundMessage {
            channel: Channel::WhatsApp,
            rfq_id: RfqId::new(7),
            attempt_id: AttemptId::new(31),
            counterparty_id: Some(CounterpartyId::new(4)),
            message_text: "Al 500t Dec".to_string(),
            idempotency_key: IdempotencyKey::new("rfq:7:send:whatsapp:4:none:1"),
            metadata: json!({}),
        }
    }

    async fn transport(server: &MockServer) -> WebhookTransport {
        WebhookTransport::new(format!("{}/send", server.uri()), 2_000)
            .unwrap()
            .with_token("secret")
    }

    #[test]
    fn new_transport() {
        let t = WebhookTransport::new("http://localhost/send", 5000).unwrap();
        assert_eq!(t.timeout_ms(), 5000);
        assert_eq!(t.endpoint(), "http://localhost/send");
    }

    #[tokio::test]
    async fn delivered_on_200() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header("Idempotency-Key", "rfq:7:send:whatsapp:4:none:1"))
            .and(header("Authorization", "Bearer secret"))
            .and(body_partial_json(json!({"rfq_id": 7, "channel": "whatsapp"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"provider_message_id": "wamid.1"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let receipt = transport(&server).await.send(&message()).await.unwrap();
        assert_eq!(receipt.state, DeliveryState::Delivered);
        assert_eq!(receipt.provider_message_id, "wamid.1");
    }

    #[tokio::test]
    async fn accepted_on_202_with_fallback_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let msg = message();
        let receipt = transport(&server).await.send(&msg).await.unwrap();
        assert_eq!(receipt.state, DeliveryState::Accepted);
        assert_eq!(
            receipt.provider_message_id,
            provider_message_id(msg.channel, &msg.idempotency_key)
        );
    }

    #[tokio::test]
    async fn rate_limit_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3"))
            .mount(&server)
            .await;

        let err = transport(&server).await.send(&message()).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.retry_after_ms(), Some(3000));
    }

    #[tokio::test]
    async fn bad_request_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("unknown number"))
            .mount(&server)
            .await;

        let err = transport(&server).await.send(&message()).await.unwrap_err();
        assert!(matches!(err, TransportError::Rejected { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = transport(&server).await.send(&message()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn garbage_body_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = transport(&server).await.send(&message()).await.unwrap_err();
        assert!(matches!(err, TransportError::Protocol { .. }));
    }
}
