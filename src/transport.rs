//! Model invocation boundary: the transport trait and its HTTP gateway
//! implementation.
//!
//! The trait returns an explicit retryable/fatal classification instead of
//! leaking transport-specific error names, so the retry policy in
//! [`crate::invoke`] stays decoupled from any one backend. A Bedrock-style
//! gateway maps its throttling exceptions to [`TransportErrorKind::Throttled`];
//! a different backend maps whatever its capacity signal is to the same
//! variant and the retry loop needs no changes.

use crate::error::ThreatDocError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// A base64 image attachment, as accepted by the model gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub mime_type: String,
    /// Base64-encoded image bytes (no data-URI prefix).
    pub data: String,
}

/// One request to the generative model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImagePayload>,
    pub max_tokens: usize,
    pub temperature: f32,
}

/// The model's reply: undecoded prose. Structured extraction happens in
/// [`crate::invoke`], not here.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelReply {
    pub text: String,
}

/// Classification of a transport failure, decided by the transport itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Transient capacity problem (throttling, overload, timeout);
    /// worth retrying with backoff.
    Throttled,
    /// Anything else; retrying will not help.
    Fatal,
}

/// A failed transport call, with its retry classification.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn throttled(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Throttled,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Fatal,
            message: message.into(),
        }
    }
}

/// A transport capable of one generative-model invocation.
#[async_trait]
pub trait ModelTransport: Send + Sync {
    /// Perform a single invocation. No retries here: classification is the
    /// transport's job, policy is the caller's.
    async fn generate(&self, request: &ModelRequest) -> Result<ModelReply, TransportError>;

    /// Short name for logs and config dumps.
    fn name(&self) -> &str;
}

// ── HTTP gateway implementation ──────────────────────────────────────────

/// Body-text markers a Bedrock-style gateway emits for capacity errors.
const THROTTLE_MARKERS: [&str; 3] = [
    "ThrottlingException",
    "TooManyRequestsException",
    "ProvisionedThroughputExceededException",
];

/// Gateway reply envelope: `{"response": "..."}` on success,
/// `{"error": "..."}` on failure.
#[derive(Debug, Deserialize)]
struct GatewayReply {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP implementation of [`ModelTransport`] for a JSON model gateway.
///
/// Posts `{prompt, image?, max_tokens, temperature}` and expects
/// `{"response": text}` back. HTTP 429/503/529, request timeouts, and
/// known throttling-exception markers in the body classify as
/// [`TransportErrorKind::Throttled`]; every other failure is fatal.
pub struct HttpGateway {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpGateway {
    /// Build a gateway client for the given endpoint URL.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, ThreatDocError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ThreatDocError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    fn classify_status(status: reqwest::StatusCode, body: &str) -> TransportErrorKind {
        if matches!(status.as_u16(), 429 | 503 | 529) {
            return TransportErrorKind::Throttled;
        }
        if THROTTLE_MARKERS.iter().any(|m| body.contains(m)) {
            return TransportErrorKind::Throttled;
        }
        TransportErrorKind::Fatal
    }
}

#[async_trait]
impl ModelTransport for HttpGateway {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelReply, TransportError> {
        debug!(
            endpoint = %self.endpoint,
            has_image = request.image.is_some(),
            "posting model request"
        );

        let mut req = self.client.post(&self.endpoint).json(request);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::throttled(format!("gateway timed out: {e}"))
            } else {
                TransportError::fatal(format!("gateway unreachable: {e}"))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::fatal(format!("reading gateway reply: {e}")))?;

        if !status.is_success() {
            let kind = Self::classify_status(status, &body);
            let detail = serde_json::from_str::<GatewayReply>(&body)
                .ok()
                .and_then(|r| r.error)
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(TransportError {
                kind,
                message: detail,
            });
        }

        let reply: GatewayReply = serde_json::from_str(&body)
            .map_err(|e| TransportError::fatal(format!("undecodable gateway reply: {e}")))?;

        match reply.response {
            Some(text) => Ok(ModelReply { text }),
            None => Err(TransportError::fatal(
                reply
                    .error
                    .unwrap_or_else(|| "gateway reply missing 'response'".to_string()),
            )),
        }
    }

    fn name(&self) -> &str {
        "http-gateway"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_status_is_throttled() {
        assert_eq!(
            HttpGateway::classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS, ""),
            TransportErrorKind::Throttled
        );
        assert_eq!(
            HttpGateway::classify_status(reqwest::StatusCode::SERVICE_UNAVAILABLE, ""),
            TransportErrorKind::Throttled
        );
    }

    #[test]
    fn throttle_marker_in_body_is_throttled() {
        assert_eq!(
            HttpGateway::classify_status(
                reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"error":"ThrottlingException: rate exceeded"}"#
            ),
            TransportErrorKind::Throttled
        );
    }

    #[test]
    fn auth_failure_is_fatal() {
        assert_eq!(
            HttpGateway::classify_status(reqwest::StatusCode::UNAUTHORIZED, "bad key"),
            TransportErrorKind::Fatal
        );
    }

    #[test]
    fn request_serialises_without_null_image() {
        let req = ModelRequest {
            prompt: "p".into(),
            image: None,
            max_tokens: 16,
            temperature: 0.1,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("image"));
    }
}
