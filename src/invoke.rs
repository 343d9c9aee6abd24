//! Resilient model invocation: bounded exponential backoff plus structured
//! output recovery.
//!
//! ## Retry strategy
//!
//! Capacity errors from shared model gateways are transient and frequent.
//! The client retries only failures the transport classified as
//! [`TransportErrorKind::Throttled`], waiting
//! `base_delay * multiplier^(attempt-1)` between attempts; with the default
//! policy (5 attempts, 1s base, ×2) the wait sequence is 1s → 2s → 4s → 8s.
//! Fatal failures propagate after a single attempt. Every retry is logged
//! with the error class, attempt number, and wait time.
//!
//! ## Structured output
//!
//! Models asked for JSON frequently wrap it in prose or code fences. The
//! recovery heuristic takes the span from the first `{` to the last `}` and
//! parses that strictly. Nested or string-embedded braces outside that span
//! are not specially handled; a stray closing brace in trailing prose will
//! corrupt the slice. This is a documented limitation, pinned by a test.

use crate::config::RetryPolicy;
use crate::error::ThreatDocError;
use crate::transport::{ImagePayload, ModelRequest, ModelTransport, TransportErrorKind};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Longest slice of model text quoted back in a MalformedOutput error.
const EXCERPT_LIMIT: usize = 200;

/// The invocation client: one transport plus the retry policy applied to it.
#[derive(Clone)]
pub struct ModelClient {
    transport: Arc<dyn ModelTransport>,
    retry: RetryPolicy,
    max_tokens: usize,
    temperature: f32,
}

impl ModelClient {
    pub fn new(
        transport: Arc<dyn ModelTransport>,
        retry: RetryPolicy,
        max_tokens: usize,
        temperature: f32,
    ) -> Self {
        Self {
            transport,
            retry,
            max_tokens,
            temperature,
        }
    }

    /// Invoke the model and return its reply text verbatim.
    pub async fn invoke_text(
        &self,
        prompt: String,
        image: Option<ImagePayload>,
    ) -> Result<String, ThreatDocError> {
        let request = ModelRequest {
            prompt,
            image,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let mut last_error = String::new();

        for attempt in 1..=self.retry.max_attempts {
            if attempt > 1 {
                let wait = self.retry.delay_for(attempt);
                warn!(
                    transport = self.transport.name(),
                    attempt,
                    max_attempts = self.retry.max_attempts,
                    wait_ms = wait.as_millis() as u64,
                    error = %last_error,
                    "transient capacity error, retrying"
                );
                sleep(wait).await;
            }

            match self.transport.generate(&request).await {
                Ok(reply) => {
                    debug!(
                        transport = self.transport.name(),
                        attempt,
                        chars = reply.text.len(),
                        "model reply received"
                    );
                    return Ok(reply.text);
                }
                Err(e) if e.kind == TransportErrorKind::Throttled => {
                    last_error = e.message;
                }
                Err(e) => {
                    warn!(
                        transport = self.transport.name(),
                        attempt,
                        error = %e.message,
                        "non-retryable transport error"
                    );
                    return Err(ThreatDocError::Transport { message: e.message });
                }
            }
        }

        Err(ThreatDocError::CapacityExceeded {
            attempts: self.retry.max_attempts,
            last_error,
        })
    }

    /// Invoke the model and coerce its reply into a strict `T`.
    pub async fn invoke_structured<T: DeserializeOwned>(
        &self,
        prompt: String,
        image: Option<ImagePayload>,
    ) -> Result<T, ThreatDocError> {
        let text = self.invoke_text(prompt, image).await?;
        extract_structured(&text)
    }
}

/// Locate the JSON object embedded in `text` and parse it strictly.
///
/// The span considered is first `{` through last `}`. If either brace is
/// missing, or the last precedes the first, the text contains no object.
pub fn extract_structured<T: DeserializeOwned>(text: &str) -> Result<T, ThreatDocError> {
    let slice = extract_json_span(text)?;
    serde_json::from_str(slice).map_err(|e| ThreatDocError::MalformedOutput {
        detail: e.to_string(),
        excerpt: excerpt(slice),
    })
}

/// The raw outermost-brace span, before parsing.
fn extract_json_span(text: &str) -> Result<&str, ThreatDocError> {
    let start = text.find('{');
    let end = text.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if e >= s => Ok(&text[s..=e]),
        _ => Err(ThreatDocError::MalformedOutput {
            detail: "no JSON object found in model reply".into(),
            excerpt: excerpt(text),
        }),
    }
}

fn excerpt(text: &str) -> String {
    if text.len() <= EXCERPT_LIMIT {
        text.to_string()
    } else {
        let mut cut = EXCERPT_LIMIT;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}\u{2026}", &text[..cut])
    }
}
