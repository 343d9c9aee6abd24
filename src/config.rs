//! Configuration types for a guided analysis run.
//!
//! Everything tunable lives in [`AnalysisConfig`], built via its
//! [`AnalysisConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share a config across controller instances and to diff two
//! runs when their behaviour differs.

use crate::error::ThreatDocError;
use crate::transport::ModelTransport;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Retry behaviour for transient capacity errors on the model gateway.
///
/// The delay before attempt `n` (1-indexed; the first retry is attempt 2)
/// is `base_delay * multiplier^(n-2)`, so the defaults produce the wait
/// sequence 1s, 2s, 4s, 8s across 5 total attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Default: 5.
    pub max_attempts: u32,
    /// Delay before the first retry. Default: 1s.
    pub base_delay_ms: u64,
    /// Multiplicative backoff factor. Default: 2.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait before the given attempt (2-indexed: the first call is
    /// attempt 1 and waits nothing).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        debug_assert!(attempt >= 2);
        let exp = attempt.saturating_sub(2);
        let factor = (self.multiplier as u64).saturating_pow(exp);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    /// Sum of all backoff waits for a permanently failing transient error:
    /// `base * (m^(n-1) - 1) / (m - 1)`, which for the default multiplier 2
    /// is `base * (2^(n-1) - 1)`.
    pub fn total_backoff(&self) -> Duration {
        (2..=self.max_attempts)
            .map(|a| self.delay_for(a))
            .sum()
    }
}

/// Bounding box and quality applied to user-supplied diagrams before they
/// reach the model gateway, keeping the request payload bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageLimits {
    /// Maximum width in pixels. Default: 1920.
    pub max_width: u32,
    /// Maximum height in pixels. Default: 1080.
    pub max_height: u32,
    /// JPEG re-encode quality, 1-100. Default: 70.
    pub jpeg_quality: u8,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
            jpeg_quality: 70,
        }
    }
}

/// Configuration for a guided analysis.
///
/// Built via [`AnalysisConfig::builder()`] or [`AnalysisConfig::default()`].
///
/// # Example
/// ```rust
/// use threatdoc::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .max_attempts(3)
///     .max_tokens(2048)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Retry policy for transient capacity errors. See [`RetryPolicy`].
    pub retry: RetryPolicy,

    /// Maximum tokens the model may generate per stage. Default: 4096.
    ///
    /// The threat-enumeration stage returns a JSON object listing every
    /// identified threat; setting this too low truncates it mid-object and
    /// the structured parse fails.
    pub max_tokens: usize,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Analysis stages transcribe and synthesise what the user provided.
    /// Low temperature keeps the model faithful to the inputs.
    pub temperature: f32,

    /// Per-call gateway timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Image preprocessing limits. See [`ImageLimits`].
    pub image_limits: ImageLimits,

    /// Pre-constructed model transport. Required for any stage invocation;
    /// tests inject scripted transports here.
    pub transport: Option<Arc<dyn ModelTransport>>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_tokens: 4_096,
            temperature: 0.1,
            api_timeout_secs: 120,
            image_limits: ImageLimits::default(),
            transport: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("retry", &self.retry)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("image_limits", &self.image_limits)
            .field(
                "transport",
                &self.transport.as_ref().map(|t| t.name().to_string()),
            )
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.retry.max_attempts = n.max(1);
        self
    }

    pub fn base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.base_delay_ms = ms;
        self
    }

    pub fn backoff_multiplier(mut self, m: u32) -> Self {
        self.config.retry.multiplier = m.max(1);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn image_limits(mut self, limits: ImageLimits) -> Self {
        self.config.image_limits = limits;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn ModelTransport>) -> Self {
        self.config.transport = Some(transport);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, ThreatDocError> {
        let c = &self.config;
        if c.retry.max_attempts == 0 {
            return Err(ThreatDocError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(ThreatDocError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.image_limits.jpeg_quality == 0 || c.image_limits.jpeg_quality > 100 {
            return Err(ThreatDocError::InvalidConfig(format!(
                "jpeg_quality must be 1-100, got {}",
                c.image_limits.jpeg_quality
            )));
        }
        Ok(self.config)
    }
}
