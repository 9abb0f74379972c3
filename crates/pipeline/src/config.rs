//! Client configuration and retry policy.
//!
//! Both types are validated when they are built; an invalid value fails at
//! client construction, never at the first call. Once built they are shared
//! read-only for the lifetime of the client.
//!
//! [`ClientSettings`] is the serialisable form of the same configuration
//! (durations in milliseconds) for callers that keep their settings in a file.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, ErrorKind};

const DEFAULT_USER_AGENT: &str = concat!("resilient-client/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Decides which error kinds the retry engine may retry.
pub type RetryablePredicate = Arc<dyn Fn(ErrorKind) -> bool + Send + Sync>;

/// Bounded exponential backoff policy.
///
/// `max_attempts` counts the first attempt: a policy with `max_attempts == 1`
/// never retries.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_fraction: f64,
    retryable: RetryablePredicate,
}

impl RetryPolicy {
    /// Creates a policy that retries the default transient kinds
    /// (`Connection`, `Timeout`, `Transient`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `max_attempts` is zero, `base_delay`
    /// exceeds `max_delay`, or `jitter_fraction` is outside `[0, 1]`.
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        jitter_fraction: f64,
    ) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts(max_attempts));
        }
        if base_delay > max_delay {
            return Err(ConfigError::DelayOrder { base: base_delay, max: max_delay });
        }
        if !(0.0..=1.0).contains(&jitter_fraction) {
            return Err(ConfigError::JitterOutOfRange(jitter_fraction));
        }
        Ok(Self {
            max_attempts,
            base_delay,
            max_delay,
            jitter_fraction,
            retryable: Arc::new(ErrorKind::is_retryable_by_default),
        })
    }

    /// A policy that performs exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_fraction: 0.0,
            retryable: Arc::new(ErrorKind::is_retryable_by_default),
        }
    }

    /// Replaces the retryable-kind predicate.
    ///
    /// The predicate narrows retries further; a failure classified as
    /// permanent is never retried regardless of what it returns.
    pub fn with_retryable(mut self, predicate: impl Fn(ErrorKind) -> bool + Send + Sync + 'static) -> Self {
        self.retryable = Arc::new(predicate);
        self
    }

    /// Maximum number of attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the second attempt, before jitter.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Cap on the un-jittered delay.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Relative jitter applied around the computed delay.
    pub fn jitter_fraction(&self) -> f64 {
        self.jitter_fraction
    }

    /// Returns `true` if failures of `kind` may be retried.
    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        (self.retryable)(kind)
    }
}

impl Default for RetryPolicy {
    /// Three attempts, 100 ms base delay, 5 s cap, 10 % jitter.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            jitter_fraction: 0.1,
            retryable: Arc::new(ErrorKind::is_retryable_by_default),
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("jitter_fraction", &self.jitter_fraction)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Telemetry settings
// ---------------------------------------------------------------------------

/// Controls the per-client telemetry recorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// When `false`, completed calls are not aggregated or exported.
    pub enabled: bool,
    /// Value of the `service` label on exported metrics.
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: "resilient-client".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Configuration shared read-only by every call on one client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_endpoint: String,
    default_timeout: Duration,
    default_headers: BTreeMap<String, String>,
    retry_policy: RetryPolicy,
    user_agent: String,
    telemetry: TelemetryConfig,
}

impl ClientConfig {
    /// Starts a configuration for the given base endpoint.
    pub fn builder(base_endpoint: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            base_endpoint: base_endpoint.into(),
            default_timeout: Duration::from_secs(30),
            default_headers: BTreeMap::new(),
            retry_policy: RetryPolicy::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            telemetry: TelemetryConfig::default(),
        }
    }

    /// Base URL (REST, GraphQL) or channel address (gRPC).
    pub fn base_endpoint(&self) -> &str {
        &self.base_endpoint
    }

    /// Per-attempt timeout used when a descriptor does not set its own.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Headers (or gRPC metadata) sent with every call.
    pub fn default_headers(&self) -> &BTreeMap<String, String> {
        &self.default_headers
    }

    /// Retry policy applied to every call.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// `User-Agent` sent by the HTTP-based adapters.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Telemetry settings.
    pub fn telemetry(&self) -> &TelemetryConfig {
        &self.telemetry
    }
}

/// Builder for [`ClientConfig`]; validation happens in [`Self::build`].
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    base_endpoint: String,
    default_timeout: Duration,
    default_headers: BTreeMap<String, String>,
    retry_policy: RetryPolicy,
    user_agent: String,
    telemetry: TelemetryConfig,
}

impl ClientConfigBuilder {
    /// Sets the default per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Adds a default header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    /// Sets the retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Sets the `User-Agent`.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the telemetry settings.
    pub fn telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Validates and finishes the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyEndpoint`] for an empty base endpoint and
    /// [`ConfigError::ZeroTimeout`] for a zero default timeout.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        if self.base_endpoint.trim().is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }
        if self.default_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(ClientConfig {
            base_endpoint: self.base_endpoint,
            default_timeout: self.default_timeout,
            default_headers: self.default_headers,
            retry_policy: self.retry_policy,
            user_agent: self.user_agent,
            telemetry: self.telemetry,
        })
    }
}

// ---------------------------------------------------------------------------
// Serialisable settings
// ---------------------------------------------------------------------------

/// Serialisable retry settings; durations in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_fraction: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 5_000,
            jitter_fraction: 0.1,
        }
    }
}

impl TryFrom<RetrySettings> for RetryPolicy {
    type Error = ConfigError;

    fn try_from(s: RetrySettings) -> Result<Self, Self::Error> {
        RetryPolicy::new(
            s.max_attempts,
            Duration::from_millis(s.base_delay_ms),
            Duration::from_millis(s.max_delay_ms),
            s.jitter_fraction,
        )
    }
}

/// Serialisable client settings.
///
/// ```json
/// { "base_endpoint": "https://api.example.com", "timeout_ms": 10000,
///   "retry": { "max_attempts": 5 } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSettings {
    pub base_endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl ClientSettings {
    /// Parses settings from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Malformed`] if the document is not valid JSON
    /// or does not match the settings shape.
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(document).map_err(|e| ConfigError::Malformed(e.to_string()))
    }
}

impl TryFrom<ClientSettings> for ClientConfig {
    type Error = ConfigError;

    fn try_from(s: ClientSettings) -> Result<Self, Self::Error> {
        let mut builder = ClientConfig::builder(s.base_endpoint)
            .timeout(Duration::from_millis(s.timeout_ms))
            .retry_policy(RetryPolicy::try_from(s.retry)?)
            .telemetry(s.telemetry);
        for (name, value) in s.default_headers {
            builder = builder.header(name, value);
        }
        if let Some(user_agent) = s.user_agent {
            builder = builder.user_agent(user_agent);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_attempts() {
        let err = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO, 0.0).unwrap_err();
        assert_eq!(err, ConfigError::ZeroAttempts(0));
    }

    #[test]
    fn rejects_base_above_max() {
        let err = RetryPolicy::new(3, Duration::from_secs(2), Duration::from_secs(1), 0.0).unwrap_err();
        assert!(matches!(err, ConfigError::DelayOrder { .. }));
    }

    #[test]
    fn rejects_jitter_outside_unit_interval() {
        for j in [-0.1, 1.01, f64::NAN] {
            let err = RetryPolicy::new(3, Duration::ZERO, Duration::ZERO, j).unwrap_err();
            assert!(matches!(err, ConfigError::JitterOutOfRange(_)));
        }
    }

    #[test]
    fn accepts_boundary_values() {
        let p = RetryPolicy::new(1, Duration::from_millis(5), Duration::from_millis(5), 1.0).unwrap();
        assert_eq!(p.max_attempts(), 1);
        assert_eq!(p.jitter_fraction(), 1.0);
    }

    #[test]
    fn custom_predicate_narrows_retries() {
        let p = RetryPolicy::default().with_retryable(|k| k == ErrorKind::Timeout);
        assert!(p.is_retryable(ErrorKind::Timeout));
        assert!(!p.is_retryable(ErrorKind::Connection));
    }

    #[test]
    fn builder_validates_endpoint_and_timeout() {
        assert_eq!(ClientConfig::builder(" ").build().unwrap_err(), ConfigError::EmptyEndpoint);
        assert_eq!(
            ClientConfig::builder("http://x").timeout(Duration::ZERO).build().unwrap_err(),
            ConfigError::ZeroTimeout
        );
    }

    #[test]
    fn settings_fill_defaults_and_validate() {
        let settings = ClientSettings::from_json(
            r#"{ "base_endpoint": "http://localhost:8080", "retry": { "max_attempts": 5 },
                 "default_headers": { "x-api": "1" } }"#,
        )
        .unwrap();
        let config = ClientConfig::try_from(settings).unwrap();
        assert_eq!(config.retry_policy().max_attempts(), 5);
        assert_eq!(config.retry_policy().base_delay(), Duration::from_millis(100));
        assert_eq!(config.default_timeout(), Duration::from_secs(30));
        assert_eq!(config.default_headers()["x-api"], "1");
        assert!(config.user_agent().starts_with("resilient-client/"));

        let bad = ClientSettings::from_json(r#"{ "base_endpoint": "x", "retry": { "max_attempts": 0 } }"#).unwrap();
        assert_eq!(ClientConfig::try_from(bad).unwrap_err(), ConfigError::ZeroAttempts(0));
    }

    #[test]
    fn malformed_settings_are_reported() {
        assert!(matches!(ClientSettings::from_json("{"), Err(ConfigError::Malformed(_))));
    }
}
