//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Durations are integer milliseconds on disk.

use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Breaker definitions, one per protected operation.
    pub breakers: Vec<BreakerConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl GateConfig {
    /// Look up a breaker definition by name.
    pub fn breaker(&self, name: &str) -> Option<&BreakerConfig> {
        self.breakers.iter().find(|b| b.name == name)
    }
}

/// Settings for a single circuit breaker.
///
/// Durations keep full precision in code; on disk they are whole milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BreakerConfig {
    /// Breaker identifier for logging/metrics.
    pub name: String,

    /// Consecutive failures that open the breaker.
    pub max_failures: u32,

    /// Deadline for a single protected call.
    #[serde(rename = "call_timeout_ms", with = "millis")]
    pub call_timeout: Duration,

    /// Initial wait in Open before a half-open trial.
    #[serde(rename = "reset_timeout_ms", with = "millis")]
    pub reset_timeout: Duration,

    /// Multiplier applied to the reset timeout after a failed trial.
    pub backoff_factor: f64,

    /// Upper bound for reset timeout growth. Defaults to `reset_timeout`.
    #[serde(rename = "max_reset_timeout_ms", with = "optional_millis")]
    pub max_reset_timeout: Option<Duration>,

    /// Extra random stretch of the reset wait, in `[0, 1]`.
    pub random_factor: f64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            max_failures: 5,
            call_timeout: Duration::from_secs(10),
            reset_timeout: Duration::from_secs(30),
            backoff_factor: 1.0,
            max_reset_timeout: None,
            random_factor: 0.0,
        }
    }
}

impl BreakerConfig {
    /// Breaker with a fixed reset timeout.
    pub fn new(max_failures: u32, call_timeout: Duration, reset_timeout: Duration) -> Self {
        Self {
            max_failures,
            call_timeout,
            reset_timeout,
            ..Default::default()
        }
    }

    /// Set the breaker name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Double the reset timeout after each failed trial, up to `max_reset_timeout`.
    pub fn with_exponential_backoff(mut self, max_reset_timeout: Duration) -> Self {
        self.backoff_factor = 2.0;
        self.max_reset_timeout = Some(max_reset_timeout);
        self
    }

    /// Override the backoff multiplier.
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Stretch each reset wait by up to `random_factor` of itself.
    pub fn with_random_factor(mut self, random_factor: f64) -> Self {
        self.random_factor = random_factor;
        self
    }

    /// The growth cap, falling back to the initial reset timeout.
    pub fn reset_timeout_cap(&self) -> Duration {
        self.max_reset_timeout.unwrap_or(self.reset_timeout)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod optional_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => super::millis::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

/// Validated, immutable breaker settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerSettings {
    pub max_failures: u32,
    pub call_timeout: Duration,
    pub reset_timeout: Duration,
    pub backoff_factor: f64,
    pub max_reset_timeout: Duration,
    pub random_factor: f64,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
