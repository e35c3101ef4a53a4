//! Metric sink configuration.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SinkError};

/// Default retention for metrics outside the extended whitelist.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(140);

/// Default retention for whitelisted metrics.
pub const DEFAULT_EXTENDED_RETENTION: Duration = Duration::from_secs(15 * 60);

/// Metrics retained for the extended duration unless configured otherwise.
pub const DEFAULT_EXTENDED_METRICS: [&str; 2] = ["cpu/usage_rate", "memory/usage"];

/// Configuration for a [`MetricSink`](crate::MetricSink).
///
/// Durations are written as whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Retention applied to every metric not in `extended_metrics`.
    #[serde(with = "duration_secs")]
    pub default_retention: Duration,
    /// Retention applied to metrics in `extended_metrics`.
    #[serde(with = "duration_secs")]
    pub extended_retention: Duration,
    /// Metric names kept for the extended retention.
    pub extended_metrics: BTreeSet<String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            default_retention: DEFAULT_RETENTION,
            extended_retention: DEFAULT_EXTENDED_RETENTION,
            extended_metrics: DEFAULT_EXTENDED_METRICS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl SinkConfig {
    /// Creates a configuration from explicit retentions and whitelist.
    #[must_use]
    pub fn new<I, S>(default_retention: Duration, extended_retention: Duration, extended: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            default_retention,
            extended_retention,
            extended_metrics: extended.into_iter().map(Into::into).collect(),
        }
    }

    /// Sets the default retention.
    #[must_use]
    pub fn with_default_retention(mut self, retention: Duration) -> Self {
        self.default_retention = retention;
        self
    }

    /// Sets the extended retention.
    #[must_use]
    pub fn with_extended_retention(mut self, retention: Duration) -> Self {
        self.extended_retention = retention;
        self
    }

    /// Adds a metric name to the extended whitelist.
    #[must_use]
    pub fn with_extended_metric(mut self, name: impl Into<String>) -> Self {
        self.extended_metrics.insert(name.into());
        self
    }

    /// Parses and validates a JSON configuration document.
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::InvalidConfig` if the document cannot be parsed,
    /// or any error from [`SinkConfig::validate`].
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| SinkError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for mistakes that would otherwise surface
    /// as silent data loss.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::InvalidRetention` for a zero or fractional-second
    /// retention and `SinkError::InvalidConfig` for an empty whitelisted
    /// metric name.
    pub fn validate(&self) -> Result<()> {
        check_retention("default", self.default_retention)?;
        check_retention("extended", self.extended_retention)?;
        if self.extended_metrics.iter().any(String::is_empty) {
            return Err(SinkError::InvalidConfig {
                reason: "empty metric name in extended_metrics".to_string(),
            });
        }
        Ok(())
    }
}

fn check_retention(class: &'static str, retention: Duration) -> Result<()> {
    let reason = if retention.is_zero() {
        "must be greater than zero"
    } else if retention.subsec_nanos() != 0 {
        "must be a whole number of seconds"
    } else {
        return Ok(());
    };
    Err(SinkError::InvalidRetention {
        class,
        reason: reason.to_string(),
    })
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
