//! Retention classes and the whitelist-driven retention policy.
//!
//! Every metric name belongs to exactly one [`RetentionClass`]. The class is
//! a static lookup against the whitelist fixed at construction, so a name
//! never changes class and every entity reporting it shares the same window.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::config::SinkConfig;
use crate::error::{Result, SinkError};

/// The two retention tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetentionClass {
    /// Applied to every metric outside the whitelist.
    Default,
    /// Applied to whitelisted metrics.
    Extended,
}

impl RetentionClass {
    /// Returns the lowercase name of this class.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Extended => "extended",
        }
    }
}

impl fmt::Display for RetentionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps metric names to retention windows.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    default_retention: chrono::Duration,
    extended_retention: chrono::Duration,
    extended_metrics: HashSet<String>,
}

impl RetentionPolicy {
    /// Creates a new retention policy.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::InvalidRetention` if either duration is zero or
    /// too large to represent as a signed time delta.
    pub fn new<I, S>(default_retention: Duration, extended_retention: Duration, extended: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let default_retention = to_delta(default_retention, RetentionClass::Default)?;
        let extended_retention = to_delta(extended_retention, RetentionClass::Extended)?;

        if extended_retention < default_retention {
            warn!(
                default_secs = default_retention.num_seconds(),
                extended_secs = extended_retention.num_seconds(),
                "extended retention is shorter than default retention"
            );
        }

        Ok(Self {
            default_retention,
            extended_retention,
            extended_metrics: extended.into_iter().map(Into::into).collect(),
        })
    }

    /// Creates a retention policy from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns any error from [`SinkConfig::validate`] or [`RetentionPolicy::new`].
    pub fn from_config(config: &SinkConfig) -> Result<Self> {
        config.validate()?;
        Self::new(
            config.default_retention,
            config.extended_retention,
            config.extended_metrics.iter().cloned(),
        )
    }

    /// Returns the class a metric name belongs to.
    #[must_use]
    pub fn class_of(&self, metric: &str) -> RetentionClass {
        if self.extended_metrics.contains(metric) {
            RetentionClass::Extended
        } else {
            RetentionClass::Default
        }
    }

    /// Returns the retention window of a class.
    #[must_use]
    pub const fn window(&self, class: RetentionClass) -> chrono::Duration {
        match class {
            RetentionClass::Default => self.default_retention,
            RetentionClass::Extended => self.extended_retention,
        }
    }

    /// Returns the retention window of a metric name.
    #[must_use]
    pub fn retention_for(&self, metric: &str) -> chrono::Duration {
        self.window(self.class_of(metric))
    }

    /// Returns the oldest timestamp a point of `metric` may carry and still
    /// be retained at `now`.
    ///
    /// Points strictly older than the cutoff are expired; a point exactly
    /// one retention window old survives.
    #[must_use]
    pub fn cutoff(&self, metric: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.retention_for(metric))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Returns the longer of the two retention windows.
    #[must_use]
    pub fn longest(&self) -> chrono::Duration {
        self.default_retention.max(self.extended_retention)
    }

    /// Returns the whitelisted metric names.
    #[must_use]
    pub const fn extended_metrics(&self) -> &HashSet<String> {
        &self.extended_metrics
    }
}

fn to_delta(retention: Duration, class: RetentionClass) -> Result<chrono::Duration> {
    if retention.is_zero() {
        return Err(SinkError::InvalidRetention {
            class: class.as_str(),
            reason: "must be greater than zero".to_string(),
        });
    }
    chrono::Duration::from_std(retention).map_err(|e| SinkError::InvalidRetention {
        class: class.as_str(),
        reason: e.to_string(),
    })
}
