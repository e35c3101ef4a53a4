//! Error types for the metric-sink crate.

use thiserror::Error;

/// Errors that can occur while constructing or configuring a metric sink.
///
/// Ingestion and queries never fail; only construction-time mistakes are
/// reported through this type.
#[derive(Debug, Error)]
pub enum SinkError {
    /// A retention duration is zero, not whole seconds, or too large to represent.
    #[error("invalid {class} retention: {reason}")]
    InvalidRetention {
        /// The retention class the duration was meant for.
        class: &'static str,
        /// The reason the duration was rejected.
        reason: String,
    },

    /// The sink configuration is malformed.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// The reason the configuration was rejected.
        reason: String,
    },

    /// An entity identifier is invalid.
    #[error("invalid entity id: {reason}")]
    InvalidEntityId {
        /// The reason the identifier was rejected.
        reason: String,
    },
}

/// Result type for metric-sink operations.
pub type Result<T> = std::result::Result<T, SinkError>;
