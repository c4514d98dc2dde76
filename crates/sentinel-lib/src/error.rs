//! Error taxonomy for the engine
//!
//! Lifecycle misuse and boundary rejections are typed so callers can match on
//! them; channel failures stay isolated from the engine's own error state and
//! only ever appear as failed notification attempts.

use thiserror::Error;

/// Errors surfaced by the engine's public operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed alert or metric input. Rejected, never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Metric name outside the tracked set fixed at startup.
    #[error("metric '{0}' is not configured")]
    UnknownMetric(String),

    /// Invalid or incomplete engine configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No active alert matches the given id.
    #[error("no active alert with id {0}")]
    NotFound(String),

    /// Acknowledge called on an alert that is already acknowledged.
    #[error("alert {0} is already acknowledged")]
    AlreadyAcknowledged(String),

    /// Resolve called on an alert that already moved to history.
    #[error("alert {0} is already resolved")]
    AlreadyResolved(String),

    /// History persistence could not read or write its backing file.
    #[error("history io error: {0}")]
    Io(#[from] std::io::Error),

    /// History persistence could not encode or decode records.
    #[error("history serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure reported by a notification channel for one delivery attempt.
///
/// Recorded on the alert as a failed `NotificationAttempt`; a failing channel
/// must not prevent delivery on any other channel, nor the alert from
/// existing or escalating.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ChannelDeliveryError {
    pub message: String,
}

impl ChannelDeliveryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
