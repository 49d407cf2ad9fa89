//! Error taxonomy for the presence engine.
//!
//! Failures inside event handlers never escape dispatch; they are funneled
//! through [`Context::report_error`] as a structured [`ErrorReport`] and
//! surfaced as `error.<operation>` events on the scoped emitter.
//!
//! [`Context::report_error`]: crate::context::Context::report_error

use serde::Serialize;

use crate::ds::DeliveryServiceError;

#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("Unknown peer: {0}")]
    UnknownPeer(String),

    #[error(transparent)]
    DeliveryServiceError(#[from] DeliveryServiceError),

    #[error("JSON processing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("An unknown error occurred: {0}")]
    Other(anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Chat {channel} is not tracked in session group {group}")]
    UnknownSessionChat { group: String, channel: String },

    #[error("An unknown error occurred: {0}")]
    Other(anyhow::Error),
}

/// Structured record of a reported, non-fatal failure: which subsystem it
/// came from, the operation that failed, and the underlying cause as
/// diagnostic text.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub category: String,
    pub operation: String,
    pub message: String,
    /// Report time in milliseconds.
    pub timestamp: i64,
}

impl ErrorReport {
    pub fn new(
        category: impl Into<String>,
        operation: impl Into<String>,
        source: &anyhow::Error,
    ) -> Self {
        Self {
            category: category.into(),
            operation: operation.into(),
            message: format!("{source:#}"),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

impl std::fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.category, self.operation, self.message)
    }
}
