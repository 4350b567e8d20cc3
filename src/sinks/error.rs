//! Unified error type for all sinks.
//!
//! Every sink reports failures through [`SinkError`], so the fan-out can apply
//! one isolation policy regardless of which sink failed.

use thiserror::Error;

/// Unified error type for sink operations.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink has already been torn down.
    ///
    /// The fan-out skips a disposed sink for the current call and moves on.
    #[error("sink has been disposed")]
    Disposed,

    /// I/O error while writing output.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error from the Prometheus sink.
    #[cfg(feature = "prometheus")]
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// Error from the OpenTelemetry sink.
    #[cfg(feature = "opentelemetry")]
    #[error("opentelemetry error: {0}")]
    OpenTelemetry(String),

    /// Any other sink failure.
    #[error("{0}")]
    Other(String),
}

impl SinkError {
    /// Returns `true` for [`SinkError::Disposed`].
    pub fn is_disposed(&self) -> bool {
        matches!(self, SinkError::Disposed)
    }
}

/// Result type for sink operations.
pub type Result<T> = std::result::Result<T, SinkError>;
