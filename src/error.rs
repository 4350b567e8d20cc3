//! Pipeline error type.

use thiserror::Error;

use crate::sinks::SinkError;

/// Errors surfaced by [`CounterPipeline`](crate::pipeline::CounterPipeline).
///
/// Per-record problems never show up here: malformed records and sink data-log
/// failures are absorbed on the hot path.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The sampling interval is not a positive finite number of seconds.
    #[error("invalid sampling interval: {0} (must be positive)")]
    InvalidInterval(f64),

    /// `start` was called on a pipeline that already ran.
    #[error("pipeline already started")]
    AlreadyStarted,

    /// The trace session could not be opened.
    #[error("session error: {0}")]
    Session(String),

    /// A sink failed a lifecycle notification.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
