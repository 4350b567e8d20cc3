//! Counter sinks: consumers of pipeline lifecycle events and samples.
//!
//! A sink implements [`CounterSink`]:
//!
//! - [`pipeline_started`](CounterSink::pipeline_started) and
//!   [`pipeline_stopped`](CounterSink::pipeline_stopped) are asynchronous and may
//!   do setup or flush work,
//! - [`log`](CounterSink::log) is synchronous and called once per sample on the
//!   record hot path, so it must return quickly.
//!
//! Built-in sinks are gated behind feature flags:
//!
//! - `json` - [`json::JsonSink`], JSON lines to any writer
//! - `table` - [`table::TableSink`], latest values rendered as a table
//! - `prometheus` - [`prometheus::PrometheusSink`], Prometheus exposition format
//! - `opentelemetry` - [`opentelemetry::OtelSink`], OpenTelemetry instruments
//! - `full` - all of the above
//!
//! # Unified Error Handling
//!
//! All sinks report failures through [`SinkError`]. Returning
//! [`SinkError::Disposed`] tells the fan-out that the sink is gone.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use flussi::sample::CounterSample;
//! use flussi::sinks::{CounterSink, Result};
//!
//! struct Stdout;
//!
//! #[async_trait]
//! impl CounterSink for Stdout {
//!     fn log(&self, sample: &CounterSample) -> Result<()> {
//!         println!("{}", sample);
//!         Ok(())
//!     }
//! }
//! ```

mod error;

pub use error::{Result, SinkError};

#[cfg(feature = "json")]
pub mod json;

#[cfg(feature = "table")]
pub mod table;

#[cfg(feature = "prometheus")]
pub mod prometheus;

#[cfg(feature = "opentelemetry")]
pub mod opentelemetry;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::sample::CounterSample;

/// A consumer of counter samples.
///
/// Sinks are shared with the pipeline through `Arc` and are never called
/// concurrently by a single pipeline.
#[async_trait]
pub trait CounterSink: Send + Sync {
    /// Called once before any sample is delivered.
    async fn pipeline_started(&self, _token: CancellationToken) -> Result<()> {
        Ok(())
    }

    /// Called once after the stream ended or was cancelled.
    async fn pipeline_stopped(&self, _token: CancellationToken) -> Result<()> {
        Ok(())
    }

    /// Receives one sample. Must not block.
    fn log(&self, sample: &CounterSample) -> Result<()>;
}
