//! # Flussi - Live Performance-Counter Streaming
//!
//! A Rust library that streams live performance counters out of an instrumented
//! process's trace session, keeps only the counters you asked for, and fans the
//! resulting samples out to any number of independent sinks.
//!
//! ## The Pipeline
//!
//! ```text
//! ┌──────────────┐   records   ┌───────────────┐  samples  ┌────────────┐
//! │ RecordSource │ ──────────► │ extract_samples│ ────────► │ SinkFanout │ ──► sinks
//! └──────────────┘             └───────────────┘           └────────────┘
//!        │ completed                   ▲ filter + session id
//!        ▼
//! ┌──────────────────┐  completed | cancelled
//! │ CompletionBridge │ ─────────────────────────► pipeline_stopped
//! └──────────────────┘
//! ```
//!
//! 1. **Filter**: [`CounterFilter`](filter::CounterFilter) holds the
//!    provider/counter allow-list and the sampling interval.
//! 2. **Session**: the filter is turned into a
//!    [`MetricSourceConfiguration`](session::MetricSourceConfiguration) with a
//!    fresh session id; a [`SessionTransport`](session::SessionTransport) opens it.
//! 3. **Extraction**: every raw [`TraceRecord`](record::TraceRecord) is decoded by
//!    [`extract_samples`](extract::extract_samples). Non-counter and malformed
//!    records yield nothing.
//! 4. **Fan-out**: samples go to every [`CounterSink`](sinks::CounterSink) through
//!    [`SinkFanout`](fanout::SinkFanout), which keeps one broken sink from
//!    affecting the others.
//! 5. **Completion**: the pipeline waits on a
//!    [`CompletionBridge`](bridge::CompletionBridge) that resolves when the stream
//!    ends or the cancellation token fires, then notifies the sinks.
//!
//! ## Failure Policy
//!
//! | Failure | Effect |
//! |---------|--------|
//! | Malformed record | dropped |
//! | Sink disposed | skipped for that call |
//! | Sink `log` error | swallowed |
//! | Sink lifecycle error | returned from [`CounterPipeline::start`](pipeline::CounterPipeline::start) |
//! | Cancellation | normal stop, sinks still get `pipeline_stopped` |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use flussi::pipeline::CounterPipeline;
//! use flussi::settings::CounterPipelineSettings;
//! use flussi::sinks::json::JsonSink;
//! use tokio_util::sync::CancellationToken;
//!
//! let settings = CounterPipelineSettings::new()
//!     .with_interval(1.0)
//!     .with_counters("System.Runtime", ["cpu-usage", "working-set"]);
//!
//! let sink = Arc::new(JsonSink::new(std::io::stdout()));
//! let mut pipeline = CounterPipeline::new(settings, vec![sink])?;
//!
//! pipeline.start(&transport, CancellationToken::new()).await?;
//! ```
//!
//! ## Sinks
//!
//! Built-in sinks are gated behind feature flags:
//!
//! | Feature | Module | Description |
//! |---------|--------|-------------|
//! | `json` | [`sinks::json`] | JSON lines to any writer |
//! | `table` | [`sinks::table`] | Latest values as an ASCII table |
//! | `prometheus` | [`sinks::prometheus`] | Prometheus exposition format |
//! | `opentelemetry` | [`sinks::opentelemetry`] | OpenTelemetry instruments |
//! | `full` | All sinks | Enables all sink modules |
//!
//! ## Logging
//!
//! The crate logs through [`tracing`]; installing a subscriber is up to the
//! application.

pub mod bridge;
pub mod error;
pub mod extract;
pub mod fanout;
pub mod filter;
pub mod pipeline;
pub mod record;
pub mod sample;
pub mod session;
pub mod settings;
pub mod sinks;
pub mod source;

#[cfg(test)]
mod testing;

pub use error::{PipelineError, Result};
pub use pipeline::{CounterPipeline, PipelineState};
