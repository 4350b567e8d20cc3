//! JSON lines sink.
//!
//! [`JsonSink`] writes every sample as one JSON object per line to any
//! [`Write`] implementation. The writer is flushed and released on
//! `pipeline_stopped`; later calls report [`SinkError::Disposed`].
//!
//! # Feature Flag
//!
//! This module requires the `json` feature:
//!
//! ```toml
//! [dependencies]
//! flussi = { version = "0.1", features = ["json"] }
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use flussi::sinks::json::JsonSink;
//!
//! let sink = JsonSink::new(std::io::stdout());
//! // {"provider":"System.Runtime","name":"cpu-usage",...,"value":{"type":"metric","value":12.5},...}
//! ```

use std::io::Write;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{CounterSink, Result, SinkError};
use crate::sample::CounterSample;

/// Configuration for the JSON sink.
#[derive(Debug, Clone, Default)]
pub struct JsonConfig {
    /// Whether to include the session id in every line.
    pub include_session: bool,
    /// Whether to flush after every line.
    pub flush_each_line: bool,
}

/// Compact line representation of a sample.
#[derive(Serialize)]
struct Line<'a> {
    timestamp_ms: u64,
    provider: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    unit: &'a str,
    #[serde(flatten)]
    value: &'a crate::sample::SampleValue,
    #[serde(skip_serializing_if = "str::is_empty")]
    metadata: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<&'a str>,
}

/// A sink that writes samples as JSON lines.
pub struct JsonSink<W: Write + Send> {
    writer: Mutex<Option<W>>,
    config: JsonConfig,
}

impl<W: Write + Send> JsonSink<W> {
    /// Creates a JSON sink with default settings.
    pub fn new(writer: W) -> Self {
        Self::with_config(writer, JsonConfig::default())
    }

    pub fn with_config(writer: W, config: JsonConfig) -> Self {
        Self {
            writer: Mutex::new(Some(writer)),
            config,
        }
    }

    /// Enables or disables the session id field.
    pub fn include_session(mut self, enabled: bool) -> Self {
        self.config.include_session = enabled;
        self
    }

    /// Enables or disables flushing after every line.
    pub fn flush_each_line(mut self, enabled: bool) -> Self {
        self.config.flush_each_line = enabled;
        self
    }

    /// Takes the writer back. The sink is disposed afterwards.
    pub fn into_inner(self) -> Option<W> {
        self.writer.into_inner()
    }

    /// Releases the writer, returning it if the sink was still open.
    pub fn close(&self) -> Option<W> {
        self.writer.lock().take()
    }

    fn line<'a>(&self, sample: &'a CounterSample) -> Line<'a> {
        Line {
            timestamp_ms: sample.timestamp_ms,
            provider: &sample.provider,
            name: &sample.name,
            unit: &sample.unit,
            value: &sample.value,
            metadata: &sample.metadata,
            session: self
                .config
                .include_session
                .then(|| sample.session_id.as_str()),
        }
    }
}

#[async_trait]
impl<W: Write + Send> CounterSink for JsonSink<W> {
    async fn pipeline_stopped(&self, _token: CancellationToken) -> Result<()> {
        let mut writer = self.close().ok_or(SinkError::Disposed)?;
        writer.flush()?;
        Ok(())
    }

    fn log(&self, sample: &CounterSample) -> Result<()> {
        let mut guard = self.writer.lock();
        let writer = guard.as_mut().ok_or(SinkError::Disposed)?;

        serde_json::to_writer(&mut *writer, &self.line(sample))?;
        writer.write_all(b"\n")?;
        if self.config.flush_each_line {
            writer.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{Quantile, SampleValue, SessionId};

    fn sample(value: SampleValue) -> CounterSample {
        CounterSample::new("System.Runtime", "cpu-usage", value, SessionId::new("s-1"))
            .with_unit("%")
            .with_timestamp(42)
    }

    fn lines(sink: JsonSink<Vec<u8>>) -> Vec<serde_json::Value> {
        let bytes = sink.into_inner().unwrap();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_one_line_per_sample() {
        let sink = JsonSink::new(Vec::new());
        sink.log(&sample(SampleValue::Metric(12.5))).unwrap();
        sink.log(&sample(SampleValue::Rate(3.0))).unwrap();

        let lines = lines(sink);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["provider"], "System.Runtime");
        assert_eq!(lines[0]["name"], "cpu-usage");
        assert_eq!(lines[0]["unit"], "%");
        assert_eq!(lines[0]["timestamp_ms"], 42);
        assert_eq!(lines[0]["type"], "metric");
        assert_eq!(lines[0]["value"], 12.5);
        assert_eq!(lines[1]["type"], "rate");
        assert!(lines[0].get("session").is_none());
        assert!(lines[0].get("metadata").is_none());
    }

    #[test]
    fn test_include_session() {
        let sink = JsonSink::new(Vec::new()).include_session(true);
        sink.log(&sample(SampleValue::Gauge(1.0))).unwrap();

        assert_eq!(lines(sink)[0]["session"], "s-1");
    }

    #[test]
    fn test_percentiles_and_ended() {
        let sink = JsonSink::new(Vec::new());
        sink.log(&sample(SampleValue::Percentiles(vec![Quantile {
            percentage: 0.5,
            value: 2.0,
        }])))
        .unwrap();
        sink.log(&sample(SampleValue::Ended)).unwrap();

        let lines = lines(sink);
        assert_eq!(lines[0]["type"], "percentiles");
        assert_eq!(lines[0]["value"][0]["percentage"], 0.5);
        assert_eq!(lines[1]["type"], "ended");
    }

    #[tokio::test]
    async fn test_disposed_after_stop() {
        let sink = JsonSink::new(Vec::new());
        sink.log(&sample(SampleValue::Metric(1.0))).unwrap();
        sink.pipeline_stopped(CancellationToken::new()).await.unwrap();

        assert!(sink.log(&sample(SampleValue::Metric(2.0))).unwrap_err().is_disposed());
        assert!(sink
            .pipeline_stopped(CancellationToken::new())
            .await
            .unwrap_err()
            .is_disposed());
    }
}
