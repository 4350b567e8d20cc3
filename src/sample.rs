//! Structured counter samples.
//!
//! A [`CounterSample`] is one decoded measurement produced by the extractor
//! from a raw trace record. Samples are immutable and are handed to every
//! sink by reference; the pipeline keeps no copy.
//!
//! # Examples
//!
//! ```rust
//! use flussi::sample::{CounterSample, MetricKind, SampleValue, SessionId};
//!
//! let sample = CounterSample::new(
//!     "System.Runtime",
//!     "cpu-usage",
//!     SampleValue::Metric(12.5),
//!     SessionId::new("session-1"),
//! )
//! .with_unit("%");
//!
//! assert_eq!(sample.value.kind(), MetricKind::Gauge);
//! assert_eq!(sample.value.as_f64(), Some(12.5));
//! assert_eq!(sample.to_string(), "System.Runtime/cpu-usage:12.5");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Opaque identifier of a trace session.
///
/// Assigned when the session configuration is created and threaded through
/// every extraction so samples can be correlated with their session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a value should be exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Per-interval increment of a monotonically increasing quantity.
    Counter,
    /// A point-in-time value that can go up or down.
    Gauge,
    /// A distribution summarized by quantiles.
    Histogram,
}

/// One quantile of a histogram report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantile {
    /// Quantile in `[0, 1]`, e.g. `0.95`.
    pub percentage: f64,
    /// Observed value at that quantile.
    pub value: f64,
}

/// The measured value of a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SampleValue {
    /// Mean of an event counter over the interval.
    Metric(f64),
    /// Increment of a sum counter over the interval.
    Rate(f64),
    /// Last value of a gauge instrument.
    Gauge(f64),
    /// Net change of an up-down counter instrument over the interval.
    UpDownCounter(f64),
    /// Quantiles of a histogram instrument.
    Percentiles(Vec<Quantile>),
    /// The instrument stopped reporting.
    Ended,
}

impl SampleValue {
    /// Returns the scalar value, if this is a scalar sample.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SampleValue::Metric(v)
            | SampleValue::Rate(v)
            | SampleValue::Gauge(v)
            | SampleValue::UpDownCounter(v) => Some(*v),
            SampleValue::Percentiles(_) | SampleValue::Ended => None,
        }
    }

    /// Classifies the value for exporters.
    pub fn kind(&self) -> MetricKind {
        match self {
            SampleValue::Rate(_) => MetricKind::Counter,
            SampleValue::Percentiles(_) => MetricKind::Histogram,
            SampleValue::Metric(_)
            | SampleValue::Gauge(_)
            | SampleValue::UpDownCounter(_)
            | SampleValue::Ended => MetricKind::Gauge,
        }
    }
}

impl Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleValue::Metric(v)
            | SampleValue::Rate(v)
            | SampleValue::Gauge(v)
            | SampleValue::UpDownCounter(v) => write!(f, "{}", v),
            SampleValue::Percentiles(quantiles) => {
                for (i, q) in quantiles.iter().enumerate() {
                    if i > 0 {
                        f.write_str(";")?;
                    }
                    write!(f, "{}={}", q.percentage, q.value)?;
                }
                Ok(())
            }
            SampleValue::Ended => f.write_str("(ended)"),
        }
    }
}

/// A single structured counter measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterSample {
    /// Provider (or meter) that published the counter.
    pub provider: String,
    /// Counter (or instrument) name.
    pub name: String,
    /// Human-readable name; falls back to `name` when the record has none.
    pub display_name: String,
    /// Unit of measure, possibly empty.
    pub unit: String,
    /// The measured value.
    pub value: SampleValue,
    /// Raw `key=value,key=value` metadata attached to the counter.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metadata: String,
    /// Reporting interval in seconds.
    pub interval_seconds: f64,
    /// Record timestamp in milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Session the record belongs to.
    pub session_id: SessionId,
}

impl CounterSample {
    /// Creates a sample with empty display name, unit and metadata.
    pub fn new(
        provider: impl Into<String>,
        name: impl Into<String>,
        value: SampleValue,
        session_id: SessionId,
    ) -> Self {
        let name = name.into();
        Self {
            provider: provider.into(),
            display_name: name.clone(),
            name,
            unit: String::new(),
            value,
            metadata: String::new(),
            interval_seconds: 0.0,
            timestamp_ms: 0,
            session_id,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = metadata.into();
        self
    }

    pub fn with_interval(mut self, interval_seconds: f64) -> Self {
        self.interval_seconds = interval_seconds;
        self
    }

    pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    /// Parses the metadata into `(key, value)` pairs.
    ///
    /// Entries without `=` and empty keys are skipped.
    pub fn tags(&self) -> Vec<(&str, &str)> {
        self.metadata
            .split(',')
            .filter_map(|entry| entry.split_once('='))
            .map(|(k, v)| (k.trim(), v.trim()))
            .filter(|(k, _)| !k.is_empty())
            .collect()
    }
}

impl Display for CounterSample {
    /// Formats the sample as `provider/name:value`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.provider, self.name, self.value)
    }
}
