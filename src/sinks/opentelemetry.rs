//! OpenTelemetry sink recording samples on synchronous instruments.
//!
//! [`OtelSink`] creates instruments lazily, one per counter name, from a
//! [`Meter`]. Rates are added to an `f64` counter; every other scalar and each
//! histogram quantile is recorded on an `f64` gauge. Exporting is left to the
//! `MeterProvider` the meter comes from.
//!
//! # Feature Flag
//!
//! This module requires the `opentelemetry` feature:
//!
//! ```toml
//! [dependencies]
//! flussi = { version = "0.1", features = ["opentelemetry"] }
//! ```
//!
//! # Attributes
//!
//! - `provider`: the provider or meter that published the counter
//! - every `key=value` pair of the sample metadata
//! - `quantile`: for histogram quantiles
//!
//! # Example
//!
//! ```rust,ignore
//! use flussi::sinks::opentelemetry::OtelSink;
//!
//! let sink = OtelSink::new("flussi");
//! // or, with an explicit provider:
//! let sink = OtelSink::with_meter(my_meter_provider.meter("flussi"));
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use opentelemetry::metrics::{Counter, Gauge, Meter};
use opentelemetry::{global, KeyValue};
use parking_lot::Mutex;

use super::{CounterSink, Result, SinkError};
use crate::sample::{CounterSample, SampleValue};

/// Sink that forwards samples to OpenTelemetry instruments.
pub struct OtelSink {
    meter: Meter,
    description_prefix: Option<String>,
    gauges: Mutex<HashMap<String, Gauge<f64>>>,
    counters: Mutex<HashMap<String, Counter<f64>>>,
}

impl OtelSink {
    /// Creates a sink using a meter from the global `MeterProvider`.
    pub fn new(meter_name: &'static str) -> Self {
        Self::with_meter(global::meter(meter_name))
    }

    /// Creates a sink with a specific meter instance.
    pub fn with_meter(meter: Meter) -> Self {
        Self {
            meter,
            description_prefix: None,
            gauges: Mutex::default(),
            counters: Mutex::default(),
        }
    }

    /// Sets a description prefix for all instruments.
    ///
    /// Counter "cpu-usage" gets description "Runtime: CPU Usage".
    pub fn with_description_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.description_prefix = Some(prefix.into());
        self
    }

    fn build_description(&self, sample: &CounterSample) -> String {
        match &self.description_prefix {
            Some(prefix) => format!("{}: {}", prefix, sample.display_name),
            None => sample.display_name.clone(),
        }
    }

    fn record_gauge(&self, sample: &CounterSample, value: f64, attributes: &[KeyValue]) {
        let mut gauges = self.gauges.lock();
        let gauge = gauges.entry(sample.name.clone()).or_insert_with(|| {
            self.meter
                .f64_gauge(sample.name.clone())
                .with_description(self.build_description(sample))
                .with_unit(sample.unit.clone())
                .build()
        });
        gauge.record(value, attributes);
    }

    fn add_counter(&self, sample: &CounterSample, value: f64, attributes: &[KeyValue]) {
        let mut counters = self.counters.lock();
        let counter = counters.entry(sample.name.clone()).or_insert_with(|| {
            self.meter
                .f64_counter(sample.name.clone())
                .with_description(self.build_description(sample))
                .with_unit(sample.unit.clone())
                .build()
        });
        counter.add(value, attributes);
    }

    /// Number of instruments created so far.
    pub fn instrument_count(&self) -> usize {
        self.gauges.lock().len() + self.counters.lock().len()
    }
}

#[async_trait]
impl CounterSink for OtelSink {
    fn log(&self, sample: &CounterSample) -> Result<()> {
        if sample.name.is_empty() {
            return Err(SinkError::OpenTelemetry("counter must have a name".into()));
        }
        let mut attributes = sample_attributes(sample);

        match &sample.value {
            // Counters are monotonic; a negative rate cannot be represented.
            SampleValue::Rate(v) => self.add_counter(sample, v.max(0.0), &attributes),
            SampleValue::Metric(v) | SampleValue::Gauge(v) | SampleValue::UpDownCounter(v) => {
                self.record_gauge(sample, *v, &attributes)
            }
            SampleValue::Percentiles(quantiles) => {
                for q in quantiles {
                    attributes.push(KeyValue::new("quantile", q.percentage));
                    self.record_gauge(sample, q.value, &attributes);
                    attributes.pop();
                }
            }
            SampleValue::Ended => {}
        }
        Ok(())
    }
}

/// Converts the sample provider and metadata into attributes.
fn sample_attributes(sample: &CounterSample) -> Vec<KeyValue> {
    let mut attributes = vec![KeyValue::new("provider", sample.provider.clone())];
    attributes.extend(
        sample
            .tags()
            .into_iter()
            .map(|(k, v)| KeyValue::new(k.to_string(), v.to_string())),
    );
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{Quantile, SessionId};
    use opentelemetry::metrics::MeterProvider;
    use opentelemetry_sdk::metrics::SdkMeterProvider;

    fn sink() -> OtelSink {
        let provider = SdkMeterProvider::builder().build();
        OtelSink::with_meter(provider.meter("flussi-test"))
    }

    fn sample(name: &str, value: SampleValue) -> CounterSample {
        CounterSample::new("System.Runtime", name, value, SessionId::new("s"))
            .with_display_name("CPU Usage")
    }

    #[test]
    fn test_build_description() {
        let s = sample("cpu-usage", SampleValue::Metric(1.0));
        assert_eq!(sink().build_description(&s), "CPU Usage");

        let prefixed = sink().with_description_prefix("Runtime");
        assert_eq!(prefixed.build_description(&s), "Runtime: CPU Usage");
    }

    #[test]
    fn test_attributes_from_provider_and_tags() {
        let s = sample("queue", SampleValue::Gauge(1.0)).with_metadata("region=eu,tier=1");
        let attrs = sample_attributes(&s);
        let keys: Vec<&str> = attrs.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["provider", "region", "tier"]);
    }

    #[test]
    fn test_instruments_created_once_per_name() {
        let sink = sink();
        sink.log(&sample("cpu-usage", SampleValue::Metric(1.0))).unwrap();
        sink.log(&sample("cpu-usage", SampleValue::Metric(2.0))).unwrap();
        sink.log(&sample("requests", SampleValue::Rate(3.0))).unwrap();
        assert_eq!(sink.instrument_count(), 2);
    }

    #[test]
    fn test_percentiles_and_ended() {
        let sink = sink();
        let quantiles = vec![
            Quantile { percentage: 0.5, value: 1.0 },
            Quantile { percentage: 0.99, value: 9.0 },
        ];
        sink.log(&sample("latency", SampleValue::Percentiles(quantiles)))
            .unwrap();
        sink.log(&sample("gone", SampleValue::Ended)).unwrap();
        assert_eq!(sink.instrument_count(), 1);
    }

    #[test]
    fn test_unnamed_counter_fails() {
        let err = sink().log(&sample("", SampleValue::Gauge(1.0))).unwrap_err();
        assert!(matches!(err, SinkError::OpenTelemetry(_)));
        assert!(!err.is_disposed());
    }

    #[test]
    fn test_global_meter() {
        let sink = OtelSink::new("flussi");
        assert!(sink.log(&sample("x", SampleValue::Gauge(1.0))).is_ok());
    }
}
