//! Prometheus sink exporting samples through the official `prometheus` crate.
//!
//! [`PrometheusSink`] keeps a [`Registry`](::prometheus::Registry) with one
//! metric family per counter name and updates it from every logged sample.
//! [`render`](PrometheusSink::render) produces the text exposition format,
//! ready to be served on a `/metrics` endpoint.
//!
//! # Feature Flag
//!
//! This module requires the `prometheus` feature:
//!
//! ```toml
//! [dependencies]
//! flussi = { version = "0.1", features = ["prometheus"] }
//! ```
//!
//! # Mapping
//!
//! | Sample value | Prometheus type | Labels |
//! |--------------|-----------------|--------|
//! | `Rate` | counter, incremented by the rate | `provider`, tags |
//! | `Metric`, `Gauge`, `UpDownCounter` | gauge | `provider`, tags |
//! | `Percentiles` | gauge, one series per quantile | `provider`, tags, `quantile` |
//! | `Ended` | removes the series | |
//!
//! Tags are matched to labels by key. A family keeps the label names of the
//! first sample it saw: later samples leave missing tags empty, and a tag the
//! family does not know is an error.
//!
//! # Examples
//!
//! ```rust,ignore
//! use flussi::sinks::prometheus::PrometheusSink;
//!
//! let sink = PrometheusSink::new().with_namespace("dotnet");
//! // ... run the pipeline ...
//! println!("{}", sink.render()?);
//! // # HELP dotnet_cpu_usage CPU Usage (%)
//! // # TYPE dotnet_cpu_usage gauge
//! // dotnet_cpu_usage{provider="System.Runtime"} 12.5
//! ```

use std::collections::HashMap;

use ::prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use async_trait::async_trait;
use parking_lot::Mutex;

use super::{CounterSink, Result, SinkError};
use crate::sample::{CounterSample, SampleValue};

const PROVIDER_LABEL: &str = "provider";
const QUANTILE_LABEL: &str = "quantile";

#[derive(Clone, Copy)]
enum Kind {
    Gauge,
    Counter,
}

enum Metric {
    Gauge(GaugeVec),
    Counter(CounterVec),
}

/// A registered metric and the label names it was registered with.
struct Family {
    metric: Metric,
    labels: Vec<String>,
}

/// A sink that maintains Prometheus metrics for the received samples.
pub struct PrometheusSink {
    registry: Registry,
    namespace: Option<String>,
    families: Mutex<HashMap<String, Family>>,
}

impl Default for PrometheusSink {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusSink {
    /// Creates a sink with a fresh registry.
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    /// Creates a sink that registers into an existing registry.
    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry,
            namespace: None,
            families: Mutex::default(),
        }
    }

    /// Sets the namespace (prefix) for all metrics.
    ///
    /// Namespace "dotnet" + counter "cpu-usage" = "dotnet_cpu_usage".
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(sanitize_name(namespace));
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Renders the registry to the Prometheus text exposition format.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| SinkError::Other(e.to_string()))
    }

    fn full_name(&self, name: &str) -> String {
        let sanitized = sanitize_name(name);
        match &self.namespace {
            Some(ns) => format!("{}_{}", ns, sanitized),
            None => sanitized,
        }
    }

    fn help(sample: &CounterSample) -> String {
        let label = if sample.display_name.is_empty() {
            &sample.name
        } else {
            &sample.display_name
        };
        match sample.unit.as_str() {
            "" => label.clone(),
            unit => format!("{} ({})", label, unit),
        }
    }

    fn family<'f>(
        &self,
        families: &'f mut HashMap<String, Family>,
        name: &str,
        help: String,
        labels: &[String],
        kind: Kind,
    ) -> Result<&'f Family> {
        if !families.contains_key(name) {
            let label_names: Vec<&str> = labels.iter().map(String::as_str).collect();
            let opts = Opts::new(name, help);
            let metric = match kind {
                Kind::Gauge => {
                    let vec = GaugeVec::new(opts, &label_names)?;
                    self.registry.register(Box::new(vec.clone()))?;
                    Metric::Gauge(vec)
                }
                Kind::Counter => {
                    let vec = CounterVec::new(opts, &label_names)?;
                    self.registry.register(Box::new(vec.clone()))?;
                    Metric::Counter(vec)
                }
            };
            families.insert(
                name.to_string(),
                Family {
                    metric,
                    labels: labels.to_vec(),
                },
            );
        }

        let family = families
            .get(name)
            .ok_or_else(|| SinkError::Other(format!("metric {} is not registered", name)))?;
        match (&family.metric, kind) {
            (Metric::Gauge(_), Kind::Counter) => Err(type_clash(name, "gauge")),
            (Metric::Counter(_), Kind::Gauge) => Err(type_clash(name, "counter")),
            _ => Ok(family),
        }
    }
}

impl Family {
    /// Orders the sample's labels after the names the family was registered
    /// with. Labels the sample lacks are empty.
    fn values<'a>(
        &self,
        name: &str,
        provider: &'a str,
        tags: &[(String, &'a str)],
        quantile: &'a str,
    ) -> Result<Vec<&'a str>> {
        if let Some((key, _)) = tags.iter().find(|(key, _)| !self.labels.contains(key)) {
            return Err(SinkError::Other(format!(
                "label {} is not part of metric {}",
                key, name
            )));
        }

        Ok(self
            .labels
            .iter()
            .map(|label| match label.as_str() {
                PROVIDER_LABEL => provider,
                QUANTILE_LABEL => quantile,
                label => tags
                    .iter()
                    .find(|(key, _)| key == label)
                    .map_or("", |(_, value)| *value),
            })
            .collect())
    }
}

#[async_trait]
impl CounterSink for PrometheusSink {
    fn log(&self, sample: &CounterSample) -> Result<()> {
        let name = self.full_name(&sample.name);

        // Label order is fixed per family, so tags are matched by key.
        let mut tags: Vec<(String, &str)> = sample
            .tags()
            .into_iter()
            .map(|(key, value)| (sanitize_name(key), value))
            .filter(|(key, _)| key != PROVIDER_LABEL && key != QUANTILE_LABEL)
            .collect();
        tags.sort_by(|a, b| a.0.cmp(&b.0));
        tags.dedup_by(|later, earlier| later.0 == earlier.0);

        let mut label_names = vec![PROVIDER_LABEL.to_string()];
        label_names.extend(tags.iter().map(|(key, _)| key.clone()));
        let provider = sample.provider.as_str();

        let mut families = self.families.lock();

        match &sample.value {
            SampleValue::Rate(v) => {
                let family = self.family(
                    &mut families,
                    &name,
                    Self::help(sample),
                    &label_names,
                    Kind::Counter,
                )?;
                let values = family.values(&name, provider, &tags, "")?;
                if let Metric::Counter(counter) = &family.metric {
                    // Prometheus counters only go up.
                    counter
                        .get_metric_with_label_values(values.as_slice())?
                        .inc_by(v.max(0.0));
                }
            }
            SampleValue::Metric(v) | SampleValue::Gauge(v) | SampleValue::UpDownCounter(v) => {
                let family = self.family(
                    &mut families,
                    &name,
                    Self::help(sample),
                    &label_names,
                    Kind::Gauge,
                )?;
                let values = family.values(&name, provider, &tags, "")?;
                if let Metric::Gauge(gauge) = &family.metric {
                    gauge.get_metric_with_label_values(values.as_slice())?.set(*v);
                }
            }
            SampleValue::Percentiles(quantiles) => {
                label_names.push(QUANTILE_LABEL.to_string());
                let family = self.family(
                    &mut families,
                    &name,
                    Self::help(sample),
                    &label_names,
                    Kind::Gauge,
                )?;
                if let Metric::Gauge(gauge) = &family.metric {
                    for q in quantiles {
                        let quantile = q.percentage.to_string();
                        let values = family.values(&name, provider, &tags, &quantile)?;
                        gauge
                            .get_metric_with_label_values(values.as_slice())?
                            .set(q.value);
                    }
                }
            }
            SampleValue::Ended => {
                if let Some(family) = families.get(&name) {
                    if let (Metric::Gauge(gauge), Ok(values)) =
                        (&family.metric, family.values(&name, provider, &tags, ""))
                    {
                        // Unknown series: nothing to remove.
                        let _ = gauge.remove_label_values(values.as_slice());
                    }
                }
            }
        }
        Ok(())
    }
}

fn type_clash(name: &str, registered: &str) -> SinkError {
    SinkError::Other(format!("metric {} is already registered as a {}", name, registered))
}

/// Sanitizes a metric or label name to be Prometheus-compatible.
///
/// Prometheus metric names must match `[a-zA-Z_:][a-zA-Z0-9_:]*`.
fn sanitize_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
            result.push(c);
        } else if c == '-' || c == '.' || c == ' ' || c == '/' {
            result.push('_');
        }
    }
    if result.is_empty() {
        result.push_str("unnamed");
    }
    if result.starts_with(|c: char| c.is_ascii_digit()) {
        result.insert(0, '_');
    }
    result
}
