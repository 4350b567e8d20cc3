//! Shared helpers for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::extract::{EVENT_COUNTERS_EVENT, METRICS_PROVIDER};
use crate::record::TraceRecord;
use crate::sample::CounterSample;
use crate::sinks::{CounterSink, Result, SinkError};

/// How a [`RecordingSink`] answers a call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Behavior {
    #[default]
    Succeed,
    Disposed,
    Fail,
}

impl Behavior {
    fn outcome(self) -> Result<()> {
        match self {
            Behavior::Succeed => Ok(()),
            Behavior::Disposed => Err(SinkError::Disposed),
            Behavior::Fail => Err(SinkError::Other("injected failure".into())),
        }
    }
}

/// A sink that records every successful call in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    started: Behavior,
    stopped: Behavior,
    log: Behavior,
    timeline: Mutex<Vec<String>>,
    log_attempts: AtomicUsize,
    cancelled_at_stop: Mutex<Option<bool>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_started(mut self, behavior: Behavior) -> Self {
        self.started = behavior;
        self
    }

    pub fn with_stopped(mut self, behavior: Behavior) -> Self {
        self.stopped = behavior;
        self
    }

    pub fn with_log(mut self, behavior: Behavior) -> Self {
        self.log = behavior;
        self
    }

    /// Every successful call: `started`, `log <sample>`, `stopped`.
    pub fn timeline(&self) -> Vec<String> {
        self.timeline.lock().clone()
    }

    /// Successful lifecycle calls only.
    pub fn events(&self) -> Vec<String> {
        self.timeline()
            .into_iter()
            .filter(|e| !e.starts_with("log "))
            .collect()
    }

    /// Successfully logged samples, formatted with `Display`.
    pub fn logged(&self) -> Vec<String> {
        self.timeline()
            .into_iter()
            .filter_map(|e| e.strip_prefix("log ").map(str::to_string))
            .collect()
    }

    pub fn log_attempts(&self) -> usize {
        self.log_attempts.load(Ordering::SeqCst)
    }

    /// Whether the token passed to `pipeline_stopped` was cancelled.
    pub fn cancelled_at_stop(&self) -> Option<bool> {
        *self.cancelled_at_stop.lock()
    }
}

#[async_trait]
impl CounterSink for RecordingSink {
    async fn pipeline_started(&self, _token: CancellationToken) -> Result<()> {
        self.started.outcome()?;
        self.timeline.lock().push("started".into());
        Ok(())
    }

    async fn pipeline_stopped(&self, token: CancellationToken) -> Result<()> {
        *self.cancelled_at_stop.lock() = Some(token.is_cancelled());
        self.stopped.outcome()?;
        self.timeline.lock().push("stopped".into());
        Ok(())
    }

    fn log(&self, sample: &CounterSample) -> Result<()> {
        self.log_attempts.fetch_add(1, Ordering::SeqCst);
        self.log.outcome()?;
        self.timeline.lock().push(format!("log {}", sample));
        Ok(())
    }
}

/// An `EventCounters` record reported at a 1 second interval.
pub fn event_counter_record(
    provider: &str,
    name: &str,
    counter_type: &str,
    value: f64,
) -> TraceRecord {
    TraceRecord::new(
        provider,
        EVENT_COUNTERS_EVENT,
        json!({
            "Payload": {
                "Name": name,
                "DisplayName": format!("{} display", name),
                "DisplayUnits": "",
                "CounterType": counter_type,
                "Mean": value,
                "Increment": value,
                "IntervalSec": 1.0,
                "Series": "Interval=1000",
                "Metadata": "",
            }
        }),
    )
    .with_timestamp(1_700_000_000_000)
}

fn instrument_record(
    event: &str,
    session: &str,
    meter: &str,
    instrument: &str,
    value_field: &str,
    value: Option<&str>,
) -> TraceRecord {
    let mut payload = json!({
        "sessionId": session,
        "meterName": meter,
        "meterVersion": "1.0",
        "instrumentName": instrument,
        "unit": "items",
        "tags": "region=eu",
    });
    if let Some(value) = value {
        payload[value_field] = json!(value);
    }
    TraceRecord::new(METRICS_PROVIDER, event, payload).with_timestamp(1_700_000_000_000)
}

pub fn gauge_record(session: &str, meter: &str, instrument: &str, last: Option<&str>) -> TraceRecord {
    instrument_record("GaugeValuePublished", session, meter, instrument, "lastValue", last)
}

pub fn rate_record(session: &str, meter: &str, instrument: &str, rate: &str) -> TraceRecord {
    instrument_record(
        "CounterRateValuePublished",
        session,
        meter,
        instrument,
        "rate",
        Some(rate),
    )
}

pub fn histogram_record(
    session: &str,
    meter: &str,
    instrument: &str,
    quantiles: &str,
) -> TraceRecord {
    instrument_record(
        "HistogramValuePublished",
        session,
        meter,
        instrument,
        "quantiles",
        Some(quantiles),
    )
}
