//! Raw trace records as delivered by the live record source.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An undecoded trace event.
///
/// Records are produced by the session transport and may or may not describe a
/// counter; the extractor decides. The payload is kept as dynamic JSON so the
/// pipeline does not depend on the transport's wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Name of the provider that emitted the event.
    pub provider_name: String,
    /// Event name, e.g. `EventCounters` or `GaugeValuePublished`.
    pub event_name: String,
    /// Event timestamp in milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp_ms: u64,
    /// Event payload fields.
    #[serde(default)]
    pub payload: Value,
}

impl TraceRecord {
    pub fn new(
        provider_name: impl Into<String>,
        event_name: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            provider_name: provider_name.into(),
            event_name: event_name.into(),
            timestamp_ms: 0,
            payload,
        }
    }

    pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }
}
