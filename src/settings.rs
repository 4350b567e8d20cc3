//! Pipeline settings.
//!
//! [`CounterPipelineSettings`] can be built in code with the `with_*` methods or
//! deserialized from any serde format. Missing fields take their defaults.
//!
//! ```rust
//! use flussi::settings::CounterPipelineSettings;
//!
//! let settings: CounterPipelineSettings = serde_json::from_str(r#"{
//!     "counter_interval_seconds": 5,
//!     "counter_groups": [
//!         { "provider_name": "System.Runtime", "counter_names": ["cpu-usage"] }
//!     ]
//! }"#).unwrap();
//!
//! assert_eq!(settings.counter_interval_seconds, 5.0);
//! assert_eq!(settings.max_time_series, 1000);
//! assert!(settings.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::filter::CounterFilter;
use crate::session::SessionLimits;

/// Counters to collect from one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CounterGroup {
    pub provider_name: String,
    /// Empty selects every counter of the provider.
    #[serde(default)]
    pub counter_names: Vec<String>,
}

impl CounterGroup {
    pub fn new<I, S>(provider_name: impl Into<String>, counter_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            provider_name: provider_name.into(),
            counter_names: counter_names.into_iter().map(Into::into).collect(),
        }
    }
}

/// Configuration of a [`CounterPipeline`](crate::pipeline::CounterPipeline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterPipelineSettings {
    /// Sampling interval in seconds. Must be positive.
    pub counter_interval_seconds: f64,
    /// Providers and counters to collect. Empty collects everything.
    pub counter_groups: Vec<CounterGroup>,
    /// Maximum number of histograms tracked by the metrics provider.
    pub max_histograms: u32,
    /// Maximum number of time series tracked by the metrics provider.
    pub max_time_series: u32,
}

impl Default for CounterPipelineSettings {
    fn default() -> Self {
        let limits = SessionLimits::default();
        Self {
            counter_interval_seconds: 1.0,
            counter_groups: Vec::new(),
            max_histograms: limits.max_histograms,
            max_time_series: limits.max_time_series,
        }
    }
}

impl CounterPipelineSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval(mut self, seconds: f64) -> Self {
        self.counter_interval_seconds = seconds;
        self
    }

    /// Adds a counter group. An empty `counter_names` selects the whole provider.
    pub fn with_counters<I, S>(mut self, provider_name: impl Into<String>, counter_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.counter_groups
            .push(CounterGroup::new(provider_name, counter_names));
        self
    }

    pub fn with_max_histograms(mut self, max: u32) -> Self {
        self.max_histograms = max;
        self
    }

    pub fn with_max_time_series(mut self, max: u32) -> Self {
        self.max_time_series = max;
        self
    }

    /// Checks that the interval is a positive finite number.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let interval = self.counter_interval_seconds;
        if interval.is_finite() && interval > 0.0 {
            Ok(())
        } else {
            Err(PipelineError::InvalidInterval(interval))
        }
    }

    /// Builds the counter filter: explicit groups, or every counter if none.
    pub fn filter(&self) -> CounterFilter {
        if self.counter_groups.is_empty() {
            return CounterFilter::all_counters(self.counter_interval_seconds);
        }

        let mut filter = CounterFilter::new(self.counter_interval_seconds);
        for group in &self.counter_groups {
            filter.add_filter(group.provider_name.as_str(), group.counter_names.iter().cloned());
        }
        filter
    }

    pub fn limits(&self) -> SessionLimits {
        SessionLimits {
            max_histograms: self.max_histograms,
            max_time_series: self.max_time_series,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = CounterPipelineSettings::default();
        assert_eq!(settings.counter_interval_seconds, 1.0);
        assert_eq!(settings.max_histograms, 10);
        assert_eq!(settings.max_time_series, 1000);
        assert!(settings.counter_groups.is_empty());
    }

    #[test]
    fn test_validate_interval() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let settings = CounterPipelineSettings::new().with_interval(bad);
            assert!(matches!(
                settings.validate(),
                Err(PipelineError::InvalidInterval(_))
            ));
        }
        assert!(CounterPipelineSettings::new().with_interval(0.25).validate().is_ok());
    }

    #[test]
    fn test_no_groups_builds_wildcard_filter() {
        let filter = CounterPipelineSettings::new().filter();
        assert!(filter.is_wildcard());
        assert!(filter.is_included("any", "counter"));
    }

    #[test]
    fn test_groups_build_explicit_filter() {
        let filter = CounterPipelineSettings::new()
            .with_interval(2.0)
            .with_counters("MyProvider", ["cpu-usage"])
            .with_counters("Other", Vec::<String>::new())
            .filter();

        assert!(!filter.is_wildcard());
        assert_eq!(filter.interval_seconds(), 2.0);
        assert!(filter.is_included("MyProvider", "cpu-usage"));
        assert!(!filter.is_included("MyProvider", "other-counter"));
        assert!(filter.is_included("Other", "x"));
        assert_eq!(filter.providers().len(), 2);
    }

    #[test]
    fn test_deserialize_partial() {
        let settings: CounterPipelineSettings =
            serde_json::from_str(r#"{"max_histograms": 3, "counter_groups": [{"provider_name": "P"}]}"#)
                .unwrap();

        assert_eq!(settings.counter_interval_seconds, 1.0);
        assert_eq!(settings.max_histograms, 3);
        assert_eq!(settings.counter_groups, vec![CounterGroup::new("P", Vec::<String>::new())]);
        assert_eq!(settings.limits().max_histograms, 3);
    }
}
