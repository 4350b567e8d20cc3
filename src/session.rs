//! Trace session configuration.
//!
//! Before records can flow, the collaborator that talks to the target process
//! needs to know which providers to enable and with which arguments. This module
//! derives that from the pipeline's filter:
//!
//! - every registered provider is enabled with `EventCounterIntervalSec`,
//! - the [`METRICS_PROVIDER`] is enabled with a fresh session id, the comma-joined
//!   provider list as meter names, the refresh interval and the tracking limits.
//!
//! The resulting [`MetricSourceConfiguration`] carries the [`SessionId`] that the
//! extractor later uses to recognize this session's instrument events.
//!
//! Opening the session itself is the job of a [`SessionTransport`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::extract::METRICS_PROVIDER;
use crate::filter::ProviderSubscription;
use crate::sample::SessionId;
use crate::source::RecordSource;

/// Provider enabled when the filter registers none (wildcard filters).
pub const DEFAULT_PROVIDER: &str = "System.Runtime";

/// Keyword enabling time-series value events on the metrics provider.
const TIME_SERIES_VALUES_KEYWORD: u64 = 0x2;

/// Event verbosity requested from a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventLevel {
    Critical,
    Error,
    Warning,
    #[default]
    Informational,
    Verbose,
}

/// A provider to enable in the trace session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventProvider {
    pub name: String,
    pub level: EventLevel,
    pub keywords: u64,
    pub arguments: BTreeMap<String, String>,
}

/// Resource limits for the in-process metrics aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLimits {
    pub max_histograms: u32,
    pub max_time_series: u32,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_histograms: 10,
            max_time_series: 1000,
        }
    }
}

/// Everything the transport needs to start a counter session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSourceConfiguration {
    session_id: SessionId,
    interval_seconds: f64,
    providers: Vec<EventProvider>,
}

impl MetricSourceConfiguration {
    /// Builds a configuration with a freshly generated session id.
    pub fn new(
        interval_seconds: f64,
        subscriptions: &[ProviderSubscription],
        limits: SessionLimits,
    ) -> Self {
        Self::with_session_id(SessionId::generate(), interval_seconds, subscriptions, limits)
    }

    /// Builds a configuration for a known session id.
    pub fn with_session_id(
        session_id: SessionId,
        interval_seconds: f64,
        subscriptions: &[ProviderSubscription],
        limits: SessionLimits,
    ) -> Self {
        let names: Vec<&str> = if subscriptions.is_empty() {
            vec![DEFAULT_PROVIDER]
        } else {
            subscriptions
                .iter()
                .map(|s| s.provider_name.as_str())
                .collect()
        };

        let mut providers: Vec<EventProvider> = names
            .iter()
            .map(|name| EventProvider {
                name: name.to_string(),
                level: EventLevel::Informational,
                keywords: 0,
                arguments: BTreeMap::from([(
                    "EventCounterIntervalSec".to_string(),
                    interval_seconds.to_string(),
                )]),
            })
            .collect();

        providers.push(EventProvider {
            name: METRICS_PROVIDER.to_string(),
            level: EventLevel::Informational,
            keywords: TIME_SERIES_VALUES_KEYWORD,
            arguments: BTreeMap::from([
                ("SessionId".to_string(), session_id.to_string()),
                ("Metrics".to_string(), names.join(",")),
                ("RefreshInterval".to_string(), interval_seconds.to_string()),
                ("MaxTimeSeries".to_string(), limits.max_time_series.to_string()),
                ("MaxHistograms".to_string(), limits.max_histograms.to_string()),
            ]),
        });

        Self {
            session_id,
            interval_seconds,
            providers,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn interval_seconds(&self) -> f64 {
        self.interval_seconds
    }

    pub fn providers(&self) -> &[EventProvider] {
        &self.providers
    }

    /// Finds an enabled provider by name.
    pub fn provider(&self, name: &str) -> Option<&EventProvider> {
        self.providers.iter().find(|p| p.name == name)
    }
}

/// Creates session configurations. Swappable so callers can pin session ids
/// or add providers.
pub trait ConfigurationFactory: Send + Sync {
    fn create(
        &self,
        interval_seconds: f64,
        subscriptions: &[ProviderSubscription],
        limits: SessionLimits,
    ) -> MetricSourceConfiguration;
}

/// The default factory: random session ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricSourceFactory;

impl ConfigurationFactory for MetricSourceFactory {
    fn create(
        &self,
        interval_seconds: f64,
        subscriptions: &[ProviderSubscription],
        limits: SessionLimits,
    ) -> MetricSourceConfiguration {
        MetricSourceConfiguration::new(interval_seconds, subscriptions, limits)
    }
}

/// Opens a trace session on the target process.
///
/// Implementations connect to the process, start the session described by the
/// configuration and return its live record stream. Failures are reported once;
/// the pipeline does not retry.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    type Source: RecordSource;

    async fn open(
        &self,
        configuration: &MetricSourceConfiguration,
    ) -> Result<Self::Source, PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::CounterFilter;

    fn subscriptions() -> Vec<ProviderSubscription> {
        let mut filter = CounterFilter::new(2.0);
        filter.add_filter("System.Runtime", ["cpu-usage"]);
        filter.add_filter("MyMeter", Vec::<String>::new());
        filter.providers()
    }

    #[test]
    fn test_providers_and_metrics_provider() {
        let config = MetricSourceConfiguration::with_session_id(
            SessionId::new("abc"),
            2.0,
            &subscriptions(),
            SessionLimits::default(),
        );

        let names: Vec<&str> = config.providers().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["System.Runtime", "MyMeter", METRICS_PROVIDER]);

        let runtime = config.provider("System.Runtime").unwrap();
        assert_eq!(runtime.arguments["EventCounterIntervalSec"], "2");
        assert_eq!(runtime.keywords, 0);

        let metrics = config.provider(METRICS_PROVIDER).unwrap();
        assert_eq!(metrics.keywords, 0x2);
        assert_eq!(metrics.arguments["SessionId"], "abc");
        assert_eq!(metrics.arguments["Metrics"], "System.Runtime,MyMeter");
        assert_eq!(metrics.arguments["RefreshInterval"], "2");
        assert_eq!(metrics.arguments["MaxTimeSeries"], "1000");
        assert_eq!(metrics.arguments["MaxHistograms"], "10");
    }

    #[test]
    fn test_wildcard_falls_back_to_default_provider() {
        let config = MetricSourceConfiguration::new(1.0, &[], SessionLimits::default());

        assert!(config.provider(DEFAULT_PROVIDER).is_some());
        assert_eq!(
            config.provider(METRICS_PROVIDER).unwrap().arguments["Metrics"],
            DEFAULT_PROVIDER
        );
    }

    #[test]
    fn test_session_ids_are_fresh() {
        let a = MetricSourceFactory.create(1.0, &[], SessionLimits::default());
        let b = MetricSourceFactory.create(1.0, &[], SessionLimits::default());
        assert_ne!(a.session_id(), b.session_id());
        assert_eq!(
            a.provider(METRICS_PROVIDER).unwrap().arguments["SessionId"],
            a.session_id().as_str()
        );
    }

    #[test]
    fn test_fractional_interval_argument() {
        let config = MetricSourceConfiguration::new(0.5, &subscriptions(), SessionLimits {
            max_histograms: 3,
            max_time_series: 7,
        });
        let metrics = config.provider(METRICS_PROVIDER).unwrap();
        assert_eq!(metrics.arguments["RefreshInterval"], "0.5");
        assert_eq!(metrics.arguments["MaxHistograms"], "3");
        assert_eq!(metrics.arguments["MaxTimeSeries"], "7");
    }
}
