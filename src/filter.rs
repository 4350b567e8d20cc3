//! Provider/counter allow-list.
//!
//! A [`CounterFilter`] decides which counters a pipeline collects and at which
//! sampling interval. It is built once, before the session starts, and is
//! shared read-only with the record handler afterwards.
//!
//! There are two ways to build one:
//!
//! - [`CounterFilter::new`] followed by [`CounterFilter::add_filter`] calls,
//!   which restricts collection to the registered providers.
//! - [`CounterFilter::all_counters`], which accepts every provider and every
//!   counter (wildcard mode).
//!
//! # Examples
//!
//! ```rust
//! use flussi::filter::CounterFilter;
//!
//! let mut filter = CounterFilter::new(1.0);
//! filter.add_filter("System.Runtime", ["cpu-usage", "working-set"]);
//! filter.add_filter("Microsoft.AspNetCore.Hosting", Vec::<String>::new());
//!
//! assert!(filter.is_included("System.Runtime", "cpu-usage"));
//! assert!(!filter.is_included("System.Runtime", "gc-heap-size"));
//! assert!(filter.is_included("Microsoft.AspNetCore.Hosting", "requests-per-second"));
//! assert!(!filter.is_included("Other", "cpu-usage"));
//! ```

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// A provider enabled for a session, paired with its sampling interval.
///
/// Produced by [`CounterFilter::providers`] and consumed by the session
/// configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSubscription {
    /// The provider name.
    pub provider_name: String,
    /// Sampling interval in seconds.
    pub interval_seconds: f64,
}

/// Counter restriction for a single provider.
///
/// `None` means every counter of the provider is selected.
type CounterSet = Option<HashSet<String>>;

/// The set of providers and counters a pipeline collects.
#[derive(Debug, Clone)]
pub struct CounterFilter {
    interval_seconds: f64,
    /// `None` selects everything (wildcard mode).
    rules: Option<Rules>,
}

#[derive(Debug, Clone, Default)]
struct Rules {
    /// Registration order of providers.
    order: Vec<String>,
    counters: HashMap<String, CounterSet>,
}

impl CounterFilter {
    /// Creates an empty filter with the given sampling interval.
    ///
    /// An empty filter selects nothing until rules are added with
    /// [`add_filter`](Self::add_filter). Use [`all_counters`](Self::all_counters)
    /// to select everything.
    pub fn new(interval_seconds: f64) -> Self {
        Self {
            interval_seconds,
            rules: Some(Rules::default()),
        }
    }

    /// Creates a wildcard filter that accepts every provider and counter.
    pub fn all_counters(interval_seconds: f64) -> Self {
        Self {
            interval_seconds,
            rules: None,
        }
    }

    /// Restricts collection for `provider_name` to `counter_names`.
    ///
    /// An empty `counter_names` selects every counter of the provider.
    /// Registering the same provider twice replaces the previous rule.
    /// Has no effect on a wildcard filter.
    pub fn add_filter<I, S>(&mut self, provider_name: impl Into<String>, counter_names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let Some(rules) = self.rules.as_mut() else {
            return;
        };

        let provider_name = provider_name.into();
        let counters: HashSet<String> = counter_names.into_iter().map(Into::into).collect();
        let counters = if counters.is_empty() {
            None
        } else {
            Some(counters)
        };

        if rules
            .counters
            .insert(provider_name.clone(), counters)
            .is_none()
        {
            rules.order.push(provider_name);
        }
    }

    /// Returns the sampling interval in seconds.
    pub fn interval_seconds(&self) -> f64 {
        self.interval_seconds
    }

    /// Returns the sampling interval in whole milliseconds.
    pub fn interval_ms(&self) -> i64 {
        (self.interval_seconds * 1000.0).round() as i64
    }

    /// Returns `true` if this filter accepts every provider and counter.
    pub fn is_wildcard(&self) -> bool {
        self.rules.is_none()
    }

    /// Returns the distinct registered providers, in registration order,
    /// each paired with the sampling interval.
    ///
    /// A wildcard filter has no registered providers and returns an empty list.
    pub fn providers(&self) -> Vec<ProviderSubscription> {
        self.rules
            .iter()
            .flat_map(|rules| rules.order.iter())
            .map(|name| ProviderSubscription {
                provider_name: name.clone(),
                interval_seconds: self.interval_seconds,
            })
            .collect()
    }

    /// Returns `true` if `counter` of `provider` is selected.
    ///
    /// Matching is exact and case-sensitive.
    pub fn is_included(&self, provider: &str, counter: &str) -> bool {
        let Some(rules) = &self.rules else {
            return true;
        };

        match rules.counters.get(provider) {
            None => false,
            Some(None) => true,
            Some(Some(counters)) => counters.contains(counter),
        }
    }

    /// Like [`is_included`](Self::is_included), but also requires the record's
    /// reporting interval to match the filter's interval.
    ///
    /// Concurrent sessions on the same provider share one reporting stream,
    /// reported at the lowest requested interval; records at other intervals
    /// belong to someone else.
    pub fn is_included_at(&self, provider: &str, counter: &str, interval_ms: i64) -> bool {
        interval_ms == self.interval_ms() && self.is_included(provider, counter)
    }
}
