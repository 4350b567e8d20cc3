//! Delivery of lifecycle events and samples to every sink.
//!
//! [`SinkFanout`] calls each sink in registration order, one at a time, and
//! isolates sinks from each other:
//!
//! | Call | Disposed sink | Any other error |
//! |------|---------------|-----------------|
//! | [`log`](SinkFanout::log) (sync, hot path) | skipped | swallowed |
//! | [`notify`](SinkFanout::notify) (async, lifecycle) | skipped | returned to the caller |
//!
//! Data-log failures are dropped without logging so a misbehaving sink can
//! never slow down or stop the stream. Lifecycle failures surface because they
//! mean a sink is misconfigured.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::sample::CounterSample;
use crate::sinks::{CounterSink, SinkError};

/// A lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Started,
    Stopped,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Started => f.write_str("pipeline_started"),
            Lifecycle::Stopped => f.write_str("pipeline_stopped"),
        }
    }
}

/// An ordered, fixed collection of sinks.
#[derive(Clone, Default)]
pub struct SinkFanout {
    sinks: Vec<Arc<dyn CounterSink>>,
}

impl SinkFanout {
    /// Creates a fan-out over `sinks`, delivered in this order.
    pub fn new(sinks: Vec<Arc<dyn CounterSink>>) -> Self {
        Self { sinks }
    }

    /// Number of sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether there are no sinks.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Delivers `samples` to every sink. Never fails.
    ///
    /// Each sink receives the samples in order; a failure on one sample does
    /// not prevent delivery of the next one or to the next sink.
    pub fn log(&self, samples: &[CounterSample]) {
        for sink in &self.sinks {
            for sample in samples {
                if let Err(err) = sink.log(sample) {
                    if err.is_disposed() {
                        break;
                    }
                }
            }
        }
    }

    /// Delivers a lifecycle notification to every sink, awaiting each in turn.
    ///
    /// Disposed sinks are skipped. The first other error stops the fan-out and
    /// is returned.
    pub async fn notify(
        &self,
        event: Lifecycle,
        token: &CancellationToken,
    ) -> Result<(), SinkError> {
        for (index, sink) in self.sinks.iter().enumerate() {
            let result = match event {
                Lifecycle::Started => sink.pipeline_started(token.clone()).await,
                Lifecycle::Stopped => sink.pipeline_stopped(token.clone()).await,
            };

            match result {
                Ok(()) => {}
                Err(err) if err.is_disposed() => {
                    debug!(sink = index, %event, "skipping disposed sink");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

impl fmt::Debug for SinkFanout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkFanout")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{SampleValue, SessionId};
    use crate::testing::{Behavior, RecordingSink};

    fn sample(name: &str) -> CounterSample {
        CounterSample::new("P", name, SampleValue::Metric(1.0), SessionId::new("s"))
    }

    fn fanout(sinks: &[Arc<RecordingSink>]) -> SinkFanout {
        SinkFanout::new(
            sinks
                .iter()
                .map(|s| Arc::clone(s) as Arc<dyn CounterSink>)
                .collect(),
        )
    }

    #[test]
    fn test_log_skips_disposed_sink() {
        let s1 = Arc::new(RecordingSink::new().with_log(Behavior::Disposed));
        let s2 = Arc::new(RecordingSink::new());

        fanout(&[s1.clone(), s2.clone()]).log(&[sample("a")]);

        assert_eq!(s1.logged(), Vec::<String>::new());
        assert_eq!(s2.logged(), vec!["P/a:1"]);
    }

    #[test]
    fn test_log_swallows_other_errors() {
        let s1 = Arc::new(RecordingSink::new().with_log(Behavior::Fail));
        let s2 = Arc::new(RecordingSink::new());

        fanout(&[s1.clone(), s2.clone()]).log(&[sample("a"), sample("b")]);

        assert_eq!(s1.log_attempts(), 2);
        assert_eq!(s2.logged(), vec!["P/a:1", "P/b:1"]);
    }

    #[test]
    fn test_log_with_no_sinks() {
        let fanout = SinkFanout::default();
        assert!(fanout.is_empty());
        fanout.log(&[sample("a")]);
    }

    #[tokio::test]
    async fn test_notify_reaches_every_sink() {
        let sinks = [Arc::new(RecordingSink::new()), Arc::new(RecordingSink::new())];
        let token = CancellationToken::new();

        fanout(&sinks).notify(Lifecycle::Started, &token).await.unwrap();
        fanout(&sinks).notify(Lifecycle::Stopped, &token).await.unwrap();

        for sink in &sinks {
            assert_eq!(sink.events(), vec!["started", "stopped"]);
        }
    }

    #[tokio::test]
    async fn test_notify_skips_disposed_sink() {
        let s1 = Arc::new(RecordingSink::new().with_started(Behavior::Disposed));
        let s2 = Arc::new(RecordingSink::new());

        fanout(&[s1.clone(), s2.clone()])
            .notify(Lifecycle::Started, &CancellationToken::new())
            .await
            .unwrap();

        assert!(s1.events().is_empty());
        assert_eq!(s2.events(), vec!["started"]);
    }

    #[tokio::test]
    async fn test_notify_propagates_other_errors() {
        let s1 = Arc::new(RecordingSink::new().with_started(Behavior::Fail));
        let s2 = Arc::new(RecordingSink::new());

        let result = fanout(&[s1.clone(), s2.clone()])
            .notify(Lifecycle::Started, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(SinkError::Other(_))));
        assert!(s2.events().is_empty());
    }
}
