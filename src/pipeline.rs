//! The counter pipeline.
//!
//! [`CounterPipeline`] ties the pieces together:
//!
//! ```text
//!  settings ──► CounterFilter ──► MetricSourceConfiguration ──► SessionTransport::open
//!                    │                      │ SessionId                │
//!                    ▼                      ▼                          ▼
//!   record ──► extract_samples(record, filter, session) ──► SinkFanout::log ──► sinks
//!                                                                      ▲
//!   CompletionBridge (completed | cancelled) ──► pipeline_stopped ─────┘
//! ```
//!
//! # Lifecycle
//!
//! `Created → Started → Streaming → Stopping → Stopped`
//!
//! - `Started`: the session is open and `pipeline_started` is being delivered.
//! - `Streaming`: the record handler is registered and samples flow.
//! - `Stopping`: the stream ended or the token was cancelled; records are no
//!   longer forwarded and `pipeline_stopped` is being delivered.
//! - `Stopped`: terminal.
//!
//! `pipeline_started` reaches every sink before the first sample, and
//! `pipeline_stopped` is delivered on both the completion and the cancellation
//! path.

use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bridge::{CompletionBridge, StreamEnd};
use crate::error::{PipelineError, Result};
use crate::extract::extract_samples;
use crate::fanout::{Lifecycle, SinkFanout};
use crate::filter::CounterFilter;
use crate::record::TraceRecord;
use crate::sample::SessionId;
use crate::session::{
    ConfigurationFactory, MetricSourceConfiguration, MetricSourceFactory, SessionTransport,
};
use crate::settings::CounterPipelineSettings;
use crate::sinks::CounterSink;
use crate::source::{RecordHandler, RecordSource, RecordSubscription};

/// Where a pipeline is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Created,
    Started,
    Streaming,
    Stopping,
    Stopped,
}

/// State shared with the record handler, which runs on the source's context.
///
/// The handler holds the read lock from the `Streaming` check until its samples
/// are delivered, so a transition out of `Streaming` waits for in-flight
/// deliveries to finish.
#[derive(Debug)]
struct StateCell(RwLock<PipelineState>);

impl StateCell {
    fn new() -> Self {
        Self(RwLock::new(PipelineState::Created))
    }

    fn load(&self) -> PipelineState {
        *self.0.read()
    }

    fn store(&self, state: PipelineState) {
        *self.0.write() = state;
    }

    fn read(&self) -> RwLockReadGuard<'_, PipelineState> {
        self.0.read()
    }
}

/// Streams filtered counter samples from a trace session to a set of sinks.
///
/// # Example
///
/// ```rust,ignore
/// use flussi::pipeline::CounterPipeline;
/// use flussi::settings::CounterPipelineSettings;
/// use tokio_util::sync::CancellationToken;
///
/// let settings = CounterPipelineSettings::new()
///     .with_interval(1.0)
///     .with_counters("System.Runtime", ["cpu-usage", "working-set"]);
///
/// let mut pipeline = CounterPipeline::new(settings, vec![Arc::new(my_sink)])?;
/// pipeline.start(&transport, CancellationToken::new()).await?;
/// ```
pub struct CounterPipeline {
    settings: CounterPipelineSettings,
    filter: Arc<CounterFilter>,
    sinks: Arc<SinkFanout>,
    factory: Box<dyn ConfigurationFactory>,
    state: Arc<StateCell>,
    session_id: Option<SessionId>,
}

impl CounterPipeline {
    /// Creates a pipeline. An empty sink list is valid and makes a no-op pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidInterval`] if the sampling interval is
    /// not a positive number.
    pub fn new(
        settings: CounterPipelineSettings,
        sinks: Vec<Arc<dyn CounterSink>>,
    ) -> Result<Self> {
        settings.validate()?;

        Ok(Self {
            filter: Arc::new(settings.filter()),
            sinks: Arc::new(SinkFanout::new(sinks)),
            factory: Box::new(MetricSourceFactory),
            state: Arc::new(StateCell::new()),
            session_id: None,
            settings,
        })
    }

    /// Replaces the factory used to build the session configuration.
    pub fn with_configuration_factory(
        mut self,
        factory: impl ConfigurationFactory + 'static,
    ) -> Self {
        self.factory = Box::new(factory);
        self
    }

    /// The settings the pipeline was created with.
    pub fn settings(&self) -> &CounterPipelineSettings {
        &self.settings
    }

    /// The counter filter derived from the settings.
    pub fn filter(&self) -> &CounterFilter {
        &self.filter
    }

    /// The current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.state.load()
    }

    /// The session id, once the configuration has been created.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Opens the session and streams until it completes or `token` is cancelled.
    ///
    /// Returns `Ok(())` on both completion and cancellation; sinks receive
    /// `pipeline_stopped` in either case.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::AlreadyStarted`] if called more than once.
    /// - Any error from [`SessionTransport::open`], unretried.
    /// - [`PipelineError::Sink`] if a sink fails a lifecycle notification for a
    ///   reason other than being disposed.
    pub async fn start<T>(&mut self, transport: &T, token: CancellationToken) -> Result<()>
    where
        T: SessionTransport,
    {
        if self.state() != PipelineState::Created {
            return Err(PipelineError::AlreadyStarted);
        }

        let configuration = self.create_configuration();
        info!(
            session = %configuration.session_id(),
            interval = configuration.interval_seconds(),
            providers = ?self.filter.providers().iter().map(|p| &p.provider_name).collect::<Vec<_>>(),
            sinks = self.sinks.len(),
            "starting counter pipeline"
        );

        let source = match transport.open(&configuration).await {
            Ok(source) => source,
            Err(err) => {
                self.state.store(PipelineState::Stopped);
                return Err(err);
            }
        };

        self.run(&source, configuration.session_id().clone(), token)
            .await
    }

    fn create_configuration(&mut self) -> MetricSourceConfiguration {
        let configuration = self.factory.create(
            self.filter.interval_seconds(),
            &self.filter.providers(),
            self.settings.limits(),
        );
        self.session_id = Some(configuration.session_id().clone());
        configuration
    }

    async fn run<S>(&self, source: &S, session_id: SessionId, token: CancellationToken) -> Result<()>
    where
        S: RecordSource + ?Sized,
    {
        self.state.store(PipelineState::Started);
        if let Err(err) = self.sinks.notify(Lifecycle::Started, &token).await {
            self.state.store(PipelineState::Stopped);
            return Err(err.into());
        }

        let completion = CompletionBridge::new(source, token.clone());
        self.state.store(PipelineState::Streaming);
        let records = RecordSubscription::new(source, self.record_handler(session_id));
        debug!("streaming records");

        let end = completion.wait().await;

        // Waits for a handler that is still delivering.
        self.state.store(PipelineState::Stopping);
        drop(records);
        match end {
            StreamEnd::Completed => info!("record stream completed"),
            StreamEnd::Cancelled => info!("counter pipeline cancelled"),
        }

        let stopped = self.sinks.notify(Lifecycle::Stopped, &token).await;
        self.state.store(PipelineState::Stopped);
        stopped.map_err(PipelineError::from)
    }

    fn record_handler(&self, session_id: SessionId) -> RecordHandler {
        let filter = Arc::clone(&self.filter);
        let sinks = Arc::clone(&self.sinks);
        let state = Arc::clone(&self.state);

        Arc::new(move |record: &TraceRecord| {
            let current = state.read();
            if *current != PipelineState::Streaming {
                return;
            }
            let samples = extract_samples(record, &filter, &session_id);
            if !samples.is_empty() {
                sinks.log(&samples);
            }
            drop(current);
        })
    }
}

impl fmt::Debug for CounterPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CounterPipeline")
            .field("settings", &self.settings)
            .field("sinks", &self.sinks)
            .field("state", &self.state())
            .field("session_id", &self.session_id)
            .finish()
    }
}
