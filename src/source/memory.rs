//! In-process record source.
//!
//! [`MemoryRecordSource`] delivers records pushed from any thread to its
//! subscribers, in push order, on the pushing thread. It doubles as a
//! [`SessionTransport`] that hands itself out as the live source and remembers
//! the last configuration it was opened with.
//!
//! # Example
//!
//! ```rust,ignore
//! use flussi::source::memory::MemoryRecordSource;
//!
//! let source = MemoryRecordSource::new();
//! let pipeline_source = source.clone();
//!
//! tokio::spawn(async move { pipeline.start(&pipeline_source, token).await });
//!
//! source.wait_for_record_handler().await;
//! for record in records {
//!     source.push(&record);
//! }
//! source.complete();
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{CompletedHandler, HandlerId, RecordHandler, RecordSource};
use crate::error::PipelineError;
use crate::record::TraceRecord;
use crate::session::{MetricSourceConfiguration, SessionTransport};

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    completed: AtomicBool,
    record_handlers: Mutex<Vec<(HandlerId, RecordHandler)>>,
    completed_handlers: Mutex<Vec<(HandlerId, CompletedHandler)>>,
    configuration: Mutex<Option<MetricSourceConfiguration>>,
    subscribed: Notify,
}

/// A cloneable, thread-safe in-memory [`RecordSource`].
#[derive(Clone, Default)]
pub struct MemoryRecordSource {
    inner: Arc<Inner>,
}

impl MemoryRecordSource {
    /// Creates an open source with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `record` to every record handler.
    ///
    /// Records pushed after [`complete`](Self::complete) are discarded.
    pub fn push(&self, record: &TraceRecord) {
        if self.is_completed() {
            return;
        }
        // Snapshot so handlers may (un)subscribe while being called.
        let handlers: Vec<RecordHandler> = self
            .inner
            .record_handlers
            .lock()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler(record);
        }
    }

    /// Ends the stream and fires the completion handlers. Idempotent.
    pub fn complete(&self) {
        if self.inner.completed.swap(true, Ordering::AcqRel) {
            return;
        }
        let handlers: Vec<CompletedHandler> = self
            .inner
            .completed_handlers
            .lock()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler();
        }
    }

    /// Whether [`complete`](Self::complete) has been called.
    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::Acquire)
    }

    /// Number of registered record handlers.
    pub fn record_handler_count(&self) -> usize {
        self.inner.record_handlers.lock().len()
    }

    /// Number of registered completion handlers.
    pub fn completed_handler_count(&self) -> usize {
        self.inner.completed_handlers.lock().len()
    }

    /// The configuration passed to the last [`SessionTransport::open`] call.
    pub fn configuration(&self) -> Option<MetricSourceConfiguration> {
        self.inner.configuration.lock().clone()
    }

    /// Waits until at least one record handler is registered.
    pub async fn wait_for_record_handler(&self) {
        loop {
            let subscribed = self.inner.subscribed.notified();
            if self.record_handler_count() > 0 {
                return;
            }
            subscribed.await;
        }
    }

    fn next_id(&self) -> HandlerId {
        HandlerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl RecordSource for MemoryRecordSource {
    /// Appends `handler`; it receives records pushed from now on.
    fn subscribe_records(&self, handler: RecordHandler) -> HandlerId {
        let id = self.next_id();
        self.inner.record_handlers.lock().push((id, handler));
        self.inner.subscribed.notify_waiters();
        id
    }

    /// Removes the handler. Unknown ids are ignored.
    fn unsubscribe_records(&self, id: HandlerId) {
        self.inner.record_handlers.lock().retain(|(h, _)| *h != id);
    }

    /// A stream that already ended fires the handler immediately.
    fn subscribe_completed(&self, handler: CompletedHandler) -> HandlerId {
        let id = self.next_id();
        self.inner
            .completed_handlers
            .lock()
            .push((id, Arc::clone(&handler)));
        if self.is_completed() {
            handler();
        }
        id
    }

    /// Removes the handler. Unknown ids are ignored.
    fn unsubscribe_completed(&self, id: HandlerId) {
        self.inner.completed_handlers.lock().retain(|(h, _)| *h != id);
    }
}

#[async_trait]
impl SessionTransport for MemoryRecordSource {
    type Source = MemoryRecordSource;

    /// Records the configuration and returns this source.
    async fn open(
        &self,
        configuration: &MetricSourceConfiguration,
    ) -> Result<Self::Source, PipelineError> {
        *self.inner.configuration.lock() = Some(configuration.clone());
        Ok(self.clone())
    }
}
