//! The live record source boundary.
//!
//! A [`RecordSource`] pushes raw [`TraceRecord`]s to subscribed handlers on its
//! own execution context and signals once when the stream ends. Handlers are
//! registered and removed explicitly, in the style of event subscriptions.
//!
//! [`memory::MemoryRecordSource`] is an in-process implementation used for
//! replaying captured records and for tests.

pub mod memory;

use std::sync::Arc;

use crate::record::TraceRecord;

/// Identifies a registered handler so it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub u64);

/// Called for every record, synchronously on the source's context.
///
/// Must not block for an unbounded time.
pub type RecordHandler = Arc<dyn Fn(&TraceRecord) + Send + Sync>;

/// Called when the stream has ended.
pub type CompletedHandler = Arc<dyn Fn() + Send + Sync>;

/// A subscribable stream of trace records.
pub trait RecordSource: Send + Sync {
    /// Registers a handler invoked for each incoming record.
    fn subscribe_records(&self, handler: RecordHandler) -> HandlerId;

    /// Removes a record handler. Unknown ids are ignored.
    fn unsubscribe_records(&self, id: HandlerId);

    /// Registers a handler invoked when the stream completes.
    fn subscribe_completed(&self, handler: CompletedHandler) -> HandlerId;

    /// Removes a completion handler. Unknown ids are ignored.
    fn unsubscribe_completed(&self, id: HandlerId);
}

impl<S: RecordSource + ?Sized> RecordSource for Arc<S> {
    fn subscribe_records(&self, handler: RecordHandler) -> HandlerId {
        (**self).subscribe_records(handler)
    }

    fn unsubscribe_records(&self, id: HandlerId) {
        (**self).unsubscribe_records(id)
    }

    fn subscribe_completed(&self, handler: CompletedHandler) -> HandlerId {
        (**self).subscribe_completed(handler)
    }

    fn unsubscribe_completed(&self, id: HandlerId) {
        (**self).unsubscribe_completed(id)
    }
}

/// Keeps a record handler registered for as long as it lives.
pub(crate) struct RecordSubscription<'a, S: RecordSource + ?Sized> {
    source: &'a S,
    id: HandlerId,
}

impl<'a, S: RecordSource + ?Sized> RecordSubscription<'a, S> {
    pub(crate) fn new(source: &'a S, handler: RecordHandler) -> Self {
        let id = source.subscribe_records(handler);
        Self { source, id }
    }
}

impl<S: RecordSource + ?Sized> Drop for RecordSubscription<'_, S> {
    fn drop(&mut self) {
        self.source.unsubscribe_records(self.id);
    }
}
