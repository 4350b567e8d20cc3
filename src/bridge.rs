//! One-shot bridge from a "stream completed" subscription to an awaitable.
//!
//! The record source announces the end of the stream through a handler it calls
//! at most once, from its own context. [`CompletionBridge`] turns that into a
//! future that also resolves when a [`CancellationToken`] fires, whichever comes
//! first.
//!
//! # Resolution
//!
//! Both paths race for a single shared cell holding the sender half of a
//! oneshot channel. Whoever takes it decides the outcome; the other path finds
//! the cell empty and does nothing. The completion handler checks the token
//! before resolving, so a cancellation requested before the stream ended is
//! reported as [`StreamEnd::Cancelled`] even if the handler runs first.
//!
//! # Registration
//!
//! The handler is registered in [`CompletionBridge::new`] and removed exactly
//! once, either when [`wait`](CompletionBridge::wait) returns or when the bridge
//! is dropped without being awaited.
//!
//! ```text
//!   source ──completed──►  ┌──────────────┐
//!                          │ Option<Sender>│ ──► Receiver ──► wait() ──► StreamEnd
//!   token  ──cancelled──►  └──────────────┘
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::source::{CompletedHandler, HandlerId, RecordSource};

/// How the stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The source reported the end of the stream.
    Completed,
    /// The cancellation token fired first.
    Cancelled,
}

/// Single-resolution cell shared by the completion handler and the waiter.
#[derive(Clone)]
struct Resolver {
    slot: Arc<Mutex<Option<oneshot::Sender<StreamEnd>>>>,
}

impl Resolver {
    /// Resolves with `outcome` if nobody did before. Returns whether it won.
    fn resolve(&self, outcome: StreamEnd) -> bool {
        match self.slot.lock().take() {
            Some(sender) => {
                let _ = sender.send(outcome);
                true
            }
            None => false,
        }
    }
}

/// Awaitable completion of a [`RecordSource`] stream.
pub struct CompletionBridge<'a, S: RecordSource + ?Sized> {
    source: &'a S,
    registration: Option<HandlerId>,
    resolver: Resolver,
    receiver: oneshot::Receiver<StreamEnd>,
    token: CancellationToken,
}

impl<'a, S: RecordSource + ?Sized> CompletionBridge<'a, S> {
    /// Subscribes to the source's completion and watches `token`.
    pub fn new(source: &'a S, token: CancellationToken) -> Self {
        let (sender, receiver) = oneshot::channel();
        let resolver = Resolver {
            slot: Arc::new(Mutex::new(Some(sender))),
        };

        let handler: CompletedHandler = {
            let resolver = resolver.clone();
            let token = token.clone();
            Arc::new(move || {
                let outcome = if token.is_cancelled() {
                    StreamEnd::Cancelled
                } else {
                    StreamEnd::Completed
                };
                resolver.resolve(outcome);
            })
        };

        let registration = Some(source.subscribe_completed(handler));

        Self {
            source,
            registration,
            resolver,
            receiver,
            token,
        }
    }

    /// Waits for the stream to complete or the token to be cancelled.
    pub async fn wait(mut self) -> StreamEnd {
        let outcome = tokio::select! {
            biased;
            received = &mut self.receiver => received.unwrap_or(StreamEnd::Completed),
            _ = self.token.cancelled() => {
                if self.resolver.resolve(StreamEnd::Cancelled) {
                    StreamEnd::Cancelled
                } else {
                    // The completion handler won the race; its value is in flight.
                    (&mut self.receiver).await.unwrap_or(StreamEnd::Completed)
                }
            }
        };
        self.release();
        outcome
    }

    fn release(&mut self) {
        if let Some(id) = self.registration.take() {
            self.source.unsubscribe_completed(id);
        }
    }
}

impl<S: RecordSource + ?Sized> Drop for CompletionBridge<'_, S> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TraceRecord;
    use crate::source::RecordHandler;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    /// A source with a single completion slot that counts (un)registrations.
    #[derive(Default)]
    struct CountingSource {
        next_id: AtomicU64,
        handler: Mutex<Option<(HandlerId, CompletedHandler)>>,
        subscribes: AtomicUsize,
        unsubscribes: AtomicUsize,
    }

    impl CountingSource {
        fn fire(&self) {
            let handler = self.handler.lock().as_ref().map(|(_, h)| Arc::clone(h));
            if let Some(handler) = handler {
                handler();
            }
        }

        fn registered(&self) -> bool {
            self.handler.lock().is_some()
        }
    }

    impl RecordSource for CountingSource {
        fn subscribe_records(&self, _handler: RecordHandler) -> HandlerId {
            HandlerId(u64::MAX)
        }

        fn unsubscribe_records(&self, _id: HandlerId) {}

        fn subscribe_completed(&self, handler: CompletedHandler) -> HandlerId {
            let id = HandlerId(self.next_id.fetch_add(1, Ordering::SeqCst));
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            *self.handler.lock() = Some((id, handler));
            id
        }

        fn unsubscribe_completed(&self, id: HandlerId) {
            self.unsubscribes.fetch_add(1, Ordering::SeqCst);
            let mut handler = self.handler.lock();
            if handler.as_ref().is_some_and(|(h, _)| *h == id) {
                *handler = None;
            }
        }
    }

    fn assert_released_once(source: &CountingSource) {
        assert_eq!(source.subscribes.load(Ordering::SeqCst), 1);
        assert_eq!(source.unsubscribes.load(Ordering::SeqCst), 1);
        assert!(!source.registered());
    }

    #[tokio::test]
    async fn test_completion_before_cancellation() {
        let source = CountingSource::default();
        let token = CancellationToken::new();
        let bridge = CompletionBridge::new(&source, token.clone());

        source.fire();
        token.cancel();

        assert_eq!(bridge.wait().await, StreamEnd::Completed);
        assert_released_once(&source);
    }

    #[tokio::test]
    async fn test_cancellation_before_completion() {
        let source = CountingSource::default();
        let token = CancellationToken::new();
        let bridge = CompletionBridge::new(&source, token.clone());

        token.cancel();
        source.fire();

        assert_eq!(bridge.wait().await, StreamEnd::Cancelled);
        assert_released_once(&source);
    }

    #[tokio::test]
    async fn test_cancellation_while_waiting() {
        let source = CountingSource::default();
        let token = CancellationToken::new();
        let bridge = CompletionBridge::new(&source, token.clone());

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                token.cancel();
            })
        };

        assert_eq!(bridge.wait().await, StreamEnd::Cancelled);
        canceller.await.unwrap();
        assert_released_once(&source);

        // A late completion is a no-op.
        source.fire();
    }

    #[tokio::test]
    async fn test_completion_while_waiting() {
        let source = Arc::new(CountingSource::default());
        let bridge = CompletionBridge::new(&*source, CancellationToken::new());

        let firer = {
            let source = Arc::clone(&source);
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                source.fire();
            })
        };

        assert_eq!(bridge.wait().await, StreamEnd::Completed);
        firer.await.unwrap();
        assert_released_once(&source);
    }

    #[tokio::test]
    async fn test_double_fire_resolves_once() {
        let source = CountingSource::default();
        let bridge = CompletionBridge::new(&source, CancellationToken::new());

        source.fire();
        source.fire();

        assert_eq!(bridge.wait().await, StreamEnd::Completed);
        assert_released_once(&source);
    }

    #[test]
    fn test_drop_without_wait_releases() {
        let source = CountingSource::default();
        {
            let _bridge = CompletionBridge::new(&source, CancellationToken::new());
            assert!(source.registered());
        }
        assert_released_once(&source);
    }

    #[tokio::test]
    async fn test_already_cancelled_token() {
        let source = CountingSource::default();
        let token = CancellationToken::new();
        token.cancel();

        let bridge = CompletionBridge::new(&source, token);
        assert_eq!(bridge.wait().await, StreamEnd::Cancelled);
        assert_released_once(&source);
    }

    #[tokio::test]
    async fn test_works_with_memory_source() {
        let source = crate::source::memory::MemoryRecordSource::new();
        let bridge = CompletionBridge::new(&source, CancellationToken::new());
        assert_eq!(source.completed_handler_count(), 1);

        source.push(&TraceRecord::new("P", "E", serde_json::Value::Null));
        source.complete();

        assert_eq!(bridge.wait().await, StreamEnd::Completed);
        assert_eq!(source.completed_handler_count(), 0);
    }
}
