//! A recording observer.
//!
//! Deliveries are pushed onto a channel so tests can await them one by one
//! instead of sleeping.

use crate::DEFAULT_WAIT;
use std::sync::Arc;
use std::time::Duration;
use tidecache_engine::{
    Change, DeliveryTarget, Immediate, Observer, ObserverId, ObserverOptions, ProviderError,
};
use tidecache_storage::Identifiable;
use tokio::sync::{mpsc, Mutex};

/// Which layer a recorded failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The source fetch failed.
    Source,
    /// The repository failed.
    Storage,
    /// The operation ended without a value or an error.
    Undefined,
}

/// One delivery seen by a [`ChangeRecorder`].
#[derive(Debug, Clone, PartialEq)]
pub enum Event<M> {
    /// A change batch.
    Changes(Vec<Change<M>>),
    /// A failure, kept as its kind and message.
    Failure(FailureKind, String),
}

/// An observer that records every delivery.
pub struct ChangeRecorder<M> {
    id: ObserverId,
    sender: mpsc::UnboundedSender<Event<M>>,
    events: Mutex<mpsc::UnboundedReceiver<Event<M>>>,
}

impl<M: Identifiable + std::fmt::Debug> ChangeRecorder<M> {
    /// Creates a recorder with a fresh observer id.
    pub fn new() -> Self {
        Self::with_id(ObserverId::next())
    }

    /// Creates a recorder using `id`.
    pub fn with_id(id: ObserverId) -> Self {
        let (sender, events) = mpsc::unbounded_channel();
        Self {
            id,
            sender,
            events: Mutex::new(events),
        }
    }

    /// Returns the observer id used by this recorder.
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Builds an observer delivering inline.
    pub fn observer(&self) -> Observer<M> {
        self.observer_on(Arc::new(Immediate))
    }

    /// Builds an observer that also receives empty refresh batches.
    pub fn observer_always_notified(&self) -> Observer<M> {
        self.observer()
            .with_options(ObserverOptions::new().with_always_notify_on_refresh(true))
    }

    /// Builds an observer delivering on `target`.
    pub fn observer_on(&self, target: Arc<dyn DeliveryTarget>) -> Observer<M> {
        let changes = self.sender.clone();
        let failures = self.sender.clone();

        Observer::new(
            self.id,
            target,
            move |batch: &[Change<M>]| {
                let _ = changes.send(Event::Changes(batch.to_vec()));
            },
            move |error: &ProviderError| {
                let kind = match error {
                    ProviderError::Source(_) => FailureKind::Source,
                    ProviderError::Storage(_) => FailureKind::Storage,
                    ProviderError::Undefined(_) => FailureKind::Undefined,
                };
                let _ = failures.send(Event::Failure(kind, error.to_string()));
            },
        )
    }

    /// Waits for the next delivery.
    ///
    /// # Panics
    ///
    /// Panics if nothing arrives within [`DEFAULT_WAIT`].
    pub async fn next_event(&self) -> Event<M> {
        let mut events = self.events.lock().await;
        tokio::time::timeout(DEFAULT_WAIT, events.recv())
            .await
            .expect("Timed out waiting for a delivery")
            .expect("Recorder channel closed")
    }

    /// Waits for the next delivery and expects a change batch.
    pub async fn next_changes(&self) -> Vec<Change<M>> {
        match self.next_event().await {
            Event::Changes(changes) => changes,
            other => panic!("Expected a change batch, got {other:?}"),
        }
    }

    /// Waits for the next delivery and expects a failure.
    pub async fn next_failure(&self) -> FailureKind {
        match self.next_event().await {
            Event::Failure(kind, _) => kind,
            other => panic!("Expected a failure, got {other:?}"),
        }
    }

    /// Returns a delivery if one is already waiting.
    pub fn try_next(&self) -> Option<Event<M>> {
        self.events.try_lock().ok()?.try_recv().ok()
    }

    /// Asserts that nothing is delivered within `wait`.
    pub async fn assert_quiet(&self, wait: Duration) {
        let mut events = self.events.lock().await;
        if let Ok(Some(event)) = tokio::time::timeout(wait, events.recv()).await {
            panic!("Expected no delivery, got {event:?}");
        }
    }
}

impl<M: Identifiable + std::fmt::Debug> Default for ChangeRecorder<M> {
    fn default() -> Self {
        Self::new()
    }
}
