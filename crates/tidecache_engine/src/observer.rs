//! Observer registrations and the registry that fans change batches out.
//!
//! # Registration lifecycle
//!
//! A registration starts *pending*: it is known to the registry but does not
//! take part in reconciliation fan-out until its baseline notification has
//! been dispatched, at which point the worker activates it. Each
//! registration carries a token; re-registering an id issues a new token,
//! and deliveries addressed to an old token are dropped.
//!
//! # Liveness
//!
//! A registration may be tied to an owner through [`Observer::owned_by`].
//! Only a weak reference to the owner is kept. Once the owner is gone the
//! registration is inert and is purged the next time the registry takes a
//! snapshot or removes an entry.
//!
//! # Consistency
//!
//! All bookkeeping happens under one registry-wide mutex. Fan-out works on a
//! point-in-time snapshot taken under that mutex, and every dispatched job
//! re-checks the registration when it runs, so a removal is honoured even
//! for deliveries already queued on a target. The mutex is never held while
//! a callback runs.
//!
//! A callback that panics is contained in its own delivery: the panic is
//! logged and the target and provider carry on.

use crate::change::Change;
use crate::delivery::DeliveryTarget;
use crate::error::ProviderError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tidecache_storage::Identifiable;
use tracing::warn;

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Allocates a process-unique id.
    pub fn next() -> Self {
        Self(NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps a caller-chosen raw id.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for ObserverId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

/// Per-observer delivery options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObserverOptions {
    /// Deliver every reconciliation outcome, including empty change batches.
    ///
    /// When false (the default) a reconciliation that changed nothing is not
    /// delivered. The baseline notification is always delivered.
    pub always_notify_on_refresh: bool,
}

impl ObserverOptions {
    /// Creates the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether empty batches are delivered.
    pub fn with_always_notify_on_refresh(mut self, value: bool) -> Self {
        self.always_notify_on_refresh = value;
        self
    }
}

/// Callback receiving a change batch.
pub type ChangeHandler<M> = Arc<dyn Fn(&[Change<M>]) + Send + Sync>;

/// Callback receiving a reconciliation failure.
pub type FailureHandler = Arc<dyn Fn(&ProviderError) + Send + Sync>;

type LivenessProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// An observer registration request.
///
/// ```rust
/// # use std::sync::Arc;
/// # use tidecache_engine::{Immediate, Observer, ObserverId, ObserverOptions};
/// # #[derive(Debug, Clone, PartialEq)] struct Note { id: String }
/// # impl tidecache_engine::Identifiable for Note { fn identifier(&self) -> &str { &self.id } }
/// let screen = Arc::new("notes screen");
/// let observer = Observer::<Note>::new(
///     ObserverId::next(),
///     Arc::new(Immediate),
///     |changes| println!("{} changes", changes.len()),
///     |error| eprintln!("refresh failed: {error}"),
/// )
/// .with_options(ObserverOptions::new().with_always_notify_on_refresh(true))
/// .owned_by(&screen);
/// ```
pub struct Observer<M> {
    id: ObserverId,
    target: Arc<dyn DeliveryTarget>,
    on_change: ChangeHandler<M>,
    on_failure: FailureHandler,
    options: ObserverOptions,
    liveness: Option<LivenessProbe>,
}

impl<M: Identifiable> Observer<M> {
    /// Creates a registration delivering on `target`.
    pub fn new(
        id: ObserverId,
        target: Arc<dyn DeliveryTarget>,
        on_change: impl Fn(&[Change<M>]) + Send + Sync + 'static,
        on_failure: impl Fn(&ProviderError) + Send + Sync + 'static,
    ) -> Self {
        Self {
            id,
            target,
            on_change: Arc::new(on_change),
            on_failure: Arc::new(on_failure),
            options: ObserverOptions::default(),
            liveness: None,
        }
    }

    /// Sets the delivery options.
    pub fn with_options(mut self, options: ObserverOptions) -> Self {
        self.options = options;
        self
    }

    /// Ties the registration to `owner` without keeping it alive.
    pub fn owned_by<T: Send + Sync + 'static>(mut self, owner: &Arc<T>) -> Self {
        let owner: Weak<T> = Arc::downgrade(owner);
        self.liveness = Some(Arc::new(move || owner.strong_count() > 0));
        self
    }

    /// Returns the observer id.
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Returns the delivery options.
    pub fn options(&self) -> ObserverOptions {
        self.options
    }
}

impl<M> fmt::Debug for Observer<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("id", &self.id)
            .field("options", &self.options)
            .field("owned", &self.liveness.is_some())
            .finish()
    }
}

/// A point-in-time copy of one registration, used for dispatch.
pub(crate) struct Subscriber<M> {
    pub(crate) id: ObserverId,
    pub(crate) token: u64,
    target: Arc<dyn DeliveryTarget>,
    on_change: ChangeHandler<M>,
    on_failure: FailureHandler,
    options: ObserverOptions,
    liveness: Option<LivenessProbe>,
}

impl<M> Clone for Subscriber<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            token: self.token,
            target: Arc::clone(&self.target),
            on_change: Arc::clone(&self.on_change),
            on_failure: Arc::clone(&self.on_failure),
            options: self.options,
            liveness: self.liveness.clone(),
        }
    }
}

impl<M> Subscriber<M> {
    fn is_alive(&self) -> bool {
        self.liveness.as_ref().map_or(true, |probe| probe())
    }
}

struct Registration<M> {
    active: bool,
    subscriber: Subscriber<M>,
}

/// Result of [`ObserverRegistry::register`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct Registered {
    pub(crate) id: ObserverId,
    pub(crate) token: u64,
    /// The registry went from zero to one registration.
    pub(crate) first: bool,
}

struct RegistryInner<M> {
    entries: HashMap<ObserverId, Registration<M>>,
    next_token: u64,
}

impl<M> RegistryInner<M> {
    fn purge_dead(&mut self) {
        self.entries.retain(|_, entry| entry.subscriber.is_alive());
    }
}

/// Thread-safe set of observer registrations.
pub(crate) struct ObserverRegistry<M> {
    inner: Mutex<RegistryInner<M>>,
}

impl<M: Identifiable> ObserverRegistry<M> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                entries: HashMap::new(),
                next_token: 1,
            }),
        }
    }

    /// Adds or replaces a registration. The new registration is pending.
    pub(crate) fn register(&self, observer: Observer<M>) -> Registered {
        let mut inner = self.inner.lock();
        inner.purge_dead();

        let token = inner.next_token;
        inner.next_token += 1;

        let first = inner.entries.is_empty();
        let id = observer.id;
        inner.entries.insert(
            id,
            Registration {
                active: false,
                subscriber: Subscriber {
                    id,
                    token,
                    target: observer.target,
                    on_change: observer.on_change,
                    on_failure: observer.on_failure,
                    options: observer.options,
                    liveness: observer.liveness,
                },
            },
        );

        Registered { id, token, first }
    }

    /// Removes a registration. Returns true if it was present.
    pub(crate) fn remove(&self, id: ObserverId) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.entries.remove(&id).is_some();
        inner.purge_dead();
        removed
    }

    /// Returns the registration `(id, token)` if it is still current, active
    /// or not.
    pub(crate) fn current(&self, id: ObserverId, token: u64) -> Option<Subscriber<M>> {
        let inner = self.inner.lock();
        inner
            .entries
            .get(&id)
            .filter(|entry| entry.subscriber.token == token && entry.subscriber.is_alive())
            .map(|entry| entry.subscriber.clone())
    }

    /// Lets a pending registration take part in fan-out.
    pub(crate) fn activate(&self, id: ObserverId, token: u64) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get_mut(&id) {
            if entry.subscriber.token == token {
                entry.active = true;
            }
        }
    }

    /// Returns the live, active registrations. Dead ones are purged.
    pub(crate) fn snapshot(&self) -> Vec<Subscriber<M>> {
        let mut inner = self.inner.lock();
        inner.purge_dead();
        inner
            .entries
            .values()
            .filter(|entry| entry.active)
            .map(|entry| entry.subscriber.clone())
            .collect()
    }

    fn is_current(&self, id: ObserverId, token: u64) -> bool {
        self.current(id, token).is_some()
    }

    /// Number of registrations, pending ones included.
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub(crate) fn contains(&self, id: ObserverId) -> bool {
        self.inner.lock().entries.contains_key(&id)
    }

    /// Dispatches a change batch to one subscriber.
    pub(crate) fn deliver_changes(
        self: &Arc<Self>,
        subscriber: &Subscriber<M>,
        changes: Arc<[Change<M>]>,
    ) {
        let registry = Arc::downgrade(self);
        let (id, token) = (subscriber.id, subscriber.token);
        let handler = Arc::clone(&subscriber.on_change);

        subscriber.target.dispatch(Box::new(move || {
            if still_registered(&registry, id, token) {
                run_handler(id, "change", || handler(&changes));
            }
        }));
    }

    /// Dispatches a failure to one subscriber.
    pub(crate) fn deliver_failure(
        self: &Arc<Self>,
        subscriber: &Subscriber<M>,
        error: Arc<ProviderError>,
    ) {
        let registry = Arc::downgrade(self);
        let (id, token) = (subscriber.id, subscriber.token);
        let handler = Arc::clone(&subscriber.on_failure);

        subscriber.target.dispatch(Box::new(move || {
            if still_registered(&registry, id, token) {
                run_handler(id, "failure", || handler(&error));
            }
        }));
    }

    /// Fans a reconciliation result out to every active subscriber.
    ///
    /// Empty batches only reach subscribers that asked for them. Returns the
    /// number of subscribers a delivery was dispatched to.
    pub(crate) fn broadcast_changes(self: &Arc<Self>, changes: Vec<Change<M>>) -> usize {
        let changes: Arc<[Change<M>]> = changes.into();
        let mut delivered = 0;

        for subscriber in self.snapshot() {
            if changes.is_empty() && !subscriber.options.always_notify_on_refresh {
                continue;
            }
            self.deliver_changes(&subscriber, Arc::clone(&changes));
            delivered += 1;
        }

        delivered
    }

    /// Fans a reconciliation failure out to every active subscriber.
    pub(crate) fn broadcast_failure(self: &Arc<Self>, error: ProviderError) -> usize {
        let error = Arc::new(error);
        let subscribers = self.snapshot();

        for subscriber in &subscribers {
            self.deliver_failure(subscriber, Arc::clone(&error));
        }

        subscribers.len()
    }
}

fn still_registered<M: Identifiable>(
    registry: &Weak<ObserverRegistry<M>>,
    id: ObserverId,
    token: u64,
) -> bool {
    registry
        .upgrade()
        .is_some_and(|registry| registry.is_current(id, token))
}

/// Runs one observer callback, containing a panic to this delivery.
fn run_handler(id: ObserverId, kind: &'static str, handler: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(handler)) {
        warn!(observer = %id, kind, panic = panic_message(&*payload), "observer callback panicked");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{Immediate, ManualQueue};
    use crate::error::SourceError;

    #[derive(Debug, Clone, PartialEq)]
    struct Tag(String);

    impl Identifiable for Tag {
        fn identifier(&self) -> &str {
            &self.0
        }
    }

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording(id: u64, target: Arc<dyn DeliveryTarget>, log: &Log) -> Observer<Tag> {
        let changes_log = Arc::clone(log);
        let failures_log = Arc::clone(log);
        Observer::new(
            ObserverId::from_raw(id),
            target,
            move |changes: &[Change<Tag>]| {
                changes_log.lock().push(format!("{id}:changes:{}", changes.len()))
            },
            move |error: &ProviderError| failures_log.lock().push(format!("{id}:failure:{error}")),
        )
    }

    fn insert(id: &str) -> Change<Tag> {
        Change::Insert(Tag(id.into()))
    }

    #[test]
    fn observer_ids_are_unique() {
        let a = ObserverId::next();
        let b = ObserverId::next();
        assert_ne!(a, b);
        assert_eq!(ObserverId::from(7).as_raw(), 7);
        assert_eq!(ObserverId::from_raw(3).to_string(), "observer#3");
    }

    #[test]
    fn first_registration_is_reported() {
        let registry = ObserverRegistry::<Tag>::new();
        let log = Log::default();

        assert!(registry.register(recording(1, Arc::new(Immediate), &log)).first);
        assert!(!registry.register(recording(2, Arc::new(Immediate), &log)).first);
        assert_eq!(registry.len(), 2);

        assert!(registry.remove(ObserverId::from_raw(1)));
        assert!(registry.remove(ObserverId::from_raw(2)));
        assert!(!registry.remove(ObserverId::from_raw(2)));
        assert!(registry.register(recording(3, Arc::new(Immediate), &log)).first);
    }

    #[test]
    fn pending_registrations_are_not_broadcast_to() {
        let registry = Arc::new(ObserverRegistry::new());
        let log = Log::default();

        let registered = registry.register(recording(1, Arc::new(Immediate), &log));
        assert_eq!(registry.broadcast_changes(vec![insert("a")]), 0);

        registry.activate(registered.id, registered.token);
        assert_eq!(registry.broadcast_changes(vec![insert("a")]), 1);
        assert_eq!(*log.lock(), vec!["1:changes:1"]);
    }

    #[test]
    fn empty_batches_respect_options() {
        let registry = Arc::new(ObserverRegistry::new());
        let log = Log::default();

        let quiet = registry.register(recording(1, Arc::new(Immediate), &log));
        let chatty = registry.register(
            recording(2, Arc::new(Immediate), &log)
                .with_options(ObserverOptions::new().with_always_notify_on_refresh(true)),
        );
        registry.activate(quiet.id, quiet.token);
        registry.activate(chatty.id, chatty.token);

        assert_eq!(registry.broadcast_changes(Vec::new()), 1);
        assert_eq!(*log.lock(), vec!["2:changes:0"]);
    }

    #[test]
    fn failures_reach_every_active_subscriber() {
        let registry = Arc::new(ObserverRegistry::new());
        let log = Log::default();

        for id in 1..=3 {
            let registered = registry.register(recording(id, Arc::new(Immediate), &log));
            registry.activate(registered.id, registered.token);
        }

        let error = ProviderError::from(SourceError::Timeout);
        assert_eq!(registry.broadcast_failure(error), 3);
        assert_eq!(log.lock().len(), 3);
        assert!(log.lock().iter().all(|entry| entry.contains(":failure:")));
    }

    #[test]
    fn removal_after_dispatch_suppresses_delivery() {
        let registry = Arc::new(ObserverRegistry::new());
        let queue = Arc::new(ManualQueue::new());
        let log = Log::default();

        let registered = registry.register(recording(1, queue.clone(), &log));
        registry.activate(registered.id, registered.token);

        assert_eq!(registry.broadcast_changes(vec![insert("a")]), 1);
        registry.remove(registered.id);

        assert_eq!(queue.run_pending(), 1);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn replaced_registration_drops_stale_deliveries() {
        let registry = Arc::new(ObserverRegistry::new());
        let queue = Arc::new(ManualQueue::new());
        let log = Log::default();

        let old = registry.register(recording(1, queue.clone(), &log));
        registry.activate(old.id, old.token);
        registry.broadcast_changes(vec![insert("a")]);

        let new = registry.register(recording(1, queue.clone(), &log));
        assert_ne!(old.token, new.token);
        assert_eq!(registry.len(), 1);
        assert!(registry.current(old.id, old.token).is_none());

        queue.run_pending();
        assert!(log.lock().is_empty());
    }

    #[test]
    fn dead_owner_makes_registration_inert() {
        let registry = Arc::new(ObserverRegistry::new());
        let log = Log::default();
        let owner = Arc::new(());

        let registered =
            registry.register(recording(1, Arc::new(Immediate), &log).owned_by(&owner));
        registry.activate(registered.id, registered.token);
        assert!(registry.contains(registered.id));

        drop(owner);
        assert_eq!(registry.broadcast_changes(vec![insert("a")]), 0);
        assert!(log.lock().is_empty());
        assert!(!registry.contains(registered.id));
    }

    #[test]
    fn panicking_callback_does_not_stop_fan_out() {
        let registry = Arc::new(ObserverRegistry::new());
        let log = Log::default();

        let faulty = registry.register(Observer::<Tag>::new(
            ObserverId::from_raw(1),
            Arc::new(Immediate),
            |_: &[Change<Tag>]| panic!("change handler bug"),
            |_: &ProviderError| panic!("failure handler bug"),
        ));
        let healthy = registry.register(recording(2, Arc::new(Immediate), &log));
        registry.activate(faulty.id, faulty.token);
        registry.activate(healthy.id, healthy.token);

        assert_eq!(registry.broadcast_changes(vec![insert("a")]), 2);
        assert_eq!(
            registry.broadcast_failure(ProviderError::from(SourceError::Timeout)),
            2
        );

        let log = log.lock();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], "2:changes:1");
        assert!(log[1].starts_with("2:failure:"));
        assert!(registry.contains(faulty.id));
    }

    #[test]
    fn panic_message_reads_common_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&7_u32), "non-string panic payload");
    }

    #[test]
    fn delivery_after_registry_dropped_is_discarded() {
        let registry = Arc::new(ObserverRegistry::new());
        let queue = Arc::new(ManualQueue::new());
        let log = Log::default();

        let registered = registry.register(recording(1, queue.clone(), &log));
        registry.activate(registered.id, registered.token);
        registry.broadcast_changes(vec![insert("a")]);

        drop(registry);
        queue.run_pending();
        assert!(log.lock().is_empty());
    }
}
