//! The data provider: keeps a repository in step with a source and tells
//! observers what changed.
//!
//! # Serialization
//!
//! Each provider owns one background worker fed by a job queue. Baseline
//! notifications and reconciliations are jobs, so at most one of them runs
//! at a time and observers see them in queue order. Triggers that arrive
//! while a reconciliation is scheduled or running fold into a single
//! follow-up run (see [`ReconcilePhase`]).
//!
//! # Reconciliation
//!
//! 1. fetch the authoritative collection from the source
//! 2. read the cache and diff it against the fetched collection
//! 3. persist the upserts and deletes in one repository batch (skipped when
//!    the diff is empty)
//! 4. fan the batch out to active observers, or the failure if any step
//!    failed
//!
//! Failures leave the repository untouched (step 1 and 2) or as the
//! backend's own atomicity left it (step 3), and are never retried here.

use crate::change::{split_changes, Change, ChangeSummary};
use crate::config::{ProviderConfig, TriggerEvent, TriggerPolicy};
use crate::diff::diff;
use crate::error::{ProviderError, ProviderResult, SourceError};
use crate::observer::{Observer, ObserverId, ObserverRegistry};
use crate::source::DataSource;
use crate::state::{ProviderStats, ReconcilePhase};
use parking_lot::RwLock;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tidecache_storage::{Identifiable, Repository, StorageResult};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

enum Job {
    /// Deliver the current cache content to a new registration.
    Baseline { id: ObserverId, token: u64 },
    /// Run reconciliations until no follow-up is queued.
    Reconcile,
    /// Resolve once every earlier job has been processed.
    Barrier(oneshot::Sender<()>),
}

/// State shared between a provider handle and its worker.
struct Shared<M: Identifiable> {
    label: String,
    trigger: TriggerPolicy,
    source: Arc<dyn DataSource<M>>,
    repository: Arc<dyn Repository<M>>,
    registry: Arc<ObserverRegistry<M>>,
    phase: watch::Sender<ReconcilePhase>,
    stats: RwLock<ProviderStats>,
    cancelled: AtomicBool,
}

/// Synchronizes a local repository with a remote source and notifies
/// observers of every change.
///
/// Reads (`fetch_by_id`, `fetch_page`) go straight to the repository and are
/// not ordered against reconciliations. Dropping the provider stops its
/// worker once the jobs already queued have run; [`DataProvider::shutdown`]
/// does the same and waits for it.
pub struct DataProvider<M: Identifiable> {
    shared: Arc<Shared<M>>,
    jobs: mpsc::UnboundedSender<Job>,
    worker: JoinHandle<()>,
    runtime: Handle,
}

impl<M: Identifiable> DataProvider<M> {
    /// Creates a provider on the current tokio runtime.
    ///
    /// With [`TriggerPolicy::OnInitialization`] the first reconciliation is
    /// scheduled before this returns.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn new<S, R>(source: Arc<S>, repository: Arc<R>, trigger: TriggerPolicy) -> Self
    where
        S: DataSource<M> + 'static,
        R: Repository<M> + 'static,
    {
        Self::with_config(
            ProviderConfig::new(trigger),
            source,
            repository,
            Handle::current(),
        )
    }

    /// Creates a provider whose worker runs on `runtime`.
    pub fn with_config<S, R>(
        config: ProviderConfig,
        source: Arc<S>,
        repository: Arc<R>,
        runtime: Handle,
    ) -> Self
    where
        S: DataSource<M> + 'static,
        R: Repository<M> + 'static,
    {
        Self::from_parts(config, source, repository, runtime)
    }

    /// Creates a provider from already type-erased capabilities.
    pub fn from_parts(
        config: ProviderConfig,
        source: Arc<dyn DataSource<M>>,
        repository: Arc<dyn Repository<M>>,
        runtime: Handle,
    ) -> Self {
        let (phase, _) = watch::channel(ReconcilePhase::Idle);
        let shared = Arc::new(Shared {
            label: config.label,
            trigger: config.trigger,
            source,
            repository,
            registry: Arc::new(ObserverRegistry::new()),
            phase,
            stats: RwLock::new(ProviderStats::default()),
            cancelled: AtomicBool::new(false),
        });

        let (jobs, receiver) = mpsc::unbounded_channel();
        let worker = runtime.spawn(run_worker(Arc::clone(&shared), receiver));

        let provider = Self {
            shared,
            jobs,
            worker,
            runtime,
        };

        debug!(provider = %provider.shared.label, trigger = ?provider.shared.trigger, "provider created");
        if provider.shared.trigger.fires_on(TriggerEvent::Initialized) {
            provider.request_reconciliation("initialization");
        }

        provider
    }

    /// Requests a reconciliation.
    ///
    /// Starts one if the provider is idle; otherwise makes sure exactly one
    /// more runs after the current one. Never blocks.
    pub fn refresh(&self) {
        self.request_reconciliation("refresh");
    }

    /// Abandons the scheduled or running reconciliation at its next
    /// checkpoint.
    ///
    /// An abandoned run does not touch the repository and notifies nobody.
    /// A follow-up already queued still runs. Does nothing while idle.
    pub fn cancel_refresh(&self) {
        let cancelled = &self.shared.cancelled;
        let mut requested = false;
        self.shared.phase.send_if_modified(|phase| {
            if phase.is_active() {
                cancelled.store(true, Ordering::SeqCst);
                requested = true;
            }
            false
        });

        if requested {
            debug!(provider = %self.shared.label, "cancellation requested");
        }
    }

    /// Registers an observer.
    ///
    /// The observer first receives the current cache content as a batch of
    /// inserts (an empty batch if the cache is empty), then every later
    /// reconciliation outcome. Re-using an id replaces the earlier
    /// registration.
    pub fn add_observer(&self, observer: Observer<M>) {
        let registered = self.shared.registry.register(observer);
        debug!(provider = %self.shared.label, observer = %registered.id, "observer registered");

        let baseline = Job::Baseline {
            id: registered.id,
            token: registered.token,
        };
        if self.jobs.send(baseline).is_err() {
            warn!(provider = %self.shared.label, "worker stopped, baseline not scheduled");
        }

        if registered.first
            && self
                .shared
                .trigger
                .fires_on(TriggerEvent::FirstObserverAdded)
        {
            self.request_reconciliation("first observer");
        }
    }

    /// Deregisters an observer. Returns true if it was registered.
    ///
    /// Deliveries already dispatched to the observer's target are dropped
    /// when they run.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let removed = self.shared.registry.remove(id);
        debug!(provider = %self.shared.label, observer = %id, removed, "observer removed");
        removed
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Returns true if `id` is registered.
    pub fn has_observer(&self, id: ObserverId) -> bool {
        self.shared.registry.contains(id)
    }

    /// Reads one model from the repository.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Storage`] if the repository read fails.
    pub async fn fetch_by_id(&self, id: &str) -> ProviderResult<Option<M>> {
        let repository = Arc::clone(&self.shared.repository);
        let id = id.to_owned();
        self.read(async move { repository.fetch_one(&id).await })
            .await
    }

    /// Reads a window of models from the repository in its natural order,
    /// or reversed.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Storage`] if the repository read fails.
    pub async fn fetch_page(
        &self,
        offset: usize,
        count: usize,
        reversed: bool,
    ) -> ProviderResult<Vec<M>> {
        let repository = Arc::clone(&self.shared.repository);
        self.read(async move { repository.fetch_page(offset, count, reversed).await })
            .await
    }

    /// Current reconciliation phase.
    pub fn phase(&self) -> ReconcilePhase {
        *self.shared.phase.borrow()
    }

    /// Waits until no reconciliation is scheduled or running.
    pub async fn wait_until_idle(&self) {
        let mut phase = self.shared.phase.subscribe();
        // The sender lives as long as `self`, so this only ends on idle.
        let _ = phase.wait_for(|phase| !phase.is_active()).await;
    }

    /// Waits until every job queued before this call, including queued
    /// follow-up reconciliations, has been processed.
    ///
    /// Deliveries are dispatched by then; whether they already ran depends on
    /// each observer's target.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.jobs.send(Job::Barrier(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// Stops accepting work and waits until the worker has processed the
    /// queued jobs and released the source and repository.
    pub async fn shutdown(self) {
        let Self {
            shared,
            jobs,
            worker,
            ..
        } = self;
        drop(jobs);
        drop(shared);

        if let Err(error) = worker.await {
            warn!(%error, "provider worker ended abnormally");
        }
    }

    /// Snapshot of the provider statistics.
    pub fn stats(&self) -> ProviderStats {
        self.shared.stats.read().clone()
    }

    /// Runs a repository read on the provider runtime and hands the result
    /// back over a one-shot channel.
    async fn read<T, F>(&self, read: F) -> ProviderResult<T>
    where
        T: Send + 'static,
        F: Future<Output = StorageResult<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.runtime.spawn(async move {
            let _ = tx.send(read.await);
        });

        match rx.await {
            Ok(result) => result.map_err(ProviderError::from),
            Err(_) => Err(ProviderError::Undefined(
                "repository read ended without a value or an error".into(),
            )),
        }
    }

    fn request_reconciliation(&self, reason: &'static str) {
        let mut start = false;
        self.shared.phase.send_if_modified(|phase| {
            let (next, begin) = phase.on_trigger();
            start = begin;
            let changed = next != *phase;
            *phase = next;
            changed
        });

        if !start {
            self.shared.stats.write().coalesced_triggers += 1;
            debug!(provider = %self.shared.label, reason, "trigger coalesced into pending reconciliation");
            return;
        }

        debug!(provider = %self.shared.label, reason, "reconciliation scheduled");
        if self.jobs.send(Job::Reconcile).is_err() {
            warn!(provider = %self.shared.label, "worker stopped, reconciliation not scheduled");
            self.shared.phase.send_replace(ReconcilePhase::Idle);
            self.shared.cancelled.store(false, Ordering::SeqCst);
        }
    }
}

impl<M: Identifiable> fmt::Debug for DataProvider<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataProvider")
            .field("label", &self.shared.label)
            .field("trigger", &self.shared.trigger)
            .field("phase", &self.phase())
            .field("observers", &self.observer_count())
            .finish()
    }
}

async fn run_worker<M: Identifiable>(shared: Arc<Shared<M>>, mut jobs: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = jobs.recv().await {
        match job {
            Job::Baseline { id, token } => shared.deliver_baseline(id, token).await,
            Job::Reconcile => loop {
                shared.reconcile().await;
                if !shared.finish_cycle() {
                    break;
                }
            },
            Job::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }

    debug!(provider = %shared.label, "worker stopped");
}

impl<M: Identifiable> Shared<M> {
    async fn deliver_baseline(&self, id: ObserverId, token: u64) {
        let Some(subscriber) = self.registry.current(id, token) else {
            debug!(provider = %self.label, observer = %id, "observer gone before baseline");
            return;
        };

        match self.repository.fetch_all().await {
            Ok(models) => {
                let changes: Vec<Change<M>> = models.into_iter().map(Change::Insert).collect();
                debug!(provider = %self.label, observer = %id, inserts = changes.len(), "baseline delivered");
                self.registry.deliver_changes(&subscriber, changes.into());
            }
            Err(error) => {
                warn!(provider = %self.label, observer = %id, %error, "baseline read failed");
                self.registry
                    .deliver_failure(&subscriber, Arc::new(error.into()));
            }
        }

        self.registry.activate(id, token);
    }

    async fn reconcile(&self) {
        let started = Instant::now();
        debug!(provider = %self.label, "reconciliation started");

        let outcome = self.run_cycle().await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(Some(changes)) => {
                let summary = ChangeSummary::of(&changes);
                {
                    let mut stats = self.stats.write();
                    stats.reconciliations += 1;
                    stats.changes_applied += summary.total() as u64;
                    stats.last_summary = Some(summary);
                    stats.last_duration = Some(elapsed);
                    stats.last_success = Some(Instant::now());
                    stats.last_error = None;
                }

                info!(
                    provider = %self.label,
                    inserts = summary.inserts,
                    updates = summary.updates,
                    deletes = summary.deletes,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "reconciliation complete"
                );
                let notified = self.registry.broadcast_changes(changes);
                debug!(provider = %self.label, notified, "changes dispatched");
            }
            Ok(None) => {
                {
                    let mut stats = self.stats.write();
                    stats.abandoned += 1;
                    stats.last_duration = Some(elapsed);
                }
                info!(provider = %self.label, "reconciliation abandoned");
            }
            Err(error) => {
                {
                    let mut stats = self.stats.write();
                    stats.failures += 1;
                    stats.last_duration = Some(elapsed);
                    stats.last_error = Some(error.to_string());
                }

                warn!(provider = %self.label, %error, "reconciliation failed");
                let notified = self.registry.broadcast_failure(error);
                debug!(provider = %self.label, notified, "failure dispatched");
            }
        }
    }

    /// One fetch, diff and persist pass. `None` means the pass was abandoned.
    async fn run_cycle(&self) -> ProviderResult<Option<Vec<Change<M>>>> {
        if self.is_cancelled() {
            return Ok(None);
        }

        let fetched = match self.source.fetch().await {
            Ok(models) => models,
            Err(SourceError::Cancelled) => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        if self.is_cancelled() {
            return Ok(None);
        }

        let cached = self.repository.fetch_all().await?;
        let changes = diff(&cached, &fetched);
        if self.is_cancelled() {
            return Ok(None);
        }

        let (upserts, deletes) = split_changes(&changes);
        if !upserts.is_empty() || !deletes.is_empty() {
            self.repository.save(upserts, deletes).await?;
        }

        Ok(Some(changes))
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Leaves the reconciling phase. Returns true if a follow-up must run.
    ///
    /// A pending cancellation belongs to the run that just ended and is
    /// cleared in the same step.
    fn finish_cycle(&self) -> bool {
        let mut rerun = false;
        self.phase.send_if_modified(|phase| {
            self.cancelled.store(false, Ordering::SeqCst);
            let (next, follow_up) = phase.on_finished();
            rerun = follow_up;
            let changed = next != *phase;
            *phase = next;
            changed
        });

        if rerun {
            debug!(provider = %self.label, "running queued reconciliation");
        }
        rerun
    }
}
