//! # tidecache Engine
//!
//! Synchronization engine that keeps a local cache in step with a remote
//! source and tells interested parties what changed.
//!
//! This crate provides:
//! - Diff engine (old vs. new collection → inserts, updates, deletes)
//! - Observer registry with per-observer delivery targets
//! - [`DataProvider`], the reconciliation loop tying a [`DataSource`] to a
//!   [`Repository`]
//! - Trigger policies and coalescing of overlapping refreshes
//!
//! ## Architecture
//!
//! A reconciliation is a single **fetch → diff → persist → notify** pass:
//! 1. Fetch the authoritative collection from the source
//! 2. Diff it against the cached collection
//! 3. Persist the changes as one repository batch
//! 4. Deliver the batch (or the failure) to every active observer
//!
//! ## Key Invariants
//!
//! - The source is authoritative
//! - At most one reconciliation runs per provider
//! - Triggers during a run collapse into one follow-up run
//! - Observers receive a baseline before any later batch
//! - Deliveries to one observer arrive in order

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod config;
mod delivery;
mod diff;
mod error;
mod observer;
mod provider;
mod source;
mod state;

pub use change::{apply_changes, split_changes, Change, ChangeSummary};
pub use config::{ProviderConfig, TriggerEvent, TriggerPolicy};
pub use delivery::{DeliveryJob, DeliveryTarget, Immediate, ManualQueue, SerialQueue};
pub use diff::diff;
pub use error::{ProviderError, ProviderResult, SourceError, SourceResult};
pub use observer::{ChangeHandler, FailureHandler, Observer, ObserverId, ObserverOptions};
pub use provider::DataProvider;
pub use source::{
    DataSource, PageSource, PaginatedSource, DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE,
};
pub use state::{ProviderStats, ReconcilePhase};

pub use tidecache_storage::{
    Identifiable, InMemoryRepository, Repository, StorageError, StorageResult,
};
