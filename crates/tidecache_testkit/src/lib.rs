//! # tidecache Testkit
//!
//! Test utilities for tidecache.
//!
//! This crate provides:
//! - A sample `Project` model and file-backed cache fixtures
//! - Property-based test generators using proptest
//! - Scriptable source and fault-injecting repository mocks
//! - A recording observer for asserting on deliveries
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tidecache_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn refresh_inserts() {
//!     let source = Arc::new(MockSource::new(projects(3)));
//!     let provider = DataProvider::new(source, Arc::new(InMemoryRepository::new()), TriggerPolicy::None);
//!     let recorder = ChangeRecorder::new();
//!     provider.add_observer(recorder.observer());
//!     // ...
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;
pub mod recorder;

use std::time::Duration;

/// How long the async helpers wait before failing a test.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::mocks::*;
    pub use crate::recorder::*;
    pub use crate::DEFAULT_WAIT;
    pub use std::sync::Arc;
    pub use tidecache_engine::{
        Change, DataProvider, InMemoryRepository, ObserverOptions, ReconcilePhase, Repository,
        TriggerPolicy,
    };
}

pub use fixtures::*;
pub use generators::*;
pub use mocks::*;
pub use recorder::*;
