//! # tidecache Storage
//!
//! Repository capability and cache backends for tidecache.
//!
//! This crate provides the local-cache side of the synchronization engine.
//! Repositories store **domain models** keyed by their identifier; how a
//! model is encoded on disk is the repository's business alone.
//!
//! ## Design Principles
//!
//! - Repositories are simple model stores (lookup, page, batch save, clear)
//! - Batch saves are atomic and empty batches are never written
//! - Natural order is documented per backend, never invented by callers
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Backends
//!
//! - [`InMemoryRepository`] - For testing and ephemeral caches
//! - [`FileRepository`] - CBOR snapshot on disk, survives restarts
//!
//! ## Example
//!
//! ```rust
//! use tidecache_storage::{Identifiable, InMemoryRepository, Repository};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Note { id: String }
//!
//! impl Identifiable for Note {
//!     fn identifier(&self) -> &str { &self.id }
//! }
//!
//! # tokio_test_block(async {
//! let repository = InMemoryRepository::new();
//! repository.save(vec![Note { id: "n1".into() }], vec![]).await.unwrap();
//! assert!(repository.fetch_one("n1").await.unwrap().is_some());
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entries;
mod error;
mod file;
mod memory;
mod model;
mod repository;

pub use error::{StorageError, StorageResult};
pub use file::FileRepository;
pub use memory::InMemoryRepository;
pub use model::Identifiable;
pub use repository::Repository;
