//! Test fixtures and cache helpers.
//!
//! Provides a small domain model and convenience functions for setting up
//! repositories in common test scenarios.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tidecache_storage::{FileRepository, Identifiable, InMemoryRepository};

/// A sample domain model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Star count.
    pub stars: u32,
}

impl Project {
    /// Creates a project with no stars.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            stars: 0,
        }
    }

    /// Returns this project with `stars` stars.
    #[must_use]
    pub fn with_stars(mut self, stars: u32) -> Self {
        self.stars = stars;
        self
    }

    /// Returns a copy with a different name and the same id.
    #[must_use]
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

impl Identifiable for Project {
    fn identifier(&self) -> &str {
        &self.id
    }
}

/// Creates a project named after its id.
pub fn project(id: &str) -> Project {
    Project::new(id, format!("project {id}"))
}

/// Creates `count` projects with ids `p0`, `p1`, ...
pub fn projects(count: usize) -> Vec<Project> {
    (0..count).map(|i| project(&format!("p{i}"))).collect()
}

/// Creates a project with a random id and star count.
pub fn random_project() -> Project {
    let mut rng = rand::thread_rng();
    let id = uuid::Uuid::new_v4().to_string();
    let name = format!("project {}", &id[..8]);
    Project::new(id, name).with_stars(rng.gen_range(0..10_000))
}

/// Creates `count` random projects.
pub fn random_projects(count: usize) -> Vec<Project> {
    (0..count).map(|_| random_project()).collect()
}

/// Returns the ids of `models`, in order.
pub fn ids<M: Identifiable>(models: &[M]) -> Vec<String> {
    models.iter().map(|m| m.identifier().to_owned()).collect()
}

/// Creates an in-memory repository holding `models`.
pub fn memory_repository(models: Vec<Project>) -> Arc<InMemoryRepository<Project>> {
    Arc::new(InMemoryRepository::with_models(models))
}

/// A file-backed test cache with automatic cleanup.
pub struct TestCache {
    /// The repository instance.
    pub repository: Arc<FileRepository<Project>>,
    path: PathBuf,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TestCache {
    /// Creates an empty cache in a new temporary directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("projects.cache");
        let repository =
            FileRepository::open(&path).expect("Failed to open file repository");

        Self {
            repository: Arc::new(repository),
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the snapshot path.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Default for TestCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_projects() {
        let all = projects(3);
        assert_eq!(ids(&all), vec!["p0", "p1", "p2"]);
        assert_eq!(all[1].name, "project p1");
    }

    #[test]
    fn renamed_keeps_identity() {
        let original = project("a").with_stars(4);
        let renamed = original.renamed("other");
        assert_eq!(renamed.id, "a");
        assert_eq!(renamed.stars, 4);
        assert_ne!(renamed, original);
    }

    #[test]
    fn random_projects_are_distinct() {
        let all = random_projects(20);
        let mut unique = ids(&all);
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 20);
    }

    #[test]
    fn test_cache_starts_empty() {
        let cache = TestCache::new();
        assert!(cache.repository.is_empty());
        assert!(cache.path().ends_with("projects.cache"));
    }
}
