//! Property-based test generators using proptest.
//!
//! Ids are drawn from a small alphabet so that generated collections share
//! identifiers often enough to exercise updates and deletes.

use crate::fixtures::Project;
use proptest::prelude::*;

/// Strategy for generating project ids from a small pool.
pub fn project_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-f][0-3]?").expect("Invalid regex")
}

/// Strategy for generating a single project.
pub fn project_strategy() -> impl Strategy<Value = Project> {
    (
        project_id_strategy(),
        prop::string::string_regex("[a-z]{0,4}").expect("Invalid regex"),
        0u32..4,
    )
        .prop_map(|(id, name, stars)| Project::new(id, name).with_stars(stars))
}

/// Strategy for generating a collection of projects.
///
/// Ids may repeat; consumers resolve duplicates by keeping the last one.
pub fn project_collection_strategy(max_len: usize) -> impl Strategy<Value = Vec<Project>> {
    prop::collection::vec(project_strategy(), 0..max_len)
}

/// Strategy for generating a collection with unique ids.
pub fn unique_project_collection_strategy(
    max_len: usize,
) -> impl Strategy<Value = Vec<Project>> {
    prop::collection::btree_map(project_id_strategy(), project_strategy(), 0..max_len)
        .prop_map(|entries| {
            entries
                .into_iter()
                .map(|(id, project)| Project { id, ..project })
                .collect()
        })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
