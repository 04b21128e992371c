//! Access to versioned OSM data.

pub mod memory;

use async_trait::async_trait;

use crate::types::{Changeset, Element, ElementType, Way};

/// Errors returned by a [`HistoryAccess`] backend.
///
/// Redaction is the one recoverable failure: a single historic version is
/// permanently inaccessible (HTTP 403/404 on the version endpoint).
/// Everything else aborts the blame run.
pub trait HistoryError: std::error::Error + Send + Sync {
    /// Whether the error reports an inaccessible (redacted) version.
    fn is_redacted(&self) -> bool;
}

/// Trait for versioned OSM data sources.
///
/// All methods are async; the blame algorithm awaits them one at a time and
/// never calls them concurrently.
#[async_trait]
pub trait HistoryAccess: Send + Sync {
    /// Error type for history operations.
    type Error: HistoryError + 'static;

    /// All accessible versions of an element, in any order.
    ///
    /// Redacted versions may be missing from the list.
    async fn get_feature_history(&self, element_type: ElementType, id: i64) -> Result<Vec<Element>, Self::Error>;

    /// One specific version. Fails with a redaction error if it is inaccessible.
    async fn get_feature_at_version(&self, element_type: ElementType, id: i64, version: u32) -> Result<Element, Self::Error>;

    /// Current version, optionally followed by all (transitive) members.
    async fn get_feature(&self, element_type: ElementType, id: i64, recursive: bool) -> Result<Vec<Element>, Self::Error>;

    /// Current ways that contain a node.
    async fn get_ways_for_node(&self, node_id: i64) -> Result<Vec<Way>, Self::Error>;

    /// One changeset.
    async fn get_changeset(&self, id: u64) -> Result<Changeset, Self::Error>;

    /// Several changesets in one request.
    async fn list_changesets(&self, ids: &[u64]) -> Result<Vec<Changeset>, Self::Error>;
}

pub use memory::{InMemoryHistory, InMemoryHistoryError};
