//! Release storage capability
//!
//! The engine persists version bumps, manifests, and condition transitions
//! through this trait and never talks to a storage transport directly. A
//! version-bumping update implies a new history snapshot on the backend;
//! the engine never mutates an existing history entry.

mod mock;

pub use mock::{MockReleaseStorage, StorageCounts};

use async_trait::async_trait;
use stevedore_core::{Release, ReleaseCondition, ReleaseHistory};

use crate::error::Result;

/// Status fields the engine patches without rewriting the whole release
#[derive(Debug, Clone, Default)]
pub struct StatusPatch {
    /// New recorded version
    pub version: Option<u32>,
    /// New last-applied manifest
    pub manifest: Option<String>,
}

/// Persistence backend for releases and their history
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait ReleaseStorage: Send + Sync {
    /// The current stored release
    async fn current(&self, namespace: &str, name: &str) -> Result<Release>;

    /// Persist a release; a bumped version appends a history snapshot
    async fn update(&self, release: &Release) -> Result<Release>;

    /// Patch status fields of the stored release
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        patch: StatusPatch,
    ) -> Result<Release>;

    /// Restore the release to a history version, clearing the rollback
    /// request; the restored release keeps the target's version number
    async fn rollback_to(&self, namespace: &str, name: &str, version: u32) -> Result<Release>;

    /// The history entry recorded for a version, if any
    async fn history_at(
        &self,
        namespace: &str,
        name: &str,
        version: u32,
    ) -> Result<Option<ReleaseHistory>>;

    /// All history entries, ordered by version
    async fn histories(&self, namespace: &str, name: &str) -> Result<Vec<ReleaseHistory>>;

    /// Delete the release and all of its history
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;

    /// Append a condition to the stored release's bounded condition log
    async fn record_condition(
        &self,
        namespace: &str,
        name: &str,
        condition: ReleaseCondition,
    ) -> Result<()>;
}
