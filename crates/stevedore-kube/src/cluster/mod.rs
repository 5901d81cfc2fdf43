//! Cluster access capability
//!
//! The engine talks to the cluster through a narrow per-(group,version,kind)
//! verb set over `DynamicObject`. The production implementation resolves
//! kinds through API discovery; the in-memory mock backs the test suite
//! without a cluster.

mod dynamic;
mod mock;

pub use dynamic::DynamicCluster;
pub use mock::{ClusterOp, MockCluster, Verb};

use async_trait::async_trait;
use kube::api::DynamicObject;
use serde_json::Value as JsonValue;
use stevedore_core::ResourceKey;

use crate::error::Result;

/// Dynamic per-kind cluster client
///
/// Implementations must be Send + Sync for use across async tasks. `delete`
/// is idempotent: deleting an absent object is success.
#[async_trait]
pub trait ClusterAccess: Send + Sync {
    /// Fetch a live object by kind and name; `None` when absent
    async fn get(&self, namespace: &str, key: &ResourceKey) -> Result<Option<DynamicObject>>;

    /// Create an object
    async fn create(
        &self,
        namespace: &str,
        key: &ResourceKey,
        obj: &DynamicObject,
    ) -> Result<DynamicObject>;

    /// Apply a JSON merge patch to an existing object
    async fn patch(
        &self,
        namespace: &str,
        key: &ResourceKey,
        patch: &JsonValue,
    ) -> Result<DynamicObject>;

    /// Delete an object with background cascade propagation
    async fn delete(&self, namespace: &str, key: &ResourceKey) -> Result<()>;
}
