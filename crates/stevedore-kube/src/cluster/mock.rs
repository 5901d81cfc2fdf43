//! Mock cluster access for testing
//!
//! Stores objects in memory and records every operation, so tests can assert
//! on the exact create/patch/delete plan the engine issued without a running
//! cluster.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use kube::api::DynamicObject;
use serde_json::Value as JsonValue;
use stevedore_core::ResourceKey;

use super::ClusterAccess;
use crate::error::{KubeError, Result};
use crate::patch::apply_merge_patch;

/// Verb of a recorded cluster operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Create,
    Patch,
    Delete,
}

/// One recorded cluster operation
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterOp {
    pub verb: Verb,
    pub namespace: String,
    pub key: ResourceKey,
}

/// In-memory cluster for testing
#[derive(Clone, Default)]
pub struct MockCluster {
    /// Storage: (namespace, key) -> object
    objects: Arc<RwLock<HashMap<(String, ResourceKey), DynamicObject>>>,
    /// Every operation in issue order
    log: Arc<RwLock<Vec<ClusterOp>>>,
}

impl MockCluster {
    /// Create a new empty mock cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a live object without recording an operation
    pub fn seed(&self, namespace: &str, key: ResourceKey, obj: DynamicObject) {
        self.objects
            .write()
            .unwrap()
            .insert((namespace.to_string(), key), obj);
    }

    /// Fetch a stored object (for assertions)
    pub fn object(&self, namespace: &str, key: &ResourceKey) -> Option<DynamicObject> {
        self.objects
            .read()
            .unwrap()
            .get(&(namespace.to_string(), key.clone()))
            .cloned()
    }

    /// Number of stored objects
    pub fn object_count(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    /// All recorded operations in issue order
    pub fn operations(&self) -> Vec<ClusterOp> {
        self.log.read().unwrap().clone()
    }

    /// Recorded operations that mutate state (create/patch/delete)
    pub fn mutations(&self) -> Vec<ClusterOp> {
        self.operations()
            .into_iter()
            .filter(|op| op.verb != Verb::Get)
            .collect()
    }

    /// Clear the operation log
    pub fn reset_log(&self) {
        self.log.write().unwrap().clear();
    }

    fn record(&self, verb: Verb, namespace: &str, key: &ResourceKey) {
        self.log.write().unwrap().push(ClusterOp {
            verb,
            namespace: namespace.to_string(),
            key: key.clone(),
        });
    }
}

#[async_trait]
impl ClusterAccess for MockCluster {
    async fn get(&self, namespace: &str, key: &ResourceKey) -> Result<Option<DynamicObject>> {
        self.record(Verb::Get, namespace, key);
        Ok(self.object(namespace, key))
    }

    async fn create(
        &self,
        namespace: &str,
        key: &ResourceKey,
        obj: &DynamicObject,
    ) -> Result<DynamicObject> {
        self.record(Verb::Create, namespace, key);

        let mut objects = self.objects.write().unwrap();
        let slot = (namespace.to_string(), key.clone());
        if objects.contains_key(&slot) {
            return Err(KubeError::ResourceConflict {
                resource: key.to_string(),
                message: "already exists".to_string(),
            });
        }

        objects.insert(slot, obj.clone());
        Ok(obj.clone())
    }

    async fn patch(
        &self,
        namespace: &str,
        key: &ResourceKey,
        patch: &JsonValue,
    ) -> Result<DynamicObject> {
        self.record(Verb::Patch, namespace, key);

        let mut objects = self.objects.write().unwrap();
        let slot = (namespace.to_string(), key.clone());
        let obj = objects
            .get_mut(&slot)
            .ok_or_else(|| KubeError::InvalidManifest(format!("no such object: {key}")))?;

        let mut value = serde_json::to_value(&*obj)?;
        apply_merge_patch(&mut value, patch);
        *obj = serde_json::from_value(value)?;

        Ok(obj.clone())
    }

    async fn delete(&self, namespace: &str, key: &ResourceKey) -> Result<()> {
        self.record(Verb::Delete, namespace, key);
        self.objects
            .write()
            .unwrap()
            .remove(&(namespace.to_string(), key.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(kind: &str, name: &str) -> ResourceKey {
        ResourceKey {
            group: String::new(),
            version: "v1".to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    fn obj(kind: &str, name: &str) -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": kind,
            "metadata": {"name": name},
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let cluster = MockCluster::new();
        let k = key("ConfigMap", "cfg");
        cluster.create("ns", &k, &obj("ConfigMap", "cfg")).await.unwrap();

        let live = cluster.get("ns", &k).await.unwrap();
        assert!(live.is_some());
        assert_eq!(cluster.object_count(), 1);
    }

    #[tokio::test]
    async fn test_create_collision_is_conflict() {
        let cluster = MockCluster::new();
        let k = key("ConfigMap", "cfg");
        cluster.create("ns", &k, &obj("ConfigMap", "cfg")).await.unwrap();

        let err = cluster
            .create("ns", &k, &obj("ConfigMap", "cfg"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_patch_mutates_stored_object() {
        let cluster = MockCluster::new();
        let k = key("ConfigMap", "cfg");
        cluster.seed("ns", k.clone(), obj("ConfigMap", "cfg"));

        cluster
            .patch("ns", &k, &json!({"data": {"a": "1"}}))
            .await
            .unwrap();

        let live = cluster.object("ns", &k).unwrap();
        assert_eq!(live.data["data"]["a"], json!("1"));
    }

    #[tokio::test]
    async fn test_delete_absent_is_success() {
        let cluster = MockCluster::new();
        cluster.delete("ns", &key("ConfigMap", "gone")).await.unwrap();
        assert_eq!(cluster.mutations().len(), 1);
    }
}
