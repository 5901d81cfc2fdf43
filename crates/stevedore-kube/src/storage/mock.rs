//! Mock release storage for testing
//!
//! Stores releases and history snapshots in memory, useful for unit tests
//! without a persistence backend. Mirrors the backend contract: a
//! version-bumping update appends a history snapshot, rollback restores
//! spec and status from the target entry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use stevedore_core::{Release, ReleaseCondition, ReleaseHistory};

use super::{ReleaseStorage, StatusPatch};
use crate::error::{KubeError, Result};

/// Counts of operations performed, for testing assertions
#[derive(Debug, Default, Clone)]
pub struct StorageCounts {
    pub reads: usize,
    pub updates: usize,
    pub patches: usize,
    pub rollbacks: usize,
    pub deletes: usize,
    pub conditions: usize,
}

type Key = (String, String);

/// In-memory release storage for testing
#[derive(Clone, Default)]
pub struct MockReleaseStorage {
    releases: Arc<RwLock<HashMap<Key, Release>>>,
    histories: Arc<RwLock<HashMap<Key, Vec<ReleaseHistory>>>>,
    counts: Arc<RwLock<StorageCounts>>,
}

impl MockReleaseStorage {
    /// Create a new empty mock storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with a pre-populated release
    pub fn with_release(release: Release) -> Self {
        let storage = Self::new();
        storage.seed(release);
        storage
    }

    /// Seed a release, fabricating a uid if the release has none
    pub fn seed(&self, mut release: Release) {
        if release.uid.is_empty() {
            release.uid = format!("mock-uid-{}", release.name);
        }
        self.releases
            .write()
            .unwrap()
            .insert(key_of(&release), release);
    }

    /// Seed a history entry directly
    pub fn seed_history(&self, namespace: &str, name: &str, history: ReleaseHistory) {
        let mut histories = self.histories.write().unwrap();
        let entries = histories
            .entry((namespace.to_string(), name.to_string()))
            .or_default();
        entries.push(history);
        entries.sort_by_key(|h| h.version);
    }

    /// Get operation counts for assertions
    pub fn counts(&self) -> StorageCounts {
        self.counts.read().unwrap().clone()
    }

    /// Fetch the stored release without counting a read
    pub fn stored(&self, namespace: &str, name: &str) -> Option<Release> {
        self.releases
            .read()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    fn not_found(namespace: &str, name: &str) -> KubeError {
        KubeError::ReleaseNotFound {
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }
}

fn key_of(release: &Release) -> Key {
    (release.namespace.clone(), release.name.clone())
}

#[async_trait]
impl ReleaseStorage for MockReleaseStorage {
    async fn current(&self, namespace: &str, name: &str) -> Result<Release> {
        self.counts.write().unwrap().reads += 1;
        self.stored(namespace, name)
            .ok_or_else(|| Self::not_found(namespace, name))
    }

    async fn update(&self, release: &Release) -> Result<Release> {
        self.counts.write().unwrap().updates += 1;

        if release.status.version > 0 {
            let mut histories = self.histories.write().unwrap();
            let entries = histories.entry(key_of(release)).or_default();
            if !entries.iter().any(|h| h.version == release.status.version) {
                entries.push(ReleaseHistory::for_release(release, "applied"));
                entries.sort_by_key(|h| h.version);
            }
        }

        self.releases
            .write()
            .unwrap()
            .insert(key_of(release), release.clone());
        Ok(release.clone())
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        patch: StatusPatch,
    ) -> Result<Release> {
        self.counts.write().unwrap().patches += 1;

        let mut releases = self.releases.write().unwrap();
        let release = releases
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| Self::not_found(namespace, name))?;

        if let Some(version) = patch.version {
            release.status.version = version;
        }
        if let Some(manifest) = patch.manifest {
            release.status.manifest = manifest;
        }

        Ok(release.clone())
    }

    async fn rollback_to(&self, namespace: &str, name: &str, version: u32) -> Result<Release> {
        self.counts.write().unwrap().rollbacks += 1;

        let target = {
            let histories = self.histories.read().unwrap();
            histories
                .get(&(namespace.to_string(), name.to_string()))
                .and_then(|entries| entries.iter().find(|h| h.version == version))
                .cloned()
        }
        .ok_or_else(|| KubeError::RollbackNotPossible {
            name: name.to_string(),
            reason: format!("version {} not found in history", version),
        })?;

        let mut releases = self.releases.write().unwrap();
        let release = releases
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| Self::not_found(namespace, name))?;

        release.spec.template = target.template.clone();
        release.spec.config = target.config.clone();
        release.spec.rollback_to = None;
        release.status.version = target.version;
        release.status.manifest = target.manifest.clone();

        Ok(release.clone())
    }

    async fn history_at(
        &self,
        namespace: &str,
        name: &str,
        version: u32,
    ) -> Result<Option<ReleaseHistory>> {
        self.counts.write().unwrap().reads += 1;
        Ok(self
            .histories
            .read()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .and_then(|entries| entries.iter().find(|h| h.version == version))
            .cloned())
    }

    async fn histories(&self, namespace: &str, name: &str) -> Result<Vec<ReleaseHistory>> {
        self.counts.write().unwrap().reads += 1;
        Ok(self
            .histories
            .read()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.counts.write().unwrap().deletes += 1;
        let key = (namespace.to_string(), name.to_string());
        self.releases.write().unwrap().remove(&key);
        self.histories.write().unwrap().remove(&key);
        Ok(())
    }

    async fn record_condition(
        &self,
        namespace: &str,
        name: &str,
        condition: ReleaseCondition,
    ) -> Result<()> {
        self.counts.write().unwrap().conditions += 1;

        let mut releases = self.releases.write().unwrap();
        let release = releases
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| Self::not_found(namespace, name))?;
        release.push_condition(condition);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stevedore_core::{ReleaseSpec, ReleaseStatus, Values};

    fn release(version: u32) -> Release {
        Release {
            name: "web".to_string(),
            namespace: "demo".to_string(),
            uid: "uid-1".to_string(),
            spec: ReleaseSpec {
                template: b"tpl".to_vec(),
                config: Values::from_json(r#"{"a": 1}"#).unwrap(),
                rollback_to: None,
                suspend: false,
            },
            status: ReleaseStatus {
                version,
                manifest: format!("manifest-v{}", version),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_current_not_found() {
        let storage = MockReleaseStorage::new();
        let err = storage.current("demo", "missing").await.unwrap_err();
        assert!(matches!(err, KubeError::ReleaseNotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_appends_history_once_per_version() {
        let storage = MockReleaseStorage::new();
        storage.update(&release(1)).await.unwrap();
        storage.update(&release(1)).await.unwrap();
        storage.update(&release(2)).await.unwrap();

        let histories = storage.histories("demo", "web").await.unwrap();
        let versions: Vec<u32> = histories.iter().map(|h| h.version).collect();
        assert_eq!(versions, [1, 2]);
        assert_eq!(histories[0].name, "web-v1");
    }

    #[tokio::test]
    async fn test_rollback_restores_spec_and_status() {
        let storage = MockReleaseStorage::new();
        storage.update(&release(1)).await.unwrap();

        let mut upgraded = release(2);
        upgraded.spec.config = Values::from_json(r#"{"a": 2}"#).unwrap();
        storage.update(&upgraded).await.unwrap();

        let restored = storage.rollback_to("demo", "web", 1).await.unwrap();
        assert_eq!(restored.status.version, 1);
        assert_eq!(restored.status.manifest, "manifest-v1");
        assert_eq!(restored.spec.config, Values::from_json(r#"{"a": 1}"#).unwrap());
        assert!(restored.spec.rollback_to.is_none());

        // History is untouched by a rollback
        let histories = storage.histories("demo", "web").await.unwrap();
        assert_eq!(histories.len(), 2);
    }

    #[tokio::test]
    async fn test_rollback_to_unknown_version() {
        let storage = MockReleaseStorage::with_release(release(1));
        let err = storage.rollback_to("demo", "web", 9).await.unwrap_err();
        assert!(matches!(err, KubeError::RollbackNotPossible { .. }));
    }

    #[tokio::test]
    async fn test_delete_removes_release_and_history() {
        let storage = MockReleaseStorage::new();
        storage.update(&release(1)).await.unwrap();
        storage.delete("demo", "web").await.unwrap();

        assert!(storage.stored("demo", "web").is_none());
        assert!(storage.histories("demo", "web").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_condition_is_bounded() {
        let storage = MockReleaseStorage::with_release(release(1));
        for i in 0..7 {
            storage
                .record_condition(
                    "demo",
                    "web",
                    ReleaseCondition::available("Applied", format!("v{}", i)),
                )
                .await
                .unwrap();
        }

        let stored = storage.stored("demo", "web").unwrap();
        assert_eq!(stored.status.conditions.len(), stevedore_core::MAX_CONDITIONS);
    }

    #[tokio::test]
    async fn test_patch_status() {
        let storage = MockReleaseStorage::with_release(release(1));
        let patched = storage
            .patch_status(
                "demo",
                "web",
                StatusPatch {
                    version: Some(4),
                    manifest: Some("m4".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(patched.status.version, 4);
        assert_eq!(patched.status.manifest, "m4");
        assert_eq!(storage.counts().patches, 1);
    }
}
