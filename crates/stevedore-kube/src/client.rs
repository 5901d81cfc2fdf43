//! Reconciliation client: diff-based create/patch/delete plan execution
//!
//! Given a namespace and two resource-document sets (or one set for
//! create/delete), the client computes the minimal plan and executes it
//! against the cluster, respecting ownership and installation order. Every
//! operation is idempotent; the first failing object aborts the remainder of
//! the call and partially-applied state is left for the next reconciliation
//! pass to converge.

use std::collections::HashMap;
use std::sync::Arc;

use kube::api::DynamicObject;
use stevedore_core::{OwnerIdentity, ResourceDoc};

use crate::cluster::ClusterAccess;
use crate::error::{KubeError, Result};
use crate::order::{sort_for_install, sort_for_uninstall};
use crate::owner::{owns, stamp_owners};
use crate::patch::{is_empty_patch, merge_patch};
use crate::registry::TouchUpRegistry;

/// Options for `ReconcileClient::get`
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Owners a live object must carry to be returned
    pub owner_filter: Vec<OwnerIdentity>,
    /// Skip missing objects instead of failing
    pub ignore_missing: bool,
}

/// Options for `ReconcileClient::create`
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Owners stamped onto created objects and accepted for re-adoption
    pub owner_filter: Vec<OwnerIdentity>,
}

/// Options for `ReconcileClient::update`
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Owners required for every mutated object
    pub owner_filter: Vec<OwnerIdentity>,
}

/// Options for `ReconcileClient::delete`
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    /// Owners a live object must carry to be deleted
    pub owner_filter: Vec<OwnerIdentity>,
    /// Kinds to leave untouched
    pub ignore_kinds: Vec<String>,
}

/// Namespace-scoped reconciliation operations over a cluster
#[derive(Clone)]
pub struct ReconcileClient {
    cluster: Arc<dyn ClusterAccess>,
    registry: TouchUpRegistry,
}

impl ReconcileClient {
    /// Create a client with the built-in touch-up registry
    pub fn new(cluster: Arc<dyn ClusterAccess>) -> Self {
        Self::with_registry(cluster, TouchUpRegistry::with_defaults())
    }

    /// Create a client with an explicit touch-up registry
    pub fn with_registry(cluster: Arc<dyn ClusterAccess>, registry: TouchUpRegistry) -> Self {
        Self { cluster, registry }
    }

    /// Resolve documents to live objects
    ///
    /// Missing objects are skipped when `ignore_missing` is set, otherwise
    /// they fail the call. Objects not owned by the filter are filtered out.
    pub async fn get(
        &self,
        namespace: &str,
        docs: &[ResourceDoc],
        options: &GetOptions,
    ) -> Result<Vec<DynamicObject>> {
        let mut live = Vec::with_capacity(docs.len());

        for doc in docs {
            let ns = doc.namespace.as_deref().unwrap_or(namespace);
            match self.cluster.get(ns, &doc.key()).await? {
                Some(obj) => {
                    if owns(&options.owner_filter, &obj) {
                        live.push(obj);
                    }
                }
                None if options.ignore_missing => continue,
                None => {
                    return Err(KubeError::ObjectNotFound {
                        resource: doc.display_name(),
                    });
                }
            }
        }

        Ok(live)
    }

    /// Create documents in installation order
    ///
    /// An existing object already owned by the filter is skipped, which makes
    /// re-running a crashed apply safe. An existing object owned by someone
    /// else is not adopted; the create is attempted anyway and the collision
    /// surfaces as the underlying create error.
    pub async fn create(
        &self,
        namespace: &str,
        docs: &[ResourceDoc],
        options: &CreateOptions,
    ) -> Result<()> {
        let mut sorted = docs.to_vec();
        sort_for_install(&mut sorted);

        for doc in &sorted {
            self.create_single(namespace, doc, &options.owner_filter)
                .await?;
        }

        Ok(())
    }

    /// Reconcile an original document set into a target set
    ///
    /// The symmetric diff keyed by `(group, version, kind, name)` partitions
    /// the work: keys only in the target are created, keys in both are
    /// patched, keys only in the original are deleted. Phases run in the
    /// fixed order create, patch, delete so that new dependencies exist
    /// before being referenced and old resources are removed last.
    pub async fn update(
        &self,
        namespace: &str,
        originals: &[ResourceDoc],
        targets: &[ResourceDoc],
        options: &UpdateOptions,
    ) -> Result<()> {
        let original_by_key: HashMap<_, _> = originals.iter().map(|d| (d.key(), d)).collect();
        let target_keys: std::collections::HashSet<_> = targets.iter().map(|d| d.key()).collect();

        let mut to_create = Vec::new();
        let mut to_patch = Vec::new();
        for target in targets {
            match original_by_key.get(&target.key()) {
                Some(original) => to_patch.push((*original, target)),
                None => to_create.push(target.clone()),
            }
        }
        let to_delete: Vec<ResourceDoc> = originals
            .iter()
            .filter(|d| !target_keys.contains(&d.key()))
            .cloned()
            .collect();

        self.create(
            namespace,
            &to_create,
            &CreateOptions {
                owner_filter: options.owner_filter.clone(),
            },
        )
        .await?;

        for (original, target) in &to_patch {
            self.patch_single(namespace, original, target, &options.owner_filter)
                .await?;
        }

        self.delete(
            namespace,
            &to_delete,
            &DeleteOptions {
                owner_filter: options.owner_filter.clone(),
                ignore_kinds: Vec::new(),
            },
        )
        .await
    }

    /// Delete documents in uninstallation order
    ///
    /// Ignored kinds and missing objects are skipped; so are live objects the
    /// filter does not own (conservative: never delete what belongs to
    /// someone else). Deletion cascades in the background.
    pub async fn delete(
        &self,
        namespace: &str,
        docs: &[ResourceDoc],
        options: &DeleteOptions,
    ) -> Result<()> {
        let mut sorted = docs.to_vec();
        sort_for_uninstall(&mut sorted);

        for doc in &sorted {
            if options.ignore_kinds.iter().any(|k| *k == doc.kind) {
                tracing::debug!(resource = %doc.display_name(), "delete skipped: ignored kind");
                continue;
            }

            let ns = doc.namespace.as_deref().unwrap_or(namespace);
            let key = doc.key();

            let live = match self.cluster.get(ns, &key).await? {
                Some(obj) => obj,
                None => continue,
            };

            if !owns(&options.owner_filter, &live) {
                tracing::debug!(resource = %doc.display_name(), "delete skipped: not owned");
                continue;
            }

            self.cluster.delete(ns, &key).await?;
        }

        Ok(())
    }

    async fn create_single(
        &self,
        namespace: &str,
        doc: &ResourceDoc,
        owner_filter: &[OwnerIdentity],
    ) -> Result<()> {
        let ns = doc.namespace.as_deref().unwrap_or(namespace);
        let key = doc.key();

        if let Some(live) = self.cluster.get(ns, &key).await? {
            if owns(owner_filter, &live) {
                tracing::debug!(resource = %doc.display_name(), "create skipped: already owned");
                return Ok(());
            }
        }

        let mut obj: DynamicObject = serde_json::from_value(doc.value.clone())?;
        stamp_owners(&mut obj, owner_filter);
        self.registry.before_create(&doc.kind, &mut obj);

        self.cluster.create(ns, &key, &obj).await?;
        Ok(())
    }

    async fn patch_single(
        &self,
        namespace: &str,
        original: &ResourceDoc,
        target: &ResourceDoc,
        owner_filter: &[OwnerIdentity],
    ) -> Result<()> {
        let ns = target.namespace.as_deref().unwrap_or(namespace);
        let key = target.key();

        let live = match self.cluster.get(ns, &key).await? {
            Some(obj) => obj,
            None => {
                // The previously applied object is gone; recreate instead of
                // failing forever so reconciliation stays convergent.
                tracing::warn!(resource = %target.display_name(), "patch target missing, recreating");
                return self.create_single(namespace, target, owner_filter).await;
            }
        };

        if !owns(owner_filter, &live) {
            return Err(KubeError::Unauthorized {
                resource: target.display_name(),
            });
        }

        let mut patch = merge_patch(&original.value, &target.value);
        self.registry.before_patch(&target.kind, &live, &mut patch);

        if is_empty_patch(&patch) {
            tracing::debug!(resource = %target.display_name(), "patch skipped: no changes");
            return Ok(());
        }

        self.cluster.patch(ns, &key, &patch).await?;
        Ok(())
    }
}
