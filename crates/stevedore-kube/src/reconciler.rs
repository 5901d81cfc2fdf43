//! The apply step: one reconciliation pass for one release snapshot
//!
//! Classifies the transition against stored history, renders the target
//! resource set when needed, drives the reconciliation client (through the
//! carrier when the rendered documents carry hierarchy paths), and persists
//! the outcome. Every error funnels through a single record-failure-then-
//! propagate wrapper so the stored release always reflects the latest
//! attempt, even when the retry queue later drops the item.

use std::sync::Arc;

use async_trait::async_trait;
use stevedore_core::{
    OwnerIdentity, Release, ReleaseCondition, ResourceDoc, join_manifest, split_manifest,
};

use crate::client::{CreateOptions, DeleteOptions, ReconcileClient, UpdateOptions};
use crate::context::ExecContext;
use crate::dispatch::Applier;
use crate::error::{KubeError, Result};
use crate::judge::{ReleaseAction, classify};
use crate::render::Renderer;
use crate::storage::ReleaseStorage;
use crate::tree::{NodeHandler, PATH_ANNOTATION, ResourceTree, TraversalOrder};

/// Reconciles release snapshots into cluster state
pub struct ReleaseReconciler<S, R> {
    storage: Arc<S>,
    renderer: Arc<R>,
    client: ReconcileClient,
}

impl<S: ReleaseStorage, R: Renderer> ReleaseReconciler<S, R> {
    /// Create a reconciler over the given capabilities
    pub fn new(storage: Arc<S>, renderer: Arc<R>, client: ReconcileClient) -> Self {
        Self {
            storage,
            renderer,
            client,
        }
    }

    /// Run one reconciliation pass, recording a failure condition on error
    pub async fn apply_release(&self, ctx: &ExecContext, release: &Release) -> Result<()> {
        match self.reconcile(ctx, release).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let condition = ReleaseCondition::failure("ReconcileFailed", err.to_string());
                if let Err(record_err) = self
                    .storage
                    .record_condition(&release.namespace, &release.name, condition)
                    .await
                {
                    tracing::warn!(
                        release = %release.name,
                        error = %record_err,
                        "failed to record failure condition"
                    );
                }
                Err(err)
            }
        }
    }

    /// Tear down a deleted release: cluster resources, then stored history
    pub async fn delete_release(
        &self,
        ctx: &ExecContext,
        namespace: &str,
        name: &str,
    ) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(KubeError::Cancelled);
        }

        let release = self.storage.current(namespace, name).await?;
        let docs = split_manifest(&release.status.manifest)?;

        self.client
            .delete(
                namespace,
                &docs,
                &DeleteOptions {
                    owner_filter: owner_filter(&release),
                    ignore_kinds: Vec::new(),
                },
            )
            .await?;

        self.storage.delete(namespace, name).await
    }

    async fn reconcile(&self, ctx: &ExecContext, release: &Release) -> Result<()> {
        if release.spec.suspend {
            tracing::debug!(release = %release.name, "release suspended, skipping");
            return Ok(());
        }
        if ctx.is_cancelled() {
            return Err(KubeError::Cancelled);
        }

        let histories = self
            .storage
            .histories(&release.namespace, &release.name)
            .await?;

        match classify(&histories, None, release) {
            ReleaseAction::None => {
                tracing::debug!(release = %release.name, "nothing to apply");
                Ok(())
            }
            ReleaseAction::Create => self.create_release(ctx, release).await,
            ReleaseAction::Rollback => self.rollback_release(ctx, release).await,
            ReleaseAction::Update => self.update_release(ctx, release).await,
        }
    }

    async fn create_release(&self, ctx: &ExecContext, release: &Release) -> Result<()> {
        let docs = self
            .renderer
            .render(
                &release.namespace,
                &release.name,
                1,
                &release.spec.template,
                &release.spec.config,
            )
            .await?;
        if ctx.is_cancelled() {
            return Err(KubeError::Cancelled);
        }

        self.install_docs(ctx, &release.namespace, &docs, owner_filter(release))
            .await?;

        let mut applied = release.clone();
        applied.status.version = 1;
        applied.status.manifest = join_manifest(&docs);
        applied.push_condition(ReleaseCondition::available("Created", "version 1 applied"));
        self.storage.update(&applied).await?;

        tracing::debug!(release = %release.name, "release created at version 1");
        Ok(())
    }

    async fn update_release(&self, ctx: &ExecContext, release: &Release) -> Result<()> {
        let previous_docs = split_manifest(&release.status.manifest)?;
        let next_version = release.status.version + 1;

        let target_docs = self
            .renderer
            .render(
                &release.namespace,
                &release.name,
                next_version,
                &release.spec.template,
                &release.spec.config,
            )
            .await?;
        if ctx.is_cancelled() {
            return Err(KubeError::Cancelled);
        }

        self.client
            .update(
                &release.namespace,
                &previous_docs,
                &target_docs,
                &UpdateOptions {
                    owner_filter: owner_filter(release),
                },
            )
            .await?;

        let mut applied = release.clone();
        applied.status.version = next_version;
        applied.status.manifest = join_manifest(&target_docs);
        applied.push_condition(ReleaseCondition::available(
            "Updated",
            format!("version {} applied", next_version),
        ));
        self.storage.update(&applied).await?;

        tracing::debug!(release = %release.name, version = next_version, "release updated");
        Ok(())
    }

    async fn rollback_release(&self, ctx: &ExecContext, release: &Release) -> Result<()> {
        let Some(target) = release.spec.rollback_to else {
            return Err(KubeError::Coordination(format!(
                "rollback selected for release '{}' without a target",
                release.name
            )));
        };

        let history = self
            .storage
            .history_at(&release.namespace, &release.name, target.version)
            .await?
            .ok_or_else(|| KubeError::RollbackNotPossible {
                name: release.name.clone(),
                reason: format!("version {} not found in history", target.version),
            })?;

        let current_docs = split_manifest(&release.status.manifest)?;
        let target_docs = split_manifest(&history.manifest)?;
        if ctx.is_cancelled() {
            return Err(KubeError::Cancelled);
        }

        self.client
            .update(
                &release.namespace,
                &current_docs,
                &target_docs,
                &UpdateOptions {
                    owner_filter: owner_filter(release),
                },
            )
            .await?;

        self.storage
            .rollback_to(&release.namespace, &release.name, target.version)
            .await?;
        self.storage
            .record_condition(
                &release.namespace,
                &release.name,
                ReleaseCondition::available(
                    "RolledBack",
                    format!("rolled back to version {}", target.version),
                ),
            )
            .await?;

        tracing::debug!(
            release = %release.name,
            version = target.version,
            "release rolled back"
        );
        Ok(())
    }

    /// Install rendered documents, through the carrier when they carry paths
    async fn install_docs(
        &self,
        ctx: &ExecContext,
        namespace: &str,
        docs: &[ResourceDoc],
        owner_filter: Vec<OwnerIdentity>,
    ) -> Result<()> {
        let options = CreateOptions { owner_filter };

        if docs.iter().any(|d| d.annotation(PATH_ANNOTATION).is_some()) {
            // Hook-style install: a parent gates its children
            let tree = ResourceTree::build(docs)?;
            let handler = Arc::new(InstallHandler {
                client: self.client.clone(),
                namespace: namespace.to_string(),
                options,
            });
            tree.execute(ctx, TraversalOrder::Reversed, handler).await
        } else {
            self.client.create(namespace, docs, &options).await
        }
    }
}

fn owner_filter(release: &Release) -> Vec<OwnerIdentity> {
    vec![release.owner_identity()]
}

/// Creates one tree node's documents
struct InstallHandler {
    client: ReconcileClient,
    namespace: String,
    options: CreateOptions,
}

#[async_trait]
impl NodeHandler for InstallHandler {
    async fn handle(&self, ctx: &ExecContext, _path: &str, resources: &[ResourceDoc]) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(KubeError::Cancelled);
        }
        if resources.is_empty() {
            return Ok(());
        }
        self.client
            .create(&self.namespace, resources, &self.options)
            .await
    }
}

#[async_trait]
impl<S, R> Applier for ReleaseReconciler<S, R>
where
    S: ReleaseStorage + 'static,
    R: Renderer + 'static,
{
    async fn apply(&self, ctx: &ExecContext, release: &Release) -> Result<()> {
        self.apply_release(ctx, release).await
    }
}
