//! Discovery-backed cluster access over `kube::Client`

use async_trait::async_trait;
use kube::{
    Client,
    api::{Api, DeleteParams, DynamicObject, Patch, PatchParams, PostParams},
    core::GroupVersionKind,
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
};
use serde_json::Value as JsonValue;
use stevedore_core::ResourceKey;

use super::ClusterAccess;
use crate::error::{KubeError, Result};

/// Field manager name for patch requests
const FIELD_MANAGER: &str = "stevedore";

/// Cluster access backed by a real API server
///
/// Kinds are resolved through cached discovery information; call
/// `refresh_discovery` after installing CRDs.
pub struct DynamicCluster {
    client: Client,
    discovery: Discovery,
}

impl DynamicCluster {
    /// Create a new DynamicCluster, running discovery once
    pub async fn new(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone())
            .run()
            .await
            .map_err(KubeError::Api)?;

        Ok(Self { client, discovery })
    }

    /// Create from existing client and discovery (for reuse)
    pub fn with_discovery(client: Client, discovery: Discovery) -> Self {
        Self { client, discovery }
    }

    /// Refresh the discovery cache
    pub async fn refresh_discovery(&mut self) -> Result<()> {
        self.discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .map_err(KubeError::Api)?;
        Ok(())
    }

    /// Resolve a resource key to its API metadata
    fn resolve(&self, key: &ResourceKey) -> Result<(ApiResource, ApiCapabilities)> {
        let gvk = GroupVersionKind {
            group: key.group.clone(),
            version: key.version.clone(),
            kind: key.kind.clone(),
        };

        self.discovery.resolve_gvk(&gvk).ok_or_else(|| {
            KubeError::InvalidManifest(format!(
                "unknown resource type: {}/{}",
                key.api_version(),
                key.kind
            ))
        })
    }

    /// Build an Api client for a key, honoring resource scope
    fn api(&self, namespace: &str, key: &ResourceKey) -> Result<Api<DynamicObject>> {
        let (api_resource, capabilities) = self.resolve(key)?;

        Ok(if capabilities.scope == Scope::Namespaced {
            Api::namespaced_with(self.client.clone(), namespace, &api_resource)
        } else {
            Api::all_with(self.client.clone(), &api_resource)
        })
    }
}

#[async_trait]
impl ClusterAccess for DynamicCluster {
    async fn get(&self, namespace: &str, key: &ResourceKey) -> Result<Option<DynamicObject>> {
        let api = self.api(namespace, key)?;
        api.get_opt(&key.name).await.map_err(KubeError::Api)
    }

    async fn create(
        &self,
        namespace: &str,
        key: &ResourceKey,
        obj: &DynamicObject,
    ) -> Result<DynamicObject> {
        let api = self.api(namespace, key)?;
        api.create(&PostParams::default(), obj)
            .await
            .map_err(KubeError::Api)
    }

    async fn patch(
        &self,
        namespace: &str,
        key: &ResourceKey,
        patch: &JsonValue,
    ) -> Result<DynamicObject> {
        let api = self.api(namespace, key)?;
        let mut params = PatchParams::default();
        params.field_manager = Some(FIELD_MANAGER.to_string());
        api.patch(&key.name, &params, &Patch::Merge(patch))
            .await
            .map_err(KubeError::Api)
    }

    async fn delete(&self, namespace: &str, key: &ResourceKey) -> Result<()> {
        let api = self.api(namespace, key)?;
        let params = DeleteParams {
            propagation_policy: Some(kube::api::PropagationPolicy::Background),
            ..Default::default()
        };

        match api.delete(&key.name, &params).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
            Err(e) => Err(KubeError::Api(e)),
        }
    }
}
