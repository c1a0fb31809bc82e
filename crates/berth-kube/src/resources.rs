//! Server-side apply of rendered manifests
//!
//! Resource types are resolved through API discovery, so any kind the
//! cluster serves can be applied without compile-time type knowledge.

use k8s_openapi::api::core::v1::Namespace;
use kube::{
    Client,
    api::{Api, DynamicObject, Patch, PatchParams},
    core::GroupVersionKind,
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
};
use serde_json::json;

use crate::error::{KubeError, Result};
use crate::manifest::Manifest;

/// Field manager name for Server-Side Apply
pub const FIELD_MANAGER: &str = "berth";

/// Applies manifests with Server-Side Apply
pub struct ResourceManager {
    client: Client,
    discovery: Discovery,
}

impl ResourceManager {
    /// Create a manager, running API discovery once
    pub async fn new(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone()).run().await?;
        Ok(Self { client, discovery })
    }

    /// Create the namespace if missing; existing namespaces are left as they are
    pub async fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        if api.get_opt(namespace).await?.is_some() {
            return Ok(());
        }

        let object = json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": { "name": namespace },
        });
        api.patch(namespace, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(&object))
            .await?;
        tracing::info!(%namespace, "created namespace");
        Ok(())
    }

    /// Apply manifests in order, stopping at the first rejection
    ///
    /// Returns the applied resources as `Kind/name`.
    pub async fn apply(&self, manifests: &[Manifest], namespace: &str) -> Result<Vec<String>> {
        let mut applied = Vec::with_capacity(manifests.len());

        for manifest in manifests {
            let (api_resource, capabilities) = self.resolve(manifest)?;
            let api = self.api_for(&api_resource, &capabilities, manifest, namespace);

            let mut object = manifest.object.clone();
            if capabilities.scope == Scope::Namespaced && object.metadata.namespace.is_none() {
                object.metadata.namespace = Some(namespace.to_string());
            }

            let mut params = PatchParams::apply(FIELD_MANAGER);
            params.force = true;

            api.patch(manifest.name(), &params, &Patch::Apply(&object))
                .await
                .map_err(|e| KubeError::ApplyFailed {
                    resource: manifest.display_name(),
                    message: e.to_string(),
                })?;

            tracing::debug!(resource = %manifest.display_name(), "applied");
            applied.push(manifest.display_name());
        }

        Ok(applied)
    }

    fn resolve(&self, manifest: &Manifest) -> Result<(ApiResource, ApiCapabilities)> {
        let gvk = gvk_of(manifest);
        self.discovery
            .resolve_gvk(&gvk)
            .ok_or_else(|| KubeError::UnknownResource {
                api_version: manifest.api_version().to_string(),
                kind: manifest.kind().to_string(),
            })
    }

    fn api_for(
        &self,
        api_resource: &ApiResource,
        capabilities: &ApiCapabilities,
        manifest: &Manifest,
        namespace: &str,
    ) -> Api<DynamicObject> {
        if capabilities.scope == Scope::Namespaced {
            let ns = manifest
                .object
                .metadata
                .namespace
                .as_deref()
                .unwrap_or(namespace);
            Api::namespaced_with(self.client.clone(), ns, api_resource)
        } else {
            Api::all_with(self.client.clone(), api_resource)
        }
    }
}

/// Group-Version-Kind of a manifest (`v1` has an empty group)
pub fn gvk_of(manifest: &Manifest) -> GroupVersionKind {
    let (group, version) = match manifest.api_version().split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", manifest.api_version()),
    };
    GroupVersionKind::gvk(group, version, manifest.kind())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn manifest(api_version: &str, kind: &str) -> Manifest {
        let rendered = BTreeMap::from([(
            "x.yaml".to_string(),
            format!("apiVersion: {api_version}\nkind: {kind}\nmetadata:\n  name: x\n"),
        )]);
        crate::manifest::parse_manifests(&rendered)
            .unwrap()
            .remove(0)
    }

    #[test]
    fn test_gvk_core() {
        let gvk = gvk_of(&manifest("v1", "ConfigMap"));
        assert_eq!(gvk.group, "");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "ConfigMap");
    }

    #[test]
    fn test_gvk_grouped() {
        let gvk = gvk_of(&manifest("networking.k8s.io/v1", "Ingress"));
        assert_eq!(gvk.group, "networking.k8s.io");
        assert_eq!(gvk.version, "v1");
    }
}
