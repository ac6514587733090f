//! # Kubernetes Store
//!
//! [`ObjectStore`] backed by the API server through dynamic APIs.
//! API resources and their scope are discovered once per kind and cached.

use super::{type_meta, ObjectStore, StoreError};
use crate::constants::CONTROLLER_NAME;
use async_trait::async_trait;
use kube::api::{Api, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::core::GroupVersionKind;
use kube::discovery::{self, ApiResource, Scope};
use kube::Client;
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Clone, Debug)]
struct ResolvedKind {
    resource: ApiResource,
    namespaced: bool,
}

pub struct KubeStore {
    client: Client,
    kinds: RwLock<HashMap<String, ResolvedKind>>,
}

impl fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            kinds: RwLock::new(HashMap::new()),
        }
    }

    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<ResolvedKind, StoreError> {
        let key = format!("{}/{}", gvk.api_version(), gvk.kind);
        if let Some(kind) = self.kinds.read().await.get(&key) {
            return Ok(kind.clone());
        }

        let (resource, caps) = discovery::pinned_kind(&self.client, gvk)
            .await
            .map_err(|e| StoreError::Api(format!("failed to discover {key}: {e}")))?;
        let kind = ResolvedKind {
            resource,
            namespaced: caps.scope == Scope::Namespaced,
        };
        debug!("Discovered {} (namespaced: {})", key, kind.namespaced);
        self.kinds.write().await.insert(key, kind.clone());
        Ok(kind)
    }

    async fn api(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
    ) -> Result<Api<DynamicObject>, StoreError> {
        let kind = self.resolve(gvk).await?;
        Ok(match namespace {
            Some(ns) if kind.namespaced => {
                Api::namespaced_with(self.client.clone(), ns, &kind.resource)
            }
            _ => Api::all_with(self.client.clone(), &kind.resource),
        })
    }
}

fn map_kube_error(gvk: &GroupVersionKind, name: &str, error: kube::Error) -> StoreError {
    match error {
        kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound {
            kind: gvk.kind.clone(),
            name: name.to_string(),
        },
        kube::Error::Api(api_err) if api_err.code == 409 && api_err.reason == "AlreadyExists" => {
            StoreError::AlreadyExists {
                kind: gvk.kind.clone(),
                name: name.to_string(),
            }
        }
        kube::Error::Api(api_err) if api_err.code == 409 => StoreError::Conflict {
            kind: gvk.kind.clone(),
            name: name.to_string(),
            message: api_err.message,
        },
        other => StoreError::Api(other.to_string()),
    }
}

/// Plain merge patch attributed to this controller; not a server-side apply
fn status_patch_params() -> PatchParams {
    PatchParams {
        field_manager: Some(CONTROLLER_NAME.to_string()),
        ..PatchParams::default()
    }
}

/// Objects returned by the API carry no TypeMeta in lists
fn with_types(mut obj: DynamicObject, gvk: &GroupVersionKind) -> DynamicObject {
    if obj.types.is_none() {
        obj.types = Some(type_meta(gvk));
    }
    obj
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>, StoreError> {
        let api = self.api(gvk, namespace).await?;
        api.get_opt(name)
            .await
            .map(|obj| obj.map(|o| with_types(o, gvk)))
            .map_err(|e| map_kube_error(gvk, name, e))
    }

    async fn create(
        &self,
        gvk: &GroupVersionKind,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        let api = self.api(gvk, obj.metadata.namespace.as_deref()).await?;
        api.create(&PostParams::default(), obj)
            .await
            .map(|o| with_types(o, gvk))
            .map_err(|e| map_kube_error(gvk, &name, e))
    }

    async fn update(
        &self,
        gvk: &GroupVersionKind,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        let api = self.api(gvk, obj.metadata.namespace.as_deref()).await?;
        api.replace(&name, &PostParams::default(), obj)
            .await
            .map(|o| with_types(o, gvk))
            .map_err(|e| map_kube_error(gvk, &name, e))
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let api = self.api(gvk, namespace).await?;
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        api.list(&params)
            .await
            .map(|list| list.items.into_iter().map(|o| with_types(o, gvk)).collect())
            .map_err(|e| map_kube_error(gvk, "", e))
    }

    async fn update_status(
        &self,
        gvk: &GroupVersionKind,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        let api = self.api(gvk, obj.metadata.namespace.as_deref()).await?;
        let status = obj.data.get("status").cloned().unwrap_or_else(|| json!({}));
        api.patch_status(
            &name,
            &status_patch_params(),
            &Patch::Merge(json!({ "status": status })),
        )
        .await
        .map(|o| with_types(o, gvk))
        .map_err(|e| map_kube_error(gvk, &name, e))
    }
}
