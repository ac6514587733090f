//! # Object Store
//!
//! Narrow interface over the cluster's object store.
//!
//! Reconcilers never talk to the API server directly; they go through a
//! [`Session`], which binds an [`ObjectStore`] to the pass's cancellation
//! token so every call aborts promptly on shutdown.
//!
//! - [`KubeStore`] is backed by a live `kube::Client`
//! - [`MemoryStore`] keeps objects in memory and enforces resource versions, for tests

mod kube_store;
mod memory;

pub use kube_store::KubeStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::core::{GroupVersionKind, TypeMeta};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors raised by the object store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },

    /// The presented resource version is stale
    #[error("conflict writing {kind} {name}: {message}")]
    Conflict {
        kind: String,
        name: String,
        message: String,
    },

    #[error("object has no apiVersion/kind")]
    MissingTypeMeta,

    #[error("store operation cancelled")]
    Cancelled,

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("API error: {0}")]
    Api(String),
}

/// Persistence for arbitrary objects, addressed by kind, namespace and name
///
/// `namespace` is ignored for cluster-scoped kinds.
#[async_trait]
pub trait ObjectStore: Send + Sync + fmt::Debug {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>, StoreError>;

    async fn create(
        &self,
        gvk: &GroupVersionKind,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    /// Replace an object; `metadata.resourceVersion` must match the stored one
    async fn update(
        &self,
        gvk: &GroupVersionKind,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>, StoreError>;

    /// Write only the `status` of an object
    async fn update_status(
        &self,
        gvk: &GroupVersionKind,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;
}

/// GroupVersionKind of a statically typed resource
pub fn gvk_of<K>() -> GroupVersionKind
where
    K: Resource<DynamicType = ()>,
{
    GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()))
}

/// GroupVersionKind carried by a dynamic object's TypeMeta
pub fn object_gvk(obj: &DynamicObject) -> Result<GroupVersionKind, StoreError> {
    obj.types
        .as_ref()
        .and_then(|tm| GroupVersionKind::try_from(tm).ok())
        .filter(|gvk| !gvk.kind.is_empty() && !gvk.version.is_empty())
        .ok_or(StoreError::MissingTypeMeta)
}

/// TypeMeta for a GroupVersionKind
pub fn type_meta(gvk: &GroupVersionKind) -> TypeMeta {
    TypeMeta {
        api_version: gvk.api_version(),
        kind: gvk.kind.clone(),
    }
}

/// Convert a typed resource into a dynamic object
pub fn to_dynamic<K: Serialize>(obj: &K) -> Result<DynamicObject, StoreError> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Convert a dynamic object into a typed resource
pub fn from_dynamic<K: DeserializeOwned>(obj: DynamicObject) -> Result<K, StoreError> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// An [`ObjectStore`] bound to one reconcile pass's cancellation token
#[derive(Debug, Clone, Copy)]
pub struct Session<'a> {
    store: &'a dyn ObjectStore,
    cancel: &'a CancellationToken,
}

impl<'a> Session<'a> {
    pub fn new(store: &'a dyn ObjectStore, cancel: &'a CancellationToken) -> Self {
        Self { store, cancel }
    }

    pub fn cancel_token(&self) -> &'a CancellationToken {
        self.cancel
    }

    async fn guarded<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(StoreError::Cancelled),
            result = call => result,
        }
    }

    pub async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>, StoreError> {
        self.guarded(self.store.get(gvk, namespace, name)).await
    }

    pub async fn create(
        &self,
        gvk: &GroupVersionKind,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        self.guarded(self.store.create(gvk, obj)).await
    }

    pub async fn update(
        &self,
        gvk: &GroupVersionKind,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        self.guarded(self.store.update(gvk, obj)).await
    }

    pub async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        self.guarded(self.store.list(gvk, namespace, label_selector))
            .await
    }

    pub async fn update_status(
        &self,
        gvk: &GroupVersionKind,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        self.guarded(self.store.update_status(gvk, obj)).await
    }

    /// Fetch a typed resource
    pub async fn get_typed<K>(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>, StoreError>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        self.get(&gvk_of::<K>(), namespace, name)
            .await?
            .map(from_dynamic)
            .transpose()
    }

    /// Persist the status of a typed resource
    pub async fn update_status_typed<K>(&self, obj: &K) -> Result<(), StoreError>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let mut dynamic = to_dynamic(obj)?;
        let gvk = gvk_of::<K>();
        dynamic.types = Some(type_meta(&gvk));
        self.update_status(&gvk, &dynamic).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Portal, PortalSpec, Release};

    #[test]
    fn test_gvk_of_typed_resources() {
        let gvk = gvk_of::<Release>();
        assert_eq!(gvk.group, "tacokumo.github.io");
        assert_eq!(gvk.version, "v1alpha1");
        assert_eq!(gvk.kind, "Release");
        assert_eq!(gvk.api_version(), "tacokumo.github.io/v1alpha1");

        let core = GroupVersionKind::gvk("", "v1", "Namespace");
        assert_eq!(type_meta(&core).api_version, "v1");
    }

    #[test]
    fn test_dynamic_conversion_keeps_identity() {
        let portal = Portal::new("tenant-a", PortalSpec {});
        let dynamic = to_dynamic(&portal).unwrap();
        assert_eq!(object_gvk(&dynamic).unwrap().kind, "Portal");
        assert_eq!(dynamic.metadata.name.as_deref(), Some("tenant-a"));

        let back: Portal = from_dynamic(dynamic).unwrap();
        assert_eq!(back.metadata.name.as_deref(), Some("tenant-a"));
    }

    #[tokio::test]
    async fn test_session_cancelled() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let session = Session::new(&store, &cancel);

        let result = session
            .get(&gvk_of::<Release>(), Some("default"), "missing")
            .await;
        assert!(matches!(result, Err(StoreError::Cancelled)));
    }
}
