//! # In-Memory Store
//!
//! [`ObjectStore`] holding objects in a map, with API-server-like semantics:
//!
//! - every write bumps `metadata.resourceVersion`; updates must present the current one
//! - creates assign a `metadata.uid`
//! - `update` leaves `status` untouched and `update_status` touches nothing else
//! - cluster-scoped kinds ignore the namespace
//!
//! Used by the test suites; also handy for dry runs.

use super::{ObjectStore, StoreError};
use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};

const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "Namespace",
    "Portal",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "PersistentVolume",
    "StorageClass",
];

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ObjectKey {
    api_version: String,
    kind: String,
    namespace: String,
    name: String,
}

#[derive(Debug)]
struct Entry {
    object: DynamicObject,
    /// Number of upcoming `get`s that still miss this object
    hidden_gets: u32,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ObjectKey, Entry>,
    next_resource_version: u64,
    creates: usize,
    updates: usize,
    status_updates: usize,
    visibility_delays: BTreeMap<String, u32>,
    rejected_kinds: BTreeSet<String>,
}

impl State {
    fn bump(&mut self) -> String {
        self.next_resource_version += 1;
        self.next_resource_version.to_string()
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

fn is_cluster_scoped(kind: &str) -> bool {
    CLUSTER_SCOPED_KINDS.contains(&kind)
}

fn key(gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> ObjectKey {
    let namespace = if is_cluster_scoped(&gvk.kind) {
        String::new()
    } else {
        namespace.unwrap_or_default().to_string()
    };
    ObjectKey {
        api_version: gvk.api_version(),
        kind: gvk.kind.clone(),
        namespace,
        name: name.to_string(),
    }
}

fn object_key(gvk: &GroupVersionKind, obj: &DynamicObject) -> ObjectKey {
    key(
        gvk,
        obj.metadata.namespace.as_deref(),
        obj.metadata.name.as_deref().unwrap_or_default(),
    )
}

/// Equality-based selectors only: `k=v[,k2=v2]`
fn matches_selector(obj: &DynamicObject, selector: &str) -> bool {
    let labels = obj.metadata.labels.clone().unwrap_or_default();
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k.trim()).map(String::as_str) == Some(v.trim()),
            None => labels.contains_key(term),
        })
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Newly created objects of `kind` stay invisible to the next `gets` lookups
    pub fn delay_visibility(&self, kind: &str, gets: u32) {
        self.lock().visibility_delays.insert(kind.to_string(), gets);
    }

    /// Fail every create and update of `kind`
    pub fn reject_writes(&self, kind: &str) {
        self.lock().rejected_kinds.insert(kind.to_string());
    }

    /// Seed an object directly, assigning uid and resource version
    pub fn insert(&self, gvk: &GroupVersionKind, mut obj: DynamicObject) -> DynamicObject {
        let mut state = self.lock();
        if obj.metadata.uid.is_none() {
            obj.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        obj.metadata.resource_version = Some(state.bump());
        obj.types = Some(super::type_meta(gvk));
        state.objects.insert(
            object_key(gvk, &obj),
            Entry {
                object: obj.clone(),
                hidden_gets: 0,
            },
        );
        obj
    }

    /// All stored objects of `kind`, regardless of visibility
    pub fn objects_of(&self, kind: &str) -> Vec<DynamicObject> {
        self.lock()
            .objects
            .iter()
            .filter(|(k, _)| k.kind == kind)
            .map(|(_, e)| e.object.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn creates(&self) -> usize {
        self.lock().creates
    }

    pub fn updates(&self) -> usize {
        self.lock().updates
    }

    pub fn status_updates(&self) -> usize {
        self.lock().status_updates
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>, StoreError> {
        let mut state = self.lock();
        match state.objects.get_mut(&key(gvk, namespace, name)) {
            Some(entry) if entry.hidden_gets > 0 => {
                entry.hidden_gets -= 1;
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.object.clone())),
            None => Ok(None),
        }
    }

    async fn create(
        &self,
        gvk: &GroupVersionKind,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let mut state = self.lock();
        let name = obj.metadata.name.clone().unwrap_or_default();
        if state.rejected_kinds.contains(&gvk.kind) {
            return Err(StoreError::Api(format!("create of {} {name} rejected", gvk.kind)));
        }
        let key = object_key(gvk, obj);
        if state.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: gvk.kind.clone(),
                name,
            });
        }

        let mut stored = obj.clone();
        stored.types = Some(super::type_meta(gvk));
        if is_cluster_scoped(&gvk.kind) {
            stored.metadata.namespace = None;
        }
        stored.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        stored.metadata.resource_version = Some(state.bump());
        let hidden_gets = state
            .visibility_delays
            .get(&gvk.kind)
            .copied()
            .unwrap_or_default();

        state.creates += 1;
        state.objects.insert(
            key,
            Entry {
                object: stored.clone(),
                hidden_gets,
            },
        );
        Ok(stored)
    }

    async fn update(
        &self,
        gvk: &GroupVersionKind,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let mut state = self.lock();
        let name = obj.metadata.name.clone().unwrap_or_default();
        if state.rejected_kinds.contains(&gvk.kind) {
            return Err(StoreError::Api(format!("update of {} {name} rejected", gvk.kind)));
        }
        let key = object_key(gvk, obj);
        let (current_version, current_status, uid) = match state.objects.get(&key) {
            Some(entry) => (
                entry.object.metadata.resource_version.clone(),
                entry.object.data.get("status").cloned(),
                entry.object.metadata.uid.clone(),
            ),
            None => {
                return Err(StoreError::NotFound {
                    kind: gvk.kind.clone(),
                    name,
                })
            }
        };
        if obj.metadata.resource_version.is_none()
            || obj.metadata.resource_version != current_version
        {
            return Err(StoreError::Conflict {
                kind: gvk.kind.clone(),
                name,
                message: format!(
                    "resourceVersion {:?} does not match {:?}",
                    obj.metadata.resource_version, current_version
                ),
            });
        }

        let mut stored = obj.clone();
        stored.types = Some(super::type_meta(gvk));
        stored.metadata.uid = uid;
        if let Some(map) = stored.data.as_object_mut() {
            match current_status {
                Some(status) => {
                    map.insert("status".to_string(), status);
                }
                None => {
                    map.remove("status");
                }
            }
        }
        stored.metadata.resource_version = Some(state.bump());
        state.updates += 1;
        if let Some(entry) = state.objects.get_mut(&key) {
            entry.object = stored.clone();
        }
        Ok(stored)
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let state = self.lock();
        let api_version = gvk.api_version();
        let namespace = namespace.filter(|_| !is_cluster_scoped(&gvk.kind));
        Ok(state
            .objects
            .iter()
            .filter(|(k, e)| {
                k.api_version == api_version
                    && k.kind == gvk.kind
                    && e.hidden_gets == 0
                    && namespace.is_none_or(|ns| k.namespace == ns)
                    && label_selector.is_none_or(|sel| matches_selector(&e.object, sel))
            })
            .map(|(_, e)| e.object.clone())
            .collect())
    }

    async fn update_status(
        &self,
        gvk: &GroupVersionKind,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let mut state = self.lock();
        let name = obj.metadata.name.clone().unwrap_or_default();
        let key = object_key(gvk, obj);
        if !state.objects.contains_key(&key) {
            return Err(StoreError::NotFound {
                kind: gvk.kind.clone(),
                name,
            });
        }
        let status = obj.data.get("status").cloned();
        let version = state.bump();
        state.status_updates += 1;

        let entry = state
            .objects
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound {
                kind: gvk.kind.clone(),
                name,
            })?;
        if let Some(map) = entry.object.data.as_object_mut() {
            match status {
                Some(status) => {
                    map.insert("status".to_string(), status);
                }
                None => {
                    map.remove("status");
                }
            }
        }
        entry.object.metadata.resource_version = Some(version);
        Ok(entry.object.clone())
    }
}
