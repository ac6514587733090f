//! Shared fixtures for the integration suites: an in-memory store, a local
//! repository directory and the shipped bundles.

#![allow(dead_code, reason = "Each test binary uses a subset of the helpers")]

use kube::Resource;
use portal_controller::crd::StatefulResource;
use portal_controller::repository::LocalConnector;
use portal_controller::store::{from_dynamic, gvk_of, to_dynamic, MemoryStore, Session};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const APPCONFIG_TWO_STAGES: &str = r"
appName: shop
build:
  image: ghcr.io/example/shop:1.4.0
stages:
  - name: staging
    policy:
      type: branch
      branch:
        name: develop
  - name: production
    policy:
      type: branch
      branch:
        name: main
service:
  http:
    - targetPort: 8080
  scale:
    min: 2
    max: 5
  machineConfig:
    cpu: 500m
    memory: 256Mi
";

pub const APPCONFIG_NO_STAGES: &str = r"
appName: shop
build:
  image: ghcr.io/example/shop:1.4.0
";

pub fn bundle(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("bundles").join(name)
}

pub struct Harness {
    pub store: MemoryStore,
    pub cancel: CancellationToken,
    pub repo: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            cancel: CancellationToken::new(),
            repo: tempfile::tempdir().unwrap(),
        }
    }

    /// Harness whose repository holds `appconfig.yaml` with `content`
    pub fn with_appconfig(content: &str) -> Self {
        let harness = Self::new();
        harness.write_file("appconfig.yaml", content);
        harness
    }

    pub fn write_file(&self, path: &str, content: &str) {
        let full = self.repo.path().join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, content).unwrap();
    }

    pub fn connector(&self) -> Arc<LocalConnector> {
        Arc::new(LocalConnector::new(self.repo.path()))
    }

    pub fn session(&self) -> Session<'_> {
        Session::new(&self.store, &self.cancel)
    }

    /// Store `resource` and return it as stored (with uid and resource version)
    pub fn seed<K>(&self, resource: &K) -> K
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
    {
        let stored = self
            .store
            .insert(&gvk_of::<K>(), to_dynamic(resource).unwrap());
        from_dynamic(stored).unwrap()
    }

    /// Current stored copy of a resource
    pub async fn fetch<K>(&self, namespace: Option<&str>, name: &str) -> K
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        self.session()
            .get_typed::<K>(namespace, name)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("{name} not found"))
    }

    /// Overwrite the persisted state of a resource, as an external actor would
    pub async fn force_state<K>(&self, namespace: Option<&str>, name: &str, state: K::State)
    where
        K: StatefulResource + Resource<DynamicType = ()> + Serialize + DeserializeOwned,
    {
        let mut resource: K = self.fetch(namespace, name).await;
        resource.set_state(state);
        self.session().update_status_typed(&resource).await.unwrap();
    }
}
