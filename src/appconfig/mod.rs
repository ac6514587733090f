//! # Application Configuration
//!
//! Typed view of the Git-hosted `appconfig.yaml` and the loader that fetches it.
//!
//! Only the fields the controller reads are modelled; unknown keys are ignored.

use crate::constants::{DEFAULT_APPCONFIG_PATH, DEFAULT_STAGE_NAME};
use crate::repository::{ConnectorError, RepositoryConnector};
use serde::{Deserialize, Serialize};
use std::io::Read as _;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};

/// Errors raised while fetching or decoding an AppConfig
#[derive(Debug, Error)]
pub enum ConfigFetchError {
    #[error("neither a branch nor a commit is set; nothing to fetch")]
    UnresolvedReference,

    #[error("failed to fetch {url}@{reference}: {source}")]
    Repository {
        url: String,
        reference: String,
        #[source]
        source: ConnectorError,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

impl ConfigFetchError {
    /// The fetch was aborted by cancellation rather than failing
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Repository {
                source: ConnectorError::Cancelled,
                ..
            }
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub stages: Vec<StageConfig>,
    #[serde(default)]
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    /// Container image to run
    #[serde(default)]
    pub image: String,
}

/// A named deployment target and its promotion policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageConfig {
    pub name: String,
    #[serde(default)]
    pub policy: StagePolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagePolicy {
    /// Policy type, e.g. `branch`
    #[serde(default, rename = "type")]
    pub policy_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchPolicy {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// HTTP listeners; the only service kind mapped to ports
    #[serde(default)]
    pub http: Vec<HttpServiceConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<ScaleConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_config: Option<MachineConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpServiceConfig {
    pub target_port: u16,
}

/// Horizontal scaling bounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScaleConfig {
    pub min: u32,
    pub max: u32,
}

/// Container resource ceilings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct MachineConfig {
    #[serde(default)]
    pub cpu: String,
    #[serde(default)]
    pub memory: String,
}

impl StageConfig {
    /// Stage promoted from `branch`
    pub fn on_branch(name: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policy: StagePolicy {
                policy_type: "branch".to_string(),
                branch: Some(BranchPolicy {
                    name: branch.into(),
                }),
            },
        }
    }
}

impl AppConfig {
    /// Declared stages, or a single `production` stage tracking `default_branch`
    pub fn effective_stages(&self, default_branch: &str) -> Vec<StageConfig> {
        if self.stages.is_empty() {
            vec![StageConfig::on_branch(DEFAULT_STAGE_NAME, default_branch)]
        } else {
            self.stages.clone()
        }
    }
}

/// Fetch `reference` of `url` and decode the AppConfig at `path`
///
/// An empty `path` reads `appconfig.yaml` from the repository root.
pub async fn load_app_config(
    connector: &dyn RepositoryConnector,
    url: &str,
    reference: &str,
    path: &str,
    cancel: &CancellationToken,
) -> Result<AppConfig, ConfigFetchError> {
    let path = if path.is_empty() {
        DEFAULT_APPCONFIG_PATH
    } else {
        path
    };
    let span = info_span!(
        "appconfig.load",
        repository.url = url,
        revision = reference,
        appconfig.path = path
    );
    let start = Instant::now();

    let result: Result<AppConfig, ConfigFetchError> = async {
        let worktree = connector
            .checkout(url, reference, cancel)
            .await
            .map_err(|source| ConfigFetchError::Repository {
                url: url.to_string(),
                reference: reference.to_string(),
                source,
            })?;

        let mut reader = worktree
            .open(path)
            .map_err(|source| ConfigFetchError::Repository {
                url: url.to_string(),
                reference: reference.to_string(),
                source,
            })?;

        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .map_err(|source| ConfigFetchError::Read {
                path: path.to_string(),
                source,
            })?;

        let config: AppConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigFetchError::Decode {
                path: path.to_string(),
                source,
            })?;
        debug!(
            "Loaded AppConfig {} with {} stage(s) in {:.2}s",
            config.app_name,
            config.stages.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(config)
    }
    .instrument(span)
    .await;

    crate::observability::metrics::increment_repository_fetch(if result.is_ok() {
        "success"
    } else {
        "failure"
    });
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::LocalConnector;

    const SAMPLE: &str = r"
appName: demo
build:
  image: ghcr.io/example/demo:1.2.3
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
    min: 1
    max: 3
  machineConfig:
    cpu: 250m
    memory: 256Mi
";

    #[test]
    fn test_decode_full_document() {
        let config: AppConfig = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(config.app_name, "demo");
        assert_eq!(config.build.image, "ghcr.io/example/demo:1.2.3");
        assert_eq!(config.stages.len(), 2);
        assert_eq!(
            config.stages[0].policy.branch.as_ref().map(|b| b.name.as_str()),
            Some("develop")
        );
        assert_eq!(config.service.http[0].target_port, 8080);
        assert_eq!(config.service.scale, Some(ScaleConfig { min: 1, max: 3 }));
        assert_eq!(
            config.service.machine_config.as_ref().map(|m| m.cpu.as_str()),
            Some("250m")
        );
    }

    #[test]
    fn test_effective_stages_default() {
        let config: AppConfig = serde_yaml::from_str("appName: demo\n").unwrap();
        let stages = config.effective_stages("main");
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].name, "production");
        assert_eq!(stages[0].policy.policy_type, "branch");
        assert_eq!(
            stages[0].policy.branch,
            Some(BranchPolicy {
                name: "main".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_load_from_local_connector() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("deploy")).unwrap();
        std::fs::write(dir.path().join("deploy/appconfig.yaml"), SAMPLE).unwrap();
        std::fs::write(dir.path().join("appconfig.yaml"), "appName: root\n").unwrap();
        let connector = LocalConnector::new(dir.path());
        let cancel = CancellationToken::new();

        let config = load_app_config(&connector, "repo", "main", "deploy/appconfig.yaml", &cancel)
            .await
            .unwrap();
        assert_eq!(config.app_name, "demo");

        let root = load_app_config(&connector, "repo", "main", "", &cancel)
            .await
            .unwrap();
        assert_eq!(root.app_name, "root");
    }

    #[tokio::test]
    async fn test_load_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.yaml"), "stages: [unclosed\n").unwrap();
        let connector = LocalConnector::new(dir.path());
        let cancel = CancellationToken::new();

        let missing = load_app_config(&connector, "repo", "main", "nope.yaml", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            missing,
            ConfigFetchError::Repository {
                source: ConnectorError::NotFound { .. },
                ..
            }
        ));

        let broken = load_app_config(&connector, "repo", "main", "broken.yaml", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(broken, ConfigFetchError::Decode { .. }));
    }
}
