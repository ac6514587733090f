//! # Custom Resource Definitions
//!
//! CRD types for the portal controller.
//!
//! Three resources are reconciled:
//! - `Application`: a deployable product, fans out into one `Release` per stage
//! - `Release`: one stage's deployed instance of an application
//! - `Portal`: cluster-scoped tenant entry surface with its own namespace and UI

mod labels;
mod status;

pub use labels::{managed_by_labels, managed_by_selector};
pub use status::{
    ApplicationState, ApplicationStatus, ChildReference, Condition, PortalState, PortalStatus,
    ReleaseState, ReleaseStatus, ResourceState, StatefulResource,
};

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Git repository holding the application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRef {
    /// Clone URL
    pub url: String,
    /// Informational reference name; resolution uses the branch/commit fields
    #[serde(default)]
    pub r#ref: String,
}

/// Release Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: tacokumo.github.io/v1alpha1
/// kind: Release
/// metadata:
///   name: my-app-production
///   namespace: my-app
/// spec:
///   repo:
///     url: https://github.com/example/my-app.git
///   appConfigPath: appconfig.yaml
///   appConfigBranch: main
/// ```
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Release",
    group = "tacokumo.github.io",
    version = "v1alpha1",
    namespaced,
    status = "ReleaseStatus",
    shortname = "rel",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSpec {
    /// Repository holding the application configuration
    pub repo: RepositoryRef,
    /// Path of the application configuration inside the repository
    #[serde(default)]
    pub app_config_path: String,
    /// Branch to read the application configuration from
    #[serde(default)]
    pub app_config_branch: String,
    /// Pinned commit, used when no branch is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    /// Secret whose keys are injected into the workload environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_secret_name: Option<String>,
}

/// Application Custom Resource Definition
///
/// The release template is copied verbatim into every child Release.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Application",
    group = "tacokumo.github.io",
    version = "v1alpha1",
    namespaced,
    status = "ApplicationStatus",
    shortname = "app",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    pub release_template: ReleaseSpec,
}

/// Portal Custom Resource Definition
///
/// Cluster-scoped; the Portal's name is also the name of its namespace.
#[allow(
    clippy::empty_structs_with_brackets,
    reason = "Portal has no fields but `spec` must serialize as `{}`"
)]
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Portal",
    group = "tacokumo.github.io",
    version = "v1alpha1",
    status = "PortalStatus",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#
)]
pub struct PortalSpec {}

impl StatefulResource for Application {
    type State = ApplicationState;

    fn raw_state(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.state.as_deref())
    }

    fn status_fields(&mut self) -> (&mut Option<String>, &mut Vec<Condition>) {
        let status = self.status.get_or_insert_with(Default::default);
        (&mut status.state, &mut status.conditions)
    }
}

impl StatefulResource for Release {
    type State = ReleaseState;

    fn raw_state(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.state.as_deref())
    }

    fn status_fields(&mut self) -> (&mut Option<String>, &mut Vec<Condition>) {
        let status = self.status.get_or_insert_with(Default::default);
        (&mut status.state, &mut status.conditions)
    }
}

impl StatefulResource for Portal {
    type State = PortalState;

    fn raw_state(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.state.as_deref())
    }

    fn status_fields(&mut self) -> (&mut Option<String>, &mut Vec<Condition>) {
        let status = self.status.get_or_insert_with(Default::default);
        (&mut status.state, &mut status.conditions)
    }
}
