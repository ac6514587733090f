//! # Release Reconciler
//!
//! `Deploying → Deployed`, or `Failed` on any error.
//!
//! In `Deploying` the AppConfig is fetched, turned into application values,
//! rendered through the application bundle, parsed and applied into the
//! Release's namespace with the Release as owner.

use super::error::ReconcilerError;
use super::state_machine::{drive, Outcome, StateMachine};
use crate::appconfig::{load_app_config, ConfigFetchError};
use crate::crd::{Release, ReleaseSpec, ReleaseState, StatefulResource};
use crate::manifest::{
    apply_all, owner_reference, parse_manifests, render_bundle, to_value_tree, ApplicationValues,
    RenderError,
};
use crate::observability::metrics;
use crate::repository::RepositoryConnector;
use crate::store::Session;
use async_trait::async_trait;
use kube::ResourceExt;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, Instrument};

/// Reference a Release reads its AppConfig from: the branch, else the pinned commit
pub fn release_reference(spec: &ReleaseSpec) -> Result<&str, ConfigFetchError> {
    if !spec.app_config_branch.is_empty() {
        return Ok(&spec.app_config_branch);
    }
    spec.commit
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or(ConfigFetchError::UnresolvedReference)
}

pub struct ReleaseReconciler {
    connector: Arc<dyn RepositoryConnector>,
    bundle: PathBuf,
}

impl fmt::Debug for ReleaseReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseReconciler")
            .field("connector", &self.connector)
            .field("bundle", &self.bundle)
            .finish()
    }
}

impl ReleaseReconciler {
    pub fn new(connector: Arc<dyn RepositoryConnector>, bundle: impl Into<PathBuf>) -> Self {
        Self {
            connector,
            bundle: bundle.into(),
        }
    }

    /// Run one reconcile pass over `release`
    pub async fn reconcile(
        &self,
        session: &Session<'_>,
        release: &mut Release,
    ) -> Result<Outcome, ReconcilerError> {
        let span = info_span!(
            "release.reconcile",
            resource.kind = "Release",
            resource.name = %release.name_any(),
            resource.namespace = %release.namespace().unwrap_or_default(),
            state = release.raw_state().unwrap_or_default()
        );
        let start = Instant::now();
        metrics::increment_reconciliations("Release");
        let result = drive(self, session, release).instrument(span).await;
        metrics::observe_reconciliation_duration("Release", start.elapsed().as_secs_f64());
        result
    }

    async fn deploy(
        &self,
        session: &Session<'_>,
        release: &mut Release,
    ) -> Result<(), ReconcilerError> {
        let name = release.name_any();
        let namespace = release.namespace().unwrap_or_else(|| "default".to_string());
        let reference = release_reference(&release.spec)?;

        let config = load_app_config(
            self.connector.as_ref(),
            &release.spec.repo.url,
            reference,
            &release.spec.app_config_path,
            session.cancel_token(),
        )
        .await?;

        // Deploy identity is the Release name, not the AppConfig's app name
        let values = ApplicationValues::from_app_config(
            &name,
            &config,
            release.spec.env_secret_name.as_deref(),
        );
        let tree = to_value_tree(&values).map_err(|e| RenderError::InvalidValues {
            path: self.bundle.clone(),
            message: e.to_string(),
        })?;

        let manifests = render_bundle(&self.bundle, &name, &namespace, &tree)?;
        let objects = parse_manifests(&manifests)?;
        let owner = owner_reference(&*release);
        let applied = apply_all(session, objects, Some(&namespace), owner.as_ref()).await?;

        info!(
            "Deployed {} object(s) for release {}/{} from {}@{}",
            applied, namespace, name, release.spec.repo.url, reference
        );
        release.set_state(ReleaseState::Deployed);
        Ok(())
    }
}

#[async_trait]
impl StateMachine for ReleaseReconciler {
    type Resource = Release;

    async fn dispatch(
        &self,
        session: &Session<'_>,
        release: &mut Release,
        state: ReleaseState,
    ) -> Result<(), ReconcilerError> {
        match state {
            ReleaseState::Deploying => self.deploy(session, release).await,
            ReleaseState::Deployed | ReleaseState::Failed => Ok(()),
        }
    }
}
