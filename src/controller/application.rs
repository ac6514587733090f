//! # Application Reconciler
//!
//! `Provisioning → Waiting → Running`, with `Error` on failure.
//!
//! - **Provisioning**: fetch the AppConfig, then create or update one child
//!   Release per stage (`<application>-<stage>`, in stage order) and record
//!   the children in the status
//! - **Waiting**: read every recorded child; once all are `Deployed` the
//!   Application is `Running`. A recorded child that no longer exists is fatal.
//!
//! Children are only ever observed through their persisted status; the
//! Release reconciler is driven by the scheduler, never called from here.

use super::error::ReconcilerError;
use super::state_machine::{drive, Outcome, StateMachine};
use crate::appconfig::load_app_config;
use crate::crd::{
    managed_by_labels, Application, ApplicationState, ChildReference, Release, ReleaseState,
    StatefulResource,
};
use crate::manifest::{create_or_update, owner_reference};
use crate::observability::metrics;
use crate::repository::RepositoryConnector;
use crate::store::{to_dynamic, Session};
use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, Instrument};

/// Name of the child Release for `stage`
pub fn release_name(application: &str, stage: &str) -> String {
    format!("{application}-{stage}")
}

pub struct ApplicationReconciler {
    connector: Arc<dyn RepositoryConnector>,
    default_branch: String,
}

impl fmt::Debug for ApplicationReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationReconciler")
            .field("connector", &self.connector)
            .field("default_branch", &self.default_branch)
            .finish()
    }
}

impl ApplicationReconciler {
    pub fn new(connector: Arc<dyn RepositoryConnector>, default_branch: impl Into<String>) -> Self {
        Self {
            connector,
            default_branch: default_branch.into(),
        }
    }

    /// Run one reconcile pass over `application`
    pub async fn reconcile(
        &self,
        session: &Session<'_>,
        application: &mut Application,
    ) -> Result<Outcome, ReconcilerError> {
        let span = info_span!(
            "application.reconcile",
            resource.kind = "Application",
            resource.name = %application.name_any(),
            resource.namespace = %application.namespace().unwrap_or_default(),
            state = application.raw_state().unwrap_or_default()
        );
        let start = Instant::now();
        metrics::increment_reconciliations("Application");
        let result = drive(self, session, application).instrument(span).await;
        metrics::observe_reconciliation_duration("Application", start.elapsed().as_secs_f64());
        result
    }

    /// Branch, else commit, else the configured default branch
    fn reference<'a>(&'a self, application: &'a Application) -> &'a str {
        let template = &application.spec.release_template;
        if !template.app_config_branch.is_empty() {
            return &template.app_config_branch;
        }
        template
            .commit
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.default_branch)
    }

    async fn provision(
        &self,
        session: &Session<'_>,
        application: &mut Application,
    ) -> Result<(), ReconcilerError> {
        let name = application.name_any();
        let namespace = application
            .namespace()
            .unwrap_or_else(|| "default".to_string());
        let template = &application.spec.release_template;

        let config = load_app_config(
            self.connector.as_ref(),
            &template.repo.url,
            self.reference(application),
            &template.app_config_path,
            session.cancel_token(),
        )
        .await?;
        let stages = config.effective_stages(&self.default_branch);
        let owner = owner_reference(&*application);

        let mut children = Vec::with_capacity(stages.len());
        for stage in &stages {
            let child_name = release_name(&name, &stage.name);
            let mut child = Release::new(&child_name, template.clone());
            child.metadata.namespace = Some(namespace.clone());
            child.metadata.labels = Some(managed_by_labels());

            let (stored, operation) = create_or_update(
                session,
                to_dynamic(&child)?,
                Some(&namespace),
                owner.as_ref(),
            )
            .await?;
            debug!("{} release {}/{}", operation.as_str(), namespace, child_name);

            children.push(ChildReference {
                api_version: Release::api_version(&()).into_owned(),
                kind: Release::kind(&()).into_owned(),
                namespace: namespace.clone(),
                name: child_name,
                uid: stored.metadata.uid.unwrap_or_default(),
            });
        }

        info!(
            "Provisioned {} release(s) for application {}/{}",
            children.len(),
            namespace,
            name
        );
        application
            .status
            .get_or_insert_with(Default::default)
            .releases = children;
        application.set_state(ApplicationState::Waiting);
        Ok(())
    }

    async fn wait_for_releases(
        &self,
        session: &Session<'_>,
        application: &mut Application,
    ) -> Result<(), ReconcilerError> {
        let children = application
            .status
            .as_ref()
            .map(|s| s.releases.clone())
            .unwrap_or_default();

        let mut deployed = 0;
        for child in &children {
            let release = session
                .get_typed::<Release>(Some(&child.namespace), &child.name)
                .await?
                .ok_or_else(|| ReconcilerError::MissingChild {
                    kind: child.kind.clone(),
                    namespace: child.namespace.clone(),
                    name: child.name.clone(),
                })?;
            if release.observed_state() == Some(ReleaseState::Deployed) {
                deployed += 1;
            }
        }

        if deployed == children.len() {
            application.set_state(ApplicationState::Running);
        } else {
            debug!(
                "{}/{} releases of {} deployed",
                deployed,
                children.len(),
                application.name_any()
            );
        }
        Ok(())
    }
}

#[async_trait]
impl StateMachine for ApplicationReconciler {
    type Resource = Application;

    async fn dispatch(
        &self,
        session: &Session<'_>,
        application: &mut Application,
        state: ApplicationState,
    ) -> Result<(), ReconcilerError> {
        match state {
            ApplicationState::Provisioning => self.provision(session, application).await,
            ApplicationState::Waiting => self.wait_for_releases(session, application).await,
            ApplicationState::Running | ApplicationState::Error => Ok(()),
        }
    }
}
