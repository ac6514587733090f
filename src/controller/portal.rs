//! # Portal Reconciler
//!
//! `Provisioning → Waiting → Running`, with `Error` on failure.
//!
//! A Portal is cluster-scoped and owns a namespace of the same name. The
//! portal UI bundle is rendered into that namespace once it is observable;
//! the Portal is `Running` when every managed pod in it is running.

use super::error::ReconcilerError;
use super::state_machine::{drive, Outcome, StateMachine};
use crate::crd::{managed_by_selector, Portal, PortalState, StatefulResource};
use crate::manifest::{
    apply_all, create_or_update, owner_reference, parse_manifests, render_bundle, to_value_tree,
    PortalValues, RenderError,
};
use crate::observability::metrics;
use crate::store::{to_dynamic, Session};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{DynamicObject, ObjectMeta};
use kube::core::GroupVersionKind;
use kube::ResourceExt;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, info_span, Instrument};

const POD_RUNNING_PHASE: &str = "Running";

/// Whether every pod is in the `Running` phase
///
/// An empty list counts as running.
pub fn all_pods_running(pods: &[DynamicObject]) -> bool {
    pods.iter().all(|pod| {
        pod.data
            .pointer("/status/phase")
            .and_then(serde_json::Value::as_str)
            == Some(POD_RUNNING_PHASE)
    })
}

#[derive(Debug)]
pub struct PortalReconciler {
    bundle: PathBuf,
}

impl PortalReconciler {
    pub fn new(bundle: impl Into<PathBuf>) -> Self {
        Self {
            bundle: bundle.into(),
        }
    }

    /// Run one reconcile pass over `portal`
    pub async fn reconcile(
        &self,
        session: &Session<'_>,
        portal: &mut Portal,
    ) -> Result<Outcome, ReconcilerError> {
        let span = info_span!(
            "portal.reconcile",
            resource.kind = "Portal",
            resource.name = %portal.name_any(),
            state = portal.raw_state().unwrap_or_default()
        );
        let start = Instant::now();
        metrics::increment_reconciliations("Portal");
        let result = drive(self, session, portal).instrument(span).await;
        metrics::observe_reconciliation_duration("Portal", start.elapsed().as_secs_f64());
        result
    }

    async fn provision(
        &self,
        session: &Session<'_>,
        portal: &mut Portal,
    ) -> Result<(), ReconcilerError> {
        let name = portal.name_any();
        let owner = owner_reference(&*portal);

        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        };
        create_or_update(session, to_dynamic(&namespace)?, None, owner.as_ref()).await?;

        // Namespace creation may not be observable right away
        if session
            .get(&GroupVersionKind::gvk("", "v1", "Namespace"), None, &name)
            .await?
            .is_none()
        {
            return Err(ReconcilerError::NotReadyYet(format!(
                "namespace {name} is not available yet"
            )));
        }

        let tree = to_value_tree(&PortalValues::for_portal(&name)).map_err(|e| {
            RenderError::InvalidValues {
                path: self.bundle.clone(),
                message: e.to_string(),
            }
        })?;
        let manifests = render_bundle(&self.bundle, &name, &name, &tree)?;
        let objects = parse_manifests(&manifests)?;
        let applied = apply_all(session, objects, Some(&name), owner.as_ref()).await?;

        info!("Provisioned portal {} ({} object(s))", name, applied);
        portal.set_state(PortalState::Waiting);
        Ok(())
    }

    async fn wait_for_pods(
        &self,
        session: &Session<'_>,
        portal: &mut Portal,
    ) -> Result<(), ReconcilerError> {
        let name = portal.name_any();
        let pods = session
            .list(
                &GroupVersionKind::gvk("", "v1", "Pod"),
                Some(&name),
                Some(&managed_by_selector()),
            )
            .await?;

        if all_pods_running(&pods) {
            portal.set_state(PortalState::Running);
        } else {
            debug!("Portal {} waiting on {} pod(s)", name, pods.len());
        }
        Ok(())
    }
}

#[async_trait]
impl StateMachine for PortalReconciler {
    type Resource = Portal;

    async fn dispatch(
        &self,
        session: &Session<'_>,
        portal: &mut Portal,
        state: PortalState,
    ) -> Result<(), ReconcilerError> {
        match state {
            PortalState::Provisioning => self.provision(session, portal).await,
            PortalState::Waiting => self.wait_for_pods(session, portal).await,
            PortalState::Running | PortalState::Error => Ok(()),
        }
    }
}
