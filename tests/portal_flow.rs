//! Portal provisioning: namespace, UI bundle and pod readiness.

mod common;

use common::{bundle, Harness};
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use kube::ResourceExt;
use portal_controller::controller::{
    find_condition, Outcome, PortalReconciler, ReconcilerError, READY_CONDITION,
};
use portal_controller::crd::{Portal, PortalSpec, PortalState, StatefulResource};
use serde_json::json;

const NAME: &str = "tenant-a";

async fn pass(harness: &Harness, reconciler: &PortalReconciler) -> Result<Outcome, ReconcilerError> {
    let mut portal: Portal = harness.fetch(None, NAME).await;
    reconciler.reconcile(&harness.session(), &mut portal).await
}

async fn state(harness: &Harness) -> Option<PortalState> {
    harness.fetch::<Portal>(None, NAME).await.observed_state()
}

fn seed_pod(harness: &Harness, name: &str, phase: &str, managed: bool) {
    let labels = if managed {
        json!({ "tacokumo.github.io/managed-by": "portal-controller" })
    } else {
        json!({ "app": "sidecar" })
    };
    let pod: DynamicObject = serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": { "name": name, "namespace": NAME, "labels": labels },
        "status": { "phase": phase }
    }))
    .unwrap();
    harness
        .store
        .insert(&GroupVersionKind::gvk("", "v1", "Pod"), pod);
}

/// Drive a fresh Portal up to `Waiting`
async fn provisioned(harness: &Harness, reconciler: &PortalReconciler) {
    harness.seed(&Portal::new(NAME, PortalSpec {}));
    pass(harness, reconciler).await.unwrap();
    pass(harness, reconciler).await.unwrap();
    assert_eq!(state(harness).await, Some(PortalState::Waiting));
}

#[tokio::test]
async fn test_namespace_not_yet_visible_is_pending_not_error() {
    let harness = Harness::new();
    let portal = harness.seed(&Portal::new(NAME, PortalSpec {}));
    harness.store.delay_visibility("Namespace", 1);
    let reconciler = PortalReconciler::new(bundle("portal"));

    assert_eq!(pass(&harness, &reconciler).await.unwrap(), Outcome::Transitioned);
    assert_eq!(state(&harness).await, Some(PortalState::Provisioning));

    assert_eq!(pass(&harness, &reconciler).await.unwrap(), Outcome::Pending);
    let stored: Portal = harness.fetch(None, NAME).await;
    assert_eq!(stored.observed_state(), Some(PortalState::Provisioning));
    let conditions = stored.status.unwrap().conditions;
    let ready = find_condition(&conditions, READY_CONDITION).unwrap();
    assert_eq!(ready.status, "False");
    assert_eq!(ready.reason.as_deref(), Some("Pending"));
    assert!(harness.store.objects_of("Deployment").is_empty());

    // The namespace was created once and is visible now
    assert_eq!(pass(&harness, &reconciler).await.unwrap(), Outcome::Transitioned);
    assert_eq!(state(&harness).await, Some(PortalState::Waiting));

    let namespaces = harness.store.objects_of("Namespace");
    assert_eq!(namespaces.len(), 1);
    assert_eq!(namespaces[0].name_any(), NAME);
    assert_eq!(namespaces[0].owner_references()[0].uid, portal.uid().unwrap());
}

#[tokio::test]
async fn test_ui_bundle_is_applied_into_portal_namespace() {
    let harness = Harness::new();
    let reconciler = PortalReconciler::new(bundle("portal"));
    provisioned(&harness, &reconciler).await;

    for kind in ["Deployment", "Service"] {
        let objects = harness.store.objects_of(kind);
        assert_eq!(objects.len(), 1, "expected one {kind}");
        assert_eq!(objects[0].name_any(), "tenant-a-ui");
        assert_eq!(objects[0].namespace().as_deref(), Some(NAME));
        assert_eq!(objects[0].owner_references()[0].kind, "Portal");
    }

    let deployment = &harness.store.objects_of("Deployment")[0].data;
    assert_eq!(
        deployment.pointer("/spec/template/metadata/labels/tacokumo.github.io~1managed-by"),
        Some(&json!("portal-controller"))
    );
}

#[tokio::test]
async fn test_running_once_every_managed_pod_runs() {
    let harness = Harness::new();
    let reconciler = PortalReconciler::new(bundle("portal"));
    provisioned(&harness, &reconciler).await;

    seed_pod(&harness, "ui-0", "Running", true);
    seed_pod(&harness, "ui-1", "Pending", true);
    // Unmanaged pods are not considered
    seed_pod(&harness, "sidecar", "Failed", false);

    assert_eq!(pass(&harness, &reconciler).await.unwrap(), Outcome::Unchanged);
    assert_eq!(state(&harness).await, Some(PortalState::Waiting));

    seed_pod(&harness, "ui-1", "Running", true);
    assert_eq!(pass(&harness, &reconciler).await.unwrap(), Outcome::Transitioned);
    assert_eq!(state(&harness).await, Some(PortalState::Running));
}

#[tokio::test]
async fn test_missing_bundle_marks_portal_error() {
    let harness = Harness::new();
    harness.seed(&Portal::new(NAME, PortalSpec {}));
    let reconciler = PortalReconciler::new(bundle("does-not-exist"));

    pass(&harness, &reconciler).await.unwrap();
    let err = pass(&harness, &reconciler).await.unwrap_err();
    assert!(matches!(err, ReconcilerError::Render(_)));
    assert_eq!(state(&harness).await, Some(PortalState::Error));
}
