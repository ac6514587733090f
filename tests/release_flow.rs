//! Release deploys through the shipped application bundle.

mod common;

use common::{bundle, Harness, APPCONFIG_TWO_STAGES};
use kube::ResourceExt;
use portal_controller::constants::{MANAGED_BY_LABEL_KEY, MANAGED_BY_LABEL_VALUE};
use portal_controller::controller::{
    find_condition, Outcome, ReconcilerError, ReleaseReconciler, READY_CONDITION,
};
use portal_controller::crd::{Release, ReleaseSpec, ReleaseState, RepositoryRef, StatefulResource};
use portal_controller::repository::LocalConnector;
use std::sync::Arc;

const NAMESPACE: &str = "shop";
const NAME: &str = "shop-production";

fn release_spec() -> ReleaseSpec {
    ReleaseSpec {
        repo: RepositoryRef {
            url: "https://example.com/shop.git".to_string(),
            r#ref: String::new(),
        },
        app_config_path: "appconfig.yaml".to_string(),
        app_config_branch: "main".to_string(),
        commit: None,
        env_secret_name: Some("shop-env".to_string()),
    }
}

fn seed_release(harness: &Harness, spec: ReleaseSpec) -> Release {
    let mut release = Release::new(NAME, spec);
    release.metadata.namespace = Some(NAMESPACE.to_string());
    harness.seed(&release)
}

async fn pass(
    harness: &Harness,
    reconciler: &ReleaseReconciler,
) -> Result<Outcome, ReconcilerError> {
    let mut release: Release = harness.fetch(Some(NAMESPACE), NAME).await;
    reconciler.reconcile(&harness.session(), &mut release).await
}

async fn state(harness: &Harness) -> Option<ReleaseState> {
    harness
        .fetch::<Release>(Some(NAMESPACE), NAME)
        .await
        .observed_state()
}

fn reconciler(harness: &Harness) -> ReleaseReconciler {
    ReleaseReconciler::new(harness.connector(), bundle("application"))
}

#[tokio::test]
async fn test_first_pass_only_sets_deploying() {
    let harness = Harness::with_appconfig(APPCONFIG_TWO_STAGES);
    seed_release(&harness, release_spec());

    assert_eq!(pass(&harness, &reconciler(&harness)).await.unwrap(), Outcome::Transitioned);
    assert_eq!(state(&harness).await, Some(ReleaseState::Deploying));
    assert_eq!(harness.store.creates(), 0);
}

#[tokio::test]
async fn test_deploys_rendered_workload() {
    let harness = Harness::with_appconfig(APPCONFIG_TWO_STAGES);
    let release = seed_release(&harness, release_spec());
    let reconciler = reconciler(&harness);

    pass(&harness, &reconciler).await.unwrap();
    assert_eq!(pass(&harness, &reconciler).await.unwrap(), Outcome::Transitioned);
    assert_eq!(state(&harness).await, Some(ReleaseState::Deployed));

    for kind in ["ServiceAccount", "Deployment", "Service", "HorizontalPodAutoscaler"] {
        let objects = harness.store.objects_of(kind);
        assert_eq!(objects.len(), 1, "expected one {kind}");
        let obj = &objects[0];
        // Deploy identity is the Release name, not the AppConfig's appName
        assert_eq!(obj.name_any(), NAME);
        assert_eq!(obj.namespace().as_deref(), Some(NAMESPACE));
        assert_eq!(
            obj.labels().get(MANAGED_BY_LABEL_KEY).map(String::as_str),
            Some(MANAGED_BY_LABEL_VALUE)
        );
        assert_eq!(obj.owner_references()[0].uid, release.uid().unwrap());
    }

    let deployment = &harness.store.objects_of("Deployment")[0].data;
    assert_eq!(deployment.pointer("/spec/replicas"), Some(&serde_json::json!(2)));
    let container = deployment
        .pointer("/spec/template/spec/containers/0")
        .unwrap();
    assert_eq!(container["image"], "ghcr.io/example/shop:1.4.0");
    assert_eq!(container["ports"][0]["containerPort"], 8080);
    assert_eq!(container["envFrom"][0]["secretRef"]["name"], "shop-env");
    assert_eq!(container["resources"]["limits"]["cpu"], "500m");
    assert_eq!(
        deployment.pointer("/spec/template/metadata/labels/tacokumo.github.io~1managed-by"),
        Some(&serde_json::json!(MANAGED_BY_LABEL_VALUE))
    );

    let hpa = &harness.store.objects_of("HorizontalPodAutoscaler")[0].data;
    assert_eq!(hpa.pointer("/spec/minReplicas"), Some(&serde_json::json!(2)));
    assert_eq!(hpa.pointer("/spec/maxReplicas"), Some(&serde_json::json!(5)));
}

#[tokio::test]
async fn test_redeploy_updates_instead_of_duplicating() {
    let harness = Harness::with_appconfig(APPCONFIG_TWO_STAGES);
    seed_release(&harness, release_spec());
    let reconciler = reconciler(&harness);
    pass(&harness, &reconciler).await.unwrap();
    pass(&harness, &reconciler).await.unwrap();

    let creates = harness.store.creates();
    let updates = harness.store.updates();
    let deployment = harness.store.objects_of("Deployment").remove(0);

    harness
        .force_state::<Release>(Some(NAMESPACE), NAME, ReleaseState::Deploying)
        .await;
    pass(&harness, &reconciler).await.unwrap();

    assert_eq!(state(&harness).await, Some(ReleaseState::Deployed));
    assert_eq!(harness.store.creates(), creates);
    assert_eq!(harness.store.updates(), updates + 4);

    let redeployed = harness.store.objects_of("Deployment").remove(0);
    assert_eq!(redeployed.uid(), deployment.uid());
    assert_ne!(redeployed.resource_version(), deployment.resource_version());
    assert_eq!(redeployed.owner_references().len(), 1);
}

#[tokio::test]
async fn test_missing_config_file_marks_release_failed() {
    let harness = Harness::with_appconfig(APPCONFIG_TWO_STAGES);
    seed_release(
        &harness,
        ReleaseSpec {
            app_config_path: "nope.yaml".to_string(),
            ..release_spec()
        },
    );
    let reconciler = reconciler(&harness);
    pass(&harness, &reconciler).await.unwrap();

    let err = pass(&harness, &reconciler).await.unwrap_err();
    assert!(matches!(err, ReconcilerError::ConfigFetch(_)));

    let stored: Release = harness.fetch(Some(NAMESPACE), NAME).await;
    assert_eq!(stored.observed_state(), Some(ReleaseState::Failed));
    let conditions = stored.status.unwrap().conditions;
    let ready = find_condition(&conditions, READY_CONDITION).unwrap();
    assert_eq!(ready.reason.as_deref(), Some("ConfigFetchFailed"));
    assert!(harness.store.objects_of("Deployment").is_empty());
}

#[tokio::test]
async fn test_unresolvable_reference_is_fatal() {
    let harness = Harness::with_appconfig(APPCONFIG_TWO_STAGES);
    seed_release(
        &harness,
        ReleaseSpec {
            app_config_branch: String::new(),
            commit: None,
            ..release_spec()
        },
    );
    let reconciler = reconciler(&harness);
    pass(&harness, &reconciler).await.unwrap();

    let err = pass(&harness, &reconciler).await.unwrap_err();
    assert!(matches!(err, ReconcilerError::ConfigFetch(_)));
    assert_eq!(state(&harness).await, Some(ReleaseState::Failed));
}

#[tokio::test]
async fn test_unknown_branch_is_fatal() {
    let harness = Harness::with_appconfig(APPCONFIG_TWO_STAGES);
    seed_release(
        &harness,
        ReleaseSpec {
            app_config_branch: "feature/missing".to_string(),
            ..release_spec()
        },
    );
    let connector = LocalConnector::new(harness.repo.path()).with_references(["main", "develop"]);
    let reconciler = ReleaseReconciler::new(Arc::new(connector), bundle("application"));
    pass(&harness, &reconciler).await.unwrap();

    let err = pass(&harness, &reconciler).await.unwrap_err();
    assert!(matches!(err, ReconcilerError::ConfigFetch(_)));
    assert_eq!(state(&harness).await, Some(ReleaseState::Failed));
}

#[tokio::test]
async fn test_pinned_commit_is_used_without_branch() {
    let harness = Harness::with_appconfig(APPCONFIG_TWO_STAGES);
    seed_release(
        &harness,
        ReleaseSpec {
            app_config_branch: String::new(),
            commit: Some("3f2a9c1".to_string()),
            ..release_spec()
        },
    );
    let connector = LocalConnector::new(harness.repo.path()).with_references(["3f2a9c1"]);
    let reconciler = ReleaseReconciler::new(Arc::new(connector), bundle("application"));
    pass(&harness, &reconciler).await.unwrap();
    pass(&harness, &reconciler).await.unwrap();

    assert_eq!(state(&harness).await, Some(ReleaseState::Deployed));
}

#[tokio::test]
async fn test_failed_apply_aborts_remaining_objects() {
    let harness = Harness::with_appconfig(APPCONFIG_TWO_STAGES);
    seed_release(&harness, release_spec());
    harness.store.reject_writes("Service");
    let reconciler = reconciler(&harness);
    pass(&harness, &reconciler).await.unwrap();

    let err = pass(&harness, &reconciler).await.unwrap_err();
    assert!(matches!(err, ReconcilerError::Store(_)));
    assert_eq!(state(&harness).await, Some(ReleaseState::Failed));

    // Templates apply in path order: deployment, hpa, service, serviceaccount
    assert_eq!(harness.store.objects_of("Deployment").len(), 1);
    assert_eq!(harness.store.objects_of("HorizontalPodAutoscaler").len(), 1);
    assert!(harness.store.objects_of("ServiceAccount").is_empty());
}

#[tokio::test]
async fn test_cancelled_pass_leaves_state_alone() {
    let harness = Harness::with_appconfig(APPCONFIG_TWO_STAGES);
    seed_release(&harness, release_spec());
    let reconciler = reconciler(&harness);
    pass(&harness, &reconciler).await.unwrap();

    let mut release: Release = harness.fetch(Some(NAMESPACE), NAME).await;
    harness.cancel.cancel();
    let err = reconciler
        .reconcile(&harness.session(), &mut release)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcilerError::Cancelled));

    let stored = harness.store.objects_of("Release").remove(0);
    assert_eq!(
        stored.data.pointer("/status/state"),
        Some(&serde_json::json!("Deploying"))
    );
    assert!(harness.store.objects_of("Deployment").is_empty());
}
