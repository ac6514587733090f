//! # Apply
//!
//! Idempotent create-or-update of dynamic objects.
//!
//! Every object is read before it is written so an update always carries the
//! stored `resourceVersion`; a stale version surfaces as a conflict and is
//! retried on a later pass after a fresh read.

use crate::crd::managed_by_labels;
use crate::observability::metrics;
use crate::store::{object_gvk, Session, StoreError};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use kube::Resource;
use tracing::{debug, info};

/// What [`create_or_update`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOperation {
    Created,
    Updated,
}

impl ApplyOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
        }
    }
}

/// Controller owner reference pointing at `owner`
///
/// `None` when the owner has not been persisted yet (no uid).
pub fn owner_reference<K>(owner: &K) -> Option<OwnerReference>
where
    K: Resource<DynamicType = ()>,
{
    owner.controller_owner_ref(&())
}

fn stamp(obj: &mut DynamicObject, namespace: Option<&str>, owner: Option<&OwnerReference>) {
    if let Some(ns) = namespace {
        obj.metadata.namespace = Some(ns.to_string());
    }

    obj.metadata
        .labels
        .get_or_insert_with(Default::default)
        .extend(managed_by_labels());

    if let Some(owner) = owner {
        let refs = obj.metadata.owner_references.get_or_insert_with(Vec::new);
        if !refs.iter().any(|r| r.uid == owner.uid) {
            refs.push(owner.clone());
        }
    }
}

/// Create `obj`, or update it in place when it already exists
///
/// The namespace is forced to `namespace` (when given) before lookup, the
/// managed-by label is added and `owner` is recorded as an owner reference.
/// Returns the object as stored.
pub async fn create_or_update(
    session: &Session<'_>,
    mut obj: DynamicObject,
    namespace: Option<&str>,
    owner: Option<&OwnerReference>,
) -> Result<(DynamicObject, ApplyOperation), StoreError> {
    let gvk = object_gvk(&obj)?;
    stamp(&mut obj, namespace, owner);
    let name = obj.metadata.name.clone().unwrap_or_default();

    let existing = session
        .get(&gvk, obj.metadata.namespace.as_deref(), &name)
        .await?;

    let (stored, operation) = match existing {
        None => {
            let stored = session.create(&gvk, &obj).await?;
            (stored, ApplyOperation::Created)
        }
        Some(current) => {
            obj.metadata.resource_version = current.metadata.resource_version;
            let stored = session.update(&gvk, &obj).await?;
            (stored, ApplyOperation::Updated)
        }
    };

    debug!(
        "{} {} {}/{}",
        operation.as_str(),
        gvk.kind,
        stored.metadata.namespace.as_deref().unwrap_or("-"),
        name
    );
    metrics::increment_objects_applied(operation.as_str());
    Ok((stored, operation))
}

/// Apply `objects` in order, stopping at the first failure
pub async fn apply_all(
    session: &Session<'_>,
    objects: Vec<DynamicObject>,
    namespace: Option<&str>,
    owner: Option<&OwnerReference>,
) -> Result<usize, StoreError> {
    let total = objects.len();
    for obj in objects {
        create_or_update(session, obj, namespace, owner).await?;
    }
    info!(
        "Applied {} object(s) into {}",
        total,
        namespace.unwrap_or("cluster scope")
    );
    Ok(total)
}
