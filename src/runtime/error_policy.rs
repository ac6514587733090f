//! # Error Policy
//!
//! Error handling and backoff for the controller watch loop.

use super::context::Context;
use crate::controller::ReconcilerError;
use crate::observability;
use crate::store::StoreError;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Key identifying a resource in the backoff table
pub fn resource_key<K>(obj: &K) -> String
where
    K: Resource<DynamicType = ()>,
{
    format!(
        "{}/{}/{}",
        K::kind(&()),
        obj.namespace().unwrap_or_default(),
        obj.name_any()
    )
}

/// Whether `error` reports that `obj` itself no longer exists in the store
pub fn is_resource_gone<K>(obj: &K, error: &ReconcilerError) -> bool
where
    K: Resource<DynamicType = ()>,
{
    match error {
        ReconcilerError::Store(StoreError::NotFound { kind, name }) => {
            *kind == K::kind(&()) && *name == obj.name_any()
        }
        _ => false,
    }
}

/// Handle a failed reconcile pass with per-resource Fibonacci backoff
///
/// The resource has already been moved to its failure state by the
/// reconciler; the backoff only spaces out the passes that observe it.
pub fn handle_reconciliation_error<K>(obj: Arc<K>, error: &ReconcilerError, ctx: Arc<Context>) -> Action
where
    K: Resource<DynamicType = ()>,
{
    let kind = K::kind(&());
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.kind = %kind,
        resource.name = %name,
        resource.namespace = %namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    if matches!(error, ReconcilerError::Cancelled) {
        info!("Reconciliation of {} {} cancelled", kind, name);
        return Action::await_change();
    }

    // Deleted while failing; nothing will reconcile this key again
    if is_resource_gone(obj.as_ref(), error) {
        info!("{} {} no longer exists, dropping its backoff", kind, name);
        ctx.reset_backoff(&resource_key(obj.as_ref()));
        return Action::await_change();
    }

    error!("Reconciliation error for {} {}: {}", kind, name, error);
    observability::metrics::increment_reconciliation_errors(&kind, error.reason());

    let (backoff_seconds, error_count) = ctx.next_error_backoff(&resource_key(obj.as_ref()));
    #[allow(
        clippy::cast_possible_wrap,
        reason = "Backoff is capped far below i64::MAX"
    )]
    let next_trigger_time = chrono::Utc::now() + chrono::Duration::seconds(backoff_seconds as i64);

    info!(
        "🔄 Retrying with Fibonacci backoff: {}s (error count: {}, trigger source: error-backoff)",
        backoff_seconds, error_count
    );
    info!(
        "📅 Next retry scheduled: {} (in {}s, trigger source: error-backoff)",
        next_trigger_time.to_rfc3339(),
        backoff_seconds
    );

    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(Duration::from_secs(backoff_seconds))
}
