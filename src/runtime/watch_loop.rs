//! # Watch Loop
//!
//! Runs one `kube_runtime::Controller` per resource kind and turns reconcile
//! outcomes into requeue decisions.
//!
//! - Applications also watch their owned Releases, so a child reaching
//!   `Deployed` wakes the parent without waiting for the poll interval
//! - Every pass gets a child of the shutdown token; cancelling it aborts
//!   in-flight repository fetches and store calls

use super::context::Context;
use super::error_policy::{handle_reconciliation_error, resource_key};
use crate::controller::{Outcome, ReconcilerError};
use crate::crd::{Application, Portal, Release, ResourceState, StatefulResource};
use crate::observability::metrics;
use crate::store::Session;
use futures::StreamExt;
use kube::{Api, Client, Resource};
use kube_runtime::controller::{Action, Controller};
use kube_runtime::watcher;
use std::fmt::Debug;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Requeue decision for a successful pass
pub fn next_action(ctx: &Context, outcome: Outcome, terminal: bool) -> Action {
    match outcome {
        Outcome::Transitioned => {
            metrics::increment_requeues_total("transition");
            Action::requeue(ctx.config.transition_requeue())
        }
        Outcome::Unchanged if terminal => Action::await_change(),
        Outcome::Unchanged => {
            metrics::increment_requeues_total("waiting");
            Action::requeue(ctx.config.poll_interval())
        }
        Outcome::Pending => {
            metrics::increment_requeues_total("pending");
            Action::requeue(ctx.config.poll_interval())
        }
    }
}

fn is_terminal<K: StatefulResource>(resource: &K) -> bool {
    resource.observed_state().is_some_and(|s| s.is_terminal())
}

fn finish<K>(
    ctx: &Context,
    resource: &K,
    result: Result<Outcome, ReconcilerError>,
) -> Result<Action, ReconcilerError>
where
    K: StatefulResource + Resource<DynamicType = ()>,
{
    let outcome = result?;
    ctx.reset_backoff(&resource_key(resource));
    Ok(next_action(ctx, outcome, is_terminal(resource)))
}

pub async fn reconcile_application(
    application: Arc<Application>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcilerError> {
    let cancel = ctx.shutdown.child_token();
    let session = Session::new(ctx.store.as_ref(), &cancel);
    let mut application = (*application).clone();
    let result = ctx.applications.reconcile(&session, &mut application).await;
    finish(&ctx, &application, result)
}

pub async fn reconcile_release(
    release: Arc<Release>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcilerError> {
    let cancel = ctx.shutdown.child_token();
    let session = Session::new(ctx.store.as_ref(), &cancel);
    let mut release = (*release).clone();
    let result = ctx.releases.reconcile(&session, &mut release).await;
    finish(&ctx, &release, result)
}

pub async fn reconcile_portal(
    portal: Arc<Portal>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcilerError> {
    let cancel = ctx.shutdown.child_token();
    let session = Session::new(ctx.store.as_ref(), &cancel);
    let mut portal = (*portal).clone();
    let result = ctx.portals.reconcile(&session, &mut portal).await;
    finish(&ctx, &portal, result)
}

fn log_result<T: Debug, E: std::error::Error>(kind: &str, result: Result<T, E>) {
    match result {
        Ok(obj) => debug!("{} reconciled: {:?}", kind, obj),
        Err(e) => warn!("{} controller error: {}", kind, e),
    }
}

/// Run the three controllers until `shutdown` fires
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn run_watch_loop(
    client: Client,
    ctx: Arc<Context>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let applications = Controller::new(
        Api::<Application>::all(client.clone()),
        watcher::Config::default(),
    )
    .owns(Api::<Release>::all(client.clone()), watcher::Config::default())
    .run(
        reconcile_application,
        handle_reconciliation_error::<Application>,
        Arc::clone(&ctx),
    )
    .for_each(|result| async move { log_result("Application", result) });

    let releases = Controller::new(
        Api::<Release>::all(client.clone()),
        watcher::Config::default(),
    )
    .run(
        reconcile_release,
        handle_reconciliation_error::<Release>,
        Arc::clone(&ctx),
    )
    .for_each(|result| async move { log_result("Release", result) });

    let portals = Controller::new(Api::<Portal>::all(client), watcher::Config::default())
        .run(
            reconcile_portal,
            handle_reconciliation_error::<Portal>,
            Arc::clone(&ctx),
        )
        .for_each(|result| async move { log_result("Portal", result) });

    info!("🚀 Watching Applications, Releases and Portals");
    tokio::select! {
        () = async { tokio::join!(applications, releases, portals); } => {
            warn!("All controller streams ended");
        }
        () = shutdown.cancelled() => {
            info!("Shutdown requested, stopping controllers");
        }
    }
    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM
pub async fn shutdown_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("Received shutdown signal");
    shutdown.cancel();
}
