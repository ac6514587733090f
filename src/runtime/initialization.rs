//! # Initialization
//!
//! Controller initialization: rustls setup, tracing, metrics, HTTP server
//! startup, Kubernetes client and reconciler context.

use super::context::Context;
use crate::config::ControllerConfig;
use crate::constants;
use crate::crd::Application;
use crate::observability;
use crate::observability::server::{start_server, ServerState};
use crate::repository::GitConnector;
use crate::store::KubeStore;
use anyhow::Result;
use kube::api::{Api, ListParams};
use kube::Client;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Everything the watch loop needs
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Reconciler context shared by all controllers
    pub context: Arc<Context>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    /// Background HTTP server task
    pub server_handle: JoinHandle<()>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("context", &self.context)
            .field("server_state", &self.server_state)
            .field("server_handle", &self.server_handle)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Reconciler context setup
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn initialize(shutdown: CancellationToken) -> Result<InitializationResult> {
    // Must happen before any rustls connection is made
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portal_controller=info".into()),
        )
        .init();

    info!("Starting Portal Controller v{}", env!("CARGO_PKG_VERSION"));

    let config = ControllerConfig::from_env();
    info!(
        "Bundles: application={}, portal={}; default branch: {}",
        config.application_bundle_path().display(),
        config.portal_bundle_path().display(),
        config.default_branch
    );
    for bundle in [config.application_bundle_path(), config.portal_bundle_path()] {
        if !bundle.join("templates").is_dir() {
            warn!(
                "Bundle {} has no templates directory; renders will fail",
                bundle.display()
            );
        }
    }

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_port = config.metrics_port;
    let server_state_clone = Arc::clone(&server_state);
    let server_shutdown = shutdown.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone, server_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Readiness probes should pass as soon as the watch starts
    wait_for_server_ready(&server_state, &server_handle).await?;

    let client = Client::try_default().await?;
    check_crds(&client).await;

    let store = Arc::new(KubeStore::new(client.clone()));
    let connector = Arc::new(GitConnector::default());
    let context = Arc::new(Context::new(store, connector, config, shutdown));

    info!("Controller initialized, starting watch loop...");
    Ok(InitializationResult {
        client,
        context,
        server_state,
        server_handle,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(constants::DEFAULT_SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval = Duration::from_millis(constants::DEFAULT_SERVER_POLL_INTERVAL_MS);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Log whether the CRDs are installed; the watch retries on its own if not
async fn check_crds(client: &Client) {
    let applications: Api<Application> = Api::all(client.clone());
    match applications.list(&ListParams::default().limit(1)).await {
        Ok(_) => info!("CRDs are queryable"),
        Err(e) => {
            error!("CRD is not queryable; {:?}. Is the CRD installed?", e);
            error!("Installation: cargo run --bin crdgen | kubectl apply -f -");
            warn!("Continuing despite CRD queryability check failure - controller will retry");
        }
    }
}
