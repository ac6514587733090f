//! # Portal Controller
//!
//! Entry point: initializes the runtime and runs the watch loop until SIGINT
//! or SIGTERM.

use anyhow::Result;
use portal_controller::runtime::{initialize, run_watch_loop, shutdown_on_signal};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let init_result = initialize(shutdown.clone()).await?;
    run_watch_loop(init_result.client, init_result.context, shutdown.clone()).await?;

    shutdown.cancel();
    init_result.server_handle.await?;
    info!("Portal controller stopped");
    Ok(())
}
