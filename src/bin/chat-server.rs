//! Chat server binary: config, logging, listener, graceful shutdown

use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use parley::{Config, Hub, TcpServer};

/// How long shutdown may take before remaining sockets are dropped.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = Config::from_env().context("failed to load config")?;

    let listener = TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("failed to listen on {:?}", cfg.listen_addr))?;
    info!(addr = %listener.local_addr()?, "listening");

    let cancel = CancellationToken::new();

    let (hub, handle) = Hub::new();
    let hub_task = tokio::spawn(hub.run(cancel.clone()));

    let server = TcpServer::new(cfg, handle);
    let serve_cancel = cancel.clone();
    let serve_task = tokio::spawn(async move { server.serve(listener, serve_cancel).await });

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for shutdown signal")?;
    info!("shutdown signal received");
    cancel.cancel();

    let drained = timeout(SHUTDOWN_GRACE, async {
        let _ = serve_task.await;
        let _ = hub_task.await;
    })
    .await;

    match drained {
        Ok(()) => info!("server stopped"),
        Err(_) => warn!("shutdown timed out; dropping remaining connections"),
    }

    Ok(())
}
