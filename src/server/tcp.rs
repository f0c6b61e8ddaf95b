//! TCP acceptor: turns accepted sockets into hub-registered connections
//!
//! The acceptor owns the listener lifecycle. On shutdown it stops accepting,
//! then waits for the remaining connection tasks to drain; bounding that wait
//! is the caller's job.

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::server::connection::Connection;
use crate::server::hub::HubHandle;

/// Accepts TCP connections and wires them to the hub.
pub struct TcpServer {
    cfg: Config,
    hub: HubHandle,
}

impl TcpServer {
    /// The hub must already be running; the acceptor only holds its handle.
    pub fn new(cfg: Config, hub: HubHandle) -> Self {
        Self { cfg, hub }
    }

    /// Accept connections until the cancellation token fires, then wait for
    /// every spawned connection task to finish.
    pub async fn serve(&self, listener: TcpListener, cancel: CancellationToken) -> Result<()> {
        let mut connection_tasks = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                // Reap finished connection tasks as we go.
                Some(_) = connection_tasks.join_next(), if !connection_tasks.is_empty() => {}

                accepted = listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            warn!(error = %err, "accept failed");
                            continue;
                        }
                    };

                    let connection = match Connection::new(self.cfg.clone(), self.hub.clone(), stream) {
                        Ok(connection) => connection,
                        Err(err) => {
                            warn!(peer = %peer_addr, error = %err, "dropping connection without endpoints");
                            continue;
                        }
                    };

                    debug!(peer = %peer_addr, client = %connection.client_id(), "connection accepted");
                    connection_tasks.spawn(connection.run(cancel.clone()));
                }
            }
        }

        info!("acceptor stopped; draining connections");
        while connection_tasks.join_next().await.is_some() {}

        Ok(())
    }
}
