//! Per-connection bridge between socket I/O and the hub event model
//!
//! Each accepted socket gets one reader task and one writer task. The reader
//! turns frames into hub inbound events; the writer drains a bounded outbound
//! queue that the hub fills through [`ConnectionHandle`]. Neither task ever
//! touches hub state directly.

use std::io::{self, ErrorKind};
use std::time::Duration;

use bytes::Bytes;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;
use crate::protocol::frame::{FrameReader, FrameWriter};
use crate::server::hub::{ClientId, ClientWriter, HubHandle, WriterError};

/// The hub's outbound handle for one connection: a bounded queue plus the
/// connection's shutdown token.
pub struct ConnectionHandle {
    frames: mpsc::Sender<Bytes>,
    shutdown: CancellationToken,
}

impl ClientWriter for ConnectionHandle {
    /// Non-blocking enqueue. A full queue means the client is reading too
    /// slowly; the hub fails that client closed rather than waiting.
    fn send(&self, frame: Bytes) -> Result<(), WriterError> {
        match self.frames.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(WriterError::Backpressure),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(WriterError::Closed),
        }
    }

    fn close(&self) {
        self.shutdown.cancel();
    }
}

/// One accepted TCP connection.
pub struct Connection {
    cfg: Config,
    hub: HubHandle,
    stream: TcpStream,
    client_id: ClientId,
}

impl Connection {
    /// Wrap an accepted socket. The identifier is derived from the socket's
    /// endpoints, which the kernel keeps unique per live connection.
    pub fn new(cfg: Config, hub: HubHandle, stream: TcpStream) -> io::Result<Self> {
        let client_id = ClientId::from_endpoints(stream.peer_addr()?, stream.local_addr()?);
        Ok(Self {
            cfg,
            hub,
            stream,
            client_id,
        })
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Register with the hub, run the reader and writer tasks, and block
    /// until both exit.
    pub async fn run(self, cancel: CancellationToken) {
        let Connection {
            cfg,
            hub,
            stream,
            client_id,
        } = self;

        let shutdown = cancel.child_token();
        let (frame_tx, frame_rx) = mpsc::channel(cfg.write_queue_depth);

        let handle = ConnectionHandle {
            frames: frame_tx,
            shutdown: shutdown.clone(),
        };
        hub.register(client_id.clone(), Box::new(handle)).await;

        let (read_half, write_half) = stream.into_split();

        // The read deadline doubles as the idle deadline when only the
        // latter is configured.
        let read_timeout_secs = if cfg.read_timeout_secs > 0 {
            cfg.read_timeout_secs
        } else {
            cfg.idle_timeout_secs
        };

        let reader = tokio::spawn(read_loop(
            hub.clone(),
            client_id.clone(),
            read_half,
            cfg.max_frame_bytes,
            read_timeout_secs,
            shutdown.clone(),
        ));
        let writer = tokio::spawn(write_loop(
            hub.clone(),
            client_id.clone(),
            frame_rx,
            write_half,
            cfg.write_timeout_secs,
            shutdown.clone(),
        ));

        let _ = reader.await;
        let _ = writer.await;

        hub.unregister(client_id.clone(), "connection closed").await;
        debug!(client = %client_id, "connection tasks finished");
    }
}

async fn read_loop(
    hub: HubHandle,
    client_id: ClientId,
    read_half: OwnedReadHalf,
    max_frame_bytes: usize,
    read_timeout_secs: u64,
    shutdown: CancellationToken,
) {
    let mut frames = FrameReader::new(read_half, max_frame_bytes);

    loop {
        // The deadline is re-armed for every read.
        let next_frame = async {
            if read_timeout_secs > 0 {
                match timeout(Duration::from_secs(read_timeout_secs), frames.read_frame()).await {
                    Ok(result) => result,
                    Err(_) => Err(io::Error::new(
                        ErrorKind::TimedOut,
                        "read deadline exceeded",
                    )),
                }
            } else {
                frames.read_frame().await
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => return,

            result = next_frame => match result {
                Ok(Some(frame)) => hub.deliver(client_id.clone(), frame).await,
                Ok(None) => {
                    hub.unregister(client_id, "connection closed by peer").await;
                    return;
                }
                Err(err) => {
                    hub.unregister(client_id, format!("read error: {}", err)).await;
                    return;
                }
            },
        }
    }
}

async fn write_loop(
    hub: HubHandle,
    client_id: ClientId,
    mut frame_rx: mpsc::Receiver<Bytes>,
    write_half: OwnedWriteHalf,
    write_timeout_secs: u64,
    shutdown: CancellationToken,
) {
    let mut writer = FrameWriter::new(write_half);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,

            maybe_frame = frame_rx.recv() => {
                let Some(frame) = maybe_frame else {
                    return;
                };

                // The deadline is scoped to this one write.
                let result = if write_timeout_secs > 0 {
                    match timeout(
                        Duration::from_secs(write_timeout_secs),
                        writer.write_frame(&shutdown, &frame),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(io::Error::new(
                            ErrorKind::TimedOut,
                            "write deadline exceeded",
                        )),
                    }
                } else {
                    writer.write_frame(&shutdown, &frame).await
                };

                if let Err(err) = result {
                    hub.unregister(client_id, format!("write error: {}", err)).await;
                    return;
                }
            },
        }
    }
}
