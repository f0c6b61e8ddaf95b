//! Parley - Multi-User Chat Service
//!
//! A newline-framed JSON protocol over TCP with a single authoritative
//! server, plus the terminal reference client that drives it.
//!
//! ## Architecture
//!
//! The server is three layers composed bottom-up:
//!
//! - **Framing**: newline-delimited byte frames with a strict size cap
//! - **Connection**: one reader task and one writer task per accepted
//!   socket, bridged to the hub through a bounded outbound queue
//! - **Hub**: a single-owner event loop holding all shared state; other
//!   tasks reach it only through its register/unregister/inbound channels
//!
//! The client is the mirror image: a line-oriented command parser, an
//! identify-gate, and a single select loop over socket and stdin.
//!
//! ## Example
//!
//! ```rust,ignore
//! use parley::{Config, Hub, TcpServer};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cfg = Config::from_env()?;
//!     let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
//!     let cancel = CancellationToken::new();
//!
//!     let (hub, handle) = Hub::new();
//!     tokio::spawn(hub.run(cancel.clone()));
//!
//!     TcpServer::new(cfg, handle).serve(listener, cancel).await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;

pub use config::Config;
pub use error::{ChatError, Result};
pub use protocol::{
    codec::{DecodeError, Envelope},
    frame::{FrameReader, FrameWriter, LineFramer},
    messages::{MessageType, Status},
};
pub use server::{ClientId, ClientWriter, Connection, Hub, HubHandle, TcpServer, WriterError};
