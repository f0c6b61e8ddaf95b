//! Server side: hub state machine, per-connection tasks, TCP acceptor

pub mod connection;
pub mod hub;
pub mod tcp;

pub use connection::Connection;
pub use hub::{ClientId, ClientWriter, Hub, HubHandle, WriterError};
pub use tcp::TcpServer;
