//! Error handling for the chat service

use std::fmt;

/// Result type alias for chat operations
pub type Result<T> = std::result::Result<T, ChatError>;

/// Chat service error types
#[derive(Debug, Clone)]
pub enum ChatError {
    /// Network-related errors (read/write failures, closed sockets)
    Network(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// Protocol errors (malformed or out-of-order frames)
    Protocol(String),
    /// Connection errors (accept/connect failures)
    Connection(String),
    /// Configuration error
    Config(String),
    /// Timeout error
    Timeout(String),
    /// Server internal error
    Internal(String),
}

impl ChatError {
    /// Create a network error
    pub fn network<T: Into<String>>(msg: T) -> Self {
        ChatError::Network(msg.into())
    }

    /// Create a serialization error
    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        ChatError::Serialization(msg.into())
    }

    /// Create a protocol error
    pub fn protocol<T: Into<String>>(msg: T) -> Self {
        ChatError::Protocol(msg.into())
    }

    /// Create a connection error
    pub fn connection<T: Into<String>>(msg: T) -> Self {
        ChatError::Connection(msg.into())
    }

    /// Create a configuration error
    pub fn config<T: Into<String>>(msg: T) -> Self {
        ChatError::Config(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<T: Into<String>>(msg: T) -> Self {
        ChatError::Timeout(msg.into())
    }

    /// Create an internal error
    pub fn internal<T: Into<String>>(msg: T) -> Self {
        ChatError::Internal(msg.into())
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::Network(msg) => write!(f, "Network error: {}", msg),
            ChatError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            ChatError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            ChatError::Connection(msg) => write!(f, "Connection error: {}", msg),
            ChatError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ChatError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            ChatError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ChatError {}

impl From<std::io::Error> for ChatError {
    fn from(err: std::io::Error) -> Self {
        ChatError::Network(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Serialization(format!("JSON error: {}", err))
    }
}
