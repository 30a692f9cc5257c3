//! Error types for the document sync server

use crate::types::ConnectionId;

/// Result type for hub and server operations
pub type HubResult<T> = Result<T, HubError>;

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("Failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to send to connection {connection_id}")]
    Send { connection_id: ConnectionId },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server is not running")]
    NotRunning,
}
