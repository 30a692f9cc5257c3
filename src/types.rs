use serde::Serialize;

/// Opaque ID types for type safety
pub type ConnectionId = String;
pub type DocumentId = i64;

/// Greeting sent to every client right after it connects
pub const WELCOME_MESSAGE: &str = "Connected to DocSync server";

/// Port used when none is configured
pub const DEFAULT_PORT: u16 = 8080;

/// Point-in-time view of the server for status displays
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub running: bool,
    pub port: u16,
    /// Listening socket address (e.g. `0.0.0.0:8080`), if running
    pub bind_address: Option<String>,
    pub client_count: usize,
}

pub fn new_connection_id() -> ConnectionId {
    ulid::Ulid::new().to_string()
}
