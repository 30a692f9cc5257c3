use crate::types::DocumentId;
use serde::{Deserialize, Serialize};

/// Envelopes the server pushes to clients.
///
/// Inbound frames have no schema; they are relayed verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        message: String,
    },
    DocumentUpdate {
        #[serde(rename = "docId")]
        doc_id: DocumentId,
        title: String,
        content: String,
        /// Epoch milliseconds
        timestamp: i64,
    },
}

/// Body of `POST /api/documents/broadcast`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    pub doc_id: DocumentId,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastResponse {
    /// Number of clients the update was handed to
    pub delivered: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
