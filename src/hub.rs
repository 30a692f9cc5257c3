//! Broadcast hub: the live client registry and message fan-out
//!
//! Connection tasks push their lifecycle events in (`on_connection_opened`,
//! `on_message_received`, ...) and the hub pushes status notifications out to
//! its [`HubObserver`]. The registry is written under an exclusive lock and
//! snapshotted before any send, so slow recipients never hold the lock.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{HubError, HubResult};
use crate::observer::HubObserver;
use crate::protocol::ServerMessage;
use crate::types::{new_connection_id, ConnectionId, DocumentId, WELCOME_MESSAGE};

/// Outgoing half of a client session
#[async_trait]
pub trait ClientSink: Send + Sync {
    /// Whether the session can still accept frames
    fn is_open(&self) -> bool;

    async fn send_text(&self, text: &str) -> HubResult<()>;

    /// Ask the session to close. Unregistration follows from its close event.
    fn close(&self);
}

/// Handle to one live client session
#[derive(Clone)]
pub struct Connection {
    id: ConnectionId,
    sink: Arc<dyn ClientSink>,
}

impl Connection {
    pub fn new(sink: Arc<dyn ClientSink>) -> Self {
        Self::with_id(new_connection_id(), sink)
    }

    pub fn with_id(id: ConnectionId, sink: Arc<dyn ClientSink>) -> Self {
        Self { id, sink }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_open(&self) -> bool {
        self.sink.is_open()
    }

    pub async fn send_text(&self, text: &str) -> HubResult<()> {
        self.sink.send_text(text).await.map_err(|e| {
            tracing::debug!(connection_id = %self.id, "Send failed: {}", e);
            HubError::Send {
                connection_id: self.id.clone(),
            }
        })
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}

pub struct BroadcastHub {
    clients: RwLock<HashMap<ConnectionId, Connection>>,
    observer: Arc<dyn HubObserver>,
    /// Last timestamp handed out, keeps document updates non-decreasing
    last_timestamp: AtomicI64,
    /// Set once the owning server has shut down; silences the observer
    stopped: AtomicBool,
}

impl BroadcastHub {
    pub fn new(observer: Arc<dyn HubObserver>) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            observer,
            last_timestamp: AtomicI64::new(0),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn observer(&self) -> &Arc<dyn HubObserver> {
        &self.observer
    }

    /// Stop forwarding notifications. Sessions torn down after this point
    /// still leave the registry, but the observer no longer hears about it.
    pub fn stop_notifications(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn notify(&self, f: impl FnOnce(&dyn HubObserver)) {
        if !self.stopped.load(Ordering::SeqCst) {
            f(self.observer.as_ref());
        }
    }

    /// Register a new session and greet it
    pub async fn on_connection_opened(&self, conn: Connection) {
        let count = {
            let mut clients = self.clients.write().await;
            clients.insert(conn.id.clone(), conn.clone());
            clients.len()
        };

        tracing::info!(connection_id = %conn.id, count, "Client connected");
        self.notify(|o| o.on_client_count_changed(count));

        let welcome = ServerMessage::Welcome {
            message: WELCOME_MESSAGE.to_string(),
        };
        let result = match serde_json::to_string(&welcome) {
            Ok(json) => conn.send_text(&json).await,
            Err(e) => Err(HubError::from(e)),
        };
        if let Err(e) = result {
            let description = format!("Failed to send welcome message: {}", e);
            self.notify(|o| o.on_error(&description));
        }
    }

    /// Drop a session from the registry. Closing an unknown id is a no-op.
    pub async fn on_connection_closed(
        &self,
        connection_id: &str,
        code: Option<u16>,
        reason: &str,
        remote: bool,
    ) -> usize {
        let (removed, count) = {
            let mut clients = self.clients.write().await;
            let removed = clients.remove(connection_id).is_some();
            (removed, clients.len())
        };

        tracing::info!(
            connection_id,
            ?code,
            reason,
            remote,
            removed,
            count,
            "Client disconnected"
        );
        self.notify(|o| o.on_client_count_changed(count));
        count
    }

    /// Relay an inbound frame verbatim to everyone except its sender.
    ///
    /// Returns the number of recipients that accepted the frame.
    pub async fn on_message_received(&self, sender_id: &str, text: &str) -> usize {
        self.notify(|o| o.on_message_received(text));
        self.broadcast(text, Some(sender_id)).await
    }

    /// Report a transport failure. The connection stays registered until
    /// its close event arrives.
    pub fn on_transport_error(&self, connection_id: &str, err: &dyn fmt::Display) {
        tracing::warn!(connection_id, "Transport error: {}", err);
        let description = err.to_string();
        self.notify(|o| o.on_error(&description));
    }

    /// Push a document snapshot to every connected client
    pub async fn broadcast_document_update(
        &self,
        doc_id: DocumentId,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> HubResult<usize> {
        let update = ServerMessage::DocumentUpdate {
            doc_id,
            title: title.into(),
            content: content.into(),
            timestamp: self.next_timestamp(),
        };

        let json = match serde_json::to_string(&update) {
            Ok(json) => json,
            Err(e) => {
                let err = HubError::from(e);
                let description = err.to_string();
                self.notify(|o| o.on_error(&description));
                return Err(err);
            }
        };

        let delivered = self.broadcast(&json, None).await;
        tracing::debug!(doc_id, delivered, "Broadcast document update");
        Ok(delivered)
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Ask every registered session to close, e.g. on shutdown
    pub async fn disconnect_all(&self) {
        let clients: Vec<Connection> = self.clients.read().await.values().cloned().collect();
        tracing::info!(count = clients.len(), "Disconnecting all clients");
        for conn in clients {
            conn.sink.close();
        }
    }

    /// Send `payload` to every open client except `exclude`.
    /// Per-recipient failures are skipped.
    async fn broadcast(&self, payload: &str, exclude: Option<&str>) -> usize {
        let recipients: Vec<Connection> = {
            let clients = self.clients.read().await;
            clients
                .values()
                .filter(|c| exclude != Some(c.id()))
                .cloned()
                .collect()
        };

        let mut delivered = 0;
        for conn in recipients {
            if !conn.is_open() {
                continue;
            }
            if conn.send_text(payload).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    fn next_timestamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let prev = self.last_timestamp.fetch_max(now, Ordering::SeqCst);
        prev.max(now)
    }
}
