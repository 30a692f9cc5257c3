use async_trait::async_trait;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::{HubError, HubResult};
use crate::hub::{BroadcastHub, ClientSink, Connection};
use crate::server::{AppState, SessionSignals};

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::debug!("WebSocket connection request");
    let hub = state.hub.clone();
    let sessions = state.sessions.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub, sessions))
}

/// Hub-facing sink backed by the connection's writer task
struct WsSink {
    tx: mpsc::UnboundedSender<Message>,
    /// Set when the server sent the close frame
    closed_by_server: Arc<AtomicBool>,
}

#[async_trait]
impl ClientSink for WsSink {
    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn send_text(&self, text: &str) -> HubResult<()> {
        self.tx
            .send(Message::Text(text.to_owned().into()))
            .map_err(|_| HubError::Transport("connection writer closed".to_string()))
    }

    fn close(&self) {
        self.closed_by_server.store(true, Ordering::SeqCst);
        let frame = CloseFrame {
            code: close_code::AWAY,
            reason: Utf8Bytes::from_static("Server shutting down"),
        };
        let _ = self.tx.send(Message::Close(Some(frame)));
    }
}

/// Drive one client session: register it, relay its frames, unregister on
/// close or when the server shuts down
async fn handle_socket(socket: WebSocket, hub: Arc<BroadcastHub>, sessions: SessionSignals) {
    // Held until this function returns; the server waits on it when stopping
    let Some(_alive) = sessions.session_guard() else {
        tracing::debug!("Server stopping, dropping new WebSocket session");
        return;
    };
    let mut shutdown = sessions.shutdown();

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    // Frames from the hub and pongs are funneled through one writer
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let closed_by_server = Arc::new(AtomicBool::new(false));
    let sink = WsSink {
        tx: tx.clone(),
        closed_by_server: closed_by_server.clone(),
    };
    let conn = Connection::new(Arc::new(sink));
    let id = conn.id().to_string();
    hub.on_connection_opened(conn).await;

    let mut code = None;
    let mut reason = String::new();
    let mut failed = false;

    loop {
        tokio::select! {
            // Fires on shutdown, or immediately if the server is already gone
            _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => {
                tracing::debug!(connection_id = %id, "Session ended by server shutdown");
                closed_by_server.store(true, Ordering::SeqCst);
                break;
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!(connection_id = %id, "Received message: {}", text.as_str());
                        hub.on_message_received(&id, text.as_str()).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if tx.send(Message::Pong(data)).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(frame) = frame {
                            code = Some(frame.code);
                            reason = frame.reason.as_str().to_owned();
                        }
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        hub.on_transport_error(&id, &e);
                        failed = true;
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    let remote = !failed && !closed_by_server.load(Ordering::SeqCst);
    hub.on_connection_closed(&id, code, &reason, remote).await;
    drop(tx);
    writer.abort();
}
