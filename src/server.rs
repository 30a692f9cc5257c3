//! Listener setup and the running server handle

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::{HubError, HubResult};
use crate::hub::BroadcastHub;
use crate::{api, ws};

/// Shared router state
pub struct AppState {
    pub hub: Arc<BroadcastHub>,
    pub local_addr: SocketAddr,
    pub sessions: SessionSignals,
}

/// Ties WebSocket sessions to the server's lifetime.
///
/// Sessions watch `shutdown` and end when it flips to true. Each live
/// session holds an upgraded `alive` sender, so the server can tell when
/// the last one is gone.
#[derive(Clone)]
pub struct SessionSignals {
    shutdown: watch::Receiver<bool>,
    alive: mpsc::WeakSender<()>,
}

/// Server-side half of [`SessionSignals`]
pub struct SessionControl {
    shutdown: watch::Sender<bool>,
    alive: mpsc::Sender<()>,
    done: mpsc::Receiver<()>,
}

pub fn session_signals() -> (SessionSignals, SessionControl) {
    let (shutdown_tx, shutdown) = watch::channel(false);
    let (alive, done) = mpsc::channel(1);
    let signals = SessionSignals {
        shutdown,
        alive: alive.downgrade(),
    };
    let control = SessionControl {
        shutdown: shutdown_tx,
        alive,
        done,
    };
    (signals, control)
}

impl SessionSignals {
    /// Keep-alive guard for one session. `None` once the server is stopping.
    pub fn session_guard(&self) -> Option<mpsc::Sender<()>> {
        self.alive.upgrade()
    }

    pub fn shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.clone()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/status", get(api::get_status))
        .route("/api/documents/broadcast", post(api::broadcast_document))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `0.0.0.0:port` with address reuse so a restart does not trip over
/// a socket lingering in TIME_WAIT.
pub fn bind(port: u16) -> HubResult<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listen = || -> std::io::Result<TcpListener> {
        let socket = TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        socket.listen(1024)
    };
    listen().map_err(|source| HubError::Bind { port, source })
}

/// Start serving on `port`. Port 0 picks an ephemeral port.
pub async fn start(port: u16, hub: Arc<BroadcastHub>) -> HubResult<RunningServer> {
    let listener = bind(port)?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| HubError::Bind { port, source })?;

    let (sessions, session_control) = session_signals();
    let app = router(Arc::new(AppState {
        hub: hub.clone(),
        local_addr,
        sessions,
    }));

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(e) = result {
            tracing::error!("Server error: {}", e);
        }
    });

    tracing::info!("Listening on ws://{}/ws", local_addr);
    hub.observer().on_server_started();

    Ok(RunningServer {
        local_addr,
        hub,
        shutdown: shutdown_tx,
        task,
        sessions: session_control,
    })
}

pub struct RunningServer {
    local_addr: SocketAddr,
    hub: Arc<BroadcastHub>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
    sessions: SessionControl,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Close all clients and stop accepting.
    ///
    /// Clients get `grace` to finish the close handshake. Whatever is still
    /// open after that is dropped, and the hub stops notifying its observer
    /// before those sessions unregister. Returns once every session task
    /// has ended.
    pub async fn stop(self, grace: Duration) {
        let Self {
            local_addr,
            hub,
            shutdown,
            mut task,
            sessions,
        } = self;
        let SessionControl {
            shutdown: sessions_shutdown,
            alive: sessions_alive,
            done: mut sessions_done,
        } = sessions;

        hub.disconnect_all().await;
        let _ = shutdown.send(());
        // Only session guards keep the channel open from here on
        drop(sessions_alive);

        let deadline = tokio::time::Instant::now() + grace;
        if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
            tracing::warn!(?grace, "Listener did not stop in time, aborting");
            task.abort();
        }

        if tokio::time::timeout_at(deadline, sessions_done.recv())
            .await
            .is_err()
        {
            let open = hub.client_count().await;
            tracing::warn!(open, "Dropping sessions that did not finish closing");
        }

        hub.stop_notifications();
        let _ = sessions_shutdown.send(true);
        // Resolves with None once the last session guard is dropped
        sessions_done.recv().await;

        tracing::info!("Server on {} stopped", local_addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{ChannelObserver, StatusEvent};

    #[tokio::test]
    async fn test_start_notifies_observer_and_reports_address() {
        let (observer, mut rx) = ChannelObserver::new();
        let hub = Arc::new(BroadcastHub::new(Arc::new(observer)));

        let server = start(0, hub).await.unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert_eq!(rx.try_recv().unwrap(), StatusEvent::ServerStarted);

        server.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_bind_fails_when_port_taken() {
        let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let (observer, mut rx) = ChannelObserver::new();
        let hub = Arc::new(BroadcastHub::new(Arc::new(observer)));

        let result = start(port, hub).await;
        match result {
            Err(HubError::Bind { port: p, .. }) => assert_eq!(p, port),
            Err(e) => panic!("Expected Bind error, got {}", e),
            Ok(_) => panic!("Expected Bind error"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_port_reusable_after_stop() {
        let (observer, _rx) = ChannelObserver::new();
        let hub = Arc::new(BroadcastHub::new(Arc::new(observer)));

        let server = start(0, hub.clone()).await.unwrap();
        let port = server.local_addr().port();
        server.stop(Duration::from_secs(1)).await;

        let server = start(port, hub).await.unwrap();
        assert_eq!(server.local_addr().port(), port);
        server.stop(Duration::from_secs(1)).await;
    }
}
