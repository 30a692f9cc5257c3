//! Start/stop lifecycle around the server
//!
//! Each `start` builds a fresh hub, so a restart begins with an empty
//! registry.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::{HubError, HubResult};
use crate::hub::BroadcastHub;
use crate::observer::HubObserver;
use crate::server::{self, RunningServer};
use crate::types::{DocumentId, ServerStatus};

pub struct ServerManager {
    config: Config,
    observer: Arc<dyn HubObserver>,
    server: Mutex<Option<RunningServer>>,
}

impl ServerManager {
    pub fn new(config: Config, observer: Arc<dyn HubObserver>) -> Self {
        Self {
            config,
            observer,
            server: Mutex::new(None),
        }
    }

    /// Start the server. Starting an already running server is a no-op.
    pub async fn start(&self) -> HubResult<ServerStatus> {
        let mut server = self.server.lock().await;
        if let Some(running) = server.as_ref() {
            tracing::warn!("Server already running on {}", running.local_addr());
            return Ok(status_of(Some(running), self.config.port).await);
        }

        let hub = Arc::new(BroadcastHub::new(self.observer.clone()));
        let running = server::start(self.config.port, hub).await?;
        tracing::info!("WebSocket server started on {}", running.local_addr());
        *server = Some(running);

        Ok(status_of(server.as_ref(), self.config.port).await)
    }

    /// Stop the server if it is running
    pub async fn stop(&self) {
        let running = self.server.lock().await.take();
        match running {
            Some(running) => {
                running.stop(self.config.shutdown_timeout).await;
                self.observer.on_client_count_changed(0);
            }
            None => tracing::debug!("Stop requested but server is not running"),
        }
    }

    pub async fn status(&self) -> ServerStatus {
        let server = self.server.lock().await;
        status_of(server.as_ref(), self.config.port).await
    }

    pub async fn broadcast_document_update(
        &self,
        doc_id: DocumentId,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> HubResult<usize> {
        let hub = match self.server.lock().await.as_ref() {
            Some(running) => running.hub().clone(),
            None => return Err(HubError::NotRunning),
        };
        hub.broadcast_document_update(doc_id, title, content).await
    }
}

async fn status_of(server: Option<&RunningServer>, configured_port: u16) -> ServerStatus {
    match server {
        Some(running) => ServerStatus {
            running: true,
            port: running.local_addr().port(),
            bind_address: Some(running.local_addr().to_string()),
            client_count: running.hub().client_count().await,
        },
        None => ServerStatus {
            running: false,
            port: configured_port,
            bind_address: None,
            client_count: 0,
        },
    }
}
