//! Status notifications emitted by the hub
//!
//! The hub never owns UI state; it pushes lifecycle events out through a
//! [`HubObserver`]. Two implementations ship with the crate: one that logs
//! through `tracing`, and one that forwards [`StatusEvent`] values over a
//! channel so a controller can consume them as plain data.

use tokio::sync::mpsc;

/// Lifecycle notification delivered to an observer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    ServerStarted,
    ClientCountChanged { count: usize },
    MessageReceived { message: String },
    Error { description: String },
}

/// Receiver of hub status notifications.
///
/// Called from connection tasks concurrently, so implementations must be
/// cheap and must not block.
pub trait HubObserver: Send + Sync {
    fn on_server_started(&self) {}

    fn on_client_count_changed(&self, count: usize);

    fn on_message_received(&self, message: &str);

    fn on_error(&self, description: &str);
}

/// Observer that only logs
#[derive(Debug, Default, Clone)]
pub struct TracingObserver;

impl HubObserver for TracingObserver {
    fn on_server_started(&self) {
        tracing::info!("Document sync server running");
    }

    fn on_client_count_changed(&self, count: usize) {
        tracing::debug!(count, "Client count changed");
    }

    fn on_message_received(&self, message: &str) {
        tracing::debug!("Message received: {}", message);
    }

    fn on_error(&self, description: &str) {
        tracing::error!("Server error: {}", description);
    }
}

/// Observer that forwards every notification as a [`StatusEvent`]
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: StatusEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.tx.send(event);
    }
}

impl HubObserver for ChannelObserver {
    fn on_server_started(&self) {
        self.emit(StatusEvent::ServerStarted);
    }

    fn on_client_count_changed(&self, count: usize) {
        self.emit(StatusEvent::ClientCountChanged { count });
    }

    fn on_message_received(&self, message: &str) {
        self.emit(StatusEvent::MessageReceived {
            message: message.to_string(),
        });
    }

    fn on_error(&self, description: &str) {
        self.emit(StatusEvent::Error {
            description: description.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_observer_forwards_events_in_order() {
        let (observer, mut rx) = ChannelObserver::new();

        observer.on_server_started();
        observer.on_client_count_changed(2);
        observer.on_message_received("edit");
        observer.on_error("boom");

        assert_eq!(rx.try_recv().unwrap(), StatusEvent::ServerStarted);
        assert_eq!(
            rx.try_recv().unwrap(),
            StatusEvent::ClientCountChanged { count: 2 }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            StatusEvent::MessageReceived {
                message: "edit".to_string()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            StatusEvent::Error {
                description: "boom".to_string()
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_observer_survives_dropped_receiver() {
        let (observer, rx) = ChannelObserver::new();
        drop(rx);
        observer.on_client_count_changed(1);
    }
}
