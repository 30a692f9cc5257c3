use std::time::Duration;

use crate::types::DEFAULT_PORT;

/// Server configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Port the WebSocket server listens on
    pub port: u16,
    /// How long `stop` waits for the listener before aborting it
    pub shutdown_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            shutdown_timeout: Duration::from_millis(1000),
        }
    }
}

impl Config {
    /// Load config from environment variables
    /// DOCSYNC_PORT, DOCSYNC_SHUTDOWN_TIMEOUT_MS
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = match std::env::var("DOCSYNC_PORT") {
            Ok(v) => v.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(
                    value = v.as_str(),
                    "Invalid DOCSYNC_PORT, using {}",
                    defaults.port
                );
                defaults.port
            }),
            Err(_) => defaults.port,
        };

        let shutdown_timeout = std::env::var("DOCSYNC_SHUTDOWN_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.shutdown_timeout);

        tracing::info!(port, ?shutdown_timeout, "Config loaded");

        Self {
            port,
            shutdown_timeout,
        }
    }
}
