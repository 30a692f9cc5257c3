// Public API for integration tests and embedding the server in another app

pub mod api;
pub mod config;
pub mod error;
pub mod hub;
pub mod manager;
pub mod observer;
pub mod protocol;
pub mod server;
pub mod types;
pub mod ws;
