//! Gatekeeper — brokers access to vault secrets behind out-of-band human
//! approval. Library side; the binary in `main.rs` wires it up.

pub mod api;
pub mod broker;
pub mod cli;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod notification;
pub mod store;
pub mod vault;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub broker: broker::RequestBroker,
    pub config: config::Config,
}
