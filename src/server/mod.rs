//! TCP server: listener, per-connection sessions and configuration

pub mod config;
pub mod connection;
pub mod listener;

pub use config::{FlushPolicy, ServerConfig};
pub use connection::Connection;
pub use listener::Server;
