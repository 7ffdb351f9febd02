//! Connection management module

pub mod builder;
pub mod config;
pub mod connection;

pub use builder::{ConnectionBuilder, DatagramLogger, ErrorCallback};
pub use config::ConnectionConfig;
pub use connection::Connection;
