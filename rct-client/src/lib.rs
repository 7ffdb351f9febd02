//! RCT inverter client
//!
//! This crate composes the framing layer and the transport layer into a
//! [`Connection`]: a single shared socket with automatic redial, a
//! publish/subscribe [`Broker`] distributing every received datagram, and a
//! response [`Cache`] serving recent values without I/O.

pub mod broker;
pub mod cache;
pub mod connection;

pub use broker::{Broker, BrokerLoop, Subscription};
pub use cache::Cache;
pub use connection::{
    Connection, ConnectionBuilder, ConnectionConfig, DatagramLogger, ErrorCallback,
};
pub use tokio_util::sync::CancellationToken;
