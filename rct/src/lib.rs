//! rct - Rust client for RCT Power inverters
//!
//! The inverters speak a framed binary protocol over TCP (port 8899). Every
//! readable or writable value is addressed by a 32-bit identifier.
//!
//! # Architecture
//!
//! This library is organized as a workspace with multiple crates:
//!
//! - `rct-core`: Core types (datagram, command, identifier) and error handling
//! - `rct-frame`: Framing layer (escaping, CRC, encoder, streaming decoder)
//! - `rct-transport`: Transport layer (TCP dialer, reconnect backoff)
//! - `rct-client`: Client implementation (broker, response cache, connection)
//!
//! # Usage
//!
//! ```no_run
//! use rct::{CancellationToken, Connection, Identifier};
//!
//! # async fn run() -> rct::RctResult<()> {
//! let token = CancellationToken::new();
//! let conn = Connection::connect(&token, "192.168.1.100").await?;
//! let power = conn.query_f32(Identifier::BATTERY_POWER_W).await?;
//! println!("battery power: {} W", power);
//! # Ok(())
//! # }
//! ```

// Re-export core types
pub use rct_core::{
    Command, Datagram, ErrorKind, Identifier, InverterState, MAX_PAYLOAD_LENGTH, RctError,
    RctResult,
};

// Re-export client API
pub use rct_client::{
    Broker, BrokerLoop, Cache, CancellationToken, Connection, ConnectionBuilder, ConnectionConfig,
    DatagramLogger, ErrorCallback, Subscription,
};

// Re-export framing layer
pub mod frame {
    pub use rct_frame::*;
}

// Re-export transport layer
pub mod transport {
    pub use rct_transport::*;
}
