//! Connection builder
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use rct_client::Connection;
//! use rct_core::Identifier;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> rct_core::RctResult<()> {
//! let token = CancellationToken::new();
//! let conn = Connection::builder("192.168.1.100")
//!     .query_timeout(Duration::from_secs(3))
//!     .on_error(|e| eprintln!("inverter link: {}", e))
//!     .log_datagrams()
//!     .build(&token)
//!     .await?;
//!
//! let soc = conn.query_f32(Identifier::BATTERY_SOC).await?;
//! # Ok(())
//! # }
//! ```

use super::config::ConnectionConfig;
use super::connection::Connection;
use rct_core::{Datagram, RctError, RctResult};
use rct_transport::{BackoffPolicy, Dialer, TcpDialer};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Invoked for every transport failure after the connection is established
pub type ErrorCallback = Arc<dyn Fn(&RctError) + Send + Sync>;

/// Invoked for every datagram received from the device
pub type DatagramLogger = Arc<dyn Fn(&Datagram) + Send + Sync>;

/// Non-serializable connection options
#[derive(Clone, Default)]
pub(crate) struct Hooks {
    pub(crate) on_error: Option<ErrorCallback>,
    pub(crate) logger: Option<DatagramLogger>,
}

/// Builder for [`Connection`]
///
/// Starts from [`ConnectionConfig`] defaults; every setter returns the
/// builder for chaining. The connection is only opened by
/// [`build`](Self::build).
#[derive(Clone)]
pub struct ConnectionBuilder {
    config: ConnectionConfig,
    hooks: Hooks,
    dialer: Option<Arc<dyn Dialer>>,
}

impl ConnectionBuilder {
    /// Create a builder for the device at `host`
    pub fn new(host: impl Into<String>) -> Self {
        Self::from_config(ConnectionConfig::new(host))
    }

    /// Create a builder from a loaded configuration
    pub fn from_config(config: ConnectionConfig) -> Self {
        Self {
            config,
            hooks: Hooks::default(),
            dialer: None,
        }
    }

    /// Set the device port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the query timeout
    ///
    /// This is both the maximum age of a cached response served by `query`
    /// and how long `query` waits for a fresh one.
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.config.query_timeout = timeout;
        self
    }

    /// Set the limit for a single dial attempt
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.config.dial_timeout = timeout;
        self
    }

    /// Set the redial policy
    pub fn backoff(mut self, policy: BackoffPolicy) -> Self {
        self.config.backoff = policy;
        self
    }

    /// Set the error callback
    ///
    /// It is only invoked after the initial connection succeeds; startup
    /// failures are returned by [`build`](Self::build).
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RctError) + Send + Sync + 'static,
    {
        self.hooks.on_error = Some(Arc::new(callback));
        self
    }

    /// Set a sink receiving every decoded datagram
    pub fn logger<F>(mut self, logger: F) -> Self
    where
        F: Fn(&Datagram) + Send + Sync + 'static,
    {
        self.hooks.logger = Some(Arc::new(logger));
        self
    }

    /// Log every decoded datagram at info level under the `rct::recv` target
    pub fn log_datagrams(self) -> Self {
        self.logger(|datagram| log::info!(target: "rct::recv", "recv: {}", datagram))
    }

    /// Replace the TCP dialer
    pub fn dialer<D>(mut self, dialer: D) -> Self
    where
        D: Dialer + 'static,
    {
        self.dialer = Some(Arc::new(dialer));
        self
    }

    /// Get the configuration built so far
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Open the connection
    ///
    /// Blocks until the first dial succeeds. The connection lives until
    /// `token` (or [`Connection::shutdown`]) cancels it.
    ///
    /// # Errors
    /// - `RctError::InvalidData` if no host is configured for TCP
    /// - `RctError::Cancelled` if `token` is cancelled first
    /// - `RctError::RetriesExhausted` if dialing fails for longer than the
    ///   backoff policy allows
    pub async fn build(self, token: &CancellationToken) -> RctResult<Connection> {
        let dialer = match self.dialer {
            Some(dialer) => dialer,
            None => {
                if self.config.host.is_empty() {
                    return Err(RctError::InvalidData("No host configured".to_string()));
                }
                Arc::new(TcpDialer::new(self.config.tcp_settings()))
            }
        };
        Connection::start(self.config, self.hooks, dialer, token).await
    }
}

impl fmt::Debug for ConnectionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionBuilder")
            .field("config", &self.config)
            .field("on_error", &self.hooks.on_error.is_some())
            .field("logger", &self.hooks.logger.is_some())
            .field("dialer", &self.dialer.as_ref().map(|d| d.endpoint()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_settings() {
        let builder = ConnectionBuilder::new("10.0.0.7")
            .port(1234)
            .query_timeout(Duration::from_millis(750))
            .dial_timeout(Duration::from_secs(1))
            .on_error(|_| {});
        let config = builder.config();
        assert_eq!(config.host, "10.0.0.7");
        assert_eq!(config.port, 1234);
        assert_eq!(config.query_timeout, Duration::from_millis(750));
        assert_eq!(config.dial_timeout, Duration::from_secs(1));
        assert!(format!("{:?}", builder).contains("on_error: true"));
    }

    #[tokio::test]
    async fn test_build_without_host() {
        let token = CancellationToken::new();
        let result = ConnectionBuilder::from_config(ConnectionConfig::default())
            .build(&token)
            .await;
        assert!(matches!(result, Err(RctError::InvalidData(_))));
    }
}
