//! Connection configuration

use rct_transport::{BackoffPolicy, DEFAULT_PORT, TcpSettings};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Serializable connection settings
///
/// Missing fields take their default values when deserializing, so a
/// configuration file only needs to name the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Device host name or address
    pub host: String,
    /// Device service port
    pub port: u16,
    /// Maximum cache age served by `query`, and the wait for a response
    pub query_timeout: Duration,
    /// Limit for a single dial attempt
    pub dial_timeout: Duration,
    /// Redial policy
    pub backoff: BackoffPolicy,
}

impl ConnectionConfig {
    /// Create a configuration for `host` with default settings
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Get the TCP settings derived from this configuration
    pub fn tcp_settings(&self) -> TcpSettings {
        TcpSettings::with_timeout(self.host.clone(), self.port, self.dial_timeout)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            query_timeout: Duration::from_secs(2),
            dial_timeout: Duration::from_secs(5),
            backoff: BackoffPolicy::default(),
        }
    }
}
