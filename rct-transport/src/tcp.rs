//! TCP dialer

use crate::dialer::{Dialer, Link};
use async_trait::async_trait;
use rct_core::{RctError, RctResult};
use std::time::Duration;
use tokio::net::TcpStream;

/// Service port of RCT devices
pub const DEFAULT_PORT: u16 = 8899;

/// TCP transport settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSettings {
    pub host: String,
    pub port: u16,
    /// Limit for a single connection attempt. None means no limit.
    pub timeout: Option<Duration>,
}

impl TcpSettings {
    /// Create new TCP settings for the default service port
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            timeout: Some(Duration::from_secs(5)),
        }
    }

    /// Create TCP settings with a dial timeout
    pub fn with_timeout(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: Some(timeout),
        }
    }

    /// Get the `host:port` address, bracketing IPv6 literals
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Dials RCT devices over TCP
#[derive(Debug, Clone)]
pub struct TcpDialer {
    settings: TcpSettings,
}

impl TcpDialer {
    /// Create a new TCP dialer
    pub fn new(settings: TcpSettings) -> Self {
        Self { settings }
    }

    /// Get the settings
    pub fn settings(&self) -> &TcpSettings {
        &self.settings
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self) -> RctResult<Link> {
        let address = self.settings.address();
        log::debug!("dialing {}", address);

        let stream = if let Some(timeout) = self.settings.timeout {
            tokio::time::timeout(timeout, TcpStream::connect(&address))
                .await
                .map_err(|_| RctError::Timeout)??
        } else {
            TcpStream::connect(&address).await?
        };
        stream.set_nodelay(true)?;

        let (reader, writer) = stream.into_split();
        Ok(Link::new(reader, writer))
    }

    fn endpoint(&self) -> String {
        self.settings.address()
    }
}
