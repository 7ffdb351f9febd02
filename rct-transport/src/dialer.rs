//! Dialer trait for the transport layer

use async_trait::async_trait;
use rct_core::RctResult;
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};

/// Read half of an established link
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of an established link
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An established byte stream to a device, split into independent halves
///
/// The halves are owned by different tasks: the receive loop reads while
/// senders write under the connection's lock.
pub struct Link {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
}

impl Link {
    /// Create a link from a read half and a write half
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link").finish_non_exhaustive()
    }
}

/// Opens links to a device
///
/// A dialer is invoked once per connection attempt; it must not retry on
/// its own since the caller applies the backoff policy.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Open a new link
    ///
    /// # Errors
    /// Returns `RctError::Connection` if the device cannot be reached, or
    /// `RctError::Timeout` if the attempt takes too long.
    async fn dial(&self) -> RctResult<Link>;

    /// Describe the dialed endpoint for diagnostics
    fn endpoint(&self) -> String;
}
