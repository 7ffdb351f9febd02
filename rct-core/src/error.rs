use std::time::Duration;
use thiserror::Error;

/// Main error type for RCT operations
#[derive(Error, Debug)]
pub enum RctError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Disconnected")]
    Disconnected,

    #[error("Timeout")]
    Timeout,

    #[error("Cancelled")]
    Cancelled,

    #[error("Invalid data length {actual}, expected {expected}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Invalid command: 0x{0:02X}")]
    InvalidCommand(u8),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Gave up after {elapsed:?}: {source}")]
    RetriesExhausted {
        elapsed: Duration,
        #[source]
        source: Box<RctError>,
    },
}

/// Classification of an [`RctError`]
///
/// Callers branch on the kind rather than on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Dial, read or write failure; retried by the connection
    Transient,
    /// Malformed or unexpected datagram content; the request may be retried
    Protocol,
    /// No matching response arrived in time
    Timeout,
    /// No socket is currently established
    Disconnected,
    /// The governing cancellation token fired
    Cancelled,
}

impl RctError {
    /// Get the kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            RctError::Connection(_) | RctError::RetriesExhausted { .. } => ErrorKind::Transient,
            RctError::Disconnected => ErrorKind::Disconnected,
            RctError::Timeout => ErrorKind::Timeout,
            RctError::Cancelled => ErrorKind::Cancelled,
            RctError::InvalidLength { .. }
            | RctError::UnexpectedResponse(_)
            | RctError::InvalidCommand(_)
            | RctError::InvalidData(_) => ErrorKind::Protocol,
        }
    }

    /// Check whether retrying the transmission may succeed
    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::Protocol
    }
}

/// Result type alias for RCT operations
pub type RctResult<T> = Result<T, RctError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert_eq!(RctError::from(io).kind(), ErrorKind::Transient);
        assert_eq!(RctError::Timeout.kind(), ErrorKind::Timeout);
        assert_eq!(RctError::Disconnected.kind(), ErrorKind::Disconnected);
        assert!(RctError::InvalidLength { expected: 4, actual: 2 }.is_recoverable());
        assert!(!RctError::Timeout.is_recoverable());
    }

    #[test]
    fn test_retries_exhausted_display() {
        let err = RctError::RetriesExhausted {
            elapsed: Duration::from_secs(1),
            source: Box::new(RctError::Timeout),
        };
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert_eq!(err.to_string(), "Gave up after 1s: Timeout");
    }
}
