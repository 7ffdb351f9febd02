//! Transport layer for the RCT protocol
//!
//! This crate provides the [`Dialer`] abstraction used by the connection to
//! (re)establish its socket, the TCP implementation of it, and the
//! exponential backoff policy governing redial attempts.

pub mod backoff;
pub mod dialer;
pub mod tcp;

pub use backoff::{Backoff, BackoffPolicy, retry};
pub use dialer::{BoxedReader, BoxedWriter, Dialer, Link};
pub use tcp::{DEFAULT_PORT, TcpDialer, TcpSettings};
