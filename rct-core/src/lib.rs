//! Core types and utilities for the RCT inverter protocol
//!
//! This crate provides the datagram model, the command and identifier types,
//! and the error type used throughout the RCT implementation.

pub mod command;
pub mod datagram;
pub mod error;
pub mod identifier;

pub use command::Command;
pub use datagram::{Datagram, MAX_PAYLOAD_LENGTH};
pub use error::{ErrorKind, RctError, RctResult};
pub use identifier::{Identifier, InverterState};
