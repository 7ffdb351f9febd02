//! RCT datagram and typed payload access

use crate::command::Command;
use crate::error::{RctError, RctResult};
use crate::identifier::Identifier;
use std::fmt;

/// Largest payload that fits the single length byte (`payload + 4 <= 255`)
pub const MAX_PAYLOAD_LENGTH: usize = 251;

/// One RCT protocol message
///
/// A datagram is immutable once built or decoded; requests are built fresh
/// for every call.
#[derive(Debug, Clone, PartialEq)]
pub struct Datagram {
    command: Command,
    identifier: Identifier,
    payload: Vec<u8>,
}

impl Datagram {
    /// Create a new datagram
    ///
    /// # Panics
    /// Panics if `payload` is longer than [`MAX_PAYLOAD_LENGTH`].
    pub fn new(command: Command, identifier: Identifier, payload: Vec<u8>) -> Self {
        assert!(
            payload.len() <= MAX_PAYLOAD_LENGTH,
            "payload of {} bytes exceeds the maximum of {}",
            payload.len(),
            MAX_PAYLOAD_LENGTH
        );
        Self {
            command,
            identifier,
            payload,
        }
    }

    /// Create a read request for the given identifier
    pub fn read(identifier: Identifier) -> Self {
        Self::new(Command::Read, identifier, Vec::new())
    }

    /// Create a write request carrying the given payload
    pub fn write(identifier: Identifier, payload: &[u8]) -> Self {
        Self::new(Command::Write, identifier, payload.to_vec())
    }

    /// Create a datagram with a big-endian `f32` payload
    pub fn from_f32(command: Command, identifier: Identifier, value: f32) -> Self {
        Self::new(command, identifier, value.to_be_bytes().to_vec())
    }

    /// Create a datagram with a big-endian `i32` payload
    pub fn from_i32(command: Command, identifier: Identifier, value: i32) -> Self {
        Self::new(command, identifier, value.to_be_bytes().to_vec())
    }

    /// Create a datagram with a big-endian `u16` payload
    pub fn from_u16(command: Command, identifier: Identifier, value: u16) -> Self {
        Self::new(command, identifier, value.to_be_bytes().to_vec())
    }

    /// Create a datagram with a single-byte payload
    pub fn from_u8(command: Command, identifier: Identifier, value: u8) -> Self {
        Self::new(command, identifier, vec![value])
    }

    /// Get the command
    pub fn command(&self) -> Command {
        self.command
    }

    /// Get the identifier
    pub fn identifier(&self) -> Identifier {
        self.identifier
    }

    /// Get the raw payload
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Check if this datagram is a device response
    pub fn is_response(&self) -> bool {
        self.command.is_response()
    }

    /// Check that this datagram answers a query for `identifier`
    ///
    /// # Errors
    /// Returns `RctError::UnexpectedResponse` if the command is not a
    /// (long) response or the identifier differs.
    pub fn ensure_response_to(&self, identifier: Identifier) -> RctResult<()> {
        if !self.is_response() {
            return Err(RctError::UnexpectedResponse(format!(
                "expected a response, got command {}",
                self.command
            )));
        }
        if self.identifier != identifier {
            return Err(RctError::UnexpectedResponse(format!(
                "expected identifier 0x{:08X}, got 0x{:08X}",
                identifier.value(),
                self.identifier.value()
            )));
        }
        Ok(())
    }

    /// Decode the payload as a big-endian `f32`
    pub fn f32(&self) -> RctResult<f32> {
        self.fixed::<4>().map(f32::from_be_bytes)
    }

    /// Decode the payload as a big-endian `i32`
    pub fn i32(&self) -> RctResult<i32> {
        self.fixed::<4>().map(i32::from_be_bytes)
    }

    /// Decode the payload as a big-endian `u16`
    pub fn u16(&self) -> RctResult<u16> {
        self.fixed::<2>().map(u16::from_be_bytes)
    }

    /// Decode the payload as a `u8`
    pub fn u8(&self) -> RctResult<u8> {
        self.fixed::<1>().map(|[b]| b)
    }

    fn fixed<const N: usize>(&self) -> RctResult<[u8; N]> {
        <[u8; N]>::try_from(self.payload.as_slice()).map_err(|_| RctError::InvalidLength {
            expected: N,
            actual: self.payload.len(),
        })
    }
}

impl fmt::Display for Datagram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cmd {} ({:02X}) Id {} ({:08X}) Data {:?}",
            self.command,
            self.command.code(),
            self.identifier,
            self.identifier.value(),
            self.payload
        )
    }
}
