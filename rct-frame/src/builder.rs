//! RCT frame encoder

use crate::crc::Crc;
use crate::{ESCAPE, START};
use bytes::{BufMut, Bytes, BytesMut};
use rct_core::Datagram;
use std::fmt;

/// Identifier bytes counted by the length field
const IDENTIFIER_LENGTH: usize = 4;

/// Builds RCT frames into an internal buffer, with escaping and CRC
///
/// The builder is reusable: every [`build`](Self::build) starts from a
/// clean buffer and a reset CRC.
#[derive(Debug, Clone, Default)]
pub struct DatagramBuilder {
    buffer: BytesMut,
    crc: Crc,
}

impl DatagramBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a datagram into a builder in one step
    pub fn from_datagram(datagram: &Datagram) -> Self {
        let mut builder = Self::new();
        builder.build(datagram);
        builder
    }

    /// Reset the internal buffer and CRC
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.crc.reset();
    }

    /// Encode a complete frame for `datagram` into the buffer
    pub fn build(&mut self, datagram: &Datagram) {
        self.reset();
        let payload = datagram.payload();
        // Datagram::new caps the payload, so the length always fits one byte
        let length = (payload.len() + IDENTIFIER_LENGTH) as u8;

        self.buffer.reserve(2 * (payload.len() + IDENTIFIER_LENGTH + 2) + 3);
        self.buffer.put_u8(START);
        self.write_byte(datagram.command().code());
        self.write_byte(length);
        for byte in datagram.identifier().to_be_bytes() {
            self.write_byte(byte);
        }
        for &byte in payload {
            self.write_byte(byte);
        }
        self.write_crc();
    }

    /// Get the frame built so far
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Take the frame out of the builder, leaving it empty
    pub fn take(&mut self) -> Bytes {
        self.crc.reset();
        self.buffer.split().freeze()
    }

    fn write_byte(&mut self, byte: u8) {
        if byte == START || byte == ESCAPE {
            // escaped in the byte stream, not in the CRC stream
            self.buffer.put_u8(ESCAPE);
        }
        self.buffer.put_u8(byte);
        self.crc.update(byte);
    }

    fn write_crc(&mut self) {
        for byte in self.crc.finish().to_be_bytes() {
            if byte == START || byte == ESCAPE {
                self.buffer.put_u8(ESCAPE);
            }
            self.buffer.put_u8(byte);
        }
    }
}

impl fmt::Display for DatagramBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, byte) in self.buffer.iter().enumerate() {
            if i != 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        f.write_str("]")
    }
}
