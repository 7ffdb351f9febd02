//! Streaming RCT frame decoder

use crate::crc::Crc;
use crate::{ESCAPE, START};
use rct_core::{Command, Datagram, Identifier};

/// Identifier bytes counted by the length field
const IDENTIFIER_LENGTH: u8 = 4;

/// Decoder state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    AwaitingStart,
    AwaitingCmd,
    AwaitingLen,
    AwaitingId0,
    AwaitingId1,
    AwaitingId2,
    AwaitingId3,
    AwaitingData,
    AwaitingCrc0,
    AwaitingCrc1,
    Done,
}

/// Decoder statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStatistics {
    /// Frames that passed the CRC check
    pub frames_decoded: u64,
    /// Frames dropped because of a CRC mismatch
    pub crc_errors: u64,
    /// Frames dropped because of an invalid command or length byte
    pub header_errors: u64,
    /// Frames abandoned because a new start marker arrived mid-frame
    pub resyncs: u64,
}

/// Byte-at-a-time decoder for RCT frames
///
/// The parser keeps its full state between calls, so frames may arrive split
/// across any number of chunks and several frames may share one chunk.
/// Corrupted frames are dropped and the parser resynchronizes on the next
/// start marker. Feed it from one producer at a time.
#[derive(Debug, Clone)]
pub struct DatagramParser {
    state: ParserState,
    escaped: bool,
    command: Command,
    payload_length: usize,
    identifier: u32,
    payload: Vec<u8>,
    crc: Crc,
    crc_received: u16,
    statistics: DecodeStatistics,
}

impl DatagramParser {
    /// Create a new parser waiting for a start marker
    pub fn new() -> Self {
        Self {
            state: ParserState::AwaitingStart,
            escaped: false,
            command: Command::Read,
            payload_length: 0,
            identifier: 0,
            payload: Vec::new(),
            crc: Crc::new(),
            crc_received: 0,
            statistics: DecodeStatistics::default(),
        }
    }

    /// Drop any frame in progress and wait for the next start marker
    pub fn reset(&mut self) {
        self.state = ParserState::AwaitingStart;
        self.escaped = false;
        self.payload.clear();
    }

    /// Get the current state
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Get the decoder statistics
    pub fn statistics(&self) -> DecodeStatistics {
        self.statistics
    }

    /// Decode the datagrams contained in `chunk`
    ///
    /// The returned iterator is lazy: bytes are consumed only as datagrams
    /// are pulled. Bytes of an incomplete trailing frame are retained in the
    /// parser state for the next chunk.
    pub fn parse<'a>(&'a mut self, chunk: &'a [u8]) -> Datagrams<'a> {
        Datagrams {
            parser: self,
            bytes: chunk.iter(),
        }
    }

    /// Process one received byte
    ///
    /// # Returns
    /// The completed datagram if this byte finished a frame with a valid CRC.
    pub fn feed(&mut self, byte: u8) -> Option<Datagram> {
        if self.escaped {
            self.escaped = false;
        } else if byte == START {
            if !matches!(self.state, ParserState::AwaitingStart | ParserState::Done) {
                self.statistics.resyncs += 1;
                log::trace!("start marker in state {:?}, resynchronizing", self.state);
            }
            self.state = ParserState::AwaitingCmd;
            return None;
        } else if byte == ESCAPE {
            self.escaped = true;
            return None;
        }

        match self.state {
            ParserState::AwaitingStart | ParserState::Done => {}

            ParserState::AwaitingCmd => match Command::try_from(byte) {
                Ok(command) => {
                    self.crc.reset();
                    self.crc.update(byte);
                    self.command = command;
                    self.state = ParserState::AwaitingLen;
                }
                Err(_) => {
                    self.statistics.header_errors += 1;
                    log::trace!("invalid command 0x{:02X}", byte);
                    self.state = ParserState::AwaitingStart;
                }
            },

            ParserState::AwaitingLen => {
                if byte < IDENTIFIER_LENGTH {
                    self.statistics.header_errors += 1;
                    log::trace!("invalid length {}", byte);
                    self.state = ParserState::AwaitingStart;
                } else {
                    self.crc.update(byte);
                    self.payload_length = (byte - IDENTIFIER_LENGTH) as usize;
                    self.state = ParserState::AwaitingId0;
                }
            }

            ParserState::AwaitingId0 => {
                self.crc.update(byte);
                self.identifier = (byte as u32) << 24;
                self.state = ParserState::AwaitingId1;
            }

            ParserState::AwaitingId1 => {
                self.crc.update(byte);
                self.identifier |= (byte as u32) << 16;
                self.state = ParserState::AwaitingId2;
            }

            ParserState::AwaitingId2 => {
                self.crc.update(byte);
                self.identifier |= (byte as u32) << 8;
                self.state = ParserState::AwaitingId3;
            }

            ParserState::AwaitingId3 => {
                self.crc.update(byte);
                self.identifier |= byte as u32;
                self.payload.clear();
                self.state = if self.payload_length > 0 {
                    ParserState::AwaitingData
                } else {
                    ParserState::AwaitingCrc0
                };
            }

            ParserState::AwaitingData => {
                self.crc.update(byte);
                self.payload.push(byte);
                if self.payload.len() >= self.payload_length {
                    self.state = ParserState::AwaitingCrc0;
                }
            }

            ParserState::AwaitingCrc0 => {
                self.crc_received = (byte as u16) << 8;
                self.state = ParserState::AwaitingCrc1;
            }

            ParserState::AwaitingCrc1 => {
                self.crc_received |= byte as u16;
                let crc_calculated = self.crc.finish();
                if crc_calculated != self.crc_received {
                    self.statistics.crc_errors += 1;
                    log::trace!(
                        "CRC error: calculated 0x{:04X}, received 0x{:04X}",
                        crc_calculated,
                        self.crc_received
                    );
                    self.state = ParserState::AwaitingStart;
                } else {
                    self.statistics.frames_decoded += 1;
                    self.state = ParserState::Done;
                    return Some(Datagram::new(
                        self.command,
                        Identifier::new(self.identifier),
                        std::mem::take(&mut self.payload),
                    ));
                }
            }
        }
        None
    }
}

impl Default for DatagramParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy iterator over the datagrams decoded from one chunk
///
/// Created by [`DatagramParser::parse`].
#[derive(Debug)]
pub struct Datagrams<'a> {
    parser: &'a mut DatagramParser,
    bytes: std::slice::Iter<'a, u8>,
}

impl Iterator for Datagrams<'_> {
    type Item = Datagram;

    fn next(&mut self) -> Option<Datagram> {
        for &byte in self.bytes.by_ref() {
            if let Some(datagram) = self.parser.feed(byte) {
                return Some(datagram);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DatagramBuilder;

    fn encode(datagram: &Datagram) -> Vec<u8> {
        DatagramBuilder::from_datagram(datagram).bytes().to_vec()
    }

    fn decode_all(bytes: &[u8]) -> Vec<Datagram> {
        let mut parser = DatagramParser::new();
        parser.parse(bytes).collect()
    }

    #[test]
    fn test_decode_read_request_vector() {
        let dgs = decode_all(&[0x2B, 0x01, 0x04, 0x40, 0x0F, 0x01, 0x5B, 0x58, 0xB4]);
        assert_eq!(dgs, vec![Datagram::read(Identifier::BATTERY_POWER_W)]);
    }

    #[test]
    fn test_decode_escaped_vector() {
        let dgs = decode_all(&[0x2B, 0x01, 0x04, 0xDB, 0x2D, 0x2D, 0x69, 0xAE, 0x55, 0xAB]);
        assert_eq!(dgs, vec![Datagram::read(Identifier::INVERTER_AC_POWER_W)]);
    }

    #[test]
    fn test_round_trip() {
        let datagrams = vec![
            Datagram::read(Identifier::new(0x0000003E)),
            Datagram::write(Identifier::new(0x2B2D2B2D), &[0x2B, 0x2D, 0x00, 0xFF]),
            Datagram::from_f32(Command::Response, Identifier::BATTERY_SOC, 0.75),
            Datagram::from_u16(Command::LongResponse, Identifier::new(0xFFFFFFFF), 0x2D2B),
            Datagram::from_u8(Command::ReadPeriodically, Identifier::INVERTER_STATE, 0x2B),
            Datagram::new(Command::Extension, Identifier::new(0), vec![0x2D; 251]),
            Datagram::new(Command::LongWrite, Identifier::new(0x01020304), (0..=250).collect()),
        ];
        for dg in datagrams {
            let decoded = decode_all(&encode(&dg));
            assert_eq!(decoded, vec![dg]);
        }
    }

    #[test]
    fn test_split_across_chunks() {
        let dg = Datagram::from_f32(Command::Response, Identifier::INVERTER_AC_POWER_W, -1234.5);
        let bytes = encode(&dg);
        let mut parser = DatagramParser::new();
        let mut decoded = Vec::new();
        for chunk in bytes.chunks(1) {
            decoded.extend(parser.parse(chunk));
        }
        assert_eq!(decoded, vec![dg.clone()]);

        // split right after the escape marker
        let mut parser = DatagramParser::new();
        let split = bytes.iter().position(|&b| b == ESCAPE).unwrap() + 1;
        assert_eq!(parser.parse(&bytes[..split]).count(), 0);
        assert_eq!(parser.parse(&bytes[split..]).collect::<Vec<_>>(), vec![dg]);
    }

    #[test]
    fn test_back_to_back_frames() {
        let first = Datagram::from_f32(Command::Response, Identifier::BATTERY_POWER_W, 1.0);
        let second = Datagram::from_u8(Command::Response, Identifier::INVERTER_STATE, 11);
        let mut bytes = encode(&first);
        bytes.extend(encode(&second));
        assert_eq!(decode_all(&bytes), vec![first, second]);
    }

    #[test]
    fn test_resynchronization_skips_garbage() {
        let first = Datagram::from_f32(Command::Response, Identifier::BATTERY_POWER_W, 1.0);
        let second = Datagram::from_u16(Command::Response, Identifier::new(0x11223344), 7);
        let mut bytes = vec![0x00, 0x13, 0x2B, 0x05, 0xFF];
        bytes.extend(encode(&first));
        bytes.extend([0x99, 0x2B, 0x01, 0x07, 0x00]);
        bytes.extend(encode(&second));

        let mut parser = DatagramParser::new();
        let decoded: Vec<_> = parser.parse(&bytes).collect();
        assert_eq!(decoded, vec![first, second]);
        assert_eq!(parser.statistics().frames_decoded, 2);
        assert!(parser.statistics().resyncs >= 2);
    }

    #[test]
    fn test_invalid_command_restarts() {
        let valid = Datagram::read(Identifier::BATTERY_POWER_W);
        let mut bytes = vec![0x2B, 0x09, 0x04, 0x40, 0x0F, 0x01, 0x5B, 0x58, 0xB4];
        bytes.extend(encode(&valid));

        let mut parser = DatagramParser::new();
        let decoded: Vec<_> = parser.parse(&bytes).collect();
        assert_eq!(decoded, vec![valid]);
        assert_eq!(parser.statistics().header_errors, 1);
    }

    #[test]
    fn test_single_bit_flip_is_rejected() {
        let dg = Datagram::from_f32(Command::Response, Identifier::BATTERY_POWER_W, 42.0);
        let follow_up = Datagram::from_u8(Command::Response, Identifier::INVERTER_STATE, 3);
        let bytes = encode(&dg);
        assert!(!bytes.iter().any(|&b| b == ESCAPE));
        let crc_start = bytes.len() - 2;

        for pos in 1..crc_start {
            for bit in 0..8 {
                let mut corrupted = bytes.clone();
                corrupted[pos] ^= 1 << bit;
                let mut stream = corrupted;
                stream.extend(encode(&follow_up));

                let decoded = decode_all(&stream);
                assert_eq!(
                    decoded,
                    vec![follow_up.clone()],
                    "flipping bit {} of byte {} was not rejected",
                    bit,
                    pos
                );
            }
        }
    }

    #[test]
    fn test_crc_mismatch_counts() {
        let mut bytes = encode(&Datagram::read(Identifier::BATTERY_POWER_W));
        let n = bytes.len();
        bytes[n - 1] ^= 0x01;
        let mut parser = DatagramParser::new();
        assert_eq!(parser.parse(&bytes).count(), 0);
        assert_eq!(parser.statistics().crc_errors, 1);
        assert_eq!(parser.state(), ParserState::AwaitingStart);
    }

    #[test]
    fn test_zero_length_payload_skips_to_crc() {
        let mut parser = DatagramParser::new();
        for &b in &[0x2B, 0x01, 0x04, 0x40, 0x0F, 0x01, 0x5B] {
            assert!(parser.feed(b).is_none());
        }
        assert_eq!(parser.state(), ParserState::AwaitingCrc0);
    }

    #[test]
    fn test_parse_is_lazy() {
        let first = Datagram::read(Identifier::BATTERY_POWER_W);
        let second = Datagram::read(Identifier::BATTERY_SOC);
        let mut bytes = encode(&first);
        bytes.extend(encode(&second));

        let mut parser = DatagramParser::new();
        let mut iter = parser.parse(&bytes);
        assert_eq!(iter.next(), Some(first));
        drop(iter);
        assert_eq!(parser.state(), ParserState::Done);
    }
}
