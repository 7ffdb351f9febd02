//! Framing layer for the RCT protocol
//!
//! Wire format (multi-byte values big-endian):
//!
//! ```text
//! [ START=0x2B ] [ CMD ] [ LEN ] [ ID3 ID2 ID1 ID0 ] [ DATA(LEN-4) ] [ CRC_HI CRC_LO ]
//! ```
//!
//! Every byte after the start marker is preceded by [`ESCAPE`] when it
//! equals [`START`] or [`ESCAPE`]. The CRC covers the logical (unescaped)
//! bytes of CMD, LEN, ID and DATA.

pub mod builder;
pub mod crc;
pub mod parser;

pub use builder::DatagramBuilder;
pub use crc::Crc;
pub use parser::{DatagramParser, Datagrams, DecodeStatistics, ParserState};

/// Start-of-frame marker
pub const START: u8 = 0x2B;

/// Escape marker
pub const ESCAPE: u8 = 0x2D;
