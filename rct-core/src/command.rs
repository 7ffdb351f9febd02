//! Datagram command codes

use crate::error::{RctError, RctResult};
use std::fmt;

/// RCT datagram command
///
/// The wire value of each command is its discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Read = 0x01,
    Write = 0x02,
    LongWrite = 0x03,
    Reserved1 = 0x04,
    Response = 0x05,
    LongResponse = 0x06,
    Reserved2 = 0x07,
    ReadPeriodically = 0x08,
    Extension = 0x3C,
}

impl Command {
    /// Get the command code as sent on the wire
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Check if this command carries a device response
    pub fn is_response(self) -> bool {
        matches!(self, Command::Response | Command::LongResponse)
    }

    /// Get the human-readable command name
    pub fn name(self) -> &'static str {
        match self {
            Command::Read => "Read",
            Command::Write => "Write",
            Command::LongWrite => "LongWrite",
            Command::Reserved1 => "Reserved1",
            Command::Response => "Response",
            Command::LongResponse => "LongResponse",
            Command::Reserved2 => "Reserved2",
            Command::ReadPeriodically => "ReadPeriodically",
            Command::Extension => "Extension",
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = RctError;

    fn try_from(value: u8) -> RctResult<Self> {
        match value {
            0x01 => Ok(Command::Read),
            0x02 => Ok(Command::Write),
            0x03 => Ok(Command::LongWrite),
            0x04 => Ok(Command::Reserved1),
            0x05 => Ok(Command::Response),
            0x06 => Ok(Command::LongResponse),
            0x07 => Ok(Command::Reserved2),
            0x08 => Ok(Command::ReadPeriodically),
            0x3C => Ok(Command::Extension),
            other => Err(RctError::InvalidCommand(other)),
        }
    }
}

impl From<Command> for u8 {
    fn from(command: Command) -> Self {
        command.code()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_codes() {
        assert_eq!(Command::try_from(0x01).unwrap(), Command::Read);
        assert_eq!(Command::try_from(0x08).unwrap(), Command::ReadPeriodically);
        assert_eq!(Command::try_from(0x3C).unwrap(), Command::Extension);
        assert_eq!(u8::from(Command::LongResponse), 0x06);
    }

    #[test]
    fn test_invalid_command() {
        for code in [0x00u8, 0x09, 0x2B, 0x3B, 0x3D, 0xFF] {
            assert!(matches!(
                Command::try_from(code),
                Err(RctError::InvalidCommand(c)) if c == code
            ));
        }
    }

    #[test]
    fn test_command_display() {
        assert_eq!(Command::Read.to_string(), "Read");
        assert_eq!(Command::Extension.to_string(), "Extension");
        assert!(Command::Response.is_response());
        assert!(Command::LongResponse.is_response());
        assert!(!Command::Read.is_response());
    }
}
