//! logwire opcodes

use std::fmt;

use super::{Error, Result};

/// Operation code carried in the first byte after the length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// Payload is a JSON-serialized log record
    Json,
    /// Acknowledgement, empty payload
    Ack,
    /// Sentinel for a receive that did not produce a full frame. Never transmitted.
    None,
}

impl OpCode {
    /// Wire byte for JSON frames
    pub const JSON_BYTE: u8 = b'j';
    /// Wire byte for ACK frames
    pub const ACK_BYTE: u8 = b'k';

    /// Convert from a wire byte
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            Self::JSON_BYTE => Ok(Self::Json),
            Self::ACK_BYTE => Ok(Self::Ack),
            byte => Err(Error::UnknownOpCode { byte }),
        }
    }

    /// Wire byte for this opcode, `None` for the sentinel
    #[must_use]
    pub const fn as_u8(self) -> Option<u8> {
        match self {
            Self::Json => Some(Self::JSON_BYTE),
            Self::Ack => Some(Self::ACK_BYTE),
            Self::None => None,
        }
    }

    /// Whether this opcode may appear on the wire
    #[must_use]
    pub const fn is_transmittable(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Json => "JSON",
            Self::Ack => "ACK",
            Self::None => "NONE",
        };
        write!(f, "{name}")
    }
}
