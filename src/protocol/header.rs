//! logwire frame header
//!
//! The header is the 4-byte little-endian length prefix in front of every frame.

use super::{Error, LENGTH_PREFIX_SIZE, MAX_DATA_SIZE, OPCODE_SIZE, Result};

/// Frame length prefix
///
/// # Wire Format
///
/// ```text
/// 0                   1                   2                   3
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |              Frame Length N (4, little-endian)                |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |    OpCode     |          Payload (N - 1) ...                  |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// `N` counts the opcode byte plus the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    frame_len: u32,
}

impl FrameHeader {
    /// Build the header for a payload of `payload_len` bytes.
    pub fn for_payload(payload_len: usize) -> Result<Self> {
        let size = payload_len.saturating_add(OPCODE_SIZE);
        if size > MAX_DATA_SIZE {
            return Err(Error::TooMuchData {
                size,
                max: MAX_DATA_SIZE,
            });
        }
        let frame_len = u32::try_from(size).map_err(|_| Error::TooMuchData {
            size,
            max: MAX_DATA_SIZE,
        })?;
        Ok(Self { frame_len })
    }

    /// Parse the prefix bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; LENGTH_PREFIX_SIZE]) -> Self {
        Self {
            frame_len: u32::from_le_bytes(bytes),
        }
    }

    /// Serialize to the prefix bytes.
    #[must_use]
    pub const fn to_bytes(self) -> [u8; LENGTH_PREFIX_SIZE] {
        self.frame_len.to_le_bytes()
    }

    /// Number of bytes following the prefix (opcode + payload).
    #[must_use]
    pub const fn frame_len(self) -> usize {
        self.frame_len as usize
    }
}
