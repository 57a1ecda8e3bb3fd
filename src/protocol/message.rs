//! logwire message implementation

use std::io::Write;
use std::time::Duration;

use bytes::Bytes;

use super::{OpCode, Result};
use crate::transport::TimedRead;

/// One decoded (or to-be-encoded) frame.
///
/// `data_complete` is `false` when the frame could not be fully read off the
/// wire. Such a message is never a valid ack or a processable payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    op_code: OpCode,
    data: Bytes,
    data_complete: bool,
}

impl Message {
    /// Create a complete message
    pub fn new(op_code: OpCode, data: impl Into<Bytes>) -> Self {
        Self {
            op_code,
            data: data.into(),
            data_complete: true,
        }
    }

    /// Create a JSON message
    pub fn json(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Json, data)
    }

    /// The acknowledgement message
    #[must_use]
    pub const fn ack() -> Self {
        Self {
            op_code: OpCode::Ack,
            data: Bytes::new(),
            data_complete: true,
        }
    }

    /// Sentinel returned when a receive was stopped, timed out, or the peer went away.
    #[must_use]
    pub const fn incomplete() -> Self {
        Self {
            op_code: OpCode::None,
            data: Bytes::new(),
            data_complete: false,
        }
    }

    pub(crate) fn from_parts(op_code: OpCode, data: Bytes, data_complete: bool) -> Self {
        Self {
            op_code,
            data,
            data_complete,
        }
    }

    /// Get opcode
    #[must_use]
    pub const fn op_code(&self) -> OpCode {
        self.op_code
    }

    /// Get payload
    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Whether the full frame was reconstructed
    #[must_use]
    pub const fn data_complete(&self) -> bool {
        self.data_complete
    }

    /// Bit-for-bit comparison against [`Message::ack`]
    #[must_use]
    pub fn is_ack(&self) -> bool {
        *self == Self::ack()
    }

    /// Encode message to wire bytes
    pub fn to_bytes(&self) -> Result<Bytes> {
        super::encode(self)
    }

    /// Read one frame from `source`.
    ///
    /// Returns [`Message::incomplete`] if the stop predicate fires, `timeout`
    /// elapses, or the peer closes before any frame bytes arrive.
    pub fn read_from<S: TimedRead + ?Sized>(
        source: &S,
        stop: Option<&dyn Fn() -> bool>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        super::codec::read_frame(source, stop, timeout)
    }

    /// Write the full frame to `sink`.
    pub fn write_to<W: Write>(&self, mut sink: W) -> Result<()> {
        let bytes = self.to_bytes()?;
        sink.write_all(&bytes)?;
        sink.flush()?;
        Ok(())
    }
}
