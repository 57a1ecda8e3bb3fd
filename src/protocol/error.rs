//! logwire framing error types

use thiserror::Error;

/// Framing errors
#[derive(Error, Debug)]
pub enum Error {
    /// Opcode byte plus payload does not fit in the length prefix
    #[error("too much data: {size} bytes (max {max})")]
    TooMuchData {
        /// Combined opcode + payload size
        size: usize,
        /// Maximum allowed
        max: usize,
    },

    /// Unrecognized opcode byte on the wire
    #[error("unknown opcode: {byte:#x}")]
    UnknownOpCode {
        /// Offending byte
        byte: u8,
    },

    /// Attempted to put the incomplete-receive sentinel on the wire
    #[error("the NONE opcode marks an incomplete receive and is never transmitted")]
    SentinelOpCode,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
