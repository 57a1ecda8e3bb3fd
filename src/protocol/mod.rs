//! logwire protocol core implementation
//!
//! This module provides the wire format, opcodes, and codec for logwire frames.

mod codec;
mod error;
mod header;
mod message;
pub(crate) mod metrics;
mod types;

pub use codec::{decode, encode};
pub use error::{Error, Result};
pub use header::FrameHeader;
pub use message::Message;
pub use metrics::MetricsSnapshot;
pub use types::OpCode;

/// Largest value representable by the length prefix (opcode byte + payload).
pub const MAX_DATA_SIZE: usize = 0xFFFF_FFFF;

/// Length prefix size in bytes
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Opcode size in bytes
pub const OPCODE_SIZE: usize = 1;

/// Largest payload that still fits in a single frame.
pub const MAX_PAYLOAD_SIZE: usize = MAX_DATA_SIZE - OPCODE_SIZE;
