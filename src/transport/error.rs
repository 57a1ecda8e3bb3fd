//! Transport-level error types covering socket, framing, and acknowledgement failures.

use std::io;

use thiserror::Error;

use super::Destination;
use crate::protocol::{self, Message};

/// Unified error type for logwire transport operations.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Framing failure. Fatal to the operation, never retried.
    #[error("framing error: {0}")]
    Protocol(protocol::Error),

    /// Socket failure (reset, refused, aborted, ...).
    #[error("socket error: {0}")]
    Io(#[from] io::Error),

    /// The peer answered with something other than an ack, or not at all.
    #[error("expected an ack, got {received:?}")]
    MissingAck {
        /// What was read instead
        received: Message,
    },

    /// The initial liveness probe for a destination failed.
    #[error("no live receiver found on {destination}")]
    NoLiveReceiver {
        /// Probed destination
        destination: Destination,
    },

    /// Record could not be serialized to JSON.
    #[error("record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The listener could not be bound.
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// Requested address
        address: String,
        /// Underlying error
        source: io::Error,
    },
}

impl TransportError {
    /// Whether this error tears down the connection and is eligible for retry.
    #[must_use]
    pub fn is_reconnect(&self) -> bool {
        matches!(self, Self::Io(_) | Self::MissingAck { .. })
    }
}

impl From<protocol::Error> for TransportError {
    fn from(err: protocol::Error) -> Self {
        match err {
            protocol::Error::Io(err) => Self::Io(err),
            other => Self::Protocol(other),
        }
    }
}
