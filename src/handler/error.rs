//! Handler error types

use thiserror::Error;

use super::LogRecord;
use crate::transport::{Destination, TransportError};

/// Errors surfaced to the code emitting a record.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Non-blocking enqueue found the destination queue full. The record is handed back.
    #[error("delivery queue for {destination} is full")]
    QueueFull {
        /// Destination whose queue is full
        destination: Destination,
        /// The rejected record
        record: Box<LogRecord>,
    },

    /// The registry was shut down and accepts no more records.
    #[error("delivery registry is shut down")]
    ShutDown,

    /// Synchronous send or delivery setup failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(TransportError::Io(err))
    }
}
