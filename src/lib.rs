//! logwire - acknowledged, length-prefixed log shipping over TCP
//!
//! Producers hand structured log records to a [`LogHandler`]; a per-destination
//! delivery thread sends them to a [`Receiver`], which acknowledges every
//! frame it processes.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use logwire::{HandlerConfig, LogHandler, LogRecord, Receiver, ReceiverConfig};
//!
//! // Collector side
//! let receiver = Receiver::new(ReceiverConfig::default()).spawn()?;
//!
//! // Producer side
//! let handler = LogHandler::new(HandlerConfig::default())?;
//! handler.emit(LogRecord::new("INFO", "hello"))?;
//! # drop(receiver);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Wire Format
//!
//! ```text
//! [LENGTH N (4, LE)] [OPCODE (1)] [PAYLOAD (N - 1)]
//! ```
//!
//! Opcode `'j'` carries a JSON record, `'k'` is the acknowledgement.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod handler;
pub mod protocol;
pub mod transport;

use std::str::FromStr;

pub use handler::{
    DeliveryRegistry, DrainReport, HandlerConfig, HandlerError, LogHandler, LogRecord,
};
pub use protocol::{Error, MAX_DATA_SIZE, Message, MetricsSnapshot, OpCode, Result};
pub use transport::{
    Destination, MessageProcessor, Receiver, ReceiverConfig, ReceiverHandle, RetryPolicy,
    Sender, SenderConfig, TransportError,
};

/// Default receiver host
pub const DEFAULT_HOST: &str = "localhost";

/// Default receiver port
pub const DEFAULT_PORT: u16 = 9999;

/// Snapshot of the process-wide transport and delivery counters.
#[must_use]
pub fn metrics_snapshot() -> MetricsSnapshot {
    protocol::metrics::Metrics::totals()
}

/// Parse an environment variable, `None` if unset or unparsable.
pub(crate) fn env_var<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.trim().parse().ok())
}
