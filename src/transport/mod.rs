//! TCP transport: resilient receive, acknowledged sender, and pooled receiver.

mod backoff;
mod error;
#[cfg(test)]
pub(crate) mod mock;
mod pool;
mod receiver;
pub(crate) mod recv;
mod sender;

use std::fmt;
use std::time::Duration;

pub use backoff::RetryPolicy;
pub use error::TransportError;
pub use pool::WorkerPool;
pub use receiver::{
    LoggingProcessor, MessageProcessor, Receiver, ReceiverConfig, ReceiverHandle,
};
pub use recv::{ReadTimeoutGuard, TimedRead, recv_partial};
pub use sender::{Sender, SenderConfig};

/// Cancellation granularity for every blocking poll loop (receive, accept, dequeue).
///
/// This bounds shutdown latency; it is not a tuning knob.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Time a sender waits for the acknowledgement frame.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// Retry cap for a single send.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Concurrent connections a receiver services.
pub const DEFAULT_MAX_CONNECTIONS: usize = 8;

/// A receiver endpoint, `(host, port)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    host: String,
    port: u16,
}

impl Destination {
    /// Create a destination
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or address
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl Default for Destination {
    fn default() -> Self {
        Self::new(crate::DEFAULT_HOST, crate::DEFAULT_PORT)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
