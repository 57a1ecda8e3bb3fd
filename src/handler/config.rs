//! Handler configuration.

use crate::env_var;
use crate::transport::{Destination, SenderConfig};

/// Records queued per destination before `emit` blocks or fails.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Handler configuration options.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Receiver host
    pub host: String,
    /// Receiver port
    pub port: u16,
    /// Hand records to a per-destination delivery thread instead of sending inline.
    pub do_async: bool,
    /// In async mode, wait for queue space rather than failing with `QueueFull`.
    pub block: bool,
    /// Queue capacity. Only the first handler for a destination sets it.
    pub queue_capacity: usize,
    /// Sender settings used for this destination.
    pub sender: SenderConfig,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            host: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
            do_async: true,
            block: true,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            sender: SenderConfig::default(),
        }
    }
}

impl HandlerConfig {
    /// Defaults overridden by `LOGWIRE_HOST`, `LOGWIRE_PORT`, `LOGWIRE_ASYNC`,
    /// `LOGWIRE_BLOCK`, and `LOGWIRE_QUEUE_CAPACITY`. Unparsable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_var("LOGWIRE_HOST").unwrap_or(defaults.host),
            port: env_var("LOGWIRE_PORT").unwrap_or(defaults.port),
            do_async: env_var("LOGWIRE_ASYNC").unwrap_or(defaults.do_async),
            block: env_var("LOGWIRE_BLOCK").unwrap_or(defaults.block),
            queue_capacity: env_var("LOGWIRE_QUEUE_CAPACITY").unwrap_or(defaults.queue_capacity),
            sender: defaults.sender,
        }
    }

    /// Set the destination
    #[must_use]
    pub fn with_destination(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Toggle async delivery
    #[must_use]
    pub fn with_async(mut self, do_async: bool) -> Self {
        self.do_async = do_async;
        self
    }

    /// Toggle blocking enqueue
    #[must_use]
    pub fn with_block(mut self, block: bool) -> Self {
        self.block = block;
        self
    }

    /// Set the queue capacity
    #[must_use]
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Replace the sender settings
    #[must_use]
    pub fn with_sender(mut self, sender: SenderConfig) -> Self {
        self.sender = sender;
        self
    }

    /// `(host, port)` as a [`Destination`]
    #[must_use]
    pub fn destination(&self) -> Destination {
        Destination::new(self.host.clone(), self.port)
    }
}
