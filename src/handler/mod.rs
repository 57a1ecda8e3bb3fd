//! Producer-side logging handler and the asynchronous delivery pipeline.
//!
//! A [`LogHandler`] stamps each record with an emit-order index and either
//! sends it inline or hands it to the destination's delivery thread through a
//! bounded queue. Per-destination state lives in a [`DeliveryRegistry`].

mod config;
mod delivery;
mod error;
mod record;
mod registry;

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::trace;

pub use config::{DEFAULT_QUEUE_CAPACITY, HandlerConfig};
pub use error::HandlerError;
pub use record::{IDX_FIELD, LogRecord};
pub use registry::{DeliveryRegistry, DrainReport, SharedSender};

use crate::transport::Destination;

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ships log records to one destination.
///
/// Handlers are cheap to clone; all handlers for the same destination in the
/// same registry share one queue, one delivery thread, and one sender.
#[derive(Debug, Clone)]
pub struct LogHandler {
    config: HandlerConfig,
    destination: Destination,
    registry: DeliveryRegistry,
}

impl LogHandler {
    /// Create a handler on the process-wide registry.
    pub fn new(config: HandlerConfig) -> Result<Self, HandlerError> {
        Self::with_registry(config, DeliveryRegistry::global().clone())
    }

    /// Create a handler on an explicit registry.
    ///
    /// In async mode this starts the destination's delivery thread if it is
    /// not already running.
    pub fn with_registry(
        config: HandlerConfig,
        registry: DeliveryRegistry,
    ) -> Result<Self, HandlerError> {
        let destination = config.destination();
        if config.do_async {
            registry.ensure_worker(&destination, config.queue_capacity, &config.sender)?;
        }
        Ok(Self {
            config,
            destination,
            registry,
        })
    }

    /// Stamp `record` with the next index and deliver it.
    ///
    /// Async mode returns once the record is queued (or fails with
    /// [`HandlerError::QueueFull`] when not blocking). Sync mode returns after
    /// the receiver acknowledged it.
    pub fn emit(&self, mut record: LogRecord) -> Result<(), HandlerError> {
        let idx = self.registry.next_idx();
        record.set_idx(idx);
        trace!(destination = %self.destination, idx, "emitting record");

        if self.config.do_async {
            return self.registry.enqueue(
                &self.destination,
                self.config.queue_capacity,
                record,
                self.config.block,
            );
        }

        let sender = self.registry.sender(&self.destination, &self.config.sender)?;
        lock(&sender).send_log_record(&record)?;
        Ok(())
    }

    /// Wait until every queued record for this destination was delivered.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.registry.flush(&self.destination, timeout)
    }

    /// Records queued for this destination and not yet delivered
    #[must_use]
    pub fn pending(&self) -> usize {
        self.registry.pending(&self.destination)
    }

    /// Target destination
    #[must_use]
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Registry this handler delivers through
    #[must_use]
    pub fn registry(&self) -> &DeliveryRegistry {
        &self.registry
    }
}
