//! Per-destination delivery state: queues, shared senders, and delivery threads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{self as channel, TrySendError};
use tracing::{debug, info, warn};

use super::delivery::DeliveryWorker;
use super::{HandlerError, LogRecord, lock};
use crate::protocol::metrics::Metrics;
use crate::transport::{Destination, Sender, SenderConfig, TransportError};

const DRAIN_POLL: Duration = Duration::from_millis(10);

/// A sender shared by every handler pointing at the same destination.
pub type SharedSender = Arc<Mutex<Sender>>;

/// Outcome of [`DeliveryRegistry::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Every queued record was delivered before the deadline.
    pub delivered_all: bool,
    /// Records discarded because the deadline expired.
    pub dropped: u64,
}

/// Registry of delivery state keyed by destination.
///
/// Cloning is cheap and yields a handle to the same registry.
#[derive(Debug, Clone, Default)]
pub struct DeliveryRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    idx: Mutex<u64>,
    queues: Mutex<HashMap<Destination, Arc<DestinationQueue>>>,
    senders: Arc<SenderTable>,
    closed: AtomicBool,
    /// Set once delivery threads are joined and queues are being emptied.
    discarding: AtomicBool,
}

/// Bounded FIFO plus the thread draining it.
#[derive(Debug)]
pub(crate) struct DestinationQueue {
    pub(crate) tx: channel::Sender<LogRecord>,
    pub(crate) rx: channel::Receiver<LogRecord>,
    /// Enqueued and not yet delivered, including a record being retried.
    outstanding: AtomicUsize,
    worker: Mutex<Option<DeliveryWorker>>,
}

impl DestinationQueue {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = channel::bounded(capacity.max(1));
        Self {
            tx,
            rx,
            outstanding: AtomicUsize::new(0),
            worker: Mutex::new(None),
        }
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_delivered(&self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        Metrics::record_delivered();
    }

    pub(crate) fn mark_dropped(&self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        Metrics::record_dropped(1);
    }
}

/// Shared senders, one per destination, created after a successful liveness probe.
///
/// The table lock only guards slot lookup. Probes run under the destination's
/// own slot lock, so a dead destination never holds up another one.
#[derive(Debug, Default)]
pub(crate) struct SenderTable {
    slots: Mutex<HashMap<Destination, Arc<SenderSlot>>>,
}

type SenderSlot = Mutex<Option<SharedSender>>;

impl SenderTable {
    pub(crate) fn get_or_probe(
        &self,
        destination: &Destination,
        config: &SenderConfig,
    ) -> Result<SharedSender, TransportError> {
        let slot = Arc::clone(lock(&self.slots).entry(destination.clone()).or_default());

        let mut slot = lock(&slot);
        if let Some(sender) = slot.as_ref() {
            return Ok(Arc::clone(sender));
        }

        let mut sender = Sender::with_config(destination.clone(), config.clone());
        if !sender.has_live_receiver() {
            return Err(TransportError::NoLiveReceiver {
                destination: destination.clone(),
            });
        }
        debug!(%destination, "live receiver found");

        let sender = Arc::new(Mutex::new(sender));
        *slot = Some(Arc::clone(&sender));
        Ok(sender)
    }

    fn close_all(&self) {
        let slots: Vec<_> = lock(&self.slots).drain().map(|(_, slot)| slot).collect();
        for slot in slots {
            if let Some(sender) = lock(&slot).take() {
                lock(&sender).close();
            }
        }
    }
}

impl DeliveryRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by [`LogHandler::new`](super::LogHandler::new).
    pub fn global() -> &'static DeliveryRegistry {
        static GLOBAL: OnceLock<DeliveryRegistry> = OnceLock::new();
        GLOBAL.get_or_init(DeliveryRegistry::new)
    }

    /// Next value of the emit-order counter.
    pub fn next_idx(&self) -> u64 {
        let mut idx = lock(&self.inner.idx);
        let current = *idx;
        *idx += 1;
        current
    }

    /// Whether [`DeliveryRegistry::shutdown`] has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Shared sender for `destination`, probing liveness on first use.
    pub fn sender(
        &self,
        destination: &Destination,
        config: &SenderConfig,
    ) -> Result<SharedSender, TransportError> {
        self.inner.senders.get_or_probe(destination, config)
    }

    /// Records accepted for `destination` and not yet delivered.
    #[must_use]
    pub fn pending(&self, destination: &Destination) -> usize {
        lock(&self.inner.queues)
            .get(destination)
            .map_or(0, |queue| queue.outstanding())
    }

    /// Wait until `destination` has nothing pending. Returns `false` on timeout.
    pub fn flush(&self, destination: &Destination, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.pending(destination) == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(DRAIN_POLL);
        }
    }

    /// Start the delivery thread for `destination` unless one is running.
    pub(crate) fn ensure_worker(
        &self,
        destination: &Destination,
        capacity: usize,
        config: &SenderConfig,
    ) -> Result<(), HandlerError> {
        if self.is_closed() {
            return Err(HandlerError::ShutDown);
        }

        let queue = self.queue(destination, capacity);
        let mut worker = lock(&queue.worker);
        if worker.as_ref().is_some_and(|w| !w.is_finished()) {
            return Ok(());
        }

        debug!(%destination, "starting delivery thread");
        *worker = Some(DeliveryWorker::spawn(
            destination.clone(),
            Arc::clone(&queue),
            Arc::clone(&self.inner.senders),
            config.clone(),
        )?);
        Ok(())
    }

    /// Put `record` on the destination queue.
    pub(crate) fn enqueue(
        &self,
        destination: &Destination,
        capacity: usize,
        record: LogRecord,
        block: bool,
    ) -> Result<(), HandlerError> {
        if self.is_closed() {
            return Err(HandlerError::ShutDown);
        }

        let queue = self.queue(destination, capacity);
        queue.outstanding.fetch_add(1, Ordering::SeqCst);
        let sent = if block {
            queue.tx.send(record).map_err(|_| HandlerError::ShutDown)
        } else {
            queue.tx.try_send(record).map_err(|err| match err {
                TrySendError::Full(record) => HandlerError::QueueFull {
                    destination: destination.clone(),
                    record: Box::new(record),
                },
                TrySendError::Disconnected(_) => HandlerError::ShutDown,
            })
        };

        match sent {
            Ok(()) if self.inner.discarding.load(Ordering::SeqCst) => {
                // Shutdown's final discard may have run before this record landed.
                discard_queued(&queue);
                Err(HandlerError::ShutDown)
            }
            Ok(()) => {
                Metrics::record_enqueued();
                Ok(())
            }
            Err(err) => {
                queue.outstanding.fetch_sub(1, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    /// Stop accepting records, let delivery threads drain until `timeout`,
    /// then abort whatever is left and join every thread.
    pub fn shutdown(&self, timeout: Duration) -> DrainReport {
        self.inner.closed.store(true, Ordering::SeqCst);
        let queues: Vec<_> = lock(&self.inner.queues).values().cloned().collect();

        let workers: Vec<_> = queues
            .iter()
            .filter_map(|queue| lock(&queue.worker).take())
            .collect();
        for worker in &workers {
            worker.request_drain();
        }

        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline && workers.iter().any(|w| !w.is_finished()) {
            thread::sleep(DRAIN_POLL);
        }
        for worker in workers {
            worker.abort();
            worker.join();
        }

        self.inner.discarding.store(true, Ordering::SeqCst);
        let queues: Vec<_> = lock(&self.inner.queues).values().cloned().collect();
        let dropped: u64 = queues.iter().map(|queue| discard_queued(queue)).sum();
        self.inner.senders.close_all();

        if dropped > 0 {
            warn!(dropped, "shutdown deadline expired with records still queued");
        } else {
            info!("delivery registry drained");
        }

        DrainReport {
            delivered_all: dropped == 0,
            dropped,
        }
    }

    fn queue(&self, destination: &Destination, capacity: usize) -> Arc<DestinationQueue> {
        let mut queues = lock(&self.inner.queues);
        Arc::clone(
            queues
                .entry(destination.clone())
                .or_insert_with(|| Arc::new(DestinationQueue::new(capacity))),
        )
    }
}

/// Empty `queue` and zero its outstanding count, returning how many records
/// were still owed.
fn discard_queued(queue: &DestinationQueue) -> u64 {
    while queue.rx.try_recv().is_ok() {}
    let dropped = queue.outstanding.swap(0, Ordering::SeqCst) as u64;
    if dropped > 0 {
        Metrics::record_dropped(dropped);
    }
    dropped
}
