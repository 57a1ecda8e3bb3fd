//! Delivery thread: drains one destination queue through its shared sender.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use tracing::{error, info, warn};

use super::LogRecord;
use super::lock;
use super::registry::{DestinationQueue, SenderTable, SharedSender};
use crate::transport::{Destination, POLL_INTERVAL, SenderConfig};

/// Pause before retrying a record whose send failed.
const RETRY_PAUSE: Duration = POLL_INTERVAL;

#[derive(Debug, Default)]
struct WorkerControl {
    drain: AtomicBool,
    abort: AtomicBool,
}

impl WorkerControl {
    fn draining(&self) -> bool {
        self.drain.load(Ordering::SeqCst)
    }

    fn aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Sleep up to `duration`, waking early on abort.
    fn pause(&self, duration: Duration) {
        let until = Instant::now() + duration;
        while !self.aborted() {
            let now = Instant::now();
            if now >= until {
                break;
            }
            thread::sleep((until - now).min(POLL_INTERVAL));
        }
    }
}

/// Handle to a running delivery thread.
#[derive(Debug)]
pub(crate) struct DeliveryWorker {
    control: Arc<WorkerControl>,
    thread: JoinHandle<()>,
}

impl DeliveryWorker {
    pub(crate) fn spawn(
        destination: Destination,
        queue: Arc<DestinationQueue>,
        senders: Arc<SenderTable>,
        config: SenderConfig,
    ) -> io::Result<Self> {
        let control = Arc::new(WorkerControl::default());
        let thread_control = Arc::clone(&control);
        let thread = thread::Builder::new()
            .name(format!("logwire-delivery-{destination}"))
            .spawn(move || {
                let worker = Delivery {
                    destination,
                    queue,
                    control: thread_control,
                };
                if let Some(sender) = worker.resolve_sender(&senders, &config) {
                    worker.deliver(&sender);
                }
            })?;

        Ok(Self { control, thread })
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Finish what is queued, then exit.
    pub(crate) fn request_drain(&self) {
        self.control.drain.store(true, Ordering::SeqCst);
    }

    /// Exit at the next poll, leaving queued records behind.
    pub(crate) fn abort(&self) {
        self.control.abort.store(true, Ordering::SeqCst);
    }

    pub(crate) fn join(self) {
        if self.thread.join().is_err() {
            error!("delivery thread panicked");
        }
    }
}

struct Delivery {
    destination: Destination,
    queue: Arc<DestinationQueue>,
    control: Arc<WorkerControl>,
}

impl Delivery {
    fn idle(&self) -> bool {
        self.queue.outstanding() == 0
    }

    /// Phase 1: keep probing until the destination answers.
    fn resolve_sender(&self, senders: &SenderTable, config: &SenderConfig) -> Option<SharedSender> {
        let mut logged = false;
        loop {
            if self.control.aborted() || (self.control.draining() && self.idle()) {
                return None;
            }
            match senders.get_or_probe(&self.destination, config) {
                Ok(sender) => {
                    if logged {
                        info!(destination = %self.destination, "delivery setup recovered");
                    }
                    return Some(sender);
                }
                Err(err) => {
                    if !logged {
                        warn!(
                            destination = %self.destination,
                            error = %err,
                            "delivery setup failed; retrying silently"
                        );
                        logged = true;
                    }
                    self.control.pause(POLL_INTERVAL);
                }
            }
        }
    }

    /// Phase 2: FIFO delivery. A record that failed on a connection-class error
    /// is retried before anything behind it.
    fn deliver(&self, sender: &SharedSender) {
        let mut retained: Option<LogRecord> = None;
        let mut failing = false;

        loop {
            if self.control.aborted() {
                break;
            }
            if self.control.draining() && retained.is_none() && self.queue.rx.is_empty() {
                break;
            }

            let record = match retained.take() {
                Some(record) => record,
                None => match self.queue.rx.recv_timeout(POLL_INTERVAL) {
                    Ok(record) => record,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
            };

            let result = lock(sender).send_log_record(&record);
            match result {
                Ok(()) => {
                    self.queue.mark_delivered();
                    if failing {
                        info!(destination = %self.destination, "delivery recovered");
                        failing = false;
                    }
                }
                Err(err) if !err.is_reconnect() => {
                    error!(
                        destination = %self.destination,
                        error = %err,
                        "record can never be sent; dropping it"
                    );
                    self.queue.mark_dropped();
                }
                Err(err) => {
                    if !failing {
                        warn!(
                            destination = %self.destination,
                            error = %err,
                            "delivery failed; retrying, repeats suppressed until a send succeeds"
                        );
                        failing = true;
                    }
                    retained = Some(record);
                    self.control.pause(RETRY_PAUSE);
                }
            }
        }
    }
}
