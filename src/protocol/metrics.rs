use std::sync::atomic::{AtomicU64, Ordering};

use super::OpCode;

/// Track logwire transport and delivery counters without external dependencies.
pub(crate) struct Metrics;

static FRAMES_SENT: AtomicU64 = AtomicU64::new(0);
static FRAMES_RECEIVED: AtomicU64 = AtomicU64::new(0);
static ACKS_SENT: AtomicU64 = AtomicU64::new(0);
static ACKS_RECEIVED: AtomicU64 = AtomicU64::new(0);
static INCOMPLETE_FRAMES: AtomicU64 = AtomicU64::new(0);
static SEND_RETRIES: AtomicU64 = AtomicU64::new(0);
static ERROR_COUNT: AtomicU64 = AtomicU64::new(0);
static ACTIVE_CONNECTIONS: AtomicU64 = AtomicU64::new(0);
static RECORDS_ENQUEUED: AtomicU64 = AtomicU64::new(0);
static RECORDS_DELIVERED: AtomicU64 = AtomicU64::new(0);
static RECORDS_DROPPED: AtomicU64 = AtomicU64::new(0);

/// Direction of frame flow for counting.
#[derive(Clone, Copy)]
pub(crate) enum FrameDirection {
    Sent,
    Received,
}

impl Metrics {
    #[inline]
    pub(crate) fn record_frame(direction: FrameDirection, op_code: OpCode) {
        let is_ack = op_code == OpCode::Ack;
        match direction {
            FrameDirection::Sent => {
                FRAMES_SENT.fetch_add(1, Ordering::Relaxed);
                if is_ack {
                    ACKS_SENT.fetch_add(1, Ordering::Relaxed);
                }
            }
            FrameDirection::Received => {
                FRAMES_RECEIVED.fetch_add(1, Ordering::Relaxed);
                if is_ack {
                    ACKS_RECEIVED.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    #[inline]
    pub(crate) fn record_incomplete_frame() {
        INCOMPLETE_FRAMES.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_retry() {
        SEND_RETRIES.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_error() {
        ERROR_COUNT.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_connection_open() {
        ACTIVE_CONNECTIONS.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_connection_close() {
        ACTIVE_CONNECTIONS.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_enqueued() {
        RECORDS_ENQUEUED.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_delivered() {
        RECORDS_DELIVERED.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_dropped(count: u64) {
        RECORDS_DROPPED.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn totals() -> MetricsSnapshot {
        MetricsSnapshot {
            frames_sent: FRAMES_SENT.load(Ordering::Relaxed),
            frames_received: FRAMES_RECEIVED.load(Ordering::Relaxed),
            acks_sent: ACKS_SENT.load(Ordering::Relaxed),
            acks_received: ACKS_RECEIVED.load(Ordering::Relaxed),
            incomplete_frames: INCOMPLETE_FRAMES.load(Ordering::Relaxed),
            send_retries: SEND_RETRIES.load(Ordering::Relaxed),
            total_errors: ERROR_COUNT.load(Ordering::Relaxed),
            active_connections: ACTIVE_CONNECTIONS.load(Ordering::Relaxed),
            records_enqueued: RECORDS_ENQUEUED.load(Ordering::Relaxed),
            records_delivered: RECORDS_DELIVERED.load(Ordering::Relaxed),
            records_dropped: RECORDS_DROPPED.load(Ordering::Relaxed),
        }
    }
}

/// Lightweight snapshot of process-wide counters.
///
/// Counters are global, so values observed in tests only ever grow.
#[allow(missing_docs)]
#[derive(Default, Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    /// Frames written, acknowledgements included
    pub frames_sent: u64,
    /// Complete frames read, acknowledgements included
    pub frames_received: u64,
    pub acks_sent: u64,
    pub acks_received: u64,
    /// Frames that ended before their declared length
    pub incomplete_frames: u64,
    /// Send attempts after the first
    pub send_retries: u64,
    pub total_errors: u64,
    /// Receiver connections currently open
    pub active_connections: u64,
    pub records_enqueued: u64,
    pub records_delivered: u64,
    /// Records discarded by delivery threads or at shutdown
    pub records_dropped: u64,
}

impl MetricsSnapshot {
    /// Records accepted by a queue but not yet delivered or dropped.
    #[must_use]
    pub fn records_outstanding(&self) -> u64 {
        self.records_enqueued
            .saturating_sub(self.records_delivered)
            .saturating_sub(self.records_dropped)
    }
}
