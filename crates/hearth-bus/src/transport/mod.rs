//! Handlers that relay events across a process or thread boundary.
//!
//! - [`PipeHandler`]: encodes each event and writes it to a byte stream.
//!   The write blocks, so a slow reader slows the producer down.
//! - [`QueueHandler`]: hands the event itself to a concurrent queue.
//!
//! Per event a transport goes `Idle → Sending → Delivered | Failure-Logged → Idle`
//! with no retry and no acknowledgment. Transport failures are logged and
//! counted in [`TransportStats`]; `handle` always returns `Ok`.

mod pipe;
mod queue;

use std::sync::atomic::{AtomicU64, Ordering};

pub use pipe::PipeHandler;
pub use queue::{event_queue, EventQueue, QueueClosed, QueueHandler};

/// Snapshot of a transport's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportCounts {
    /// Events handed to the endpoint
    pub delivered: u64,
    /// Events dropped because encoding or the endpoint failed
    pub failed: u64,
    /// Events that failed the encodability check
    pub encode_errors: u64,
}

#[derive(Debug, Default)]
pub struct TransportStats {
    delivered: AtomicU64,
    failed: AtomicU64,
    encode_errors: AtomicU64,
}

impl TransportStats {
    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_encode_error(&self) {
        self.encode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TransportCounts {
        TransportCounts {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            encode_errors: self.encode_errors.load(Ordering::Relaxed),
        }
    }
}
