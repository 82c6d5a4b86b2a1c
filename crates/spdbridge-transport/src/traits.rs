use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// A connected byte stream to an SPD reader/writer device.
///
/// Implemented by [`crate::SerialLink`] for real hardware and by
/// [`crate::MemoryLink`] for simulated devices in tests. Reads block for at
/// most the configured timeout; a timed-out read surfaces as
/// `std::io::ErrorKind::TimedOut` so callers can poll a shutdown flag
/// between attempts.
pub trait Link: Read + Write + Send {
    /// Port identifier used in diagnostics and error context.
    fn name(&self) -> &str;

    /// Number of bytes currently readable without blocking.
    fn bytes_to_read(&self) -> Result<u32>;

    /// Discard any pending bytes in the input and output buffers.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Set the device-level read timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Create a second handle to the same link.
    ///
    /// The frame receiver owns one handle for reading while the correlator
    /// writes through another; the handles share buffers, open state, and
    /// traffic counters.
    fn try_clone(&self) -> Result<Box<dyn Link>>;

    /// Whether the underlying connection is still usable.
    fn is_open(&self) -> bool;

    /// Close the link. All handles observe the closure.
    fn close(&mut self);

    /// Snapshot of cumulative traffic counters.
    fn stats(&self) -> LinkStats;
}

/// Cumulative byte counts over the lifetime of a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Bytes written to the device.
    pub bytes_sent: u64,
    /// Bytes read from the device.
    pub bytes_received: u64,
}

/// Shared traffic counters; cloned handles to one link update the same cell.
#[derive(Debug, Default)]
pub(crate) struct LinkCounters {
    tx: AtomicU64,
    rx: AtomicU64,
}

impl LinkCounters {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn record_tx(&self, n: usize) {
        self.tx.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_rx(&self, n: usize) {
        self.rx.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> LinkStats {
        LinkStats {
            bytes_sent: self.tx.load(Ordering::Relaxed),
            bytes_received: self.rx.load(Ordering::Relaxed),
        }
    }
}
