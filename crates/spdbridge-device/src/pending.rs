use std::sync::{Condvar, Mutex};
use std::time::Duration;

use spdbridge_frame::Frame;

/// Single-writer/single-reader rendezvous for the one awaited response frame.
///
/// Holds at most one frame. Exclusivity of the waiter is enforced by the
/// connection's call-serializing lock, not by the slot itself.
pub(crate) struct PendingSlot {
    frame: Mutex<Option<Frame>>,
    ready: Condvar,
}

impl PendingSlot {
    pub(crate) fn new() -> Self {
        Self {
            frame: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Deposit a frame and wake the waiter. A frame nobody is waiting for
    /// (e.g. a late answer to a timed-out call) is simply overwritten or
    /// cleared later; it must never match a future call.
    pub(crate) fn deliver(&self, frame: Frame) {
        *self.frame.lock().unwrap() = Some(frame);
        self.ready.notify_all();
    }

    /// Block until a frame is delivered or `timeout` elapses, taking the
    /// frame out of the slot.
    pub(crate) fn wait(&self, timeout: Duration) -> Option<Frame> {
        let guard = self.frame.lock().unwrap();
        let (mut guard, _) = self
            .ready
            .wait_timeout_while(guard, timeout, |frame| frame.is_none())
            .unwrap();
        guard.take()
    }

    /// Drop whatever the slot holds so the next call starts clean.
    pub(crate) fn clear(&self) {
        *self.frame.lock().unwrap() = None;
    }
}
