use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Result, TransportError};
use crate::serial::DEFAULT_TIMEOUT;
use crate::traits::{Link, LinkCounters, LinkStats};

/// One direction of a loopback link.
#[derive(Default)]
struct Pipe {
    buf: Mutex<VecDeque<u8>>,
    readable: Condvar,
}

/// An in-memory bidirectional link, used as the simulated-device end in tests.
///
/// [`MemoryLink::pair`] returns two connected ends. Reads block with the same
/// timeout semantics as a serial port (`ErrorKind::TimedOut` on expiry, EOF
/// once the link is closed and drained). Closing either end is observed by
/// both.
pub struct MemoryLink {
    name: &'static str,
    rx: Arc<Pipe>,
    tx: Arc<Pipe>,
    open: Arc<AtomicBool>,
    timeout: Duration,
    counters: Arc<LinkCounters>,
}

impl MemoryLink {
    /// Create a connected pair of links.
    pub fn pair() -> (MemoryLink, MemoryLink) {
        let a_to_b = Arc::new(Pipe::default());
        let b_to_a = Arc::new(Pipe::default());
        let open = Arc::new(AtomicBool::new(true));

        let a = MemoryLink {
            name: "mem-host",
            rx: Arc::clone(&b_to_a),
            tx: Arc::clone(&a_to_b),
            open: Arc::clone(&open),
            timeout: DEFAULT_TIMEOUT,
            counters: LinkCounters::new(),
        };
        let b = MemoryLink {
            name: "mem-device",
            rx: a_to_b,
            tx: b_to_a,
            open,
            timeout: DEFAULT_TIMEOUT,
            counters: LinkCounters::new(),
        };
        (a, b)
    }
}

impl Read for MemoryLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let deadline = Instant::now() + self.timeout;
        let mut queue = self.rx.buf.lock().unwrap();
        loop {
            if !queue.is_empty() {
                let n = queue.len().min(buf.len());
                for (slot, byte) in buf.iter_mut().zip(queue.drain(..n)) {
                    *slot = byte;
                }
                self.counters.record_rx(n);
                return Ok(n);
            }

            if !self.open.load(Ordering::Acquire) {
                return Ok(0); // EOF
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(std::io::Error::from(std::io::ErrorKind::TimedOut));
            }
            let (guard, _) = self
                .rx
                .readable
                .wait_timeout(queue, deadline - now)
                .unwrap();
            queue = guard;
        }
    }
}

impl Write for MemoryLink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if !self.open.load(Ordering::Acquire) {
            return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        }
        let mut queue = self.tx.buf.lock().unwrap();
        queue.extend(buf.iter().copied());
        self.tx.readable.notify_all();
        self.counters.record_tx(buf.len());
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Link for MemoryLink {
    fn name(&self) -> &str {
        self.name
    }

    fn bytes_to_read(&self) -> Result<u32> {
        if !self.open.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        Ok(self.rx.buf.lock().unwrap().len() as u32)
    }

    fn clear_buffers(&mut self) -> Result<()> {
        if !self.open.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        // Writes are delivered instantly, so only the input side can be stale.
        self.rx.buf.lock().unwrap().clear();
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn Link>> {
        Ok(Box::new(MemoryLink {
            name: self.name,
            rx: Arc::clone(&self.rx),
            tx: Arc::clone(&self.tx),
            open: Arc::clone(&self.open),
            timeout: self.timeout,
            counters: Arc::clone(&self.counters),
        }))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&mut self) {
        self.open.store(false, Ordering::Release);
        // Wake readers blocked on either end.
        self.rx.readable.notify_all();
        self.tx.readable.notify_all();
    }

    fn stats(&self) -> LinkStats {
        self.counters.snapshot()
    }
}

impl std::fmt::Debug for MemoryLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLink")
            .field("name", &self.name)
            .field("open", &self.open.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_both_directions() {
        let (mut host, mut device) = MemoryLink::pair();

        host.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        device.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        device.write_all(b"pong").unwrap();
        host.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[test]
    fn read_times_out_when_idle() {
        let (mut host, _device) = MemoryLink::pair();
        host.set_timeout(Duration::from_millis(20)).unwrap();

        let start = Instant::now();
        let err = host.read(&mut [0u8; 1]).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn close_unblocks_peer_with_eof() {
        let (mut host, mut device) = MemoryLink::pair();
        host.set_timeout(Duration::from_secs(5)).unwrap();

        let reader = std::thread::spawn(move || host.read(&mut [0u8; 1]));
        std::thread::sleep(Duration::from_millis(20));
        device.close();

        let n = reader.join().unwrap().unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn bytes_to_read_and_clear() {
        let (mut host, mut device) = MemoryLink::pair();

        device.write_all(b"stale").unwrap();
        assert_eq!(host.bytes_to_read().unwrap(), 5);

        host.clear_buffers().unwrap();
        assert_eq!(host.bytes_to_read().unwrap(), 0);
    }

    #[test]
    fn write_after_close_fails() {
        let (mut host, mut device) = MemoryLink::pair();
        host.close();

        assert!(!device.is_open());
        let err = device.write(b"x").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn clones_share_open_state_and_stats() {
        let (host, mut device) = MemoryLink::pair();
        let mut clone = host.try_clone().unwrap();

        device.write_all(b"abc").unwrap();
        let mut buf = [0u8; 3];
        clone.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");
        assert_eq!(host.stats().bytes_received, 3);

        clone.close();
        assert!(!host.is_open());
        assert!(!device.is_open());
    }
}
