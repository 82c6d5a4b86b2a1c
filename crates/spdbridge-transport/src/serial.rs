use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{Link, LinkCounters, LinkStats};

/// Default baud rate, matching the device firmware's serial configuration.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Default device-level read timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

/// Serial line parameters for opening a [`SerialLink`].
#[derive(Debug, Clone)]
pub struct LinkSettings {
    /// Port name, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    /// Baud rate. Must match the firmware's configured rate.
    pub baud: u32,
    /// Device-level read timeout.
    pub timeout: Duration,
}

impl LinkSettings {
    /// Settings for `port` with the default baud rate and timeout.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud: DEFAULT_BAUD,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// A serial port connection to the device.
///
/// Cloned handles share the underlying port, the open flag, and the traffic
/// counters, so one handle can be dedicated to reading while another writes.
pub struct SerialLink {
    port: Box<dyn serialport::SerialPort>,
    name: String,
    open: Arc<AtomicBool>,
    counters: Arc<LinkCounters>,
}

impl SerialLink {
    /// Open the port described by `settings`.
    pub fn open(settings: &LinkSettings) -> Result<Self> {
        let port = serialport::new(&settings.port, settings.baud)
            .timeout(settings.timeout)
            .open()
            .map_err(|source| TransportError::Open {
                port: settings.port.clone(),
                source,
            })?;

        info!(port = %settings.port, baud = settings.baud, "opened serial link");

        Ok(Self {
            port,
            name: settings.port.clone(),
            open: Arc::new(AtomicBool::new(true)),
            counters: LinkCounters::new(),
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(TransportError::Closed)
        }
    }
}

impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.port.read(buf)?;
        self.counters.record_rx(n);
        Ok(n)
    }
}

impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.port.write(buf)?;
        self.counters.record_tx(n);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.port.flush()
    }
}

impl Link for SerialLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn bytes_to_read(&self) -> Result<u32> {
        self.check_open()?;
        Ok(self.port.bytes_to_read()?)
    }

    fn clear_buffers(&mut self) -> Result<()> {
        self.check_open()?;
        self.port.clear(serialport::ClearBuffer::All)?;
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.port.set_timeout(timeout)?;
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn Link>> {
        let port = self.port.try_clone()?;
        Ok(Box::new(Self {
            port,
            name: self.name.clone(),
            open: Arc::clone(&self.open),
            counters: Arc::clone(&self.counters),
        }))
    }

    fn is_open(&self) -> bool {
        // A yanked USB adapter keeps the file handle but errors on probe.
        self.open.load(Ordering::Acquire) && self.port.bytes_to_read().is_ok()
    }

    fn close(&mut self) {
        if self.open.swap(false, Ordering::AcqRel) {
            debug!(port = %self.name, "closed serial link");
        }
    }

    fn stats(&self) -> LinkStats {
        self.counters.snapshot()
    }
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("port", &self.name)
            .field("open", &self.open.load(Ordering::Relaxed))
            .finish()
    }
}

/// Enumerate serial port names that may host an SPD reader/writer device.
pub fn list_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports()?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
