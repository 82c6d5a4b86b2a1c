use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use spdbridge_frame::{
    checksum, Frame, FrameError, FrameReader, FromResponse, ParamValue, GET_MODIFIER,
};
use spdbridge_transport::{Link, LinkSettings, LinkStats, SerialLink, TransportError};
use tracing::{debug, info, warn};

use crate::alert::{Alert, AlertEvent, ConnectionEvent};
use crate::command::{Command, Opcode};
use crate::error::{DeviceError, Result};
use crate::pending::PendingSlot;

/// Read timeout for the frame receiver; bounds how quickly it notices the
/// shutdown flag.
const RECEIVER_POLL: Duration = Duration::from_millis(10);

/// How often the liveness monitor probes the link.
const MONITOR_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for a [`Device`] connection.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Serial line parameters.
    pub link: LinkSettings,
    /// How long a command may wait for its response frame.
    pub command_timeout: Duration,
    /// How long `connect` waits for the device's ready alert.
    pub connect_timeout: Duration,
}

impl DeviceConfig {
    /// Configuration for `port` with default timeouts.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            link: LinkSettings::new(port),
            command_timeout: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

type AlertCallback = Box<dyn Fn(AlertEvent) + Send + Sync + 'static>;
type ConnectionCallback = Box<dyn Fn(ConnectionEvent) + Send + Sync + 'static>;

/// Capability state discovered from the device.
///
/// Valid only while connected; wiped (not merely stale) on disconnect.
#[derive(Debug, Clone, Default)]
struct Capabilities {
    addresses: Vec<u8>,
    rswp_support: u8,
    max_payload: usize,
}

/// Live connection resources: the write handle plus background threads.
struct Active {
    link: Box<dyn Link>,
    receiver: Option<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
}

struct Shared {
    port: String,
    command_timeout: Duration,
    active: Mutex<Option<Active>>,
    /// Serializes command execution; exactly one command in flight per
    /// connection. Scoped per device instance, so independent devices are
    /// never serialized against each other.
    call_lock: Mutex<()>,
    slot: PendingSlot,
    running: AtomicBool,
    connected: AtomicBool,
    ready: Mutex<bool>,
    ready_signal: Condvar,
    caps: Mutex<Capabilities>,
    alert_subs: Mutex<Vec<AlertCallback>>,
    connection_subs: Mutex<Vec<ConnectionCallback>>,
}

/// A connection to an SPD reader/writer device.
///
/// Owns the link, a frame-receiver thread, and a liveness monitor. Commands
/// are synchronous: the caller blocks until the matching response frame
/// arrives or the timeout elapses. Alerts are delivered to subscribers on
/// short-lived worker threads, never on the receiver.
pub struct Device {
    config: DeviceConfig,
    shared: Arc<Shared>,
}

impl Device {
    /// Create a disconnected device for the configured port.
    pub fn new(config: DeviceConfig) -> Self {
        let shared = Arc::new(Shared {
            port: config.link.port.clone(),
            command_timeout: config.command_timeout,
            active: Mutex::new(None),
            call_lock: Mutex::new(()),
            slot: PendingSlot::new(),
            running: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            ready: Mutex::new(false),
            ready_signal: Condvar::new(),
            caps: Mutex::new(Capabilities::default()),
            alert_subs: Mutex::new(Vec::new()),
            connection_subs: Mutex::new(Vec::new()),
        });
        Self { config, shared }
    }

    /// Open the configured serial port and establish the connection:
    /// wait for the ready alert, run the Test handshake, prime the
    /// capability cache, and start the liveness monitor.
    ///
    /// On any failure the connection is fully torn down — never half-open.
    pub fn connect(&self) -> Result<()> {
        let link = SerialLink::open(&self.config.link)?;
        self.connect_with(Box::new(link))
    }

    /// Establish the connection over an already-open link.
    ///
    /// Used by tests to connect to a simulated device over a
    /// [`spdbridge_transport::MemoryLink`].
    pub fn connect_with(&self, link: Box<dyn Link>) -> Result<()> {
        if self.is_connected() {
            debug!(port = %self.shared.port, "already connected");
            return Ok(());
        }

        match self.try_connect(link) {
            Ok(()) => {
                Shared::notify_connection(&self.shared, ConnectionEvent::Established);
                Ok(())
            }
            Err(err) => {
                Shared::teardown(&self.shared);
                Err(err)
            }
        }
    }

    fn try_connect(&self, link: Box<dyn Link>) -> Result<()> {
        // Disconnected -> Opening
        {
            let mut active = self.shared.active.lock().unwrap();
            if active.is_some() {
                return Err(DeviceError::HandshakeFailed(
                    "connection attempt already in progress".into(),
                ));
            }

            self.shared.running.store(true, Ordering::Release);
            self.shared.connected.store(false, Ordering::Release);
            *self.shared.ready.lock().unwrap() = false;
            self.shared.slot.clear();
            *self.shared.caps.lock().unwrap() = Capabilities::default();

            let mut read_half = link.try_clone()?;
            read_half.set_timeout(RECEIVER_POLL)?;
            let receiver = spawn_receiver(Arc::clone(&self.shared), read_half)?;

            *active = Some(Active {
                link,
                receiver: Some(receiver),
                monitor: None,
            });
        }

        // Opening -> AwaitingReady
        let is_ready = {
            let guard = self.shared.ready.lock().unwrap();
            let (guard, _) = self
                .shared
                .ready_signal
                .wait_timeout_while(guard, self.config.connect_timeout, |ready| !*ready)
                .unwrap();
            *guard
        };
        if !is_ready {
            return Err(DeviceError::HandshakeFailed(format!(
                "device not ready within {:?}",
                self.config.connect_timeout
            )));
        }

        // AwaitingReady -> HandshakeTesting
        debug!(port = %self.shared.port, "device ready, testing communication");
        let ok: bool = Shared::execute_as(
            &self.shared,
            &Command::new(Opcode::Test),
            self.config.command_timeout,
        )?;
        if !ok {
            return Err(DeviceError::HandshakeFailed(
                "test command rejected by device".into(),
            ));
        }

        Shared::refresh_capabilities(&self.shared, self.config.command_timeout)?;
        let max_payload: u8 = Shared::execute_as(
            &self.shared,
            &Command::with_params(Opcode::Size, vec![ParamValue::U8(GET_MODIFIER)]),
            self.config.command_timeout,
        )?;
        self.shared.caps.lock().unwrap().max_payload = max_payload as usize;

        // HandshakeTesting -> Connected
        self.shared.connected.store(true, Ordering::Release);
        {
            let mut active = self.shared.active.lock().unwrap();
            let active = active.as_mut().ok_or(DeviceError::NotConnected)?;
            let probe = active.link.try_clone()?;
            active.monitor = Some(spawn_monitor(Arc::clone(&self.shared), probe)?);
        }

        info!(port = %self.shared.port, "connection established");
        Ok(())
    }

    /// Tear down the connection: stop the receiver and monitor, close the
    /// link, and invalidate cached capability state.
    pub fn disconnect(&self) {
        if self.shared.active.lock().unwrap().is_none() {
            return;
        }
        info!(port = %self.shared.port, "disconnecting");
        Shared::teardown(&self.shared);
    }

    /// Whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Execute a command and return the raw response body.
    ///
    /// Fails fast with [`DeviceError::NotConnected`] when disconnected,
    /// without touching the link.
    pub fn execute(&self, command: &Command) -> Result<Bytes> {
        self.execute_with_timeout(command, self.config.command_timeout)
    }

    /// Execute a command with an explicit response timeout.
    pub fn execute_with_timeout(&self, command: &Command, timeout: Duration) -> Result<Bytes> {
        if !self.is_connected() {
            return Err(DeviceError::NotConnected);
        }
        Shared::execute(&self.shared, command, timeout)
    }

    /// Execute a command and decode the response body as `T`.
    pub fn execute_as<T: FromResponse>(&self, command: &Command) -> Result<T> {
        self.execute(command).map(|body| T::from_response(&body))
    }

    /// Register a callback for device alerts.
    ///
    /// Invoked on a dedicated worker thread per alert; a slow or panicking
    /// subscriber cannot stall the frame receiver.
    pub fn subscribe_alerts(&self, callback: impl Fn(AlertEvent) + Send + Sync + 'static) {
        self.shared
            .alert_subs
            .lock()
            .unwrap()
            .push(Box::new(callback));
    }

    /// Register a callback for connection state changes.
    pub fn subscribe_connection(&self, callback: impl Fn(ConnectionEvent) + Send + Sync + 'static) {
        self.shared
            .connection_subs
            .lock()
            .unwrap()
            .push(Box::new(callback));
    }

    /// EEPROM addresses discovered on the bus. Empty while disconnected.
    pub fn addresses(&self) -> Vec<u8> {
        self.shared.caps.lock().unwrap().addresses.clone()
    }

    /// RSWP capability bitmask reported by the device. Zero while
    /// disconnected.
    pub fn rswp_support(&self) -> u8 {
        self.shared.caps.lock().unwrap().rswp_support
    }

    /// Maximum command payload the device accepts. Zero while disconnected.
    pub fn max_payload_size(&self) -> usize {
        self.shared.caps.lock().unwrap().max_payload
    }

    /// Cumulative link traffic counters, while connected.
    pub fn stats(&self) -> Option<LinkStats> {
        self.shared
            .active
            .lock()
            .unwrap()
            .as_ref()
            .map(|active| active.link.stats())
    }

    /// The configured port name.
    pub fn port(&self) -> &str {
        &self.shared.port
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        Shared::teardown(&self.shared);
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("port", &self.shared.port)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Shared {
    /// Run one command under the call lock: flush stale bytes, write the
    /// command, and wait for the response frame. The pending slot is cleared
    /// on every exit path so the next call starts clean.
    fn execute(shared: &Shared, command: &Command, timeout: Duration) -> Result<Bytes> {
        let _call = shared.call_lock.lock().unwrap();
        shared.slot.clear();

        let bytes = command.to_bytes();
        {
            let mut active = shared.active.lock().unwrap();
            let active = active.as_mut().ok_or(DeviceError::NotConnected)?;
            active.link.clear_buffers()?;
            active.link.write_all(&bytes).map_err(TransportError::Io)?;
            active.link.flush().map_err(TransportError::Io)?;
        }
        debug!(opcode = ?command.opcode(), bytes = ?bytes, "command sent");

        let outcome = match shared.slot.wait(timeout) {
            None => Err(DeviceError::Timeout {
                opcode: command.opcode(),
                timeout,
            }),
            Some(Frame::Alert { .. }) => Err(DeviceError::UnexpectedFrame {
                opcode: command.opcode(),
            }),
            Some(Frame::Response { body, checksum: received }) => {
                let expected = checksum(&body);
                if expected == received {
                    Ok(body)
                } else {
                    Err(DeviceError::ChecksumMismatch {
                        opcode: command.opcode(),
                        expected,
                        received,
                    })
                }
            }
        };

        shared.slot.clear();
        outcome
    }

    fn execute_as<T: FromResponse>(
        shared: &Shared,
        command: &Command,
        timeout: Duration,
    ) -> Result<T> {
        Self::execute(shared, command, timeout).map(|body| T::from_response(&body))
    }

    /// Re-run the bus scan and refresh the RSWP capability bitmask.
    fn refresh_capabilities(shared: &Shared, timeout: Duration) -> Result<()> {
        let addresses: Vec<u8> =
            Self::execute_as(shared, &Command::new(Opcode::ScanBus), timeout)?;
        let rswp: u8 = Self::execute_as(shared, &Command::new(Opcode::RswpReport), timeout)?;

        let mut caps = shared.caps.lock().unwrap();
        caps.addresses = addresses;
        caps.rswp_support = rswp;
        debug!(addresses = ?caps.addresses, rswp = rswp, "capability cache refreshed");
        Ok(())
    }

    /// Full teardown. Safe to call from any thread, including the monitor;
    /// a thread never joins itself.
    fn teardown(shared: &Shared) {
        shared.running.store(false, Ordering::Release);
        shared.connected.store(false, Ordering::Release);
        *shared.ready.lock().unwrap() = false;
        shared.ready_signal.notify_all();
        shared.slot.clear();
        *shared.caps.lock().unwrap() = Capabilities::default();

        let active = shared.active.lock().unwrap().take();
        if let Some(mut active) = active {
            active.link.close();
            for handle in [active.receiver.take(), active.monitor.take()]
                .into_iter()
                .flatten()
            {
                if handle.thread().id() != thread::current().id() {
                    let _ = handle.join();
                }
            }
        }
    }

    /// Invoke connection subscribers on a dedicated thread.
    fn notify_connection(shared: &Arc<Shared>, event: ConnectionEvent) {
        let shared = Arc::clone(shared);
        let spawned = thread::Builder::new()
            .name("spdbridge-event".into())
            .spawn(move || {
                let subs = shared.connection_subs.lock().unwrap();
                for sub in subs.iter() {
                    if catch_unwind(AssertUnwindSafe(|| sub(event))).is_err() {
                        warn!(?event, "connection subscriber panicked");
                    }
                }
            });
        if let Err(err) = spawned {
            warn!(error = %err, "failed to spawn event worker");
        }
    }
}

/// Dedicated frame-receiver loop for the lifetime of a connection.
///
/// Alerts are handed off to a worker immediately; responses go to the
/// pending slot. Exits when the link closes or the shutdown flag is set.
fn spawn_receiver(shared: Arc<Shared>, link: Box<dyn Link>) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("spdbridge-recv".into())
        .spawn(move || {
            let mut reader = FrameReader::new(link);
            while shared.running.load(Ordering::Acquire) {
                match reader.read_frame() {
                    Ok(Frame::Alert { code }) => dispatch_alert(&shared, code),
                    Ok(frame) => shared.slot.deliver(frame),
                    Err(FrameError::Io(err))
                        if matches!(
                            err.kind(),
                            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                        ) =>
                    {
                        continue;
                    }
                    Err(FrameError::ConnectionClosed) => {
                        debug!("link closed; receiver exiting");
                        break;
                    }
                    Err(err) => {
                        warn!(error = %err, "receiver error");
                        break;
                    }
                }
            }
        })
        .map_err(|err| DeviceError::Transport(TransportError::Io(err)))
}

/// Handle one alert on a short-lived worker so the receiver never blocks:
/// notify subscribers, then apply the alert's side effect to cached state.
fn dispatch_alert(shared: &Arc<Shared>, code: u8) {
    let shared = Arc::clone(shared);
    let spawned = thread::Builder::new()
        .name("spdbridge-alert".into())
        .spawn(move || {
            let alert = Alert::from_code(code);
            let event = AlertEvent {
                alert,
                timestamp: SystemTime::now(),
            };
            debug!(?alert, "alert received");

            {
                let subs = shared.alert_subs.lock().unwrap();
                for sub in subs.iter() {
                    if catch_unwind(AssertUnwindSafe(|| sub(event))).is_err() {
                        warn!(?alert, "alert subscriber panicked");
                    }
                }
            }

            match alert {
                Alert::Ready => {
                    *shared.ready.lock().unwrap() = true;
                    shared.ready_signal.notify_all();
                }
                alert if alert.changes_addresses()
                    && shared.connected.load(Ordering::Acquire) =>
                {
                    if let Err(err) =
                        Shared::refresh_capabilities(&shared, shared.command_timeout)
                    {
                        warn!(error = %err, "bus rescan after alert failed");
                    }
                }
                _ => {}
            }
        });
    if let Err(err) = spawned {
        warn!(error = %err, "failed to spawn alert worker");
    }
}

/// Liveness monitor: polls the link and drives teardown when it observes an
/// unexpected closure. The only background condition allowed to change
/// connection state.
fn spawn_monitor(shared: Arc<Shared>, probe: Box<dyn Link>) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("spdbridge-monitor".into())
        .spawn(move || {
            while shared.running.load(Ordering::Acquire) {
                thread::sleep(MONITOR_INTERVAL);
                if !shared.running.load(Ordering::Acquire) {
                    break;
                }
                if !probe.is_open() {
                    warn!(port = %shared.port, "link lost; tearing down connection");
                    Shared::teardown(&shared);
                    Shared::notify_connection(&shared, ConnectionEvent::Lost);
                    break;
                }
            }
        })
        .map_err(|err| DeviceError::Transport(TransportError::Io(err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_fail_fast_while_disconnected() {
        let device = Device::new(DeviceConfig::new("test-port"));
        let err = device.execute(&Command::new(Opcode::Test)).unwrap_err();
        assert!(matches!(err, DeviceError::NotConnected));
        assert!(!device.is_connected());
    }

    #[test]
    fn capability_accessors_empty_while_disconnected() {
        let device = Device::new(DeviceConfig::new("test-port"));
        assert!(device.addresses().is_empty());
        assert_eq!(device.rswp_support(), 0);
        assert_eq!(device.max_payload_size(), 0);
        assert!(device.stats().is_none());
    }

    #[test]
    fn disconnect_when_never_connected_is_a_no_op() {
        let device = Device::new(DeviceConfig::new("test-port"));
        device.disconnect();
        assert!(!device.is_connected());
    }
}
