//! Serial link abstraction for SPD reader/writer devices.
//!
//! Provides a unified byte-stream interface over the physical connection to
//! the device:
//! - USB serial ports (the real hardware path)
//! - In-memory loopback pairs (simulated devices in tests)
//!
//! This is the lowest layer of spdbridge. Everything else builds on top of
//! the [`Link`] trait provided here.

pub mod error;
pub mod memory;
pub mod serial;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::MemoryLink;
pub use serial::{list_ports, LinkSettings, SerialLink, DEFAULT_BAUD};
pub use traits::{Link, LinkStats};
