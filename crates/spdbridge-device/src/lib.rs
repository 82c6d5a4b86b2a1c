//! Command/response engine and connection lifecycle for SPD reader/writer
//! devices.
//!
//! This is the "just works" layer. Connect to a device, issue synchronous
//! commands with typed results, and receive asynchronous alerts, while a
//! background monitor watches for silent disconnection.

pub mod alert;
pub mod command;
pub mod device;
pub mod error;
pub mod ops;
mod pending;

pub use alert::{Alert, AlertEvent, ConnectionEvent};
pub use command::{Command, Opcode};
pub use device::{Device, DeviceConfig};
pub use error::{DeviceError, Result};
