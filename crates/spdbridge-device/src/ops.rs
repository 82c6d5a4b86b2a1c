//! Typed device operations.
//!
//! Thin wrappers over [`Device::execute_as`], one per firmware operation.
//! 16-bit EEPROM offsets are split into MSB/LSB here; the wire carries plain
//! bytes only. The reserved [`GET_MODIFIER`] parameter selects "report the
//! current value" on get/set opcodes.

use spdbridge_frame::{ParamValue, GET_MODIFIER};

use crate::command::{Command, Opcode};
use crate::device::Device;
use crate::error::Result;

impl Device {
    /// Communication self-test. True when the device responds affirmatively.
    pub fn test(&self) -> Result<bool> {
        self.execute_as(&Command::new(Opcode::Test))
    }

    /// Firmware version number.
    pub fn firmware_version(&self) -> Result<u32> {
        self.execute_as(&Command::new(Opcode::Version))
    }

    /// The device's assigned name.
    pub fn device_name(&self) -> Result<String> {
        self.execute_as(&Command::with_params(
            Opcode::Name,
            vec![ParamValue::U8(GET_MODIFIER)],
        ))
    }

    /// Assign a new device name.
    pub fn set_device_name(&self, name: &str) -> Result<bool> {
        let bytes = name.as_bytes();
        self.execute_as(&Command::with_params(
            Opcode::Name,
            vec![
                ParamValue::U8(bytes.len() as u8),
                ParamValue::Bytes(bytes.to_vec()),
            ],
        ))
    }

    /// Restore factory settings.
    pub fn factory_reset(&self) -> Result<bool> {
        self.execute_as(&Command::new(Opcode::FactoryReset))
    }

    /// Scan the bus and return the detected EEPROM addresses.
    pub fn scan_bus(&self) -> Result<Vec<u8>> {
        self.execute_as(&Command::new(Opcode::ScanBus))
    }

    /// Current bus clock mode.
    pub fn bus_clock(&self) -> Result<u8> {
        self.execute_as(&Command::with_params(
            Opcode::BusClock,
            vec![ParamValue::U8(GET_MODIFIER)],
        ))
    }

    /// Set the bus clock mode.
    pub fn set_bus_clock(&self, mode: u8) -> Result<bool> {
        self.execute_as(&Command::with_params(
            Opcode::BusClock,
            vec![ParamValue::U8(mode)],
        ))
    }

    /// Whether a device answers at `address`.
    pub fn probe_address(&self, address: u8) -> Result<bool> {
        self.execute_as(&Command::with_params(
            Opcode::ProbeAddress,
            vec![ParamValue::U8(address)],
        ))
    }

    /// Current level of a configuration pin.
    pub fn pin_state(&self, pin: u8) -> Result<bool> {
        self.execute_as(&Command::with_params(
            Opcode::PinControl,
            vec![ParamValue::U8(pin), ParamValue::U8(GET_MODIFIER)],
        ))
    }

    /// Drive a configuration pin high or low.
    pub fn set_pin(&self, pin: u8, high: bool) -> Result<bool> {
        self.execute_as(&Command::with_params(
            Opcode::PinControl,
            vec![ParamValue::U8(pin), ParamValue::Bool(high)],
        ))
    }

    /// Restore all configuration pins to their default state.
    pub fn reset_pins(&self) -> Result<bool> {
        self.execute_as(&Command::new(Opcode::PinReset))
    }

    /// Enable or clear reversible write protection for `block`.
    pub fn set_rswp(&self, block: u8, enable: bool) -> Result<bool> {
        self.execute_as(&Command::with_params(
            Opcode::Rswp,
            vec![ParamValue::U8(block), ParamValue::Bool(enable)],
        ))
    }

    /// RSWP capability/coverage bitmask.
    pub fn rswp_report(&self) -> Result<u8> {
        self.execute_as(&Command::new(Opcode::RswpReport))
    }

    /// Permanently write-protect the EEPROM at `address`. Irreversible.
    pub fn set_pswp(&self, address: u8) -> Result<bool> {
        self.execute_as(&Command::with_params(
            Opcode::Pswp,
            vec![ParamValue::U8(address)],
        ))
    }

    /// Whether a DDR4 module is present at `address`.
    pub fn detect_ddr4(&self, address: u8) -> Result<bool> {
        self.execute_as(&Command::with_params(
            Opcode::Ddr4Detect,
            vec![ParamValue::U8(address)],
        ))
    }

    /// Whether a DDR5 module is present at `address`.
    pub fn detect_ddr5(&self, address: u8) -> Result<bool> {
        self.execute_as(&Command::with_params(
            Opcode::Ddr5Detect,
            vec![ParamValue::U8(address)],
        ))
    }

    /// Read an SPD5 hub register.
    pub fn spd5_hub_reg(&self, address: u8, register: u8) -> Result<u8> {
        self.execute_as(&Command::with_params(
            Opcode::Spd5HubReg,
            vec![
                ParamValue::U8(address),
                ParamValue::U8(register),
                ParamValue::U8(GET_MODIFIER),
            ],
        ))
    }

    /// Write an SPD5 hub register.
    pub fn set_spd5_hub_reg(&self, address: u8, register: u8, value: u8) -> Result<bool> {
        self.execute_as(&Command::with_params(
            Opcode::Spd5HubReg,
            vec![
                ParamValue::U8(address),
                ParamValue::U8(register),
                ParamValue::U8(value),
            ],
        ))
    }

    /// SPD EEPROM size in bytes at `address`.
    pub fn spd_size(&self, address: u8) -> Result<u16> {
        self.execute_as(&Command::with_params(
            Opcode::Size,
            vec![ParamValue::U8(address)],
        ))
    }

    /// Read one EEPROM byte.
    pub fn read_eeprom(&self, address: u8, offset: u16) -> Result<u8> {
        let [msb, lsb] = offset.to_be_bytes();
        self.execute_as(&Command::with_params(
            Opcode::Eeprom,
            vec![
                ParamValue::U8(address),
                ParamValue::U8(msb),
                ParamValue::U8(lsb),
                ParamValue::U8(GET_MODIFIER),
            ],
        ))
    }

    /// Write one EEPROM byte.
    pub fn write_eeprom(&self, address: u8, offset: u16, value: u8) -> Result<bool> {
        let [msb, lsb] = offset.to_be_bytes();
        self.execute_as(&Command::with_params(
            Opcode::Eeprom,
            vec![
                ParamValue::U8(address),
                ParamValue::U8(msb),
                ParamValue::U8(lsb),
                ParamValue::U8(value),
            ],
        ))
    }
}
