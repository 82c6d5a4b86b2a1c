use spdbridge_frame::{encode_params, ParamValue};

/// Operations understood by the device firmware.
///
/// Values are the stable single-byte opcodes carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Communication self-test.
    Test = b't',
    /// Firmware version.
    Version = b'v',
    /// Device name (get or assign).
    Name = b'n',
    /// Restore factory settings.
    FactoryReset = b'f',
    /// Scan the I2C bus for EEPROM addresses.
    ScanBus = b's',
    /// I2C clock mode (get or set).
    BusClock = b'c',
    /// Probe a single bus address.
    ProbeAddress = b'a',
    /// Configuration pin state (get or set).
    PinControl = b'p',
    /// Restore all configuration pins to defaults.
    PinReset = b'd',
    /// Reversible software write protection (set or clear per block).
    Rswp = b'b',
    /// Permanent software write protection.
    Pswp = b'l',
    /// RSWP capability/coverage bitmask.
    RswpReport = b'u',
    /// DDR4 presence detection at an address.
    Ddr4Detect = b'4',
    /// DDR5 presence detection at an address.
    Ddr5Detect = b'5',
    /// SPD5 hub register access (get or set).
    Spd5HubReg = b'h',
    /// SPD EEPROM size at an address.
    Size = b'z',
    /// SPD EEPROM byte access (get or set).
    Eeprom = b'r',
}

/// A request to the device: an opcode plus flattened parameter bytes.
///
/// Ephemeral; built and consumed per call. Multi-byte fields (e.g. 16-bit
/// EEPROM offsets) are supplied pre-split into MSB/LSB parameters.
#[derive(Debug, Clone)]
pub struct Command {
    opcode: Opcode,
    params: Vec<ParamValue>,
}

impl Command {
    /// A command with no parameters.
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            params: Vec::new(),
        }
    }

    /// A command with parameters, flattened in order.
    pub fn with_params(opcode: Opcode, params: Vec<ParamValue>) -> Self {
        Self { opcode, params }
    }

    /// The opcode this command requests.
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// The wire bytes: opcode followed by flattened parameters, written as a
    /// single contiguous sequence.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.params.len());
        out.push(self.opcode as u8);
        out.extend_from_slice(&encode_params(&self.params));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spdbridge_frame::GET_MODIFIER;

    #[test]
    fn bare_command_is_single_opcode_byte() {
        assert_eq!(Command::new(Opcode::Test).to_bytes(), vec![b't']);
    }

    #[test]
    fn params_follow_opcode_in_order() {
        let cmd = Command::with_params(
            Opcode::Eeprom,
            vec![
                ParamValue::U8(0x50),
                ParamValue::U8(0x01), // offset MSB
                ParamValue::U8(0x40), // offset LSB
                ParamValue::U8(GET_MODIFIER),
            ],
        );
        assert_eq!(cmd.to_bytes(), vec![b'r', 0x50, 0x01, 0x40, 0xFF]);
    }

    #[test]
    fn bool_param_encodes_as_byte() {
        let cmd = Command::with_params(
            Opcode::PinControl,
            vec![ParamValue::U8(2), ParamValue::Bool(true)],
        );
        assert_eq!(cmd.to_bytes(), vec![b'p', 2, 1]);
    }
}
