use std::time::SystemTime;

/// Alert code byte: device ready.
pub const READY: u8 = b'!';
/// Alert code byte: an EEPROM address appeared on the bus.
pub const ADDRESS_ADDED: u8 = b'+';
/// Alert code byte: an EEPROM address left the bus.
pub const ADDRESS_REMOVED: u8 = b'-';
/// Alert code byte: bus clock raised.
pub const CLOCK_RAISED: u8 = b'/';
/// Alert code byte: bus clock lowered.
pub const CLOCK_LOWERED: u8 = b'\\';

/// An asynchronous, unsolicited notification from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alert {
    /// The device finished booting and accepts commands.
    Ready,
    /// The set of detected bus addresses grew.
    AddressAdded,
    /// The set of detected bus addresses shrank.
    AddressRemoved,
    /// The bus clock was raised.
    ClockRaised,
    /// The bus clock was lowered.
    ClockLowered,
    /// A code this library does not know about.
    Unknown(u8),
}

impl Alert {
    /// Map a wire code byte to an alert.
    pub fn from_code(code: u8) -> Self {
        match code {
            READY => Alert::Ready,
            ADDRESS_ADDED => Alert::AddressAdded,
            ADDRESS_REMOVED => Alert::AddressRemoved,
            CLOCK_RAISED => Alert::ClockRaised,
            CLOCK_LOWERED => Alert::ClockLowered,
            other => Alert::Unknown(other),
        }
    }

    /// The wire code byte for this alert.
    pub fn code(&self) -> u8 {
        match self {
            Alert::Ready => READY,
            Alert::AddressAdded => ADDRESS_ADDED,
            Alert::AddressRemoved => ADDRESS_REMOVED,
            Alert::ClockRaised => CLOCK_RAISED,
            Alert::ClockLowered => CLOCK_LOWERED,
            Alert::Unknown(code) => *code,
        }
    }

    /// Whether this alert changes the set of detected bus addresses.
    pub fn changes_addresses(&self) -> bool {
        matches!(self, Alert::AddressAdded | Alert::AddressRemoved)
    }
}

/// An alert paired with its arrival time, as delivered to subscribers.
#[derive(Debug, Clone, Copy)]
pub struct AlertEvent {
    pub alert: Alert,
    pub timestamp: SystemTime,
}

/// Connection state changes, as delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Handshake completed; the device accepts commands.
    Established,
    /// The monitor observed the link go away.
    Lost,
}
