//! Common types shared across the service manager and device providers.
//!
//! This module defines the service handle, the command payload and
//! completion types, cash unit inventory records, and the structured
//! status/capability records returned by `get_info`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle identifying one open binding to a service provider.
///
/// Handles are allocated by the manager and are only meaningful to the
/// manager that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceHandle(u32);

impl ServiceHandle {
    /// Wrap a raw handle value.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw handle value.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Input data accompanying a command.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// Command takes no data.
    #[default]
    Empty,

    /// Monetary amount in whole currency units (dispense).
    Amount(u32),

    /// Free text (print form, keyed PIN).
    Text(String),
}

impl Payload {
    /// Short name of the payload shape, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Amount(_) => "amount",
            Self::Text(_) => "text",
        }
    }
}

/// Output data of a successful command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// Command completed without output data.
    Done,

    /// Raw track data read from the card.
    TrackData(String),

    /// Notes counted out by a dispense.
    NoteMix(NoteMix),

    /// Opaque PIN block.
    PinBlock(String),
}

/// Number of notes of one denomination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteCount {
    /// Note value in whole currency units.
    pub denomination: u32,

    /// Number of notes.
    pub count: u32,
}

/// The set of notes chosen to fulfill a dispense amount.
///
/// Entries are ordered by denomination, largest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteMix {
    pub notes: Vec<NoteCount>,
}

impl NoteMix {
    /// Total value of the mix.
    pub fn total(&self) -> u64 {
        self.notes
            .iter()
            .map(|n| u64::from(n.denomination) * u64::from(n.count))
            .sum()
    }

    /// Number of notes of a denomination in the mix (0 if absent).
    pub fn count_of(&self, denomination: u32) -> u32 {
        self.notes
            .iter()
            .find(|n| n.denomination == denomination)
            .map_or(0, |n| n.count)
    }

    /// Total number of notes.
    pub fn note_count(&self) -> u32 {
        self.notes.iter().map(|n| n.count).sum()
    }
}

/// One cassette of notes in the cash dispenser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashUnit {
    /// Note value in whole currency units (always positive).
    pub denomination: u32,

    /// Notes remaining in the cassette.
    pub count: u32,

    /// ISO 4217 currency code.
    pub currency: String,
}

impl CashUnit {
    /// Create a new cash unit.
    pub fn new(denomination: u32, count: u32, currency: impl Into<String>) -> Self {
        Self {
            denomination,
            count,
            currency: currency.into(),
        }
    }

    /// Value held by this cassette.
    pub fn value(&self) -> u64 {
        u64::from(self.denomination) * u64::from(self.count)
    }
}

/// Operational state reported by every device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum DeviceState {
    Online,
    Offline,
    HardwareError,
}

/// Card reader status (`WFS_INF_IDC_STATUS`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardReaderStatus {
    pub device_state: DeviceState,
    pub media_present: bool,
    pub retain_bin_count: u32,
}

/// Card reader capabilities (`WFS_INF_IDC_CAPABILITIES`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardReaderCapabilities {
    pub can_eject: bool,
    pub can_retain: bool,
    pub can_read_track1: bool,
    pub can_read_track2: bool,
    pub can_read_track3: bool,
}

/// State of the dispenser's output position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispenserState {
    /// No notes waiting at the output.
    Ok,

    /// Notes counted out and waiting to be taken or retracted.
    Presented,
}

/// Cash dispenser status (`WFS_INF_CDM_STATUS`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispenserStatus {
    pub device_state: DeviceState,
    pub dispenser_state: DispenserState,
    pub intermediate_stacker_empty: bool,
    pub last_dispensed_amount: u32,
}

/// Cash unit inventory (`WFS_INF_CDM_CASH_UNIT_INFO`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashUnitInfo {
    /// Cassettes ordered by denomination, largest first.
    pub units: Vec<CashUnit>,
}

impl CashUnitInfo {
    /// Total value held by all cassettes.
    pub fn total_value(&self) -> u64 {
        self.units.iter().map(CashUnit::value).sum()
    }

    /// Notes remaining for a denomination (`None` if no such cassette).
    pub fn count_of(&self, denomination: u32) -> Option<u32> {
        self.units
            .iter()
            .find(|u| u.denomination == denomination)
            .map(|u| u.count)
    }
}

/// PIN pad status (`WFS_INF_PIN_STATUS`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinPadStatus {
    pub device_state: DeviceState,
    pub encryption_ready: bool,
    pub keys_loaded: bool,
    pub pin_entered: bool,
}

/// PIN pad capabilities (`WFS_INF_PIN_CAPABILITIES`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinPadCapabilities {
    pub can_ecb: bool,
    pub can_cbc: bool,
    pub can_mac: bool,
    pub can_triple_des: bool,
}

/// Printer status (`WFS_INF_PTR_STATUS`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterStatus {
    pub device_state: DeviceState,
    pub paper_level: u32,
    pub toner_level: u8,
}

/// Structured answer to a `get_info` query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
#[non_exhaustive]
pub enum InfoReply {
    CardReaderStatus(CardReaderStatus),
    CardReaderCapabilities(CardReaderCapabilities),
    DispenserStatus(DispenserStatus),
    CashUnits(CashUnitInfo),
    PinPadStatus(PinPadStatus),
    PinPadCapabilities(PinPadCapabilities),
    PrinterStatus(PrinterStatus),
}
