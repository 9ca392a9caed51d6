use crate::{Result, error::Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Outcome code returned by every manager and provider operation.
///
/// The integer values are a stable contract with applications and match
/// the `WFS_*` HRESULT values of the XFS API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ResultCode {
    Success = 0,
    InternalError = -1,
    AlreadyStarted = -2,
    NotStarted = -3,
    InvalidWindowHandle = -4,
    InvalidService = -5,
    Timeout = -6,
    HardwareError = -7,
    ConnectionLost = -8,
    UserError = -9,
    UnsupportedCommand = -10,
}

impl ResultCode {
    /// Convert the result code to its integer value.
    #[inline]
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Returns `true` for [`ResultCode::Success`].
    #[inline]
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, ResultCode::Success)
    }
}

impl TryFrom<i32> for ResultCode {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(ResultCode::Success),
            -1 => Ok(ResultCode::InternalError),
            -2 => Ok(ResultCode::AlreadyStarted),
            -3 => Ok(ResultCode::NotStarted),
            -4 => Ok(ResultCode::InvalidWindowHandle),
            -5 => Ok(ResultCode::InvalidService),
            -6 => Ok(ResultCode::Timeout),
            -7 => Ok(ResultCode::HardwareError),
            -8 => Ok(ResultCode::ConnectionLost),
            -9 => Ok(ResultCode::UserError),
            -10 => Ok(ResultCode::UnsupportedCommand),
            _ => Err(Error::UnknownResultCode(value)),
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ResultCode::Success => "WFS_SUCCESS",
            ResultCode::InternalError => "WFS_ERR_INTERNAL_ERROR",
            ResultCode::AlreadyStarted => "WFS_ERR_ALREADY_STARTED",
            ResultCode::NotStarted => "WFS_ERR_NOT_STARTED",
            ResultCode::InvalidWindowHandle => "WFS_ERR_INVALID_HWND",
            ResultCode::InvalidService => "WFS_ERR_INVALID_HSERVICE",
            ResultCode::Timeout => "WFS_ERR_TIMEOUT",
            ResultCode::HardwareError => "WFS_ERR_HARDWARE_ERROR",
            ResultCode::ConnectionLost => "WFS_ERR_CONNECTION_LOST",
            ResultCode::UserError => "WFS_ERR_USER_ERROR",
            ResultCode::UnsupportedCommand => "WFS_ERR_UNSUPP_COMMAND",
        };
        write!(f, "{} ({})", name, self.as_i32())
    }
}

/// XFS service class (device type).
///
/// `CheckReader` and `TextTerminal` are part of the numbering but no
/// provider implements them; opening them yields `InvalidService`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum ServiceClass {
    Printer = 1,
    CardReader = 2,
    CashDispenser = 3,
    PinPad = 4,
    CheckReader = 5,
    TextTerminal = 7,
}

impl ServiceClass {
    /// Create a service class from its XFS number.
    ///
    /// # Errors
    /// Returns `Error::UnknownServiceClass` for numbers outside the table.
    #[inline]
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            1 => Ok(ServiceClass::Printer),
            2 => Ok(ServiceClass::CardReader),
            3 => Ok(ServiceClass::CashDispenser),
            4 => Ok(ServiceClass::PinPad),
            5 => Ok(ServiceClass::CheckReader),
            7 => Ok(ServiceClass::TextTerminal),
            _ => Err(Error::UnknownServiceClass(value)),
        }
    }

    /// Convert the service class to its XFS number.
    #[inline]
    #[must_use]
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Three-letter XFS abbreviation (IDC, CDM, ...).
    #[must_use]
    pub fn abbreviation(self) -> &'static str {
        match self {
            ServiceClass::Printer => "PTR",
            ServiceClass::CardReader => "IDC",
            ServiceClass::CashDispenser => "CDM",
            ServiceClass::PinPad => "PIN",
            ServiceClass::CheckReader => "CHK",
            ServiceClass::TextTerminal => "TTU",
        }
    }
}

impl fmt::Display for ServiceClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ServiceClass::Printer => write!(f, "Printer"),
            ServiceClass::CardReader => write!(f, "Card Reader"),
            ServiceClass::CashDispenser => write!(f, "Cash Dispenser"),
            ServiceClass::PinPad => write!(f, "PIN Pad"),
            ServiceClass::CheckReader => write!(f, "Check Reader"),
            ServiceClass::TextTerminal => write!(f, "Text Terminal"),
        }
    }
}

/// Primary account number read from a card (12-19 digits).
///
/// # Security
/// Comparison is constant-time, and [`CardNumber::masked`] is the only form
/// that should reach logs.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct CardNumber(String);

impl CardNumber {
    /// Minimum PAN length.
    pub const MIN_LENGTH: usize = 12;

    /// Maximum PAN length.
    pub const MAX_LENGTH: usize = 19;

    /// Create a new card number with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidCardFormat` if the number is not 12-19 ASCII digits.
    pub fn new(number: &str) -> Result<Self> {
        let number = number.trim();

        let len = number.len();
        if !(Self::MIN_LENGTH..=Self::MAX_LENGTH).contains(&len) {
            return Err(Error::InvalidCardFormat(format!(
                "Card number must be {}-{} digits, got {len}",
                Self::MIN_LENGTH,
                Self::MAX_LENGTH
            )));
        }

        if !number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidCardFormat(
                "Card number must contain digits only".to_string(),
            ));
        }

        Ok(CardNumber(number.to_string()))
    }

    /// Extract the card number from ISO 7813 track 2 data (`PAN=YYMM...`).
    ///
    /// # Errors
    /// Returns `Error::InvalidCardFormat` if the track has no separator or
    /// the PAN is malformed.
    pub fn from_track2(track: &str) -> Result<Self> {
        let track = track.trim_start_matches(';').trim_end_matches('?');
        let (pan, _) = track
            .split_once('=')
            .ok_or_else(|| Error::InvalidCardFormat("Track 2 separator missing".to_string()))?;
        CardNumber::new(pan)
    }

    /// Get the card number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Masked form showing only the last four digits (`****9012`).
    #[must_use]
    pub fn masked(&self) -> String {
        format!("****{}", &self.0[self.0.len() - 4..])
    }
}

impl fmt::Display for CardNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.masked())
    }
}

impl std::str::FromStr for CardNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CardNumber::new(s)
    }
}

impl PartialEq for CardNumber {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::hash::Hash for CardNumber {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}
