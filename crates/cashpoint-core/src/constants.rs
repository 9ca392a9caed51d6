//! Core constants for the XFS middleware.
//!
//! This module defines the numeric contract shared between the service
//! manager and the device service providers: command codes, information
//! categories, event identifiers and the logical service names registered
//! at startup.
//!
//! # Numbering
//!
//! Each device class owns a distinct range so a code sent to the wrong
//! provider can never be mistaken for one of its own commands:
//!
//! | Device class | Commands | Info categories |
//! |--------------|----------|-----------------|
//! | Card reader (IDC) | 301-304 | 401-402 |
//! | Cash dispenser (CDM) | 321-324 | 421-422 |
//! | PIN pad (PIN) | 341-343 | 441-442 |
//! | Receipt printer (PTR) | 361-362 | 461 |
//!
//! # Usage
//!
//! ```
//! use cashpoint_core::constants::*;
//!
//! assert_eq!(WFS_CMD_CDM_DISPENSE, 321);
//! assert_eq!(LOGICAL_NAME_CARD_READER, "CardReader");
//! ```

// ============================================================================
// Service Handles
// ============================================================================

/// First handle value allocated by the service manager.
///
/// Handles are allocated monotonically from this base and never reused for
/// the lifetime of a manager, including across cleanup/startup cycles.
pub const HANDLE_BASE: u32 = 1000;

/// XFS version requested by callers that do not negotiate one.
///
/// Encoded as in the XFS API: high byte minor, low byte major (3.20).
pub const DEFAULT_XFS_VERSION: u32 = 0x1403;

// ============================================================================
// Logical Service Names
// ============================================================================

/// Logical name of the card reader service.
pub const LOGICAL_NAME_CARD_READER: &str = "CardReader";

/// Logical name of the cash dispenser service.
pub const LOGICAL_NAME_CASH_DISPENSER: &str = "CashDispenser";

/// Logical name of the PIN pad service.
pub const LOGICAL_NAME_PIN_PAD: &str = "PINPad";

/// Logical name of the receipt printer service.
pub const LOGICAL_NAME_RECEIPT_PRINTER: &str = "ReceiptPrinter";

// ============================================================================
// Card Reader (IDC)
// ============================================================================

/// Read raw track data from an inserted card.
pub const WFS_CMD_IDC_READ_RAW_DATA: u32 = 301;

/// Eject the card back to the customer.
pub const WFS_CMD_IDC_EJECT_CARD: u32 = 302;

/// Capture the card into the retain bin.
pub const WFS_CMD_IDC_RETAIN_CARD: u32 = 303;

/// Reset the card reader, ejecting any card.
pub const WFS_CMD_IDC_RESET: u32 = 304;

/// Card reader status.
pub const WFS_INF_IDC_STATUS: u32 = 401;

/// Card reader capabilities.
pub const WFS_INF_IDC_CAPABILITIES: u32 = 402;

// ============================================================================
// Cash Dispenser (CDM)
// ============================================================================

/// Count and stack notes for an amount.
pub const WFS_CMD_CDM_DISPENSE: u32 = 321;

/// Present stacked notes to the customer.
pub const WFS_CMD_CDM_PRESENT: u32 = 322;

/// Retract presented notes.
pub const WFS_CMD_CDM_RETRACT: u32 = 323;

/// Reset the dispenser, retracting presented notes.
pub const WFS_CMD_CDM_RESET: u32 = 324;

/// Cash dispenser status.
pub const WFS_INF_CDM_STATUS: u32 = 421;

/// Cash unit inventory.
pub const WFS_INF_CDM_CASH_UNIT_INFO: u32 = 422;

// ============================================================================
// PIN Pad (PIN)
// ============================================================================

/// Capture a PIN from the customer.
pub const WFS_CMD_PIN_GET_PIN: u32 = 341;

/// Build a PIN block from the captured PIN.
pub const WFS_CMD_PIN_GET_PINBLOCK: u32 = 342;

/// Reset the PIN pad, discarding any captured PIN.
pub const WFS_CMD_PIN_RESET: u32 = 343;

/// PIN pad status.
pub const WFS_INF_PIN_STATUS: u32 = 441;

/// PIN pad capabilities.
pub const WFS_INF_PIN_CAPABILITIES: u32 = 442;

/// Minimum number of PIN digits accepted by the PIN pad.
pub const MIN_PIN_LENGTH: usize = 4;

/// Maximum number of PIN digits accepted by the PIN pad.
pub const MAX_PIN_LENGTH: usize = 6;

// ============================================================================
// Receipt Printer (PTR)
// ============================================================================

/// Print a form (receipt text).
pub const WFS_CMD_PTR_PRINT_FORM: u32 = 361;

/// Reset the printer.
pub const WFS_CMD_PTR_RESET: u32 = 362;

/// Printer status.
pub const WFS_INF_PTR_STATUS: u32 = 461;

// ============================================================================
// Events
// ============================================================================

/// Published by the card reader after track data has been read.
pub const EVENT_CARD_INSERTED: &str = "CARD_INSERTED";

/// Published by the card reader after a card has been ejected.
pub const EVENT_CARD_EJECTED: &str = "CARD_EJECTED";

/// Published by the card reader after a card has been retained.
pub const EVENT_CARD_RETAINED: &str = "CARD_RETAINED";

/// Published by the cash dispenser when notes are presented.
pub const EVENT_CASH_PRESENTED: &str = "CASH_PRESENTED";

/// Published by the cash dispenser when presented notes are retracted.
pub const EVENT_CASH_RETRACTED: &str = "CASH_RETRACTED";

/// Published by the printer when the last sheet has been used.
pub const EVENT_PAPER_OUT: &str = "PAPER_OUT";

/// Event identifier of card reader events.
pub const EVENT_ID_CARD: u32 = 1001;

/// Event identifier of cash dispenser events.
pub const EVENT_ID_CASH: u32 = 2001;

/// Event identifier of printer events.
pub const EVENT_ID_PRINTER: u32 = 3001;

// ============================================================================
// Session Keys
// ============================================================================

/// Session key holding the card number of the current customer.
pub const SESSION_CARD_NUMBER: &str = "CardNumber";

/// Session key holding the selected transaction type.
pub const SESSION_TRANSACTION_TYPE: &str = "TransactionType";

/// Session key holding the requested amount.
pub const SESSION_AMOUNT: &str = "Amount";

/// Session key holding the balance reported by the host.
pub const SESSION_BALANCE: &str = "Balance";

// ============================================================================
// Host Authorization
// ============================================================================

/// Wrong PIN entries allowed before the card is retained.
pub const MAX_PIN_ATTEMPTS: u32 = 3;

/// Largest amount a single withdrawal may request.
pub const DEFAULT_WITHDRAWAL_LIMIT: u32 = 500;

/// Opening balance of the demo account.
pub const DEFAULT_ACCOUNT_BALANCE: u64 = 1500;
