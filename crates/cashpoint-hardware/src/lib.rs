//! XFS-style device services for the Cashpoint ATM simulator.
//!
//! This crate hosts the service manager and the simulated peripherals of a
//! self-service terminal: card reader, cash dispenser, PIN pad and receipt
//! printer. Applications talk to devices the way XFS applications do:
//! start the manager, open a logical service to get a handle, execute
//! numbered commands and query numbered information categories through
//! that handle, and subscribe to device events.
//!
//! # Design
//!
//! - **Async-first**: commands and queries are `async fn` (Rust 1.90 +
//!   Edition 2024 RPITIT) and simulate device busy-time on Tokio.
//! - **Enum dispatch**: the manager holds [`AnyProvider`] values rather
//!   than trait objects.
//! - **Commit-or-nothing**: a failed or timed-out command never changes
//!   device state; events are published only after state is committed.
//! - **Panic-isolated**: panics in providers or event handlers are caught
//!   at the manager and bus boundaries.
//!
//! # Example
//!
//! ```
//! use cashpoint_core::constants::{
//!     DEFAULT_XFS_VERSION, EVENT_CARD_INSERTED, WFS_CMD_IDC_READ_RAW_DATA,
//! };
//! use cashpoint_hardware::{Payload, XfsConfig, XfsManager};
//!
//! #[tokio::main]
//! async fn main() -> cashpoint_hardware::Result<()> {
//!     let manager = XfsManager::new(XfsConfig::instant());
//!     manager.events().subscribe(EVENT_CARD_INSERTED, |event| {
//!         println!("card inserted on {}", event.service_handle);
//!     });
//!
//!     manager.startup(DEFAULT_XFS_VERSION)?;
//!     let idc = manager.open("CardReader")?;
//!     manager
//!         .execute(idc, WFS_CMD_IDC_READ_RAW_DATA, Payload::Empty, None)
//!         .await?;
//!     manager.cleanup()
//! }
//! ```
//!
//! # Error Handling
//!
//! Operations return [`Result<T>`][error::Result] with [`XfsError`]; use
//! [`XfsError::code`] or [`error::result_code`] for the flat numeric
//! `ResultCode` an XFS caller expects.
//!
//! [`AnyProvider`]: devices::AnyProvider

pub mod config;
pub mod devices;
pub mod error;
pub mod events;
pub mod latency;
pub mod manager;
pub mod providers;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use config::XfsConfig;
pub use error::{Result, XfsError, result_code};
pub use events::{EventBus, EventPayload, SubscriptionId, XfsEvent};
pub use latency::{DeviceTimings, Latency};
pub use manager::XfsManager;
pub use traits::ServiceProvider;
pub use types::{
    CashUnit, Completion, InfoReply, NoteCount, NoteMix, Payload, ServiceHandle,
};
