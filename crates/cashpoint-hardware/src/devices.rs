//! Enum wrapper for service provider dispatch.
//!
//! Native `async fn` in traits (RPITIT, Rust Edition 2024) is not
//! object-safe, so the manager cannot hold `Box<dyn ServiceProvider>`.
//! [`AnyProvider`] closes the set of providers instead and dispatches to
//! the concrete type with a `match`.
//!
//! # Examples
//!
//! ```
//! use cashpoint_core::ServiceClass;
//! use cashpoint_hardware::config::XfsConfig;
//! use cashpoint_hardware::devices::AnyProvider;
//! use cashpoint_hardware::traits::ServiceProvider;
//!
//! let provider = AnyProvider::for_class(ServiceClass::Printer, &XfsConfig::instant()).unwrap();
//! assert_eq!(provider.service_class(), ServiceClass::Printer);
//! ```

use crate::config::XfsConfig;
use crate::error::{Result, XfsError};
use crate::events::EventBus;
use crate::providers::{CardReader, CashDispenser, PinPad, Printer};
use crate::traits::ServiceProvider;
use crate::types::{Completion, InfoReply, Payload, ServiceHandle};
use cashpoint_core::ServiceClass;
use std::time::Duration;

/// Any simulated device the manager can register.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyProvider {
    CardReader(CardReader),
    CashDispenser(CashDispenser),
    PinPad(PinPad),
    Printer(Printer),
}

impl AnyProvider {
    /// Build the simulated provider for a device class.
    ///
    /// # Errors
    ///
    /// Returns `InvalidService` for classes without a simulated device
    /// (`CheckReader`, `TextTerminal`).
    pub fn for_class(class: ServiceClass, config: &XfsConfig) -> Result<Self> {
        match class {
            ServiceClass::CardReader => Ok(Self::CardReader(CardReader::new(config))),
            ServiceClass::CashDispenser => Ok(Self::CashDispenser(CashDispenser::new(config))),
            ServiceClass::PinPad => Ok(Self::PinPad(PinPad::new(config))),
            ServiceClass::Printer => Ok(Self::Printer(Printer::new(config))),
            other => Err(XfsError::invalid_service(format!(
                "No provider for service class {other}"
            ))),
        }
    }
}

impl ServiceProvider for AnyProvider {
    fn service_class(&self) -> ServiceClass {
        match self {
            Self::CardReader(device) => device.service_class(),
            Self::CashDispenser(device) => device.service_class(),
            Self::PinPad(device) => device.service_class(),
            Self::Printer(device) => device.service_class(),
        }
    }

    fn initialize(&mut self, bus: EventBus) {
        match self {
            Self::CardReader(device) => device.initialize(bus),
            Self::CashDispenser(device) => device.initialize(bus),
            Self::PinPad(device) => device.initialize(bus),
            Self::Printer(device) => device.initialize(bus),
        }
    }

    async fn execute(
        &self,
        handle: ServiceHandle,
        command: u32,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> Result<Completion> {
        match self {
            Self::CardReader(device) => device.execute(handle, command, payload, timeout).await,
            Self::CashDispenser(device) => device.execute(handle, command, payload, timeout).await,
            Self::PinPad(device) => device.execute(handle, command, payload, timeout).await,
            Self::Printer(device) => device.execute(handle, command, payload, timeout).await,
        }
    }

    async fn get_info(&self, category: u32) -> Result<InfoReply> {
        match self {
            Self::CardReader(device) => device.get_info(category).await,
            Self::CashDispenser(device) => device.get_info(category).await,
            Self::PinPad(device) => device.get_info(category).await,
            Self::Printer(device) => device.get_info(category).await,
        }
    }

    fn close(&self, handle: ServiceHandle) {
        match self {
            Self::CardReader(device) => device.close(handle),
            Self::CashDispenser(device) => device.close(handle),
            Self::PinPad(device) => device.close(handle),
            Self::Printer(device) => device.close(handle),
        }
    }
}
