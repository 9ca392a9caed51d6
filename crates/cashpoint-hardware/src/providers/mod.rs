//! Simulated device service providers.
//!
//! Each provider owns the private state of one device and implements
//! [`ServiceProvider`](crate::traits::ServiceProvider). They share the same
//! shape:
//!
//! - a `busy` async mutex serializing commands (a device services one
//!   command at a time, whichever handle issued it);
//! - a [`StateCell`] holding committed state, written only after a command
//!   has validated its preconditions and finished its simulated busy-time;
//! - events collected as a [`Notice`] and published by `execute` after the
//!   busy lock has been released.

pub mod card_reader;
pub mod cash_dispenser;
pub mod pin_pad;
pub mod printer;

pub use card_reader::CardReader;
pub use cash_dispenser::{CashDispenser, calculate_note_mix};
pub use pin_pad::PinPad;
pub use printer::Printer;

use crate::events::{EventBus, EventPayload, XfsEvent};
use crate::types::{Completion, ServiceHandle};
use std::sync::{PoisonError, RwLock};

/// Committed device state.
///
/// Readers never observe a half-applied command because every mutation
/// happens inside a single [`StateCell::commit`] closure.
#[derive(Debug)]
pub(crate) struct StateCell<S>(RwLock<S>);

impl<S> StateCell<S> {
    pub(crate) fn new(state: S) -> Self {
        Self(RwLock::new(state))
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.0.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn commit<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.0.write().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Event raised by a command, published once the device is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Notice {
    event_type: &'static str,
    event_id: u32,
    payload: EventPayload,
}

impl Notice {
    pub(crate) fn new(event_type: &'static str, event_id: u32, payload: EventPayload) -> Self {
        Self {
            event_type,
            event_id,
            payload,
        }
    }
}

/// Result of a successful command before event publication.
pub(crate) type Outcome = (Completion, Option<Notice>);

/// Publish a command's notice, if any, stamped with the issuing handle.
pub(crate) fn emit(bus: Option<&EventBus>, handle: ServiceHandle, notice: Option<Notice>) {
    if let (Some(bus), Some(notice)) = (bus, notice) {
        bus.publish(&XfsEvent::new(
            notice.event_type,
            handle,
            notice.event_id,
            notice.payload,
        ));
    }
}
