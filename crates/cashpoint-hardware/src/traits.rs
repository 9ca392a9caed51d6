//! Service provider trait definition.
//!
//! This module defines the capability contract between the XFS manager and
//! the device service providers. The manager only ever talks to a device
//! through this trait: it initializes the provider with the event bus at
//! startup, routes `execute`/`get_info` calls for open handles, and calls
//! the close hook when a handle is released.
//!
//! Methods use native `async fn` (Rust 1.90 + Edition 2024 RPITIT), so the
//! trait is dispatched through the closed [`AnyProvider`] enum rather than
//! a trait object.
//!
//! # Concurrency contract
//!
//! Providers are shared between every handle opened on the same logical
//! name, so all methods take `&self`. Implementations must:
//!
//! - execute at most one command at a time;
//! - let `get_info` observe only fully committed state;
//! - leave state untouched when a command fails;
//! - publish events only after the state change is committed and their
//!   own locks are released.
//!
//! [`AnyProvider`]: crate::devices::AnyProvider

#![allow(async_fn_in_trait)]

use crate::error::Result;
use crate::events::EventBus;
use crate::types::{Completion, InfoReply, Payload, ServiceHandle};
use cashpoint_core::ServiceClass;
use std::time::Duration;

/// Capability contract implemented by every simulated device.
pub trait ServiceProvider: Send + Sync {
    /// Device class implemented by this provider.
    fn service_class(&self) -> ServiceClass;

    /// Attach the provider to the event bus.
    ///
    /// Called once by the manager at startup, before the provider is shared.
    fn initialize(&mut self, bus: EventBus);

    /// Execute a device command.
    ///
    /// `handle` identifies the session issuing the command and is stamped
    /// on any event the command publishes. `timeout` bounds the simulated
    /// busy-time; `None` waits indefinitely.
    ///
    /// # Errors
    ///
    /// - `Unsupported` for a command code outside the provider's range
    /// - `InvalidPayload` if the payload does not match the command
    /// - `Hardware` / `User` if a device precondition is not met
    /// - `Timeout` if the operation outlasts `timeout`
    async fn execute(
        &self,
        handle: ServiceHandle,
        command: u32,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> Result<Completion>;

    /// Query device status or capabilities. Never mutates state.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` for an unknown category.
    async fn get_info(&self, category: u32) -> Result<InfoReply>;

    /// Close hook, called when a handle bound to this provider is closed.
    ///
    /// Device state survives the close; it lives until the manager is
    /// cleaned up.
    fn close(&self, handle: ServiceHandle);
}
