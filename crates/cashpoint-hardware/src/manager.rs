//! XFS service manager.
//!
//! [`XfsManager`] owns the service registry: the providers registered at
//! startup (one per logical name) and the table of open service handles.
//! Applications never touch a provider directly; every command and query
//! goes through a handle.
//!
//! ```text
//!  open("CashDispenser") ──► handle 1001 ─┐
//!                                         ├──► Arc<AnyProvider::CashDispenser>
//!  open("CashDispenser") ──► handle 1002 ─┘
//!
//!  execute(1001, DISPENSE) ──► registry lookup ──► provider.execute(..)
//!                              (lock released)        │
//!                                                     └──► EventBus::publish
//! ```
//!
//! The registry is guarded by one `std::sync::Mutex`, held only for table
//! lookups and updates, never across a provider call. Providers serialize
//! their own commands.
//!
//! # Examples
//!
//! ```
//! use cashpoint_core::constants::{DEFAULT_XFS_VERSION, WFS_CMD_CDM_DISPENSE};
//! use cashpoint_hardware::config::XfsConfig;
//! use cashpoint_hardware::manager::XfsManager;
//! use cashpoint_hardware::types::{Completion, Payload};
//!
//! #[tokio::main]
//! async fn main() -> cashpoint_hardware::Result<()> {
//!     let manager = XfsManager::new(XfsConfig::instant());
//!     manager.startup(DEFAULT_XFS_VERSION)?;
//!
//!     let cdm = manager.open("CashDispenser")?;
//!     let completion = manager
//!         .execute(cdm, WFS_CMD_CDM_DISPENSE, Payload::Amount(50), None)
//!         .await?;
//!
//!     if let Completion::NoteMix(mix) = completion {
//!         assert_eq!(mix.total(), 50);
//!     }
//!
//!     manager.close(cdm)?;
//!     manager.cleanup()?;
//!     Ok(())
//! }
//! ```

use crate::config::XfsConfig;
use crate::devices::AnyProvider;
use crate::error::{Result, XfsError};
use crate::events::EventBus;
use crate::traits::ServiceProvider;
use crate::types::{Completion, InfoReply, Payload, ServiceHandle};
use cashpoint_core::ServiceClass;
use cashpoint_core::constants::{
    HANDLE_BASE, LOGICAL_NAME_CARD_READER, LOGICAL_NAME_CASH_DISPENSER, LOGICAL_NAME_PIN_PAD,
    LOGICAL_NAME_RECEIPT_PRINTER,
};
use futures::FutureExt;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Logical names registered at startup and the device behind each.
const REGISTRATIONS: [(&str, ServiceClass); 4] = [
    (LOGICAL_NAME_CARD_READER, ServiceClass::CardReader),
    (LOGICAL_NAME_CASH_DISPENSER, ServiceClass::CashDispenser),
    (LOGICAL_NAME_PIN_PAD, ServiceClass::PinPad),
    (LOGICAL_NAME_RECEIPT_PRINTER, ServiceClass::Printer),
];

/// One open binding of a handle to a provider.
#[derive(Debug)]
struct ServiceDescriptor {
    logical_name: String,
    provider: Arc<AnyProvider>,
}

#[derive(Debug)]
struct Registry {
    started: bool,
    version: Option<u32>,
    providers: BTreeMap<String, Arc<AnyProvider>>,
    services: HashMap<ServiceHandle, ServiceDescriptor>,
    /// Never reset, so handles are unique for the manager's lifetime.
    next_handle: u32,
}

impl Registry {
    fn allocate_handle(&mut self) -> Result<ServiceHandle> {
        let handle = ServiceHandle::new(self.next_handle);
        self.next_handle = self
            .next_handle
            .checked_add(1)
            .ok_or_else(|| XfsError::internal("Service handle space exhausted"))?;
        Ok(handle)
    }

    fn bind(&mut self, logical_name: &str, provider: Arc<AnyProvider>) -> Result<ServiceHandle> {
        let handle = self.allocate_handle()?;
        self.services.insert(
            handle,
            ServiceDescriptor {
                logical_name: logical_name.to_string(),
                provider,
            },
        );
        Ok(handle)
    }
}

/// The XFS service manager.
///
/// All operations take `&self`; share the manager between tasks with an
/// `Arc`.
#[derive(Debug)]
pub struct XfsManager {
    config: XfsConfig,
    bus: EventBus,
    registry: Mutex<Registry>,
}

impl XfsManager {
    /// Create a stopped manager. Providers are built from `config` at
    /// each [`startup`](Self::startup).
    pub fn new(config: XfsConfig) -> Self {
        Self {
            config,
            bus: EventBus::new(),
            registry: Mutex::new(Registry {
                started: false,
                version: None,
                providers: BTreeMap::new(),
                services: HashMap::new(),
                next_handle: HANDLE_BASE,
            }),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the manager and register the four simulated devices.
    ///
    /// Every startup creates fresh providers, so device state does not
    /// survive a cleanup.
    ///
    /// # Errors
    ///
    /// - `AlreadyStarted` if the manager is running
    /// - `Configuration` if the configuration fails validation
    pub fn startup(&self, version: u32) -> Result<()> {
        let mut registry = self.registry();
        if registry.started {
            warn!("Startup called while already started");
            return Err(XfsError::AlreadyStarted);
        }

        self.config.validate()?;

        let mut providers = BTreeMap::new();
        for (logical_name, class) in REGISTRATIONS {
            let mut provider = AnyProvider::for_class(class, &self.config)?;
            provider.initialize(self.bus.clone());
            providers.insert(logical_name.to_string(), Arc::new(provider));
        }

        registry.providers = providers;
        registry.version = Some(version);
        registry.started = true;

        info!(version = format_args!("{version:#06x}"), "XFS manager started");
        Ok(())
    }

    /// Stop the manager, closing every open handle and dropping all
    /// providers.
    ///
    /// # Errors
    ///
    /// Returns `NotStarted` if the manager is not running.
    pub fn cleanup(&self) -> Result<()> {
        let closed: Vec<(ServiceHandle, ServiceDescriptor)> = {
            let mut registry = self.registry();
            if !registry.started {
                warn!("Cleanup called while not started");
                return Err(XfsError::NotStarted);
            }

            registry.started = false;
            registry.version = None;
            registry.providers.clear();
            registry.services.drain().collect()
        };

        for (handle, descriptor) in &closed {
            close_hook(handle, descriptor);
        }

        info!(closed = closed.len(), "XFS manager cleaned up");
        Ok(())
    }

    /// Open a service by logical name.
    ///
    /// Each call allocates a new handle; handles opened on the same name
    /// share one provider.
    ///
    /// # Errors
    ///
    /// Returns `InvalidService` if the manager is not running or the name
    /// is not registered.
    pub fn open(&self, logical_name: &str) -> Result<ServiceHandle> {
        let mut registry = self.registry();
        if !registry.started {
            warn!(logical_name, "Open called while not started");
            return Err(XfsError::invalid_service("XFS manager not started"));
        }

        let Some(provider) = registry.providers.get(logical_name).cloned() else {
            warn!(logical_name, "Unknown logical service");
            return Err(XfsError::invalid_service(format!(
                "Unknown logical service: {logical_name}"
            )));
        };

        let handle = registry.bind(logical_name, provider)?;
        info!(logical_name, service = %handle, "Service opened");
        Ok(handle)
    }

    /// Open the service registered for a device class.
    ///
    /// # Errors
    ///
    /// Returns `InvalidService` if the manager is not running or no
    /// provider implements `class`.
    pub fn open_class(&self, class: ServiceClass) -> Result<ServiceHandle> {
        let logical_name = {
            let registry = self.registry();
            registry
                .providers
                .iter()
                .find(|(_, provider)| provider.service_class() == class)
                .map(|(name, _)| name.clone())
        };

        match logical_name {
            Some(name) => self.open(&name),
            None => Err(XfsError::invalid_service(format!(
                "No service registered for {class}"
            ))),
        }
    }

    /// Close a handle. The provider keeps its state.
    ///
    /// # Errors
    ///
    /// Returns `InvalidService` if the handle is unknown or already closed.
    pub fn close(&self, handle: ServiceHandle) -> Result<()> {
        let descriptor = self.registry().services.remove(&handle);

        let Some(descriptor) = descriptor else {
            warn!(service = %handle, "Close on unknown handle");
            return Err(invalid_handle(handle));
        };

        close_hook(&handle, &descriptor);
        info!(service = %handle, logical_name = %descriptor.logical_name, "Service closed");
        Ok(())
    }

    /// Execute a command on an open service.
    ///
    /// A panic inside the provider is caught and reported as `Internal`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidService` for an unknown handle, otherwise whatever
    /// the provider reports.
    pub async fn execute(
        &self,
        handle: ServiceHandle,
        command: u32,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> Result<Completion> {
        let provider = self.provider_for(handle)?;
        debug!(service = %handle, command, payload = payload.kind(), ?timeout, "Execute");

        guarded(
            "execute",
            provider.execute(handle, command, payload, timeout),
        )
        .await
    }

    /// Query status or capabilities of an open service. Never mutates
    /// device state.
    ///
    /// # Errors
    ///
    /// Returns `InvalidService` for an unknown handle, otherwise whatever
    /// the provider reports.
    pub async fn get_info(&self, handle: ServiceHandle, category: u32) -> Result<InfoReply> {
        let provider = self.provider_for(handle)?;
        debug!(service = %handle, category, "GetInfo");

        guarded("get_info", provider.get_info(category)).await
    }

    fn provider_for(&self, handle: ServiceHandle) -> Result<Arc<AnyProvider>> {
        self.registry()
            .services
            .get(&handle)
            .map(|descriptor| descriptor.provider.clone())
            .ok_or_else(|| {
                warn!(service = %handle, "Unknown service handle");
                invalid_handle(handle)
            })
    }

    /// Whether the manager has been started and not cleaned up.
    pub fn is_started(&self) -> bool {
        self.registry().started
    }

    /// Version requested at startup, while running.
    pub fn version(&self) -> Option<u32> {
        self.registry().version
    }

    /// Currently open handles, in allocation order.
    pub fn open_handles(&self) -> Vec<ServiceHandle> {
        let mut handles: Vec<ServiceHandle> = self.registry().services.keys().copied().collect();
        handles.sort();
        handles
    }

    /// Registered logical names, empty while stopped.
    pub fn logical_names(&self) -> Vec<String> {
        self.registry().providers.keys().cloned().collect()
    }

    /// Event bus shared by all providers. Subscriptions survive restarts.
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Configuration the providers are built from.
    pub fn config(&self) -> &XfsConfig {
        &self.config
    }
}

fn invalid_handle(handle: ServiceHandle) -> XfsError {
    XfsError::invalid_service(format!("Invalid service handle: {handle}"))
}

fn close_hook(handle: &ServiceHandle, descriptor: &ServiceDescriptor) {
    let outcome =
        std::panic::catch_unwind(AssertUnwindSafe(|| descriptor.provider.close(*handle)));
    if let Err(panic) = outcome {
        warn!(
            service = %handle,
            panic = panic_message(panic.as_ref()),
            "Provider close hook panicked"
        );
    }
}

/// Run a provider future, turning a panic into an `Internal` error.
async fn guarded<T>(
    operation: &'static str,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            warn!(operation, panic = message, "Provider panicked");
            Err(XfsError::internal(format!(
                "Provider panicked during {operation}: {message}"
            )))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashpoint_core::ResultCode;
    use cashpoint_core::constants::DEFAULT_XFS_VERSION;

    fn started() -> XfsManager {
        let manager = XfsManager::new(XfsConfig::instant());
        manager.startup(DEFAULT_XFS_VERSION).unwrap();
        manager
    }

    #[test]
    fn test_new_manager_is_stopped() {
        let manager = XfsManager::new(XfsConfig::instant());
        assert!(!manager.is_started());
        assert_eq!(manager.version(), None);
        assert!(manager.logical_names().is_empty());
    }

    #[test]
    fn test_startup_registers_devices() {
        let manager = started();
        assert!(manager.is_started());
        assert_eq!(manager.version(), Some(DEFAULT_XFS_VERSION));
        assert_eq!(
            manager.logical_names(),
            vec!["CardReader", "CashDispenser", "PINPad", "ReceiptPrinter"]
        );
    }

    #[test]
    fn test_startup_rejects_invalid_config() {
        let mut config = XfsConfig::instant();
        config.simulated_pin = "12".to_string();

        let manager = XfsManager::new(config);
        let err = manager.startup(DEFAULT_XFS_VERSION).unwrap_err();
        assert!(matches!(err, XfsError::Configuration { .. }));
        assert_eq!(err.code(), ResultCode::InternalError);
        assert!(!manager.is_started());
    }

    #[test]
    fn test_handles_start_at_base() {
        let manager = started();
        let first = manager.open(LOGICAL_NAME_CARD_READER).unwrap();
        let second = manager.open(LOGICAL_NAME_CARD_READER).unwrap();
        assert_eq!(first.as_u32(), HANDLE_BASE);
        assert_eq!(second.as_u32(), HANDLE_BASE + 1);
        assert_eq!(manager.open_handles(), vec![first, second]);
    }

    #[test]
    fn test_open_class() {
        let manager = started();

        let handle = manager.open_class(ServiceClass::PinPad).unwrap();
        assert_eq!(manager.open_handles(), vec![handle]);

        let err = manager.open_class(ServiceClass::CheckReader).unwrap_err();
        assert!(matches!(err, XfsError::InvalidService { .. }));
    }

    #[test]
    fn test_open_class_when_stopped() {
        let manager = XfsManager::new(XfsConfig::instant());
        let err = manager.open_class(ServiceClass::Printer).unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidService);
    }

    #[test]
    fn test_cleanup_closes_handles() {
        let manager = started();
        let handle = manager.open(LOGICAL_NAME_RECEIPT_PRINTER).unwrap();

        manager.cleanup().unwrap();
        assert!(manager.open_handles().is_empty());
        assert!(manager.logical_names().is_empty());
        assert!(matches!(
            manager.close(handle),
            Err(XfsError::InvalidService { .. })
        ));
    }

    async fn jammed() -> Result<()> {
        panic!("cassette jammed")
    }

    #[tokio::test]
    async fn test_guard_converts_panic() {
        let result = guarded("execute", jammed()).await;

        let err = result.unwrap_err();
        assert_eq!(err.code(), ResultCode::InternalError);
        assert!(err.to_string().contains("cassette jammed"));
    }

    #[tokio::test]
    async fn test_guard_passes_results_through() {
        let ok = guarded("get_info", async { Ok::<u32, XfsError>(7) }).await;
        assert_eq!(ok, Ok(7));

        let err = guarded("get_info", async { Err::<u32, XfsError>(XfsError::hardware("jam")) }).await;
        assert_eq!(err, Err(XfsError::hardware("jam")));
    }

    #[test]
    fn test_panic_message_shapes() {
        let text: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(text.as_ref()), "static");

        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");

        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
