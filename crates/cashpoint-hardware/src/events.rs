//! In-process event bus for device notifications.
//!
//! Providers publish [`XfsEvent`]s (card inserted, cash presented, ...)
//! after their state change has been committed; applications subscribe
//! handlers by event type name.
//!
//! ```text
//! ┌──────────────┐  publish()  ┌──────────────┐  handler(&event)  ┌─────────────┐
//! │ Card Reader  │────────────►│   EventBus   │──────────────────►│ Application │
//! │ Dispenser    │             │ (per type,   │                   │ handlers    │
//! │ Printer      │             │  in order)   │                   │             │
//! └──────────────┘             └──────────────┘                   └─────────────┘
//! ```
//!
//! Dispatch is synchronous. The handler list is snapshotted before
//! dispatch, so handlers may subscribe, unsubscribe or call back into the
//! service manager. A panicking handler is isolated: it is logged, counted
//! in [`EventBus::handler_failures`], and the remaining handlers still run.

use crate::types::ServiceHandle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Data carried by an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPayload {
    None,
    TrackData(String),
    Amount(u32),
}

/// An event published by a device provider.
///
/// Events are immutable once published; handlers only ever see `&XfsEvent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XfsEvent {
    /// Event type name, e.g. `CARD_INSERTED`.
    pub event_type: String,

    /// Handle of the session whose command caused the event.
    pub service_handle: ServiceHandle,

    /// Numeric event identifier.
    pub event_id: u32,

    /// Event data.
    pub payload: EventPayload,

    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

impl XfsEvent {
    /// Create a new event stamped with the current time.
    pub fn new(
        event_type: impl Into<String>,
        service_handle: ServiceHandle,
        event_id: u32,
        payload: EventPayload,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            service_handle,
            event_id,
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Identifier returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&XfsEvent) + Send + Sync>;

#[derive(Default)]
struct Inner {
    handlers: RwLock<HashMap<String, Vec<(SubscriptionId, Handler)>>>,
    next_subscription: AtomicU64,
    events_published: AtomicU64,
    handler_failures: AtomicU64,
}

/// Synchronous publish/subscribe dispatcher keyed by event type.
///
/// Cloning the bus is cheap and every clone shares the same subscriptions.
///
/// # Examples
///
/// ```
/// use cashpoint_hardware::events::{EventBus, EventPayload, XfsEvent};
/// use cashpoint_hardware::types::ServiceHandle;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// let bus = EventBus::new();
/// let seen = Arc::new(AtomicU32::new(0));
///
/// let counter = seen.clone();
/// bus.subscribe("CASH_PRESENTED", move |event| {
///     if let EventPayload::Amount(amount) = event.payload {
///         counter.fetch_add(amount, Ordering::SeqCst);
///     }
/// });
///
/// let event = XfsEvent::new("CASH_PRESENTED", ServiceHandle::new(1000), 2001, EventPayload::Amount(40));
/// assert_eq!(bus.publish(&event), 1);
/// assert_eq!(seen.load(Ordering::SeqCst), 40);
/// ```
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    /// Create an empty event bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an event type.
    ///
    /// Handlers for the same type run in subscription order.
    pub fn subscribe<F>(&self, event_type: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&XfsEvent) + Send + Sync + 'static,
    {
        let event_type = event_type.into();
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));

        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event_type.clone())
            .or_default()
            .push((id, Arc::new(handler)));

        debug!(event_type = %event_type, "New subscription created");
        id
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self
            .inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        for list in handlers.values_mut() {
            if let Some(pos) = list.iter().position(|(sid, _)| *sid == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Number of handlers registered for an event type.
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_type)
            .map_or(0, Vec::len)
    }

    /// Deliver an event to every handler registered for its type.
    ///
    /// Returns the number of handlers that completed. Publishing an event
    /// nobody listens to is a no-op.
    pub fn publish(&self, event: &XfsEvent) -> usize {
        self.inner.events_published.fetch_add(1, Ordering::Relaxed);

        let handlers: Vec<Handler> = self
            .inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.event_type)
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        let mut delivered = 0;
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    self.inner.handler_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        event_type = %event.event_type,
                        service = %event.service_handle,
                        "Event handler panicked, event dropped for this handler"
                    );
                }
            }
        }

        debug!(
            event_type = %event.event_type,
            service = %event.service_handle,
            receivers = delivered,
            "Event published"
        );
        delivered
    }

    /// Total number of events published.
    pub fn events_published(&self) -> u64 {
        self.inner.events_published.load(Ordering::Relaxed)
    }

    /// Number of handler invocations that panicked.
    pub fn handler_failures(&self) -> u64 {
        self.inner.handler_failures.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types = self
            .inner
            .handlers
            .read()
            .map(|h| h.len())
            .unwrap_or_default();
        f.debug_struct("EventBus")
            .field("event_types", &types)
            .field("events_published", &self.events_published())
            .finish()
    }
}
