use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};
use uuid::Uuid;

use crate::error::{EventBusError, Result};
use crate::event::BusEvent;
use crate::handlers::{EventHandler, HandlerResult};

/// Handle returned by every subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which events a subscription receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter<K> {
    Kind(K),
    Any,
}

impl<K: PartialEq> EventFilter<K> {
    fn matches(&self, kind: &K) -> bool {
        match self {
            Self::Kind(expected) => expected == kind,
            Self::Any => true,
        }
    }
}

struct Subscription<E: BusEvent> {
    id: SubscriptionId,
    filter: EventFilter<E::Kind>,
    handler: Arc<dyn EventHandler<E>>,
}

/// Result of one `publish` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub event: &'static str,
    pub delivered: usize,
    pub failed: usize,
}

/// Synchronous fan-out bus.
///
/// Handlers are invoked on the publisher's thread in registration order.
/// The subscription list is snapshotted before delivery, so a handler may
/// subscribe, unsubscribe or publish without deadlocking the bus.
pub struct EventBus<E: BusEvent> {
    subscriptions: RwLock<Vec<Arc<Subscription<E>>>>,
}

impl<E: BusEvent> EventBus<E> {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
        }
    }

    /// Register a closure for one event kind
    pub fn on<F>(&self, kind: E::Kind, handler: F) -> SubscriptionId
    where
        F: Fn(&E) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe(EventFilter::Kind(kind), Arc::new(handler))
    }

    /// Register a closure that receives every event
    pub fn on_any<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&E) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe(EventFilter::Any, Arc::new(handler))
    }

    /// Register a shared handler object
    pub fn subscribe(
        &self,
        filter: EventFilter<E::Kind>,
        handler: Arc<dyn EventHandler<E>>,
    ) -> SubscriptionId {
        let id = SubscriptionId::new();
        debug!(subscription_id = %id, filter = ?filter, "Registering event handler");
        self.subscriptions.write().push(Arc::new(Subscription {
            id,
            filter,
            handler,
        }));
        id
    }

    /// Remove a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionNotFound`] when the id is not registered.
    pub fn off(&self, id: SubscriptionId) -> Result<()> {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|subscription| subscription.id != id);
        if subscriptions.len() == before {
            return Err(EventBusError::SubscriptionNotFound(id));
        }
        debug!(subscription_id = %id, "Removed event handler");
        Ok(())
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Deliver an event to every matching handler.
    ///
    /// Never fails: handler errors and panics are logged and counted in the
    /// returned report.
    pub fn publish(&self, event: &E) -> DeliveryReport {
        let kind = event.kind();
        let targets: Vec<Arc<Subscription<E>>> = self
            .subscriptions
            .read()
            .iter()
            .filter(|subscription| subscription.filter.matches(&kind))
            .cloned()
            .collect();

        let mut report = DeliveryReport {
            event: event.name(),
            delivered: 0,
            failed: 0,
        };

        for subscription in targets {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| subscription.handler.handle_event(event)));
            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    error!(
                        event = event.name(),
                        subscription_id = %subscription.id,
                        error = %e,
                        "Event handler failed"
                    );
                }
                Err(payload) => {
                    report.failed += 1;
                    error!(
                        event = event.name(),
                        subscription_id = %subscription.id,
                        panic = panic_message(payload.as_ref()),
                        "Event handler panicked"
                    );
                }
            }
        }

        trace!(
            event = report.event,
            delivered = report.delivered,
            failed = report.failed,
            "Event published"
        );
        report
    }
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BusEvent> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
