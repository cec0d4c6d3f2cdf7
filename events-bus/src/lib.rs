//! In-process event bus for RustCare Engine
//!
//! This crate provides the synchronous publish/subscribe fan-out used by
//! engine components to announce state changes to notification, audit and
//! analytics collaborators:
//! - Typed events: every event exposes a kind (used for routing) and a
//!   stable wire name such as `protocol:execution:completed`
//! - Kind-filtered and catch-all subscriptions
//! - Delivery in registration order on the publisher's thread
//! - Handler isolation: a handler that errors or panics is logged and
//!   skipped, and never fails the publisher
//!
//! # Example
//!
//! ```rust
//! use events_bus::{BusEvent, EventBus};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum OrderKind {
//!     Placed,
//! }
//!
//! struct OrderPlaced(u32);
//!
//! impl BusEvent for OrderPlaced {
//!     type Kind = OrderKind;
//!
//!     fn kind(&self) -> OrderKind {
//!         OrderKind::Placed
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "order:placed"
//!     }
//! }
//!
//! let bus: EventBus<OrderPlaced> = EventBus::new();
//! let subscription = bus.on(OrderKind::Placed, |event: &OrderPlaced| {
//!     println!("order {} placed", event.0);
//!     Ok(())
//! });
//!
//! let report = bus.publish(&OrderPlaced(7));
//! assert_eq!(report.delivered, 1);
//!
//! bus.off(subscription).unwrap();
//! ```

pub mod bus;
pub mod error;
pub mod event;
pub mod handlers;

pub use bus::*;
pub use error::*;
pub use event::*;
pub use handlers::*;
