// Event contract for the in-process bus
use std::fmt::Debug;
use std::hash::Hash;

/// An event that can be published on an [`EventBus`](crate::EventBus).
///
/// `Kind` is the routing key handlers subscribe to. `name` is the stable
/// external identifier forwarded to collaborators and written to logs.
pub trait BusEvent: Send + Sync + 'static {
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;

    fn name(&self) -> &'static str;
}
