// Event handlers
use crate::event::BusEvent;

/// Outcome of a single handler invocation. Errors are logged by the bus and
/// never propagated to the publisher.
pub type HandlerResult = anyhow::Result<()>;

pub trait EventHandler<E: BusEvent>: Send + Sync {
    fn handle_event(&self, event: &E) -> HandlerResult;
}

impl<E, F> EventHandler<E> for F
where
    E: BusEvent,
    F: Fn(&E) -> HandlerResult + Send + Sync,
{
    fn handle_event(&self, event: &E) -> HandlerResult {
        self(event)
    }
}
