//! Protocol lifecycle events
//!
//! Every state change the engine commits is announced on the
//! [`EventNotifier`] after the store write, with no store lock held.
//! Notification, audit and analytics collaborators subscribe by
//! [`ProtocolEventKind`]; the serialized form carries the wire name
//! (`protocol:execution:completed`, ...) so payloads can be forwarded as-is.

use events_bus::{BusEvent, DeliveryReport, EventBus, EventBusError, HandlerResult, SubscriptionId};
use serde::Serialize;
use tracing::debug;

use crate::models::{
    CareProtocol, CompletionReport, ProtocolExecution, ProtocolOutcomeResult, ProtocolStep,
    ProtocolVariance,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProtocolEventKind {
    ProtocolCreated,
    ProtocolActivated,
    ExecutionStarted,
    StepCompleted,
    VarianceRecorded,
    VarianceApproved,
    OutcomeRecorded,
    ExecutionCompleted,
    ExecutionDiscontinued,
    ExecutionHeld,
    ExecutionResumed,
    ReportGenerated,
}

impl ProtocolEventKind {
    pub const ALL: [Self; 12] = [
        Self::ProtocolCreated,
        Self::ProtocolActivated,
        Self::ExecutionStarted,
        Self::StepCompleted,
        Self::VarianceRecorded,
        Self::VarianceApproved,
        Self::OutcomeRecorded,
        Self::ExecutionCompleted,
        Self::ExecutionDiscontinued,
        Self::ExecutionHeld,
        Self::ExecutionResumed,
        Self::ReportGenerated,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::ProtocolCreated => "protocol:created",
            Self::ProtocolActivated => "protocol:activated",
            Self::ExecutionStarted => "protocol:execution:started",
            Self::StepCompleted => "protocol:step:completed",
            Self::VarianceRecorded => "protocol:variance:recorded",
            Self::VarianceApproved => "protocol:variance:approved",
            Self::OutcomeRecorded => "protocol:outcome:recorded",
            Self::ExecutionCompleted => "protocol:execution:completed",
            Self::ExecutionDiscontinued => "protocol:execution:discontinued",
            Self::ExecutionHeld => "protocol:execution:held",
            Self::ExecutionResumed => "protocol:execution:resumed",
            Self::ReportGenerated => "protocol:report:generated",
        }
    }

    /// Inverse of [`ProtocolEventKind::name`]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum ProtocolEvent {
    #[serde(rename = "protocol:created")]
    ProtocolCreated(CareProtocol),
    #[serde(rename = "protocol:activated")]
    ProtocolActivated(CareProtocol),
    #[serde(rename = "protocol:execution:started")]
    ExecutionStarted(ProtocolExecution),
    #[serde(rename = "protocol:step:completed")]
    StepCompleted {
        execution: ProtocolExecution,
        step: ProtocolStep,
    },
    #[serde(rename = "protocol:variance:recorded")]
    VarianceRecorded {
        execution: ProtocolExecution,
        variance: ProtocolVariance,
    },
    #[serde(rename = "protocol:variance:approved")]
    VarianceApproved {
        execution: ProtocolExecution,
        variance: ProtocolVariance,
    },
    #[serde(rename = "protocol:outcome:recorded")]
    OutcomeRecorded {
        execution: ProtocolExecution,
        outcome: ProtocolOutcomeResult,
    },
    #[serde(rename = "protocol:execution:completed")]
    ExecutionCompleted(ProtocolExecution),
    #[serde(rename = "protocol:execution:discontinued")]
    ExecutionDiscontinued(ProtocolExecution),
    #[serde(rename = "protocol:execution:held")]
    ExecutionHeld(ProtocolExecution),
    #[serde(rename = "protocol:execution:resumed")]
    ExecutionResumed(ProtocolExecution),
    #[serde(rename = "protocol:report:generated")]
    ReportGenerated(CompletionReport),
}

impl ProtocolEvent {
    /// The execution this event concerns, if any
    pub fn execution(&self) -> Option<&ProtocolExecution> {
        match self {
            Self::ExecutionStarted(execution)
            | Self::ExecutionCompleted(execution)
            | Self::ExecutionDiscontinued(execution)
            | Self::ExecutionHeld(execution)
            | Self::ExecutionResumed(execution)
            | Self::StepCompleted { execution, .. }
            | Self::VarianceRecorded { execution, .. }
            | Self::VarianceApproved { execution, .. }
            | Self::OutcomeRecorded { execution, .. } => Some(execution),
            Self::ProtocolCreated(_) | Self::ProtocolActivated(_) | Self::ReportGenerated(_) => None,
        }
    }
}

impl BusEvent for ProtocolEvent {
    type Kind = ProtocolEventKind;

    fn kind(&self) -> ProtocolEventKind {
        match self {
            Self::ProtocolCreated(_) => ProtocolEventKind::ProtocolCreated,
            Self::ProtocolActivated(_) => ProtocolEventKind::ProtocolActivated,
            Self::ExecutionStarted(_) => ProtocolEventKind::ExecutionStarted,
            Self::StepCompleted { .. } => ProtocolEventKind::StepCompleted,
            Self::VarianceRecorded { .. } => ProtocolEventKind::VarianceRecorded,
            Self::VarianceApproved { .. } => ProtocolEventKind::VarianceApproved,
            Self::OutcomeRecorded { .. } => ProtocolEventKind::OutcomeRecorded,
            Self::ExecutionCompleted(_) => ProtocolEventKind::ExecutionCompleted,
            Self::ExecutionDiscontinued(_) => ProtocolEventKind::ExecutionDiscontinued,
            Self::ExecutionHeld(_) => ProtocolEventKind::ExecutionHeld,
            Self::ExecutionResumed(_) => ProtocolEventKind::ExecutionResumed,
            Self::ReportGenerated(_) => ProtocolEventKind::ReportGenerated,
        }
    }

    fn name(&self) -> &'static str {
        self.kind().name()
    }
}

/// Synchronous fan-out of [`ProtocolEvent`]s to registered handlers.
///
/// Handlers run in registration order. A failing or panicking handler is
/// logged by the bus and never affects the transition that emitted the event.
#[derive(Debug, Default)]
pub struct EventNotifier {
    bus: EventBus<ProtocolEvent>,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, kind: ProtocolEventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&ProtocolEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.bus.on(kind, handler)
    }

    pub fn on_any<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ProtocolEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.bus.on_any(handler)
    }

    /// # Errors
    ///
    /// Returns `SubscriptionNotFound` when the id is not registered.
    pub fn off(&self, subscription: SubscriptionId) -> Result<(), EventBusError> {
        self.bus.off(subscription)
    }

    pub fn subscriber_count(&self) -> usize {
        self.bus.subscriber_count()
    }

    pub(crate) fn emit(&self, event: ProtocolEvent) -> DeliveryReport {
        let report = self.bus.publish(&event);
        debug!(
            event = report.event,
            delivered = report.delivered,
            failed = report.failed,
            "Protocol event emitted"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_round_trip() {
        for kind in ProtocolEventKind::ALL {
            assert_eq!(ProtocolEventKind::from_name(kind.name()), Some(kind));
            assert!(kind.name().starts_with("protocol:"));
        }
        assert_eq!(ProtocolEventKind::from_name("protocol:deleted"), None);
    }

    #[test]
    fn test_serialized_event_carries_wire_name() {
        let report = CompletionReport {
            execution_id: uuid::Uuid::new_v4(),
            protocol_id: uuid::Uuid::new_v4(),
            patient_id: uuid::Uuid::new_v4(),
            duration_ms: 1_500,
            total_steps: 2,
            completed_steps: 2,
            variance_count: 1,
            approved_variance_count: 0,
            adherence_rate: 50.0,
            outcomes_recorded: 0,
            outcomes_achieved: 0,
            outcome_achievement_rate: 0.0,
            generated_at: chrono::Utc::now(),
        };

        let json = serde_json::to_value(ProtocolEvent::ReportGenerated(report)).unwrap();

        assert_eq!(json["event"], "protocol:report:generated");
        assert_eq!(json["payload"]["adherenceRate"], 50.0);
    }
}
