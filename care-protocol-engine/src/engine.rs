use std::sync::Arc;

use events_bus::{EventBusError, HandlerResult, SubscriptionId};
use logger_redacted::{PiiRedactor, RedactionConfig};
use tracing::info;

use crate::config::EngineConfig;
use crate::controller::ExecutionController;
use crate::events::{EventNotifier, ProtocolEvent, ProtocolEventKind};
use crate::outcome::OutcomeTracker;
use crate::registry::ProtocolRegistry;
use crate::statistics::StatisticsEngine;
use crate::store::{ExecutionStore, ProtocolStore, ReportStore};
use crate::variance::VarianceTracker;
use crate::workflow::{InMemoryWorkflowLauncher, WorkflowLauncher};

/// One self-contained engine instance.
///
/// Owns the protocol, execution and report stores and wires every component
/// to them and to a shared [`EventNotifier`]. Instances share nothing, so
/// tests can run many side by side.
pub struct CareProtocolEngine {
    config: Arc<EngineConfig>,
    notifier: Arc<EventNotifier>,
    registry: ProtocolRegistry,
    controller: ExecutionController,
    variances: Arc<VarianceTracker>,
    outcomes: OutcomeTracker,
    statistics: Arc<StatisticsEngine>,
}

impl CareProtocolEngine {
    pub fn new(launcher: Arc<dyn WorkflowLauncher>, config: EngineConfig) -> Self {
        let config = Arc::new(config);
        let notifier = Arc::new(EventNotifier::new());
        let redactor = PiiRedactor::new(RedactionConfig::from(&config.logging));

        let protocols = Arc::new(ProtocolStore::new());
        let executions = Arc::new(ExecutionStore::new());
        let reports = Arc::new(ReportStore::new());

        let registry = ProtocolRegistry::new(protocols.clone(), notifier.clone(), config.clone());
        let variances = Arc::new(VarianceTracker::new(
            executions.clone(),
            notifier.clone(),
            redactor.clone(),
        ));
        let outcomes = OutcomeTracker::new(executions.clone(), notifier.clone(), redactor.clone());
        let statistics = Arc::new(StatisticsEngine::new(
            protocols.clone(),
            executions.clone(),
            reports.clone(),
        ));
        let controller = ExecutionController::new(
            protocols,
            executions,
            reports,
            variances.clone(),
            statistics.clone(),
            launcher,
            notifier.clone(),
            config.clone(),
            redactor,
        );

        info!(
            strict_transitions = config.strict_transitions,
            rollback_failed_starts = config.rollback_failed_starts,
            "Care protocol engine initialized"
        );

        Self {
            config,
            notifier,
            registry,
            controller,
            variances,
            outcomes,
            statistics,
        }
    }

    /// Default configuration with an [`InMemoryWorkflowLauncher`]
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(InMemoryWorkflowLauncher::new()), EngineConfig::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProtocolRegistry {
        &self.registry
    }

    pub fn controller(&self) -> &ExecutionController {
        &self.controller
    }

    pub fn variances(&self) -> &VarianceTracker {
        &self.variances
    }

    pub fn outcomes(&self) -> &OutcomeTracker {
        &self.outcomes
    }

    pub fn statistics(&self) -> &StatisticsEngine {
        &self.statistics
    }

    pub fn notifier(&self) -> &EventNotifier {
        &self.notifier
    }

    /// Subscribe to one event kind
    pub fn on<F>(&self, kind: ProtocolEventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&ProtocolEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.notifier.on(kind, handler)
    }

    /// Subscribe to every event
    pub fn on_any<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ProtocolEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.notifier.on_any(handler)
    }

    /// # Errors
    ///
    /// Returns `SubscriptionNotFound` when the id is not registered.
    pub fn off(&self, subscription: SubscriptionId) -> Result<(), EventBusError> {
        self.notifier.off(subscription)
    }
}
