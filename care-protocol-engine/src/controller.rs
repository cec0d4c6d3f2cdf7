//! Execution lifecycle
//!
//! ```text
//!              hold                 complete / discontinue
//! IN_PROGRESS ──────▶ ON_HOLD ───────────────────────────▶ COMPLETED | DISCONTINUED
//!      ▲                 │
//!      └──── resume ─────┘
//! ```
//!
//! `complete` and `discontinue` are accepted from either non-terminal state.
//! Completing the last outstanding step completes the execution on its own.

use std::sync::Arc;

use chrono::Utc;
use logger_redacted::{hash_identifier, PiiRedactor};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EntityKind, ProtocolError, Result};
use crate::events::{EventNotifier, ProtocolEvent};
use crate::models::{CompletionReport, ExecutionStatus, ProtocolExecution, VarianceType};
use crate::statistics::StatisticsEngine;
use crate::store::{ExecutionStore, ProtocolStore, ReportStore};
use crate::variance::{VarianceRecord, VarianceTracker};
use crate::workflow::{WorkflowLaunchError, WorkflowLauncher, WorkflowStartContext, WorkflowStartData};

/// Who starts an execution, and for which patient encounter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartExecutionRequest {
    pub patient_id: Uuid,
    pub encounter_id: Uuid,
    pub user_id: Uuid,
    pub organization_id: Uuid,
    /// Overrides the protocol's workflow definition
    #[serde(default)]
    pub workflow_definition: Option<String>,
}

/// Step completion, optionally documenting a deviation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCompletion {
    pub user_id: Uuid,
    #[serde(default)]
    pub is_variance: bool,
    #[serde(default)]
    pub variance_type: Option<VarianceType>,
    #[serde(default)]
    pub variance_reason: Option<String>,
}

impl StepCompletion {
    pub fn by(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_variance: false,
            variance_type: None,
            variance_reason: None,
        }
    }

    pub fn with_variance(user_id: Uuid, variance_type: VarianceType, reason: &str) -> Self {
        Self {
            user_id,
            is_variance: true,
            variance_type: Some(variance_type),
            variance_reason: Some(reason.to_string()),
        }
    }
}

/// Owns every execution state transition
pub struct ExecutionController {
    protocols: Arc<ProtocolStore>,
    executions: Arc<ExecutionStore>,
    reports: Arc<ReportStore>,
    variances: Arc<VarianceTracker>,
    statistics: Arc<StatisticsEngine>,
    launcher: Arc<dyn WorkflowLauncher>,
    notifier: Arc<EventNotifier>,
    config: Arc<EngineConfig>,
    redactor: PiiRedactor,
}

impl ExecutionController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        protocols: Arc<ProtocolStore>,
        executions: Arc<ExecutionStore>,
        reports: Arc<ReportStore>,
        variances: Arc<VarianceTracker>,
        statistics: Arc<StatisticsEngine>,
        launcher: Arc<dyn WorkflowLauncher>,
        notifier: Arc<EventNotifier>,
        config: Arc<EngineConfig>,
        redactor: PiiRedactor,
    ) -> Self {
        Self {
            protocols,
            executions,
            reports,
            variances,
            statistics,
            launcher,
            notifier,
            config,
            redactor,
        }
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Start a patient on an ACTIVE protocol and launch its workflow.
    ///
    /// The execution is stored before the workflow engine is called. If the
    /// launch fails it stays behind without a workflow instance, unless
    /// `rollback_failed_starts` is set.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown protocol, `InvalidState` when the
    /// protocol is not ACTIVE and `WorkflowStartFailed` when the launch fails.
    pub async fn start(
        &self,
        protocol_id: Uuid,
        request: StartExecutionRequest,
    ) -> Result<ProtocolExecution> {
        let protocol = self.protocols.get(protocol_id)?;
        if !protocol.is_active() {
            warn!(protocol_id = %protocol_id, status = ?protocol.status, "Refused to start inactive protocol");
            return Err(ProtocolError::invalid_state(
                EntityKind::Protocol,
                protocol_id,
                "Protocol is not active",
            ));
        }

        let now = Utc::now();
        let execution = ProtocolExecution {
            id: Uuid::new_v4(),
            protocol_id,
            protocol: self
                .config
                .embed_protocol_snapshot
                .then(|| protocol.clone()),
            workflow_instance_id: None,
            patient_id: request.patient_id,
            encounter_id: request.encounter_id,
            organization_id: request.organization_id,
            status: ExecutionStatus::InProgress,
            current_step: 0,
            completed_steps: Vec::new(),
            variances: Vec::new(),
            outcomes: Vec::new(),
            metadata: Default::default(),
            started_by: request.user_id,
            started_at: now,
            updated_by: request.user_id,
            updated_at: now,
            completed_at: None,
        };
        let execution_id = execution.id;
        self.executions.insert(execution);

        let context = WorkflowStartContext {
            user_id: request.user_id,
            patient_id: request.patient_id,
            encounter_id: request.encounter_id,
            protocol_execution_id: execution_id,
            organization_id: request.organization_id,
        };
        let data = WorkflowStartData {
            protocol_id,
            protocol_name: protocol.name.clone(),
            steps: protocol.steps.clone(),
            patient_id: request.patient_id,
        };

        let launched = match request
            .workflow_definition
            .or_else(|| protocol.workflow_definition_id.clone())
        {
            Some(definition) => self.launcher.start_workflow(&definition, context, data).await,
            None => Err(WorkflowLaunchError::DefinitionNotFound(
                "protocol has no workflow definition".to_string(),
            )),
        };

        let instance = match launched {
            Ok(instance) => instance,
            Err(e) => {
                error!(
                    execution_id = %execution_id,
                    protocol_id = %protocol_id,
                    error = %e,
                    rollback = self.config.rollback_failed_starts,
                    "Workflow start failed"
                );
                if self.config.rollback_failed_starts {
                    self.executions.remove(execution_id);
                }
                return Err(ProtocolError::WorkflowStartFailed {
                    execution_id,
                    reason: e.to_string(),
                });
            }
        };

        let execution = self.executions.update(execution_id, |execution| {
            execution.workflow_instance_id = Some(instance.id.clone());
            Ok(execution.clone())
        })?;

        info!(
            execution_id = %execution_id,
            protocol_id = %protocol_id,
            workflow_instance_id = %instance.id,
            patient = %hash_identifier(&request.patient_id.to_string()),
            "Started protocol execution"
        );
        self.notifier
            .emit(ProtocolEvent::ExecutionStarted(execution.clone()));
        Ok(execution)
    }

    /// Mark a step done, optionally documenting a variance first.
    ///
    /// `current_step` becomes the position of `step_id` in step order, so
    /// completing steps out of order can move it backward.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown execution, protocol or step, and
    /// `InvalidState` for a finished execution when transitions are strict.
    pub fn complete_step(
        &self,
        execution_id: Uuid,
        step_id: &str,
        completion: StepCompletion,
    ) -> Result<ProtocolExecution> {
        let current = self.executions.get(execution_id)?;
        self.ensure_open_for_steps(&current)?;

        let protocol = self.protocols.get(current.protocol_id)?;
        let step = protocol
            .step(step_id)
            .cloned()
            .ok_or_else(|| ProtocolError::not_found(EntityKind::Step, step_id))?;
        let position = protocol.step_position(step_id).unwrap_or(current.current_step);

        if completion.is_variance {
            self.variances.record_variance(
                execution_id,
                VarianceRecord {
                    step_id: step_id.to_string(),
                    variance_type: completion.variance_type.unwrap_or(VarianceType::Other),
                    reason: completion.variance_reason.clone().unwrap_or_default(),
                    documented_by: completion.user_id,
                },
            )?;
        }

        let (execution, previous_step, newly_completed) =
            self.executions.update(execution_id, |execution| {
                self.ensure_open_for_steps(execution)?;
                let previous_step = execution.current_step;
                let newly_completed = execution.mark_step_completed(step_id);
                execution.current_step = position;
                execution.touch(completion.user_id, Utc::now());
                Ok((execution.clone(), previous_step, newly_completed))
            })?;

        if position < previous_step {
            warn!(
                execution_id = %execution_id,
                step_id = %step_id,
                previous_step,
                current_step = position,
                "Step completed out of order; current step moved backward"
            );
        }
        info!(
            execution_id = %execution_id,
            step_id = %step_id,
            newly_completed,
            completed = execution.completed_steps.len(),
            total = protocol.steps.len(),
            "Completed protocol step"
        );
        self.notifier.emit(ProtocolEvent::StepCompleted {
            execution: execution.clone(),
            step,
        });

        if execution.completed_steps.len() == protocol.steps.len() && !execution.is_terminal() {
            debug!(execution_id = %execution_id, "All steps completed; completing execution");
            return self.complete(execution_id, completion.user_id);
        }
        Ok(execution)
    }

    /// Finish an execution and store its completion report.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown execution and `InvalidState` when it
    /// is already COMPLETED or DISCONTINUED.
    pub fn complete(&self, execution_id: Uuid, user_id: Uuid) -> Result<ProtocolExecution> {
        let execution = self.executions.update(execution_id, |execution| {
            ensure_not_terminal(execution, "complete")?;
            let now = Utc::now();
            execution.status = ExecutionStatus::Completed;
            execution.completed_at = Some(now);
            execution.touch(user_id, now);
            Ok(execution.clone())
        })?;

        info!(
            execution_id = %execution_id,
            protocol_id = %execution.protocol_id,
            completed_by = %user_id,
            "Completed protocol execution"
        );
        self.notifier
            .emit(ProtocolEvent::ExecutionCompleted(execution.clone()));

        let protocol = self
            .protocols
            .find(execution.protocol_id)
            .or_else(|| execution.protocol.clone());
        match protocol {
            Some(protocol) => {
                let report = self.statistics.generate_completion_report(&execution, &protocol);
                self.reports.insert(report.clone());
                info!(
                    execution_id = %execution_id,
                    adherence_rate = report.adherence_rate,
                    duration_ms = report.duration_ms,
                    "Generated completion report"
                );
                self.notifier.emit(ProtocolEvent::ReportGenerated(report));
            }
            None => warn!(
                execution_id = %execution_id,
                protocol_id = %execution.protocol_id,
                "Protocol definition unavailable; no completion report generated"
            ),
        }

        Ok(execution)
    }

    /// Stop an execution early. No report is generated.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown execution and `InvalidState` when it
    /// is already finished.
    pub fn discontinue(
        &self,
        execution_id: Uuid,
        reason: &str,
        user_id: Uuid,
    ) -> Result<ProtocolExecution> {
        let execution = self.executions.update(execution_id, |execution| {
            ensure_not_terminal(execution, "discontinue")?;
            let now = Utc::now();
            execution.status = ExecutionStatus::Discontinued;
            execution.completed_at = Some(now);
            execution
                .metadata
                .insert("discontinuationReason".to_string(), Value::from(reason));
            execution.touch(user_id, now);
            Ok(execution.clone())
        })?;

        info!(
            execution_id = %execution_id,
            discontinued_by = %user_id,
            reason = %self.redactor.redact(reason),
            "Discontinued protocol execution"
        );
        self.notifier
            .emit(ProtocolEvent::ExecutionDiscontinued(execution.clone()));
        Ok(execution)
    }

    /// Pause an execution.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown execution. With strict transitions,
    /// returns `InvalidState` unless the execution is IN_PROGRESS.
    pub fn hold(&self, execution_id: Uuid, reason: &str, user_id: Uuid) -> Result<ProtocolExecution> {
        let strict = self.config.strict_transitions;
        let execution = self.executions.update(execution_id, |execution| {
            if strict && execution.status != ExecutionStatus::InProgress {
                return Err(ProtocolError::invalid_state(
                    EntityKind::Execution,
                    execution.id,
                    format!("cannot hold execution in {}", execution.status),
                ));
            }

            let now = Utc::now();
            execution.status = ExecutionStatus::OnHold;
            execution
                .metadata
                .insert("holdReason".to_string(), Value::from(reason));
            execution
                .metadata
                .insert("heldBy".to_string(), json!(user_id));
            execution.metadata.insert("heldAt".to_string(), json!(now));
            execution.touch(user_id, now);
            Ok(execution.clone())
        });

        let execution = execution.map_err(|e| {
            warn!(execution_id = %execution_id, error = %e, "Hold rejected");
            e
        })?;

        info!(
            execution_id = %execution_id,
            held_by = %user_id,
            reason = %self.redactor.redact(reason),
            "Put protocol execution on hold"
        );
        self.notifier
            .emit(ProtocolEvent::ExecutionHeld(execution.clone()));
        Ok(execution)
    }

    /// Continue a held execution. The hold reason is kept in metadata.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown execution and `InvalidState` unless
    /// it is ON_HOLD.
    pub fn resume(&self, execution_id: Uuid, user_id: Uuid) -> Result<ProtocolExecution> {
        let execution = self.executions.update(execution_id, |execution| {
            if execution.status != ExecutionStatus::OnHold {
                return Err(ProtocolError::invalid_state(
                    EntityKind::Execution,
                    execution.id,
                    format!("cannot resume execution in {}", execution.status),
                ));
            }

            let now = Utc::now();
            execution.status = ExecutionStatus::InProgress;
            execution
                .metadata
                .insert("resumedBy".to_string(), json!(user_id));
            execution.metadata.insert("resumedAt".to_string(), json!(now));
            execution.touch(user_id, now);
            Ok(execution.clone())
        })?;

        info!(execution_id = %execution_id, resumed_by = %user_id, "Resumed protocol execution");
        self.notifier
            .emit(ProtocolEvent::ExecutionResumed(execution.clone()));
        Ok(execution)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown execution.
    pub fn get_execution(&self, execution_id: Uuid) -> Result<ProtocolExecution> {
        self.executions.get(execution_id)
    }

    /// Oldest first
    pub fn executions_for_patient(&self, patient_id: Uuid) -> Vec<ProtocolExecution> {
        let mut executions = self
            .executions
            .filter(|execution| execution.patient_id == patient_id);
        executions.sort_by_key(|execution| execution.started_at);
        debug!(
            patient = %hash_identifier(&patient_id.to_string()),
            executions = executions.len(),
            "Executions for patient"
        );
        executions
    }

    /// Oldest first
    pub fn executions_for_protocol(&self, protocol_id: Uuid) -> Vec<ProtocolExecution> {
        let mut executions = self
            .executions
            .filter(|execution| execution.protocol_id == protocol_id);
        executions.sort_by_key(|execution| execution.started_at);
        executions
    }

    /// # Errors
    ///
    /// Returns `NotFound` when the execution has not been completed.
    pub fn completion_report(&self, execution_id: Uuid) -> Result<CompletionReport> {
        self.reports.get(execution_id)
    }

    fn ensure_open_for_steps(&self, execution: &ProtocolExecution) -> Result<()> {
        if self.config.strict_transitions {
            ensure_not_terminal(execution, "complete a step of")?;
        }
        Ok(())
    }
}

fn ensure_not_terminal(execution: &ProtocolExecution, action: &str) -> Result<()> {
    if execution.is_terminal() {
        return Err(ProtocolError::invalid_state(
            EntityKind::Execution,
            execution.id,
            format!("cannot {action} execution in {}", execution.status),
        ));
    }
    Ok(())
}
