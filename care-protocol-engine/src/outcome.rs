use std::sync::Arc;

use chrono::Utc;
use logger_redacted::PiiRedactor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::events::{EventNotifier, ProtocolEvent};
use crate::models::ProtocolOutcomeResult;
use crate::statistics::percentage;
use crate::store::ExecutionStore;

/// A measurement taken against one of the protocol's outcome definitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRecord {
    pub outcome_id: String,
    pub value: Value,
    pub achieved_target: bool,
    pub recorded_by: Uuid,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Append-only outcome measurements per execution
pub struct OutcomeTracker {
    executions: Arc<ExecutionStore>,
    notifier: Arc<EventNotifier>,
    redactor: PiiRedactor,
}

impl OutcomeTracker {
    pub fn new(
        executions: Arc<ExecutionStore>,
        notifier: Arc<EventNotifier>,
        redactor: PiiRedactor,
    ) -> Self {
        Self {
            executions,
            notifier,
            redactor,
        }
    }

    /// Append a result stamped with the current time. The outcome id is not
    /// checked against the protocol's definitions.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown execution.
    pub fn record_outcome(
        &self,
        execution_id: Uuid,
        record: OutcomeRecord,
    ) -> Result<ProtocolOutcomeResult> {
        let result = ProtocolOutcomeResult {
            outcome_id: record.outcome_id,
            value: record.value,
            achieved_target: record.achieved_target,
            measured_at: Utc::now(),
            recorded_by: record.recorded_by,
            notes: record.notes,
        };

        let execution = self.executions.update(execution_id, |execution| {
            execution.outcomes.push(result.clone());
            execution.touch(result.recorded_by, result.measured_at);
            Ok(execution.clone())
        })?;

        info!(
            execution_id = %execution_id,
            outcome_id = %result.outcome_id,
            achieved = result.achieved_target,
            notes = ?result.notes.as_deref().map(|notes| self.redactor.redact(notes)),
            "Recorded protocol outcome"
        );

        self.notifier.emit(ProtocolEvent::OutcomeRecorded {
            execution,
            outcome: result.clone(),
        });
        Ok(result)
    }

    /// Percentage of recorded results that met their target, 0 when none
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown execution.
    pub fn outcome_achievement(&self, execution_id: Uuid) -> Result<f64> {
        let execution = self.executions.get(execution_id)?;
        Ok(percentage(
            execution.achieved_outcome_count(),
            execution.outcomes.len(),
        ))
    }
}
