use std::sync::Arc;

use chrono::Utc;
use logger_redacted::PiiRedactor;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{EntityKind, ProtocolError, Result};
use crate::events::{EventNotifier, ProtocolEvent};
use crate::models::{ProtocolVariance, VarianceApproval, VarianceType};
use crate::store::ExecutionStore;

/// A deviation to document against an execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VarianceRecord {
    pub step_id: String,
    pub variance_type: VarianceType,
    pub reason: String,
    pub documented_by: Uuid,
}

/// Documents and approves deviations from protocol steps.
///
/// Only the `variances` collection of an execution is touched here; the step
/// id is stored as given, without checking it against the protocol.
pub struct VarianceTracker {
    executions: Arc<ExecutionStore>,
    notifier: Arc<EventNotifier>,
    redactor: PiiRedactor,
}

impl VarianceTracker {
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

    /// Append an unapproved variance.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown execution.
    pub fn record_variance(
        &self,
        execution_id: Uuid,
        record: VarianceRecord,
    ) -> Result<ProtocolVariance> {
        let variance = ProtocolVariance {
            id: Uuid::new_v4(),
            step_id: record.step_id,
            variance_type: record.variance_type,
            reason: record.reason,
            documented_by: record.documented_by,
            documented_at: Utc::now(),
            approval: None,
        };

        let execution = self.executions.update(execution_id, |execution| {
            execution.variances.push(variance.clone());
            execution.touch(variance.documented_by, variance.documented_at);
            Ok(execution.clone())
        })?;

        info!(
            execution_id = %execution_id,
            variance_id = %variance.id,
            step_id = %variance.step_id,
            variance_type = %variance.variance_type,
            reason = %self.redactor.redact(&variance.reason),
            "Recorded protocol variance"
        );

        self.notifier.emit(ProtocolEvent::VarianceRecorded {
            execution,
            variance: variance.clone(),
        });
        Ok(variance)
    }

    /// Approve a variance. Approving twice re-stamps the approver and time.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown execution or variance.
    pub fn approve_variance(
        &self,
        execution_id: Uuid,
        variance_id: Uuid,
        user_id: Uuid,
    ) -> Result<ProtocolVariance> {
        let (execution, variance) = self.executions.update(execution_id, |execution| {
            let now = Utc::now();
            let variance = execution
                .variances
                .iter_mut()
                .find(|variance| variance.id == variance_id)
                .ok_or_else(|| ProtocolError::not_found(EntityKind::Variance, variance_id))?;

            variance.approval = Some(VarianceApproval {
                approved_by: user_id,
                approved_at: now,
            });
            let approved = variance.clone();
            execution.touch(user_id, now);
            Ok((execution.clone(), approved))
        })?;

        info!(
            execution_id = %execution_id,
            variance_id = %variance_id,
            approved_by = %user_id,
            "Approved protocol variance"
        );

        self.notifier.emit(ProtocolEvent::VarianceApproved {
            execution,
            variance: variance.clone(),
        });
        Ok(variance)
    }

    /// Variances still awaiting approval, in documentation order
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown execution.
    pub fn pending_variances(&self, execution_id: Uuid) -> Result<Vec<ProtocolVariance>> {
        let execution = self.executions.get(execution_id)?;
        let pending: Vec<ProtocolVariance> = execution
            .variances
            .into_iter()
            .filter(|variance| !variance.is_approved())
            .collect();

        debug!(execution_id = %execution_id, pending = pending.len(), "Pending variances");
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecutionStatus, ProtocolExecution};
    use crate::ProtocolEventKind;
    use parking_lot::Mutex;

    fn execution() -> ProtocolExecution {
        let now = Utc::now();
        let user = Uuid::new_v4();
        ProtocolExecution {
            id: Uuid::new_v4(),
            protocol_id: Uuid::new_v4(),
            protocol: None,
            workflow_instance_id: None,
            patient_id: Uuid::new_v4(),
            encounter_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            status: ExecutionStatus::InProgress,
            current_step: 0,
            completed_steps: Vec::new(),
            variances: Vec::new(),
            outcomes: Vec::new(),
            metadata: Default::default(),
            started_by: user,
            started_at: now,
            updated_by: user,
            updated_at: now,
            completed_at: None,
        }
    }

    fn tracker() -> (VarianceTracker, Arc<ExecutionStore>, Arc<EventNotifier>) {
        let executions = Arc::new(ExecutionStore::new());
        let notifier = Arc::new(EventNotifier::new());
        let tracker = VarianceTracker::new(
            executions.clone(),
            notifier.clone(),
            PiiRedactor::default(),
        );
        (tracker, executions, notifier)
    }

    fn skipped(step_id: &str) -> VarianceRecord {
        VarianceRecord {
            step_id: step_id.to_string(),
            variance_type: VarianceType::Skipped,
            reason: "Contraindicated by renal function".to_string(),
            documented_by: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_record_appends_unapproved_variance() {
        let (tracker, executions, _) = tracker();
        let run = execution();
        executions.insert(run.clone());

        let variance = tracker.record_variance(run.id, skipped("not-a-step")).unwrap();

        assert!(!variance.is_approved());
        let stored = executions.get(run.id).unwrap();
        assert_eq!(stored.variances, vec![variance]);
        assert_eq!(stored.variances[0].step_id, "not-a-step");
    }

    #[test]
    fn test_record_on_unknown_execution() {
        let (tracker, _, _) = tracker();

        let error = tracker.record_variance(Uuid::new_v4(), skipped("assess")).unwrap_err();

        assert!(matches!(
            error,
            ProtocolError::NotFound {
                entity: EntityKind::Execution,
                ..
            }
        ));
    }

    #[test]
    fn test_approve_sets_and_restamps_approval() {
        let (tracker, executions, notifier) = tracker();
        let approvals = Arc::new(Mutex::new(0));
        let counter = approvals.clone();
        notifier.on(ProtocolEventKind::VarianceApproved, move |_| {
            *counter.lock() += 1;
            Ok(())
        });
        let run = execution();
        executions.insert(run.clone());
        let variance = tracker.record_variance(run.id, skipped("assess")).unwrap();

        let first = tracker
            .approve_variance(run.id, variance.id, Uuid::new_v4())
            .unwrap();
        let second_approver = Uuid::new_v4();
        let second = tracker
            .approve_variance(run.id, variance.id, second_approver)
            .unwrap();

        assert!(first.is_approved());
        assert_eq!(second.approval.unwrap().approved_by, second_approver);
        assert_eq!(*approvals.lock(), 2);
        assert!(tracker.pending_variances(run.id).unwrap().is_empty());
    }

    #[test]
    fn test_approve_unknown_variance() {
        let (tracker, executions, _) = tracker();
        let run = execution();
        executions.insert(run.clone());

        let error = tracker
            .approve_variance(run.id, Uuid::new_v4(), Uuid::new_v4())
            .unwrap_err();

        assert!(matches!(
            error,
            ProtocolError::NotFound {
                entity: EntityKind::Variance,
                ..
            }
        ));
    }
}
