// Aggregate protocol analytics
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{CareProtocol, CompletionReport, ExecutionStatus, ProtocolExecution, VarianceType};
use crate::store::{ExecutionStore, ProtocolStore, ReportStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VarianceStatistics {
    pub total_executions: usize,
    pub executions_with_variances: usize,
    pub total_variances: usize,
    pub by_type: BTreeMap<VarianceType, usize>,
    pub approved_variances: usize,
    pub approval_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeMetric {
    pub outcome_id: String,
    pub name: String,
    pub measured: usize,
    pub achieved: usize,
    pub achievement_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeStatistics {
    pub protocol_id: Uuid,
    pub completed_executions: usize,
    /// One entry per outcome definition, in definition order
    pub outcomes: Vec<OutcomeMetric>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdherenceSummary {
    pub protocol_id: Uuid,
    pub completed_executions: usize,
    pub discontinued_executions: usize,
    pub mean_adherence_rate: f64,
}

/// Read-only analytics over the protocol, execution and report stores
pub struct StatisticsEngine {
    protocols: Arc<ProtocolStore>,
    executions: Arc<ExecutionStore>,
    reports: Arc<ReportStore>,
}

impl StatisticsEngine {
    pub fn new(
        protocols: Arc<ProtocolStore>,
        executions: Arc<ExecutionStore>,
        reports: Arc<ReportStore>,
    ) -> Self {
        Self {
            protocols,
            executions,
            reports,
        }
    }

    /// Variance counts across all executions, or those of one protocol
    pub fn variance_statistics(&self, protocol_id: Option<Uuid>) -> VarianceStatistics {
        let executions = self
            .executions
            .filter(|execution| protocol_id.map_or(true, |id| execution.protocol_id == id));

        let mut by_type = BTreeMap::new();
        let mut total_variances = 0;
        let mut approved_variances = 0;
        for variance in executions.iter().flat_map(|execution| &execution.variances) {
            *by_type.entry(variance.variance_type).or_insert(0) += 1;
            total_variances += 1;
            if variance.is_approved() {
                approved_variances += 1;
            }
        }

        let statistics = VarianceStatistics {
            total_executions: executions.len(),
            executions_with_variances: executions
                .iter()
                .filter(|execution| !execution.variances.is_empty())
                .count(),
            total_variances,
            by_type,
            approved_variances,
            approval_rate: percentage(approved_variances, total_variances),
        };

        debug!(
            protocol_id = ?protocol_id,
            executions = statistics.total_executions,
            variances = statistics.total_variances,
            "Computed variance statistics"
        );
        statistics
    }

    /// Per-outcome achievement over the protocol's COMPLETED executions.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown protocol.
    pub fn outcome_statistics(&self, protocol_id: Uuid) -> Result<OutcomeStatistics> {
        let protocol = self.protocols.get(protocol_id)?;
        let completed = self.completed_executions(protocol_id);

        let outcomes = protocol
            .outcomes
            .iter()
            .map(|definition| {
                let results: Vec<_> = completed
                    .iter()
                    .flat_map(|execution| &execution.outcomes)
                    .filter(|result| result.outcome_id == definition.id)
                    .collect();
                let achieved = results.iter().filter(|result| result.achieved_target).count();

                OutcomeMetric {
                    outcome_id: definition.id.clone(),
                    name: definition.name.clone(),
                    measured: results.len(),
                    achieved,
                    achievement_rate: percentage(achieved, results.len()),
                }
            })
            .collect();

        Ok(OutcomeStatistics {
            protocol_id,
            completed_executions: completed.len(),
            outcomes,
        })
    }

    /// Summarise a finished execution.
    ///
    /// Adherence is `(steps - variances) / steps * 100` and is not clamped,
    /// so more variances than steps gives a negative rate. A protocol without
    /// steps has 100% adherence.
    pub fn generate_completion_report(
        &self,
        execution: &ProtocolExecution,
        protocol: &CareProtocol,
    ) -> CompletionReport {
        let generated_at = Utc::now();
        let finished_at = execution.completed_at.unwrap_or(generated_at);
        let total_steps = protocol.steps.len();
        let variance_count = execution.variances.len();

        CompletionReport {
            execution_id: execution.id,
            protocol_id: protocol.id,
            patient_id: execution.patient_id,
            duration_ms: (finished_at - execution.started_at).num_milliseconds(),
            total_steps,
            completed_steps: execution.completed_steps.len(),
            variance_count,
            approved_variance_count: execution.approved_variance_count(),
            adherence_rate: adherence_rate(total_steps, variance_count),
            outcomes_recorded: execution.outcomes.len(),
            outcomes_achieved: execution.achieved_outcome_count(),
            outcome_achievement_rate: percentage(
                execution.achieved_outcome_count(),
                execution.outcomes.len(),
            ),
            generated_at,
        }
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown protocol.
    pub fn adherence_summary(&self, protocol_id: Uuid) -> Result<AdherenceSummary> {
        self.protocols.get(protocol_id)?;

        let completed = self.completed_executions(protocol_id);
        let rates: Vec<f64> = completed
            .iter()
            .filter_map(|execution| self.reports.find(execution.id))
            .map(|report| report.adherence_rate)
            .collect();
        let discontinued = self
            .executions
            .filter(|execution| {
                execution.protocol_id == protocol_id
                    && execution.status == ExecutionStatus::Discontinued
            })
            .len();

        Ok(AdherenceSummary {
            protocol_id,
            completed_executions: completed.len(),
            discontinued_executions: discontinued,
            mean_adherence_rate: mean(&rates),
        })
    }

    fn completed_executions(&self, protocol_id: Uuid) -> Vec<ProtocolExecution> {
        self.executions.filter(|execution| {
            execution.protocol_id == protocol_id && execution.status == ExecutionStatus::Completed
        })
    }
}

/// `part / whole * 100`, or 0 when `whole` is 0
pub(crate) fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn adherence_rate(total_steps: usize, variance_count: usize) -> f64 {
    if total_steps == 0 {
        return 100.0;
    }
    (total_steps as f64 - variance_count as f64) / total_steps as f64 * 100.0
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        EvidenceLevel, ProtocolOutcomeDefinition, ProtocolOutcomeResult, ProtocolStatus,
        ProtocolStep, ProtocolVariance, StepType, VarianceApproval,
    };
    use chrono::Duration;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn protocol(step_count: u32) -> CareProtocol {
        let now = Utc::now();
        CareProtocol {
            id: Uuid::new_v4(),
            name: "Diabetic Ketoacidosis".to_string(),
            code: "DKA-01".to_string(),
            version: "1.0".to_string(),
            description: String::new(),
            category: "Endocrinology".to_string(),
            condition: "DKA".to_string(),
            icd10_codes: BTreeSet::new(),
            workflow_definition_id: Some("wf-dka".to_string()),
            steps: (1..=step_count)
                .map(|order| {
                    ProtocolStep::new(&format!("step-{order}"), order, "Step", StepType::Monitoring)
                })
                .collect(),
            outcomes: vec![
                ProtocolOutcomeDefinition::new("gap-closed", "Anion gap closed", "anion_gap"),
                ProtocolOutcomeDefinition::new("no-hypokalemia", "No hypokalemia", "potassium"),
            ],
            evidence_level: EvidenceLevel::B,
            status: ProtocolStatus::Active,
            effective_date: None,
            expiration_date: None,
            organization_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            updated_by: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    fn execution(protocol_id: Uuid, status: ExecutionStatus) -> ProtocolExecution {
        let now = Utc::now();
        let user = Uuid::new_v4();
        ProtocolExecution {
            id: Uuid::new_v4(),
            protocol_id,
            protocol: None,
            workflow_instance_id: None,
            patient_id: Uuid::new_v4(),
            encounter_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            status,
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

    fn variance(variance_type: VarianceType, approved: bool) -> ProtocolVariance {
        ProtocolVariance {
            id: Uuid::new_v4(),
            step_id: "step-1".to_string(),
            variance_type,
            reason: "Patient preference".to_string(),
            documented_by: Uuid::new_v4(),
            documented_at: Utc::now(),
            approval: approved.then(|| VarianceApproval {
                approved_by: Uuid::new_v4(),
                approved_at: Utc::now(),
            }),
        }
    }

    fn result(outcome_id: &str, achieved: bool) -> ProtocolOutcomeResult {
        ProtocolOutcomeResult {
            outcome_id: outcome_id.to_string(),
            value: json!(achieved),
            achieved_target: achieved,
            measured_at: Utc::now(),
            recorded_by: Uuid::new_v4(),
            notes: None,
        }
    }

    fn engine() -> (StatisticsEngine, Arc<ProtocolStore>, Arc<ExecutionStore>, Arc<ReportStore>) {
        let protocols = Arc::new(ProtocolStore::new());
        let executions = Arc::new(ExecutionStore::new());
        let reports = Arc::new(ReportStore::new());
        let engine = StatisticsEngine::new(protocols.clone(), executions.clone(), reports.clone());
        (engine, protocols, executions, reports)
    }

    #[test]
    fn test_variance_statistics_without_variances() {
        let (engine, _, executions, _) = engine();
        executions.insert(execution(Uuid::new_v4(), ExecutionStatus::InProgress));

        let statistics = engine.variance_statistics(None);

        assert_eq!(statistics.total_executions, 1);
        assert_eq!(statistics.total_variances, 0);
        assert_eq!(statistics.approval_rate, 0.0);
        assert!(statistics.by_type.is_empty());
    }

    #[test]
    fn test_variance_statistics_by_protocol() {
        let (engine, _, executions, _) = engine();
        let protocol_id = Uuid::new_v4();
        let mut first = execution(protocol_id, ExecutionStatus::Completed);
        first.variances = vec![
            variance(VarianceType::Skipped, true),
            variance(VarianceType::Delayed, false),
            variance(VarianceType::Skipped, false),
        ];
        let mut other = execution(Uuid::new_v4(), ExecutionStatus::InProgress);
        other.variances = vec![variance(VarianceType::Other, true)];
        executions.insert(first);
        executions.insert(execution(protocol_id, ExecutionStatus::InProgress));
        executions.insert(other);

        let statistics = engine.variance_statistics(Some(protocol_id));

        assert_eq!(statistics.total_executions, 2);
        assert_eq!(statistics.executions_with_variances, 1);
        assert_eq!(statistics.total_variances, 3);
        assert_eq!(statistics.by_type[&VarianceType::Skipped], 2);
        assert_eq!(statistics.by_type[&VarianceType::Delayed], 1);
        assert_eq!(statistics.approved_variances, 1);
        assert!((statistics.approval_rate - 100.0 / 3.0).abs() < 1e-9);

        assert_eq!(engine.variance_statistics(None).total_variances, 4);
    }

    #[test]
    fn test_outcome_statistics_counts_completed_only() {
        let (engine, protocols, executions, _) = engine();
        let definition = protocol(2);
        protocols.insert(definition.clone());

        let mut completed = execution(definition.id, ExecutionStatus::Completed);
        completed.outcomes = vec![result("gap-closed", true), result("gap-closed", false)];
        let mut running = execution(definition.id, ExecutionStatus::InProgress);
        running.outcomes = vec![result("gap-closed", true)];
        executions.insert(completed);
        executions.insert(running);

        let statistics = engine.outcome_statistics(definition.id).unwrap();

        assert_eq!(statistics.completed_executions, 1);
        assert_eq!(statistics.outcomes.len(), 2);
        assert_eq!(statistics.outcomes[0].measured, 2);
        assert_eq!(statistics.outcomes[0].achievement_rate, 50.0);
        assert_eq!(statistics.outcomes[1].measured, 0);
        assert_eq!(statistics.outcomes[1].achievement_rate, 0.0);
    }

    #[test]
    fn test_outcome_statistics_unknown_protocol() {
        let (engine, _, _, _) = engine();

        assert!(engine.outcome_statistics(Uuid::new_v4()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_report_adherence_can_go_negative() {
        let (engine, _, _, _) = engine();
        let definition = protocol(2);
        let mut run = execution(definition.id, ExecutionStatus::Completed);
        run.started_at = Utc::now() - Duration::seconds(90);
        run.completed_at = Some(run.started_at + Duration::seconds(90));
        run.variances = vec![
            variance(VarianceType::Skipped, false),
            variance(VarianceType::Modified, false),
            variance(VarianceType::Delayed, true),
        ];

        let report = engine.generate_completion_report(&run, &definition);

        assert_eq!(report.duration_ms, 90_000);
        assert_eq!(report.adherence_rate, -50.0);
        assert_eq!(report.approved_variance_count, 1);
        assert_eq!(report.outcome_achievement_rate, 0.0);
    }

    #[test]
    fn test_report_for_protocol_without_steps() {
        let (engine, _, _, _) = engine();
        let definition = protocol(0);
        let run = execution(definition.id, ExecutionStatus::Completed);

        let report = engine.generate_completion_report(&run, &definition);

        assert_eq!(report.total_steps, 0);
        assert_eq!(report.adherence_rate, 100.0);
    }

    #[test]
    fn test_adherence_summary() {
        let (engine, protocols, executions, reports) = engine();
        let definition = protocol(4);
        protocols.insert(definition.clone());

        let mut clean = execution(definition.id, ExecutionStatus::Completed);
        clean.completed_at = Some(Utc::now());
        let mut deviated = clean.clone();
        deviated.id = Uuid::new_v4();
        deviated.variances = vec![variance(VarianceType::Skipped, false)];
        for run in [&clean, &deviated] {
            reports.insert(engine.generate_completion_report(run, &definition));
            executions.insert(run.clone());
        }
        executions.insert(execution(definition.id, ExecutionStatus::Discontinued));

        let summary = engine.adherence_summary(definition.id).unwrap();

        assert_eq!(summary.completed_executions, 2);
        assert_eq!(summary.discontinued_executions, 1);
        assert_eq!(summary.mean_adherence_rate, 87.5);
    }
}
