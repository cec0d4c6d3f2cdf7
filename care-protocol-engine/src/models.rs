use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Free-form key/value data attached to executions and step actions
pub type Metadata = Map<String, Value>;

// =============================================================================
// Protocol definitions
// =============================================================================

/// Grading of the clinical evidence behind a protocol, A strongest to D weakest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum EvidenceLevel {
    A,
    B,
    #[default]
    C,
    D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtocolStatus {
    Draft,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepType {
    Assessment,
    Procedure,
    Medication,
    Intervention,
    Monitoring,
    Education,
    Consultation,
    Documentation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Metadata,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolStep {
    pub id: String,
    /// Position in the pathway; unique within a protocol
    pub order: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default)]
    pub expected_duration_minutes: Option<u32>,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub actions: Vec<StepAction>,
    #[serde(default)]
    pub alternatives: Vec<String>,
}

fn default_required() -> bool {
    true
}

impl ProtocolStep {
    pub fn new(id: &str, order: u32, name: &str, step_type: StepType) -> Self {
        Self {
            id: id.to_string(),
            order,
            name: name.to_string(),
            description: String::new(),
            step_type,
            expected_duration_minutes: None,
            required: true,
            actions: Vec::new(),
            alternatives: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolOutcomeDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub metric: String,
    #[serde(default)]
    pub target: Value,
    #[serde(default)]
    pub timeframe: Option<String>,
}

impl ProtocolOutcomeDefinition {
    pub fn new(id: &str, name: &str, metric: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            metric: metric.to_string(),
            target: Value::Null,
            timeframe: None,
        }
    }
}

/// A versioned clinical pathway definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CareProtocol {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub version: String,
    pub description: String,
    pub category: String,
    pub condition: String,
    pub icd10_codes: BTreeSet<String>,
    pub workflow_definition_id: Option<String>,
    pub steps: Vec<ProtocolStep>,
    pub outcomes: Vec<ProtocolOutcomeDefinition>,
    pub evidence_level: EvidenceLevel,
    pub status: ProtocolStatus,
    pub effective_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub organization_id: Uuid,
    pub created_by: Uuid,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl CareProtocol {
    pub fn is_active(&self) -> bool {
        self.status == ProtocolStatus::Active && self.deleted_at.is_none()
    }

    /// Steps sorted by `order`; ties keep definition order
    pub fn ordered_steps(&self) -> Vec<&ProtocolStep> {
        let mut steps: Vec<&ProtocolStep> = self.steps.iter().collect();
        steps.sort_by_key(|step| step.order);
        steps
    }

    pub fn step(&self, step_id: &str) -> Option<&ProtocolStep> {
        self.steps.iter().find(|step| step.id == step_id)
    }

    /// Index of a step within canonical step order
    pub fn step_position(&self, step_id: &str) -> Option<usize> {
        self.ordered_steps()
            .iter()
            .position(|step| step.id == step_id)
    }

    pub fn outcome(&self, outcome_id: &str) -> Option<&ProtocolOutcomeDefinition> {
        self.outcomes.iter().find(|outcome| outcome.id == outcome_id)
    }
}

// =============================================================================
// Executions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    InProgress,
    OnHold,
    Completed,
    Discontinued,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Discontinued)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InProgress => "IN_PROGRESS",
            Self::OnHold => "ON_HOLD",
            Self::Completed => "COMPLETED",
            Self::Discontinued => "DISCONTINUED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VarianceType {
    Skipped,
    Delayed,
    Modified,
    Substituted,
    Contraindicated,
    PatientDeclined,
    Other,
}

impl VarianceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Skipped => "SKIPPED",
            Self::Delayed => "DELAYED",
            Self::Modified => "MODIFIED",
            Self::Substituted => "SUBSTITUTED",
            Self::Contraindicated => "CONTRAINDICATED",
            Self::PatientDeclined => "PATIENT_DECLINED",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for VarianceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VarianceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SKIPPED" => Ok(Self::Skipped),
            "DELAYED" => Ok(Self::Delayed),
            "MODIFIED" => Ok(Self::Modified),
            "SUBSTITUTED" => Ok(Self::Substituted),
            "CONTRAINDICATED" => Ok(Self::Contraindicated),
            "PATIENT_DECLINED" => Ok(Self::PatientDeclined),
            "OTHER" => Ok(Self::Other),
            other => Err(format!("unknown variance type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VarianceApproval {
    pub approved_by: Uuid,
    pub approved_at: DateTime<Utc>,
}

/// A documented deviation from a protocol step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolVariance {
    pub id: Uuid,
    pub step_id: String,
    pub variance_type: VarianceType,
    pub reason: String,
    pub documented_by: Uuid,
    pub documented_at: DateTime<Utc>,
    pub approval: Option<VarianceApproval>,
}

impl ProtocolVariance {
    pub fn is_approved(&self) -> bool {
        self.approval.is_some()
    }
}

/// One measurement of a protocol outcome within an execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolOutcomeResult {
    pub outcome_id: String,
    pub value: Value,
    pub achieved_target: bool,
    pub measured_at: DateTime<Utc>,
    pub recorded_by: Uuid,
    pub notes: Option<String>,
}

/// One patient's run through a protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolExecution {
    pub id: Uuid,
    pub protocol_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<CareProtocol>,
    pub workflow_instance_id: Option<String>,
    pub patient_id: Uuid,
    pub encounter_id: Uuid,
    pub organization_id: Uuid,
    pub status: ExecutionStatus,
    pub current_step: usize,
    /// Completed step ids in completion order, without duplicates
    pub completed_steps: Vec<String>,
    pub variances: Vec<ProtocolVariance>,
    pub outcomes: Vec<ProtocolOutcomeResult>,
    pub metadata: Metadata,
    pub started_by: Uuid,
    pub started_at: DateTime<Utc>,
    pub updated_by: Uuid,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProtocolExecution {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn has_completed(&self, step_id: &str) -> bool {
        self.completed_steps.iter().any(|id| id == step_id)
    }

    /// Returns `false` when the step was already recorded
    pub fn mark_step_completed(&mut self, step_id: &str) -> bool {
        if self.has_completed(step_id) {
            return false;
        }
        self.completed_steps.push(step_id.to_string());
        true
    }

    pub fn variance(&self, variance_id: Uuid) -> Option<&ProtocolVariance> {
        self.variances.iter().find(|variance| variance.id == variance_id)
    }

    pub fn approved_variance_count(&self) -> usize {
        self.variances.iter().filter(|variance| variance.is_approved()).count()
    }

    pub fn achieved_outcome_count(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.achieved_target).count()
    }

    pub(crate) fn touch(&mut self, user_id: Uuid, at: DateTime<Utc>) {
        self.updated_by = user_id;
        self.updated_at = at;
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Summary generated when an execution completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub execution_id: Uuid,
    pub protocol_id: Uuid,
    pub patient_id: Uuid,
    pub duration_ms: i64,
    pub total_steps: usize,
    pub completed_steps: usize,
    pub variance_count: usize,
    pub approved_variance_count: usize,
    /// Not clamped: more variances than steps yields a negative rate
    pub adherence_rate: f64,
    pub outcomes_recorded: usize,
    pub outcomes_achieved: usize,
    pub outcome_achievement_rate: f64,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protocol_with_steps(steps: Vec<ProtocolStep>) -> CareProtocol {
        let now = Utc::now();
        CareProtocol {
            id: Uuid::new_v4(),
            name: "Community Acquired Pneumonia".to_string(),
            code: "CAP-01".to_string(),
            version: "1.0".to_string(),
            description: String::new(),
            category: "Pulmonology".to_string(),
            condition: "Pneumonia".to_string(),
            icd10_codes: BTreeSet::new(),
            workflow_definition_id: None,
            steps,
            outcomes: Vec::new(),
            evidence_level: EvidenceLevel::default(),
            status: ProtocolStatus::Draft,
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

    #[test]
    fn test_step_position_follows_order_not_definition() {
        let protocol = protocol_with_steps(vec![
            ProtocolStep::new("antibiotics", 3, "Start antibiotics", StepType::Medication),
            ProtocolStep::new("triage", 1, "Triage", StepType::Assessment),
            ProtocolStep::new("xray", 2, "Chest X-ray", StepType::Procedure),
        ]);

        assert_eq!(protocol.step_position("triage"), Some(0));
        assert_eq!(protocol.step_position("xray"), Some(1));
        assert_eq!(protocol.step_position("antibiotics"), Some(2));
        assert_eq!(protocol.step_position("unknown"), None);
    }

    #[test]
    fn test_default_evidence_level_is_c() {
        assert_eq!(EvidenceLevel::default(), EvidenceLevel::C);
        assert!(EvidenceLevel::A < EvidenceLevel::D);
    }

    #[test]
    fn test_variance_type_parsing() {
        assert_eq!("SKIPPED".parse::<VarianceType>(), Ok(VarianceType::Skipped));
        assert_eq!(
            "patient_declined".parse::<VarianceType>(),
            Ok(VarianceType::PatientDeclined)
        );
        assert!("forgotten".parse::<VarianceType>().is_err());
    }

    #[test]
    fn test_execution_status_wire_format() {
        let json = serde_json::to_value(ExecutionStatus::OnHold).unwrap();
        assert_eq!(json, serde_json::json!("ON_HOLD"));
        assert!(ExecutionStatus::Discontinued.is_terminal());
        assert!(!ExecutionStatus::OnHold.is_terminal());
    }
}
