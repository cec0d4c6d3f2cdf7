// Bundled protocol templates
use std::collections::BTreeSet;

use serde::Deserialize;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{EvidenceLevel, ProtocolOutcomeDefinition, ProtocolStep};
use crate::registry::CreateProtocolRequest;

const SEPSIS_MANAGEMENT: &str = include_str!("../templates/sepsis_management.yaml");

/// Static protocol definition used to seed a registry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolTemplate {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub version: Option<String>,
    pub description: String,
    pub category: String,
    pub condition: String,
    #[serde(default)]
    pub icd10_codes: BTreeSet<String>,
    #[serde(default)]
    pub workflow_definition_id: Option<String>,
    #[serde(default)]
    pub evidence_level: Option<EvidenceLevel>,
    pub steps: Vec<ProtocolStep>,
    pub outcomes: Vec<ProtocolOutcomeDefinition>,
}

impl ProtocolTemplate {
    /// # Errors
    ///
    /// Returns `Template` when the document does not describe a protocol.
    pub fn from_yaml(document: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(document)?)
    }

    pub fn into_request(self, organization_id: Uuid, created_by: Uuid) -> CreateProtocolRequest {
        CreateProtocolRequest {
            name: self.name,
            code: self.code,
            version: self.version,
            description: self.description,
            category: self.category,
            condition: self.condition,
            icd10_codes: self.icd10_codes,
            workflow_definition_id: self.workflow_definition_id,
            steps: self.steps,
            outcomes: self.outcomes,
            evidence_level: self.evidence_level,
            effective_date: None,
            expiration_date: None,
            organization_id,
            created_by,
        }
    }
}

/// Every template shipped with the engine
///
/// # Errors
///
/// Returns `Template` if an embedded document fails to parse.
pub fn bundled_templates() -> Result<Vec<ProtocolTemplate>> {
    [SEPSIS_MANAGEMENT]
        .into_iter()
        .map(ProtocolTemplate::from_yaml)
        .collect()
}
