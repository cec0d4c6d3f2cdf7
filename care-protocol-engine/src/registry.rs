use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::config::EngineConfig;
use crate::error::{ProtocolError, Result};
use crate::events::{EventNotifier, ProtocolEvent};
use crate::models::{
    CareProtocol, EvidenceLevel, ProtocolOutcomeDefinition, ProtocolStatus, ProtocolStep,
};
use crate::store::ProtocolStore;
use crate::templates::bundled_templates;
use crate::validation::{activation_violations, required_field_violations};

/// Parameters for a new DRAFT protocol
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProtocolRequest {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub code: String,
    /// Defaults to the configured version
    #[serde(default)]
    pub version: Option<String>,
    #[validate(length(min = 1))]
    pub description: String,
    #[validate(length(min = 1))]
    pub category: String,
    #[validate(length(min = 1))]
    pub condition: String,
    #[serde(default)]
    pub icd10_codes: BTreeSet<String>,
    #[serde(default)]
    pub workflow_definition_id: Option<String>,
    pub steps: Vec<ProtocolStep>,
    pub outcomes: Vec<ProtocolOutcomeDefinition>,
    /// Defaults to the configured evidence level
    #[serde(default)]
    pub evidence_level: Option<EvidenceLevel>,
    #[serde(default)]
    pub effective_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,
    pub organization_id: Uuid,
    pub created_by: Uuid,
}

impl CreateProtocolRequest {
    fn normalize(&mut self) {
        for field in [
            &mut self.name,
            &mut self.code,
            &mut self.description,
            &mut self.category,
            &mut self.condition,
        ] {
            *field = field.trim().to_string();
        }
    }
}

/// Owns protocol definitions: creation, activation and lookup
pub struct ProtocolRegistry {
    protocols: Arc<ProtocolStore>,
    notifier: Arc<EventNotifier>,
    config: Arc<EngineConfig>,
}

impl ProtocolRegistry {
    pub fn new(
        protocols: Arc<ProtocolStore>,
        notifier: Arc<EventNotifier>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            protocols,
            notifier,
            config,
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create a DRAFT protocol. Steps and outcomes may still be empty; they are
    /// checked on activation.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailed` when a required text field is blank.
    pub fn create_protocol(&self, mut request: CreateProtocolRequest) -> Result<CareProtocol> {
        request.normalize();
        if let Err(errors) = request.validate() {
            let violations = required_field_violations(&errors);
            warn!(code = %request.code, ?violations, "Rejected protocol definition");
            return Err(ProtocolError::ValidationFailed { violations });
        }

        let now = Utc::now();
        let protocol = CareProtocol {
            id: Uuid::new_v4(),
            name: request.name,
            code: request.code,
            version: request
                .version
                .unwrap_or_else(|| self.config.default_version.clone()),
            description: request.description,
            category: request.category,
            condition: request.condition,
            icd10_codes: request.icd10_codes,
            workflow_definition_id: request.workflow_definition_id,
            steps: request.steps,
            outcomes: request.outcomes,
            evidence_level: request
                .evidence_level
                .unwrap_or(self.config.default_evidence_level),
            status: ProtocolStatus::Draft,
            effective_date: request.effective_date,
            expiration_date: request.expiration_date,
            organization_id: request.organization_id,
            created_by: request.created_by,
            updated_by: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        self.protocols.insert(protocol.clone());
        info!(
            protocol_id = %protocol.id,
            code = %protocol.code,
            version = %protocol.version,
            steps = protocol.steps.len(),
            "Created care protocol"
        );

        self.notifier
            .emit(ProtocolEvent::ProtocolCreated(protocol.clone()));
        Ok(protocol)
    }

    /// Validate and flip a protocol to ACTIVE.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and `ValidationFailed` listing
    /// every activation rule the protocol breaks.
    pub fn activate_protocol(&self, protocol_id: Uuid, user_id: Uuid) -> Result<CareProtocol> {
        let activated = self.protocols.update(protocol_id, |protocol| {
            let violations = activation_violations(protocol);
            if !violations.is_empty() {
                return Err(ProtocolError::ValidationFailed { violations });
            }

            protocol.status = ProtocolStatus::Active;
            protocol.updated_by = Some(user_id);
            protocol.updated_at = Utc::now();
            Ok(protocol.clone())
        });

        let protocol = match activated {
            Ok(protocol) => protocol,
            Err(e) => {
                warn!(protocol_id = %protocol_id, error = %e, "Protocol activation rejected");
                return Err(e);
            }
        };

        info!(
            protocol_id = %protocol.id,
            code = %protocol.code,
            activated_by = %user_id,
            "Activated care protocol"
        );
        self.notifier
            .emit(ProtocolEvent::ProtocolActivated(protocol.clone()));
        Ok(protocol)
    }

    /// Soft-delete a protocol. It disappears from lookups and can no longer
    /// start executions; running executions are unaffected.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn archive_protocol(&self, protocol_id: Uuid, user_id: Uuid) -> Result<CareProtocol> {
        let protocol = self.protocols.update(protocol_id, |protocol| {
            let now = Utc::now();
            protocol.deleted_at.get_or_insert(now);
            protocol.updated_by = Some(user_id);
            protocol.updated_at = now;
            Ok(protocol.clone())
        })?;

        info!(protocol_id = %protocol_id, archived_by = %user_id, "Archived care protocol");
        Ok(protocol)
    }

    /// Create DRAFT protocols from every bundled template
    ///
    /// # Errors
    ///
    /// Returns `Template` if a bundled template fails to parse.
    pub fn seed_templates(&self, organization_id: Uuid, user_id: Uuid) -> Result<Vec<CareProtocol>> {
        bundled_templates()?
            .into_iter()
            .map(|template| self.create_protocol(template.into_request(organization_id, user_id)))
            .collect()
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn get_protocol(&self, protocol_id: Uuid) -> Result<CareProtocol> {
        self.protocols.get(protocol_id)
    }

    /// The ACTIVE version for a code, or the most recently updated one
    pub fn find_by_code(&self, code: &str) -> Option<CareProtocol> {
        self.protocols
            .filter(|protocol| protocol.code == code && protocol.deleted_at.is_none())
            .into_iter()
            .max_by_key(|protocol| (protocol.is_active(), protocol.updated_at))
    }

    pub fn list_protocols(&self, status: Option<ProtocolStatus>) -> Vec<CareProtocol> {
        let mut protocols = self.protocols.filter(|protocol| {
            protocol.deleted_at.is_none() && status.map_or(true, |status| protocol.status == status)
        });
        sort_by_name(&mut protocols);
        protocols
    }

    /// ACTIVE protocols whose name or condition contains `text`, ignoring case
    pub fn protocols_by_condition(&self, text: &str) -> Vec<CareProtocol> {
        let needle = text.to_lowercase();
        let mut protocols = self.protocols.filter(|protocol| {
            protocol.is_active()
                && (protocol.name.to_lowercase().contains(&needle)
                    || protocol.condition.to_lowercase().contains(&needle))
        });
        sort_by_name(&mut protocols);
        debug!(condition = %text, matches = protocols.len(), "Protocol lookup by condition");
        protocols
    }

    /// ACTIVE protocols listing exactly this ICD-10 code
    pub fn protocols_by_icd10(&self, code: &str) -> Vec<CareProtocol> {
        let mut protocols = self
            .protocols
            .filter(|protocol| protocol.is_active() && protocol.icd10_codes.contains(code));
        sort_by_name(&mut protocols);
        debug!(icd10 = %code, matches = protocols.len(), "Protocol lookup by ICD-10 code");
        protocols
    }
}

fn sort_by_name(protocols: &mut [CareProtocol]) {
    protocols.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));
}
