use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Entities the engine can report as missing or in the wrong state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Protocol,
    Step,
    Execution,
    Variance,
    Report,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Protocol => "Protocol",
            Self::Step => "Step",
            Self::Execution => "Execution",
            Self::Variance => "Variance",
            Self::Report => "Completion report",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },

    #[error("Protocol validation failed: {}", .violations.join("; "))]
    ValidationFailed { violations: Vec<String> },

    #[error("Invalid state for {entity} {id}: {message}")]
    InvalidState {
        entity: EntityKind,
        id: Uuid,
        message: String,
    },

    #[error("Workflow start failed for execution {execution_id}: {reason}")]
    WorkflowStartFailed { execution_id: Uuid, reason: String },

    #[error("Invalid protocol template: {0}")]
    Template(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ProtocolError {
    pub fn not_found(entity: EntityKind, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_state(entity: EntityKind, id: Uuid, message: impl Into<String>) -> Self {
        Self::InvalidState {
            entity,
            id,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
