// External workflow engine contract
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::ProtocolStep;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStartContext {
    pub user_id: Uuid,
    pub patient_id: Uuid,
    pub encounter_id: Uuid,
    pub protocol_execution_id: Uuid,
    pub organization_id: Uuid,
}

/// Data embedded in the workflow instance so work items can be built from the steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStartData {
    pub protocol_id: Uuid,
    pub protocol_name: String,
    pub steps: Vec<ProtocolStep>,
    pub patient_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowLaunchError {
    #[error("Workflow definition not found: {0}")]
    DefinitionNotFound(String),

    #[error("Workflow engine rejected start request: {0}")]
    Rejected(String),

    #[error("Workflow engine unavailable: {0}")]
    Unavailable(String),
}

/// The generic workflow engine that sequences work items for an execution.
///
/// Implemented by the host system. Failure semantics (timeouts, retries)
/// belong to the implementation.
#[async_trait]
pub trait WorkflowLauncher: Send + Sync {
    async fn start_workflow(
        &self,
        definition: &str,
        context: WorkflowStartContext,
        data: WorkflowStartData,
    ) -> Result<WorkflowInstance, WorkflowLaunchError>;
}

/// A start request accepted by [`InMemoryWorkflowLauncher`]
#[derive(Debug, Clone)]
pub struct StartedWorkflow {
    pub instance: WorkflowInstance,
    pub definition: String,
    pub context: WorkflowStartContext,
    pub data: WorkflowStartData,
}

/// In-memory launcher for testing and development.
///
/// Accepts every request and records it, unless switched into failure mode
/// with [`InMemoryWorkflowLauncher::fail_with`].
#[derive(Debug, Default)]
pub struct InMemoryWorkflowLauncher {
    started: Mutex<Vec<StartedWorkflow>>,
    failure: Mutex<Option<WorkflowLaunchError>>,
}

impl InMemoryWorkflowLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, error: WorkflowLaunchError) {
        *self.failure.lock() = Some(error);
    }

    pub fn recover(&self) {
        *self.failure.lock() = None;
    }

    pub fn started(&self) -> Vec<StartedWorkflow> {
        self.started.lock().clone()
    }
}

#[async_trait]
impl WorkflowLauncher for InMemoryWorkflowLauncher {
    async fn start_workflow(
        &self,
        definition: &str,
        context: WorkflowStartContext,
        data: WorkflowStartData,
    ) -> Result<WorkflowInstance, WorkflowLaunchError> {
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }

        let instance = WorkflowInstance {
            id: format!("wf-{}", Uuid::new_v4()),
        };
        self.started.lock().push(StartedWorkflow {
            instance: instance.clone(),
            definition: definition.to_string(),
            context,
            data,
        });
        Ok(instance)
    }
}
