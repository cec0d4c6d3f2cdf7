//! Clinical care protocol engine for RustCare Engine
//!
//! This crate manages evidence-based clinical pathways and tracks patients
//! through them:
//! - Versioned protocol definitions with ordered steps, outcome definitions
//!   and evidence grading, validated before activation
//! - Per-patient executions driven by an external workflow engine
//! - Variance documentation and approval for deviations from a step
//! - Outcome measurements against protocol targets
//! - Completion reports, adherence and outcome analytics
//! - Typed lifecycle events for notification, audit and analytics subscribers
//!
//! # Execution States
//!
//! - **IN_PROGRESS**: initial state, steps are being completed
//! - **ON_HOLD**: paused, resumes to IN_PROGRESS
//! - **COMPLETED**: terminal, a completion report is stored
//! - **DISCONTINUED**: terminal, stopped early without a report
//!
//! # Example
//!
//! ```rust
//! use care_protocol_engine::{
//!     CareProtocolEngine, ProtocolEventKind, StartExecutionRequest, StepCompletion,
//! };
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = CareProtocolEngine::with_defaults();
//!     let org = Uuid::new_v4();
//!     let clinician = Uuid::new_v4();
//!
//!     engine.on(ProtocolEventKind::ReportGenerated, |event| {
//!         println!("report ready: {event:?}");
//!         Ok(())
//!     });
//!
//!     let sepsis = engine.registry().seed_templates(org, clinician)?.remove(0);
//!     engine.registry().activate_protocol(sepsis.id, clinician)?;
//!
//!     let execution = engine
//!         .controller()
//!         .start(
//!             sepsis.id,
//!             StartExecutionRequest {
//!                 patient_id: Uuid::new_v4(),
//!                 encounter_id: Uuid::new_v4(),
//!                 user_id: clinician,
//!                 organization_id: org,
//!                 workflow_definition: None,
//!             },
//!         )
//!         .await?;
//!
//!     engine
//!         .controller()
//!         .complete_step(execution.id, "sepsis-screening", StepCompletion::by(clinician))?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod events;
pub mod models;
pub mod outcome;
pub mod registry;
pub mod statistics;
pub mod store;
pub mod templates;
pub mod validation;
pub mod variance;
pub mod workflow;

pub use config::EngineConfig;
pub use controller::{ExecutionController, StartExecutionRequest, StepCompletion};
pub use engine::CareProtocolEngine;
pub use error::{EntityKind, ProtocolError, Result};
pub use events::{EventNotifier, ProtocolEvent, ProtocolEventKind};
pub use models::*;
pub use outcome::{OutcomeRecord, OutcomeTracker};
pub use registry::{CreateProtocolRequest, ProtocolRegistry};
pub use statistics::{
    AdherenceSummary, OutcomeMetric, OutcomeStatistics, StatisticsEngine, VarianceStatistics,
};
pub use templates::{bundled_templates, ProtocolTemplate};
pub use variance::{VarianceRecord, VarianceTracker};
pub use workflow::{
    InMemoryWorkflowLauncher, StartedWorkflow, WorkflowInstance, WorkflowLaunchError,
    WorkflowLauncher, WorkflowStartContext, WorkflowStartData,
};
