// Engine configuration
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use logger_redacted::LoggerConfig;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::EvidenceLevel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Version stamped on newly created protocols
    pub default_version: String,
    pub default_evidence_level: EvidenceLevel,
    /// Reject hold outside IN_PROGRESS and step completion on terminal executions
    pub strict_transitions: bool,
    /// Drop the execution when the workflow engine refuses to start it
    pub rollback_failed_starts: bool,
    /// Embed a copy of the protocol in each execution
    pub embed_protocol_snapshot: bool,
    pub logging: LoggerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_version: "1.0".to_string(),
            default_evidence_level: EvidenceLevel::C,
            strict_transitions: true,
            rollback_failed_starts: false,
            embed_protocol_snapshot: true,
            logging: LoggerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Environment variables are read as `CARE_PROTOCOL__<FIELD>`, nested with `__`
    pub const ENV_PREFIX: &'static str = "CARE_PROTOCOL";

    /// Load from an optional config file, overridden by environment variables.
    ///
    /// # Errors
    ///
    /// Returns `Config` when the file is unreadable or a value has the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(Self::ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// # Errors
    ///
    /// Returns `Config` when the document is not valid YAML for this shape.
    pub fn from_yaml_str(document: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(document, FileFormat::Yaml))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Install the process-wide tracing subscriber described by `logging`.
    ///
    /// # Errors
    ///
    /// Returns `Internal` for an invalid filter or when a subscriber is
    /// already installed.
    pub fn init_logging(&self) -> Result<()> {
        logger_redacted::init_logging(&self.logging).map_err(anyhow::Error::from)?;
        Ok(())
    }
}
