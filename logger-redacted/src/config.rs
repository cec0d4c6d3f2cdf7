// Logger configuration
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Fallback filter directive when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
    pub redaction_enabled: bool,
    pub hash_for_correlation: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            redaction_enabled: true,
            hash_for_correlation: true,
        }
    }
}
