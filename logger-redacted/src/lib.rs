//! HIPAA-compliant logging for clinical workflows
//!
//! Clinical engines log state transitions that reference patients and carry
//! free-text clinical reasoning (variance reasons, hold reasons, outcome
//! notes). This crate keeps that PHI out of log sinks:
//!
//! - **Subscriber setup**: one call installs a `tracing-subscriber` with an
//!   `EnvFilter` (`RUST_LOG` wins over the configured level) in pretty,
//!   compact or JSON layout
//! - **Correlation tokens**: [`hash_identifier`] turns a patient or encounter
//!   id into a short stable token, so log lines can be joined without
//!   exposing the identifier
//! - **Free-text redaction**: [`PiiRedactor`] masks emails, phone numbers,
//!   SSNs and medical record numbers embedded in clinician-entered text
//!
//! # Example
//!
//! ```rust
//! use logger_redacted::{hash_identifier, PiiRedactor, RedactionConfig};
//!
//! let redactor = PiiRedactor::new(RedactionConfig::default());
//! let reason = redactor.redact("Family (555) 123-4567 requested delay");
//! assert!(!reason.contains("123-4567"));
//!
//! let token = hash_identifier("patient-42");
//! assert_eq!(token, hash_identifier("patient-42"));
//! tracing::info!(patient = %token, reason = %reason, "Step deferred");
//! ```
//!
//! # Configuration
//!
//! ```yaml
//! logging:
//!   level: "info"
//!   format: "json"
//!   redaction_enabled: true
//!   hash_for_correlation: true
//! ```

pub mod config;
pub mod error;
pub mod redactor;
pub mod subscriber;

pub use config::*;
pub use error::*;
pub use redactor::*;
pub use subscriber::*;

/// Number of digest bytes kept in a correlation token
pub const CORRELATION_TOKEN_BYTES: usize = 8;
