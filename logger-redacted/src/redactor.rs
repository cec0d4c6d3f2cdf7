use base64::{engine::general_purpose, Engine as _};
use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::CORRELATION_TOKEN_BYTES;

/// Categories of identifiers that can show up in clinician-entered text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiiKind {
    Email,
    Phone,
    Ssn,
    MedicalRecordNumber,
}

impl PiiKind {
    fn label(self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::Phone => "PHONE",
            Self::Ssn => "SSN",
            Self::MedicalRecordNumber => "MRN",
        }
    }

    fn mask(self) -> &'static str {
        match self {
            Self::Email => "***@***",
            Self::Phone => "(***) ***-****",
            Self::Ssn => "***-**-****",
            Self::MedicalRecordNumber => "MRN******",
        }
    }
}

struct Rule {
    kind: PiiKind,
    pattern: Regex,
}

lazy_static! {
    // SSN runs before phone so 123-45-6789 is not half-matched as a phone number
    static ref RULES: Vec<Rule> = [
        (PiiKind::Email, r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"),
        (PiiKind::Ssn, r"\b\d{3}-\d{2}-\d{4}\b"),
        (PiiKind::MedicalRecordNumber, r"\bMRN[-:\s]?\d{4,}\b"),
        (PiiKind::Phone, r"(?:\+1[-.\s]?)?\(?\b\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b"),
    ]
    .into_iter()
    .filter_map(|(kind, pattern)| Regex::new(pattern).ok().map(|pattern| Rule { kind, pattern }))
    .collect();
}

/// PHI redaction configuration
#[derive(Debug, Clone)]
pub struct RedactionConfig {
    pub enabled: bool,
    pub redact_emails: bool,
    pub redact_phones: bool,
    pub redact_ssn: bool,
    pub redact_mrn: bool,
    /// Replace matches with a stable hash instead of a fixed mask
    pub hash_for_correlation: bool,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redact_emails: true,
            redact_phones: true,
            redact_ssn: true,
            redact_mrn: true,
            hash_for_correlation: false,
        }
    }
}

impl From<&crate::LoggerConfig> for RedactionConfig {
    fn from(config: &crate::LoggerConfig) -> Self {
        Self {
            enabled: config.redaction_enabled,
            hash_for_correlation: config.hash_for_correlation,
            ..Self::default()
        }
    }
}

/// Redacts identifiers from free text before it reaches a log sink
#[derive(Debug, Clone, Default)]
pub struct PiiRedactor {
    config: RedactionConfig,
}

impl PiiRedactor {
    pub fn new(config: RedactionConfig) -> Self {
        Self { config }
    }

    pub fn redact(&self, text: &str) -> String {
        if !self.config.enabled {
            return text.to_string();
        }

        RULES
            .iter()
            .filter(|rule| self.is_enabled(rule.kind))
            .fold(text.to_string(), |current, rule| {
                rule.pattern
                    .replace_all(&current, |caps: &regex::Captures| {
                        if self.config.hash_for_correlation {
                            format!("{}[{}]", rule.kind.label(), hash_identifier(&caps[0]))
                        } else {
                            rule.kind.mask().to_string()
                        }
                    })
                    .into_owned()
            })
    }

    fn is_enabled(&self, kind: PiiKind) -> bool {
        match kind {
            PiiKind::Email => self.config.redact_emails,
            PiiKind::Phone => self.config.redact_phones,
            PiiKind::Ssn => self.config.redact_ssn,
            PiiKind::MedicalRecordNumber => self.config.redact_mrn,
        }
    }
}

/// Stable, non-reversible token for an identifier, safe to emit as a log field
pub fn hash_identifier(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    let prefix = digest.get(..CORRELATION_TOKEN_BYTES).unwrap_or(digest.as_slice());
    general_purpose::URL_SAFE_NO_PAD.encode(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks_contact_details_in_reason() {
        let redactor = PiiRedactor::default();

        let redacted =
            redactor.redact("Daughter jane.doe@example.com asked to call (555) 123-4567 first");

        assert!(redacted.contains("***@***"));
        assert!(redacted.contains("(***) ***-****"));
        assert!(!redacted.contains("example.com"));
        assert!(!redacted.contains("123-4567"));
    }

    #[test]
    fn test_ssn_and_mrn_redaction() {
        let redactor = PiiRedactor::default();

        let redacted = redactor.redact("Duplicate chart MRN 00451234, SSN 123-45-6789 on file");

        assert_eq!(redacted, "Duplicate chart MRN******, SSN ***-**-**** on file");
    }

    #[test]
    fn test_hashing_is_stable_for_correlation() {
        let redactor = PiiRedactor::new(RedactionConfig {
            hash_for_correlation: true,
            ..Default::default()
        });

        let first = redactor.redact("Reach at (555) 123-4567");
        let second = redactor.redact("Reach at (555) 123-4567");

        assert_eq!(first, second);
        assert!(first.starts_with("Reach at PHONE["));
    }

    #[test]
    fn test_disabled_redaction_passes_text_through() {
        let redactor = PiiRedactor::new(RedactionConfig {
            enabled: false,
            ..Default::default()
        });

        let text = "SSN 123-45-6789";
        assert_eq!(redactor.redact(text), text);
    }

    #[test]
    fn test_hash_identifier() {
        let token = hash_identifier("4f1c2b1e-patient");

        assert_eq!(token, hash_identifier("4f1c2b1e-patient"));
        assert_ne!(token, hash_identifier("4f1c2b1e-patient2"));
        // 8 bytes, unpadded base64
        assert_eq!(token.len(), 11);
        assert!(!token.contains("patient"));
    }
}
