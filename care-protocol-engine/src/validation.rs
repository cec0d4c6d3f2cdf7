// Protocol activation rules
use itertools::Itertools;
use validator::ValidationErrors;

use crate::models::CareProtocol;

/// Every rule an ACTIVE protocol must satisfy. Empty means the protocol may be activated.
pub fn activation_violations(protocol: &CareProtocol) -> Vec<String> {
    let mut violations = Vec::new();

    if protocol.name.trim().is_empty() {
        violations.push("Protocol name is required".to_string());
    }
    if protocol.code.trim().is_empty() {
        violations.push("Protocol code is required".to_string());
    }
    if protocol.steps.is_empty() {
        violations.push("Protocol must have at least one step".to_string());
    }

    let duplicate_orders: Vec<u32> = protocol
        .steps
        .iter()
        .map(|step| step.order)
        .duplicates()
        .sorted()
        .collect();
    if !duplicate_orders.is_empty() {
        violations.push(format!(
            "Duplicate step order numbers: {}",
            duplicate_orders.iter().join(", ")
        ));
    }

    let has_workflow = protocol
        .workflow_definition_id
        .as_deref()
        .is_some_and(|id| !id.trim().is_empty());
    if !has_workflow {
        violations.push("Workflow definition ID is required".to_string());
    }

    violations
}

/// Flatten derive-validator errors into one message per offending field
pub fn required_field_violations(errors: &ValidationErrors) -> Vec<String> {
    errors
        .field_errors()
        .keys()
        .map(|field| format!("{field} is required"))
        .sorted()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EvidenceLevel, ProtocolStatus, ProtocolStep, StepType};
    use chrono::Utc;
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn protocol(orders: &[u32], workflow: Option<&str>) -> CareProtocol {
        let now = Utc::now();
        CareProtocol {
            id: Uuid::new_v4(),
            name: "Acute Stroke Pathway".to_string(),
            code: "STROKE-01".to_string(),
            version: "1.0".to_string(),
            description: String::new(),
            category: "Neurology".to_string(),
            condition: "Ischemic stroke".to_string(),
            icd10_codes: BTreeSet::new(),
            workflow_definition_id: workflow.map(str::to_string),
            steps: orders
                .iter()
                .enumerate()
                .map(|(index, order)| {
                    ProtocolStep::new(&format!("step-{index}"), *order, "Step", StepType::Assessment)
                })
                .collect(),
            outcomes: Vec::new(),
            evidence_level: EvidenceLevel::A,
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
    fn test_valid_protocol_has_no_violations() {
        assert!(activation_violations(&protocol(&[1, 2, 3], Some("wf-stroke"))).is_empty());
    }

    #[test]
    fn test_duplicate_orders_are_listed_once() {
        let violations = activation_violations(&protocol(&[1, 1, 2, 2, 2], Some("wf-stroke")));

        assert_eq!(violations, vec!["Duplicate step order numbers: 1, 2".to_string()]);
    }

    #[test]
    fn test_all_violations_reported_together() {
        let mut empty = protocol(&[], Some("  "));
        empty.name = String::new();

        let violations = activation_violations(&empty);

        assert_eq!(
            violations,
            vec![
                "Protocol name is required".to_string(),
                "Protocol must have at least one step".to_string(),
                "Workflow definition ID is required".to_string(),
            ]
        );
    }

    proptest! {
        #[test]
        fn property_activation_rules(
            orders in proptest::collection::vec(0u32..6, 0..6),
            workflow in proptest::option::of("[a-z]{0,4}"),
        ) {
            let candidate = protocol(&orders, workflow.as_deref());
            let unique = orders.iter().collect::<BTreeSet<_>>().len() == orders.len();
            let linked = workflow.as_deref().is_some_and(|id| !id.is_empty());

            let expected_valid = !orders.is_empty() && unique && linked;
            prop_assert_eq!(activation_violations(&candidate).is_empty(), expected_valid);
        }
    }
}
