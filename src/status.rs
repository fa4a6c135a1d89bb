//! Ready-condition computation for reconciliation.
//!
//! Validation rules can change after a document is already stored, so the
//! reconciliation loop re-validates every existing document from scratch and
//! refreshes a `Ready` status condition with the outcome. Callers are told
//! whether anything actually changed so they can skip redundant status
//! writes.

use chrono::{SecondsFormat, Utc};

use crate::policy::{Condition, ConditionStatus, ResourceIndexPolicy};
use crate::sandbox::ExpressionValidator;
use crate::validation::{aggregate, validate_policy, ValidationError};

/// Type of the condition tracking overall policy validity.
pub const READY_CONDITION_TYPE: &str = "Ready";

/// Reason recorded when validation passes.
pub const VALID_REASON: &str = "Valid";

/// Reason recorded when validation fails.
pub const INVALID_REASON: &str = "Invalid";

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Build the `Ready` condition for a validation outcome.
///
/// An empty error list yields `True`/`Valid`; otherwise `False`/`Invalid`
/// with every error aggregated into the message.
pub fn ready_condition(errors: &[ValidationError]) -> Condition {
    if errors.is_empty() {
        Condition {
            condition_type: READY_CONDITION_TYPE.to_string(),
            status: ConditionStatus::True,
            reason: VALID_REASON.to_string(),
            message: "ResourceIndexPolicy is valid".to_string(),
            last_transition_time: now_rfc3339(),
        }
    } else {
        Condition {
            condition_type: READY_CONDITION_TYPE.to_string(),
            status: ConditionStatus::False,
            reason: INVALID_REASON.to_string(),
            message: aggregate(errors),
            last_transition_time: now_rfc3339(),
        }
    }
}

/// Merge `new` into `conditions`, keyed by condition type.
///
/// The transition time is preserved when the status value is unchanged, so
/// it records when the status last flipped rather than when it was last
/// observed. Returns whether anything changed.
pub fn set_status_condition(conditions: &mut Vec<Condition>, new: Condition) -> bool {
    match conditions
        .iter_mut()
        .find(|c| c.condition_type == new.condition_type)
    {
        None => {
            conditions.push(new);
            true
        }
        Some(existing) => {
            let mut changed = false;
            if existing.status != new.status {
                existing.status = new.status;
                existing.last_transition_time = new.last_transition_time;
                changed = true;
            }
            if existing.reason != new.reason {
                existing.reason = new.reason;
                changed = true;
            }
            if existing.message != new.message {
                existing.message = new.message;
                changed = true;
            }
            changed
        }
    }
}

/// Re-validate `policy` and refresh its `Ready` condition.
///
/// Validity is recomputed from scratch on every call; nothing is cached.
/// Returns whether the stored status changed, so callers can skip the
/// write when it did not.
pub fn reconcile(policy: &mut ResourceIndexPolicy, expressions: &ExpressionValidator) -> bool {
    tracing::debug!(policy = %policy.metadata.name, "reconciling policy document");

    let errors = validate_policy(policy, expressions);
    if !errors.is_empty() {
        tracing::warn!(
            policy = %policy.metadata.name,
            errors = errors.len(),
            "policy document failed validation"
        );
    }
    let condition = ready_condition(&errors);
    let changed = set_status_condition(&mut policy.status.conditions, condition);
    if !changed {
        tracing::debug!(policy = %policy.metadata.name, "status unchanged, skipping update");
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{
        FieldPolicy, PolicyCondition, ResourceIndexPolicySpec, TargetResource,
    };
    use crate::validation::{FieldPath, ValidationError};

    fn policy_with_expression(expression: &str) -> ResourceIndexPolicy {
        ResourceIndexPolicy {
            spec: ResourceIndexPolicySpec {
                target_resource: TargetResource {
                    group: "g".to_string(),
                    version: "v1".to_string(),
                    kind: "K".to_string(),
                },
                conditions: vec![PolicyCondition {
                    name: "c".to_string(),
                    expression: expression.to_string(),
                }],
                fields: vec![FieldPolicy {
                    path: ".spec.name".to_string(),
                    searchable: true,
                    filterable: false,
                    facetable: false,
                }],
            },
            ..Default::default()
        }
    }

    fn validator() -> ExpressionValidator {
        ExpressionValidator::new(50).unwrap()
    }

    #[test]
    fn ready_condition_for_success() {
        let condition = ready_condition(&[]);
        assert_eq!(condition.condition_type, "Ready");
        assert_eq!(condition.status, ConditionStatus::True);
        assert_eq!(condition.reason, "Valid");
        assert_eq!(condition.message, "ResourceIndexPolicy is valid");
        assert!(!condition.last_transition_time.is_empty());
    }

    #[test]
    fn ready_condition_for_failure_aggregates_messages() {
        let errs = vec![
            ValidationError::invalid(FieldPath::new("spec").child("a"), "v", "m1"),
            ValidationError::invalid(FieldPath::new("spec").child("b"), "w", "m2"),
        ];
        let condition = ready_condition(&errs);
        assert_eq!(condition.status, ConditionStatus::False);
        assert_eq!(condition.reason, "Invalid");
        assert!(condition.message.contains("m1"));
        assert!(condition.message.contains("m2"));
    }

    #[test]
    fn set_condition_inserts_when_absent() {
        let mut conditions = Vec::new();
        assert!(set_status_condition(&mut conditions, ready_condition(&[])));
        assert_eq!(conditions.len(), 1);
    }

    #[test]
    fn set_condition_preserves_transition_time_when_status_unchanged() {
        let mut first = ready_condition(&[]);
        first.last_transition_time = "2020-01-01T00:00:00Z".to_string();
        let mut conditions = vec![first];

        let changed = set_status_condition(&mut conditions, ready_condition(&[]));
        assert!(!changed);
        assert_eq!(conditions[0].last_transition_time, "2020-01-01T00:00:00Z");
    }

    #[test]
    fn set_condition_updates_transition_time_on_flip() {
        let mut first = ready_condition(&[]);
        first.last_transition_time = "2020-01-01T00:00:00Z".to_string();
        let mut conditions = vec![first];

        let errs = vec![ValidationError::invalid(FieldPath::new("spec"), "v", "m")];
        let changed = set_status_condition(&mut conditions, ready_condition(&errs));
        assert!(changed);
        assert_eq!(conditions[0].status, ConditionStatus::False);
        assert_ne!(conditions[0].last_transition_time, "2020-01-01T00:00:00Z");
    }

    #[test]
    fn reconcile_marks_valid_policy_ready() {
        let mut policy = policy_with_expression("metadata.name == 'x'");
        assert!(reconcile(&mut policy, &validator()));
        assert_eq!(policy.status.conditions.len(), 1);
        assert_eq!(policy.status.conditions[0].status, ConditionStatus::True);
    }

    #[test]
    fn reconcile_is_stable_when_nothing_changes() {
        let mut policy = policy_with_expression("metadata.name == 'x'");
        let validator = validator();
        assert!(reconcile(&mut policy, &validator));
        assert!(!reconcile(&mut policy, &validator));
    }

    #[test]
    fn reconcile_flags_newly_invalid_policy() {
        // A document that was admitted under older rules can fail a later
        // pass; the Ready condition must flip rather than stay stale.
        let mut policy = policy_with_expression("metadata.name == 'x'");
        let validator = validator();
        assert!(reconcile(&mut policy, &validator));

        policy.spec.conditions[0].expression = "10 - 5 > 0".to_string();
        assert!(reconcile(&mut policy, &validator));
        assert_eq!(policy.status.conditions[0].status, ConditionStatus::False);
        assert_eq!(policy.status.conditions[0].reason, "Invalid");
        assert!(policy.status.conditions[0].message.contains("'_-_' is not allowed"));
    }
}
