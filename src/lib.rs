#![deny(missing_docs)]

//! indexpolicy: validation for resource index policies.
//!
//! A resource-indexing platform lets administrators declare which resources
//! of a kind get indexed (via boolean filter expressions) and which of their
//! fields are projected into the index (via restricted field paths). This
//! crate is the validation engine that gates those policy documents: every
//! expression and path is checked for syntax, type correctness, and use of
//! only a pre-approved, minimal set of operations before a document is
//! accepted or re-confirmed.
//!
//! # Core Concepts
//!
//! - **ResourceIndexPolicy**: the policy document — target resource,
//!   filter conditions, and field projections
//! - **ExpressionValidator**: the sandbox that restricts filter expressions
//!   to an allowlisted operator subset with a bounded nesting depth
//! - **validate_path**: the restricted dot/bracket grammar for projection
//!   paths
//! - **validate_policy**: the orchestrator that runs both validators over a
//!   whole document and aggregates field-addressed errors
//! - **admission / status**: the create-time gate and the reconcile-time
//!   `Ready` condition built from the orchestrator's output
//!
//! # Example
//!
//! ```
//! use indexpolicy::{validate_policy, ExpressionValidator, ResourceIndexPolicy};
//!
//! let validator = ExpressionValidator::new(50).unwrap();
//! let policy = ResourceIndexPolicy::parse(r#"{
//!     "metadata": {"name": "contacts"},
//!     "spec": {
//!         "targetResource": {"group": "contacts.example.com", "version": "v1", "kind": "Contact"},
//!         "conditions": [{"name": "is-active", "expression": "status.active == true"}],
//!         "fields": [{"path": ".spec.name", "searchable": true}]
//!     }
//! }"#).unwrap();
//!
//! assert!(validate_policy(&policy, &validator).is_empty());
//! ```

/// Canonical expression tree consumed by the sandbox validator.
pub mod ast;

/// Expression frontend: parsing, macro expansion, and result-type inference.
pub mod compiler;

mod admission;
mod jsonpath;
mod policy;
mod sandbox;
mod status;
mod validation;

pub use admission::{validate_create, validate_delete, validate_update, AdmissionError};
pub use jsonpath::{validate_path, PathError};
pub use policy::{
    Condition, ConditionStatus, FieldPolicy, ObjectMeta, PolicyCondition, ResourceIndexPolicy,
    ResourceIndexPolicySpec, ResourceIndexPolicyStatus, TargetResource, MAX_CONDITIONS,
    MAX_FIELDS, MAX_NAME_LENGTH,
};
pub use sandbox::{ExpressionValidator, ValidatorError, DEFAULT_MAX_DEPTH};
pub use status::{
    ready_condition, reconcile, set_status_condition, INVALID_REASON, READY_CONDITION_TYPE,
    VALID_REASON,
};
pub use validation::{
    aggregate, validate_policy, validate_structure, ErrorType, FieldPath, ValidationError,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_and_reconcile_agree() {
        let validator = ExpressionValidator::new(DEFAULT_MAX_DEPTH).unwrap();
        let mut policy = ResourceIndexPolicy::parse(
            r#"{
                "metadata": {"name": "deployments-ready"},
                "spec": {
                    "targetResource": {"group": "apps", "version": "v1", "kind": "Deployment"},
                    "conditions": [
                        {"name": "ready", "expression": "status.conditions.exists(c, c.type == 'Ready')"}
                    ],
                    "fields": [{"path": ".metadata.name", "searchable": true}]
                }
            }"#,
        )
        .unwrap();

        assert!(validate_create(&policy, &validator).is_ok());
        assert!(reconcile(&mut policy, &validator));
        assert_eq!(policy.status.conditions[0].status, ConditionStatus::True);
    }

    #[test]
    fn rejection_carries_every_error() {
        let validator = ExpressionValidator::new(DEFAULT_MAX_DEPTH).unwrap();
        let policy = ResourceIndexPolicy::parse(
            r#"{
                "metadata": {"name": "broken"},
                "spec": {
                    "targetResource": {"group": "apps", "version": "v1", "kind": "Deployment"},
                    "conditions": [
                        {"name": "a", "expression": "10 - 5 > 0"},
                        {"name": "a", "expression": "123"}
                    ],
                    "fields": [{"path": "metadata.name", "searchable": true}]
                }
            }"#,
        )
        .unwrap();

        let err = validate_create(&policy, &validator).unwrap_err();
        match err {
            AdmissionError::Invalid { errors, .. } => {
                // one operator error, one type error, one path error, one
                // duplicate name error
                assert_eq!(errors.len(), 4, "{errors:?}");
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }
}
