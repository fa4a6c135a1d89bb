//! Admission decisions for policy documents.
//!
//! The synchronous gate in front of the storage layer: a document is fully
//! validated before it is ever persisted, and all failures are surfaced in
//! one rejection so an operator can fix every problem in a single edit
//! cycle. In-place edits are rejected outright; the supported workflow is
//! delete-and-recreate. The HTTP transport that carries these decisions
//! lives outside this crate.

use std::fmt;

use crate::policy::ResourceIndexPolicy;
use crate::sandbox::ExpressionValidator;
use crate::validation::{aggregate, validate_policy, validate_structure, ValidationError};

/// Why a policy document was refused admission.
#[derive(Clone, Debug, PartialEq)]
pub enum AdmissionError {
    /// The document failed validation; carries every failure found.
    Invalid {
        /// The document's name.
        name: String,
        /// All validation failures, in orchestrator order.
        errors: Vec<ValidationError>,
    },
    /// In-place updates are not supported.
    UpdatesUnsupported,
}

impl fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionError::Invalid { name, errors } => {
                write!(
                    f,
                    "ResourceIndexPolicy \"{name}\" is invalid: {}",
                    aggregate(errors)
                )
            }
            AdmissionError::UpdatesUnsupported => write!(
                f,
                "ResourceIndexPolicy updates are not supported. Consider deleting the \
                 resource and creating a new one with the desired spec"
            ),
        }
    }
}

impl std::error::Error for AdmissionError {}

/// Decide whether a new policy document may be created.
///
/// Runs the schema-level structural checks and the validation orchestrator;
/// any failure rejects the document with every error attached.
pub fn validate_create(
    policy: &ResourceIndexPolicy,
    expressions: &ExpressionValidator,
) -> Result<(), AdmissionError> {
    tracing::debug!(policy = %policy.metadata.name, "validating policy document for create");

    let mut errors = validate_structure(policy);
    errors.extend(validate_policy(policy, expressions));

    if errors.is_empty() {
        Ok(())
    } else {
        tracing::debug!(
            policy = %policy.metadata.name,
            errors = errors.len(),
            "rejecting policy document"
        );
        Err(AdmissionError::Invalid {
            name: policy.metadata.name.clone(),
            errors,
        })
    }
}

/// Decide whether an existing policy document may be updated in place.
///
/// Always refused, independent of the document's contents.
pub fn validate_update(
    _old: &ResourceIndexPolicy,
    _new: &ResourceIndexPolicy,
) -> Result<(), AdmissionError> {
    Err(AdmissionError::UpdatesUnsupported)
}

/// Decide whether a policy document may be deleted. Always admitted.
pub fn validate_delete(_policy: &ResourceIndexPolicy) -> Result<(), AdmissionError> {
    Ok(())
}
