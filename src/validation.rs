//! Whole-document validation.
//!
//! The orchestrator runs the expression sandbox over every condition and the
//! path validator over every field projection, scans for duplicate names and
//! paths, and aggregates every failure into a structured, field-addressed
//! error list. No pass is skipped because an earlier one failed, so an
//! operator sees every problem in one round trip.

use std::collections::HashSet;
use std::fmt;

use crate::jsonpath::validate_path;
use crate::policy::{ResourceIndexPolicy, MAX_CONDITIONS, MAX_FIELDS, MAX_NAME_LENGTH};
use crate::sandbox::ExpressionValidator;

/// A structured path into a policy document, e.g.
/// `spec.conditions[1].expression`.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FieldPath(String);

impl FieldPath {
    /// A path rooted at `name`.
    pub fn new(name: &str) -> Self {
        FieldPath(name.to_string())
    }

    /// Append a child field.
    pub fn child(mut self, name: &str) -> Self {
        self.0.push('.');
        self.0.push_str(name);
        self
    }

    /// Append a list index.
    pub fn index(mut self, i: usize) -> Self {
        self.0.push('[');
        self.0.push_str(&i.to_string());
        self.0.push(']');
        self
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The category of a [`ValidationError`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum ErrorType {
    /// The value at the path is not acceptable.
    Invalid,
    /// The value at the path duplicates an earlier one.
    Duplicate,
    /// A required value at the path is missing.
    Required,
}

/// One field-addressed validation failure.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ValidationError {
    /// What kind of failure this is.
    pub error_type: ErrorType,
    /// Where in the document the failure is.
    pub field_path: FieldPath,
    /// The offending value.
    pub invalid_value: String,
    /// Why the value was rejected.
    pub message: String,
}

impl ValidationError {
    /// An `Invalid` error at `field_path`.
    pub fn invalid(field_path: FieldPath, value: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError {
            error_type: ErrorType::Invalid,
            field_path,
            invalid_value: value.into(),
            message: message.into(),
        }
    }

    /// A `Duplicate` error at `field_path`.
    pub fn duplicate(field_path: FieldPath, value: impl Into<String>) -> Self {
        ValidationError {
            error_type: ErrorType::Duplicate,
            field_path,
            invalid_value: value.into(),
            message: "duplicate value".to_string(),
        }
    }

    /// A `Required` error at `field_path`.
    pub fn required(field_path: FieldPath, message: impl Into<String>) -> Self {
        ValidationError {
            error_type: ErrorType::Required,
            field_path,
            invalid_value: String::new(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error_type {
            ErrorType::Invalid => write!(
                f,
                "{}: Invalid value: \"{}\": {}",
                self.field_path, self.invalid_value, self.message
            ),
            ErrorType::Duplicate => write!(
                f,
                "{}: Duplicate value: \"{}\"",
                self.field_path, self.invalid_value
            ),
            ErrorType::Required => {
                write!(f, "{}: Required value: {}", self.field_path, self.message)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Join every error's message into one human-readable string.
pub fn aggregate(errors: &[ValidationError]) -> String {
    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    messages.join(", ")
}

/// Validate a policy document.
///
/// Four passes run unconditionally and their errors are concatenated in
/// order: condition-expression errors, field-path-syntax errors, duplicate
/// field paths, duplicate condition names. Within one expression the
/// sandbox reports only its first violation; across the document every
/// failure is reported.
///
/// # Example
///
/// ```
/// use indexpolicy::{validate_policy, ExpressionValidator, ResourceIndexPolicy};
///
/// let validator = ExpressionValidator::new(50).unwrap();
/// let policy = ResourceIndexPolicy::parse(r#"{
///     "spec": {
///         "targetResource": {"group": "g", "version": "v1", "kind": "K"},
///         "conditions": [{"name": "c", "expression": "10 - 5 > 0"}],
///         "fields": [{"path": "spec.name", "searchable": true}]
///     }
/// }"#).unwrap();
/// let errors = validate_policy(&policy, &validator);
/// assert_eq!(errors.len(), 2);
/// ```
pub fn validate_policy(
    policy: &ResourceIndexPolicy,
    expressions: &ExpressionValidator,
) -> Vec<ValidationError> {
    let mut all_errs = Vec::new();

    for (i, condition) in policy.spec.conditions.iter().enumerate() {
        for err in expressions.validate(&condition.expression) {
            all_errs.push(ValidationError::invalid(
                FieldPath::new("spec").child("conditions").index(i).child("expression"),
                condition.expression.as_str(),
                err,
            ));
        }
    }

    for (i, field) in policy.spec.fields.iter().enumerate() {
        if let Err(err) = validate_path(&field.path) {
            all_errs.push(ValidationError::invalid(
                FieldPath::new("spec").child("fields").index(i).child("path"),
                field.path.as_str(),
                err.to_string(),
            ));
        }
    }

    let mut seen_field_paths = HashSet::new();
    for (i, field) in policy.spec.fields.iter().enumerate() {
        if !seen_field_paths.insert(field.path.as_str()) {
            all_errs.push(ValidationError::duplicate(
                FieldPath::new("spec").child("fields").index(i).child("path"),
                field.path.as_str(),
            ));
        }
    }

    let mut seen_condition_names = HashSet::new();
    for (i, condition) in policy.spec.conditions.iter().enumerate() {
        if !seen_condition_names.insert(condition.name.as_str()) {
            all_errs.push(ValidationError::duplicate(
                FieldPath::new("spec").child("conditions").index(i).child("name"),
                condition.name.as_str(),
            ));
        }
    }

    all_errs
}

/// Validate the schema-level shape of a policy document.
///
/// These are the rules the storage schema enforces before the orchestrator
/// ever runs: required target-resource coordinates, entry-count bounds,
/// name and path length limits, and the current restrictions on the field
/// behavior flags.
pub fn validate_structure(policy: &ResourceIndexPolicy) -> Vec<ValidationError> {
    let mut all_errs = Vec::new();
    let spec = FieldPath::new("spec");

    let target = &policy.spec.target_resource;
    let target_path = spec.clone().child("targetResource");
    if target.group.is_empty() {
        all_errs.push(ValidationError::required(
            target_path.clone().child("group"),
            "group is required",
        ));
    }
    if target.version.is_empty() {
        all_errs.push(ValidationError::required(
            target_path.clone().child("version"),
            "version is required",
        ));
    }
    if target.kind.is_empty() {
        all_errs.push(ValidationError::required(
            target_path.child("kind"),
            "kind is required",
        ));
    }

    let conditions_path = spec.clone().child("conditions");
    if policy.spec.conditions.is_empty() {
        all_errs.push(ValidationError::required(
            conditions_path.clone(),
            "at least one condition is required",
        ));
    }
    if policy.spec.conditions.len() > MAX_CONDITIONS {
        all_errs.push(ValidationError::invalid(
            conditions_path.clone(),
            policy.spec.conditions.len().to_string(),
            format!("must contain at most {MAX_CONDITIONS} conditions"),
        ));
    }
    for (i, condition) in policy.spec.conditions.iter().enumerate() {
        if condition.name.is_empty() {
            all_errs.push(ValidationError::required(
                conditions_path.clone().index(i).child("name"),
                "name is required",
            ));
        }
        if condition.name.len() > MAX_NAME_LENGTH {
            all_errs.push(ValidationError::invalid(
                conditions_path.clone().index(i).child("name"),
                condition.name.as_str(),
                format!("must be at most {MAX_NAME_LENGTH} characters"),
            ));
        }
        if condition.expression.is_empty() {
            all_errs.push(ValidationError::required(
                conditions_path.clone().index(i).child("expression"),
                "expression is required",
            ));
        }
    }

    let fields_path = spec.child("fields");
    if policy.spec.fields.is_empty() {
        all_errs.push(ValidationError::required(
            fields_path.clone(),
            "at least one field is required",
        ));
    }
    if policy.spec.fields.len() > MAX_FIELDS {
        all_errs.push(ValidationError::invalid(
            fields_path.clone(),
            policy.spec.fields.len().to_string(),
            format!("must contain at most {MAX_FIELDS} fields"),
        ));
    }
    for (i, field) in policy.spec.fields.iter().enumerate() {
        if field.path.is_empty() {
            all_errs.push(ValidationError::required(
                fields_path.clone().index(i).child("path"),
                "path is required",
            ));
        }
        if field.path.len() > MAX_NAME_LENGTH {
            all_errs.push(ValidationError::invalid(
                fields_path.clone().index(i).child("path"),
                field.path.as_str(),
                format!("must be at most {MAX_NAME_LENGTH} characters"),
            ));
        }
        if !field.searchable {
            all_errs.push(ValidationError::invalid(
                fields_path.clone().index(i).child("searchable"),
                field.searchable.to_string(),
                "searchable must be true. Currently, only full-text search is supported.",
            ));
        }
        if field.filterable {
            all_errs.push(ValidationError::invalid(
                fields_path.clone().index(i).child("filterable"),
                field.filterable.to_string(),
                "filterable is a forward-looking option and will be added in a future release. \
                 It must be false.",
            ));
        }
        if field.facetable {
            all_errs.push(ValidationError::invalid(
                fields_path.clone().index(i).child("facetable"),
                field.facetable.to_string(),
                "facetable is a forward-looking option and will be added in a future release. \
                 It must be false.",
            ));
        }
    }

    all_errs
}
