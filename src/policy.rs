//! The resource index policy document model.
//!
//! A [`ResourceIndexPolicy`] is the declarative object an administrator
//! writes: it names a target resource kind, a set of filter conditions that
//! decide which resources of that kind get indexed, and a set of field
//! projections that decide what gets indexed. The types here mirror the
//! platform's camelCase JSON wire format; validation lives in
//! [`crate::validation`].

/// Maximum number of conditions in one policy document.
pub const MAX_CONDITIONS: usize = 10;

/// Maximum number of field projections in one policy document.
pub const MAX_FIELDS: usize = 10;

/// Maximum length of a condition name or field path, in bytes.
pub const MAX_NAME_LENGTH: usize = 256;

/// A policy for indexing resources of one kind.
///
/// # Example
///
/// ```
/// use indexpolicy::ResourceIndexPolicy;
///
/// let policy = ResourceIndexPolicy::parse(r#"{
///     "metadata": {"name": "contacts"},
///     "spec": {
///         "targetResource": {"group": "contacts.example.com", "version": "v1", "kind": "Contact"},
///         "conditions": [{"name": "is-active", "expression": "status.active == true"}],
///         "fields": [{"path": ".spec.name", "searchable": true}]
///     }
/// }"#).unwrap();
/// assert_eq!(policy.metadata.name, "contacts");
/// ```
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ResourceIndexPolicy {
    /// Object metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// The desired policy.
    pub spec: ResourceIndexPolicySpec,
    /// The last reported observations.
    #[serde(default)]
    pub status: ResourceIndexPolicyStatus,
}

impl ResourceIndexPolicy {
    /// Parse a policy document from its JSON representation.
    pub fn parse(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }
}

/// Minimal object metadata: the document's name.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ObjectMeta {
    /// The document's name.
    #[serde(default)]
    pub name: String,
}

/// The specification of a [`ResourceIndexPolicy`].
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIndexPolicySpec {
    /// The resource type this policy applies to.
    #[serde(default)]
    pub target_resource: TargetResource,
    /// Filter conditions, evaluated with OR semantics: a resource is indexed
    /// if it satisfies any condition.
    #[serde(default)]
    pub conditions: Vec<PolicyCondition>,
    /// The fields projected into the index for matched resources.
    #[serde(default)]
    pub fields: Vec<FieldPolicy>,
}

/// A versioned reference to a resource type.
///
/// Field paths may differ between API versions, so the reference is pinned
/// to one version.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct TargetResource {
    /// API group of the resource.
    #[serde(default)]
    pub group: String,
    /// API version of the resource.
    #[serde(default)]
    pub version: String,
    /// Kind of the resource.
    #[serde(default)]
    pub kind: String,
}

/// A named filter condition.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PolicyCondition {
    /// Unique identifier for the condition, used in status reporting.
    pub name: String,
    /// A filter expression that must evaluate to a boolean.
    pub expression: String,
}

/// How one resource field is projected into the index.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FieldPolicy {
    /// Path to the field value, in the restricted dot/bracket grammar.
    pub path: String,
    /// Whether the field participates in full-text search. Currently the
    /// only supported behavior, so it must be true.
    #[serde(default)]
    pub searchable: bool,
    /// Forward-looking option; must currently be false.
    #[serde(default)]
    pub filterable: bool,
    /// Forward-looking option; must currently be false.
    #[serde(default)]
    pub facetable: bool,
}

/// The reported status of a [`ResourceIndexPolicy`].
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ResourceIndexPolicyStatus {
    /// Latest available observations of the policy's state.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// One observation record in a status.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// The observation's type, e.g. `Ready`.
    #[serde(rename = "type")]
    pub condition_type: String,
    /// Whether the observation holds.
    #[serde(default)]
    pub status: ConditionStatus,
    /// A one-word reason for the current status.
    #[serde(default)]
    pub reason: String,
    /// A human-readable message.
    #[serde(default)]
    pub message: String,
    /// RFC3339 time of the last status change.
    #[serde(default)]
    pub last_transition_time: String,
}

/// The truth value of a [`Condition`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum ConditionStatus {
    /// The condition holds.
    True,
    /// The condition does not hold.
    False,
    /// The condition has not been evaluated.
    #[default]
    Unknown,
}
