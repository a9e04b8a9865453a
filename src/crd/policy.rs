//! AdmissionPolicy and ClusterAdmissionPolicy CRD definitions
//!
//! Both kinds bind a policy module to a named PolicyServer worker pool:
//! - AdmissionPolicy is namespaced
//! - ClusterAdmissionPolicy is cluster-scoped
//!
//! They share the same spec shape (`PolicySpec`) and status shape
//! (`PolicyStatus`), and both implement the [`Policy`] trait so webhook
//! handling and reconciliation are written once for the two kinds.

use kube::{Api, Client, CustomResource, Resource, ResourceExt};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Fields shared by both binding kinds
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    /// Name of the PolicyServer this binding is scheduled on.
    /// Empty means the binding is not assigned to any pool.
    #[serde(default)]
    pub policy_server: String,

    /// Policy module URI evaluated by the worker pool
    pub module: String,

    /// Opaque module configuration passed through to the workers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<serde_json::Value>,

    /// Admission rules selecting the requests this policy applies to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<AdmissionRule>,

    /// What the workers do when module evaluation fails
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Whether the module may mutate admitted objects
    #[serde(default)]
    pub mutating: bool,
}

/// A single admission rule
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRule {
    /// API groups the rule applies to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_groups: Vec<String>,

    /// API versions the rule applies to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_versions: Vec<String>,

    /// Resources the rule applies to (e.g., "pods", "*/*")
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,

    /// Operations the rule applies to (e.g., "CREATE", "*")
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<String>,
}

impl AdmissionRule {
    /// A rule can match requests only when it names at least one operation
    /// and at least one resource.
    pub fn is_complete(&self) -> bool {
        !self.operations.is_empty() && !self.resources.is_empty()
    }
}

/// Failure disposition applied by the workers when evaluation fails
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Reject the request when the module cannot be evaluated
    #[default]
    Fail,
    /// Admit the request when the module cannot be evaluated
    Ignore,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::Fail => write!(f, "Fail"),
            FailurePolicy::Ignore => write!(f, "Ignore"),
        }
    }
}

/// AdmissionPolicy is the Schema for the admissionpolicies API
///
/// A namespaced binding of a policy module to a PolicyServer worker pool.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "policies.example.com",
    version = "v1alpha1",
    kind = "AdmissionPolicy",
    plural = "admissionpolicies",
    shortname = "ap",
    namespaced,
    status = "PolicyStatus",
    printcolumn = r#"{"name":"PolicyServer", "type":"string", "jsonPath":".spec.policyServer"}"#,
    printcolumn = r#"{"name":"Mutating", "type":"boolean", "jsonPath":".spec.mutating"}"#,
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.policyStatus"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionPolicySpec {
    #[serde(flatten)]
    pub policy: PolicySpec,
}

/// ClusterAdmissionPolicy is the Schema for the clusteradmissionpolicies API
///
/// The cluster-scoped counterpart of AdmissionPolicy.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "policies.example.com",
    version = "v1alpha1",
    kind = "ClusterAdmissionPolicy",
    plural = "clusteradmissionpolicies",
    shortname = "cap",
    status = "PolicyStatus",
    printcolumn = r#"{"name":"PolicyServer", "type":"string", "jsonPath":".spec.policyServer"}"#,
    printcolumn = r#"{"name":"Mutating", "type":"boolean", "jsonPath":".spec.mutating"}"#,
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.policyStatus"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAdmissionPolicySpec {
    #[serde(flatten)]
    pub policy: PolicySpec,
}

/// Status shared by both binding kinds
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStatus {
    /// Scheduling state of the binding on its policy server
    #[serde(default)]
    pub policy_status: PolicyState,
}

/// Scheduling state of a binding
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PolicyState {
    /// No policy server assigned
    #[default]
    Unscheduled,
    /// Assigned pool exists but is not fully ready
    Scheduled,
    /// Assigned pool exists and all workers are ready
    Active,
    /// Assigned pool does not exist
    Unschedulable,
}

impl PolicyState {
    /// Returns the wire representation of this state
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyState::Unscheduled => "unscheduled",
            PolicyState::Scheduled => "scheduled",
            PolicyState::Active => "active",
            PolicyState::Unschedulable => "unschedulable",
        }
    }
}

impl std::fmt::Display for PolicyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Common surface of the two binding kinds
///
/// Keeps the webhook handlers and the binding reconciler generic: both kinds
/// expose their shared spec, their current scheduling state, and the Api
/// scoped the way the kind requires.
pub trait Policy:
    Resource<DynamicType = ()>
    + Clone
    + std::fmt::Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
    /// The shared binding spec
    fn policy_spec(&self) -> &PolicySpec;

    /// The current scheduling state, if a status has been written
    fn state(&self) -> Option<PolicyState>;

    /// Api scoped to this object (its namespace for namespaced kinds)
    fn api(&self, client: Client) -> Api<Self>;

    /// Api listing this kind across the whole cluster
    fn all(client: Client) -> Api<Self>;

    /// Lowercase plural used in logs and binding ids
    fn kind_plural() -> &'static str;

    /// Stable identifier for this binding in a pool's configuration
    fn binding_id(&self) -> String {
        match self.namespace() {
            Some(ns) => format!("{}/{}/{}", Self::kind_plural(), ns, self.name_any()),
            None => format!("{}/{}", Self::kind_plural(), self.name_any()),
        }
    }
}

impl Policy for AdmissionPolicy {
    fn policy_spec(&self) -> &PolicySpec {
        &self.spec.policy
    }

    fn state(&self) -> Option<PolicyState> {
        self.status.as_ref().map(|s| s.policy_status.clone())
    }

    fn api(&self, client: Client) -> Api<Self> {
        // Objects observed through the API server always carry a namespace.
        Api::namespaced(client, &self.namespace().unwrap_or_default())
    }

    fn all(client: Client) -> Api<Self> {
        Api::all(client)
    }

    fn kind_plural() -> &'static str {
        "admissionpolicies"
    }
}

impl Policy for ClusterAdmissionPolicy {
    fn policy_spec(&self) -> &PolicySpec {
        &self.spec.policy
    }

    fn state(&self) -> Option<PolicyState> {
        self.status.as_ref().map(|s| s.policy_status.clone())
    }

    fn api(&self, client: Client) -> Api<Self> {
        Api::all(client)
    }

    fn all(client: Client) -> Api<Self> {
        Api::all(client)
    }

    fn kind_plural() -> &'static str {
        "clusteradmissionpolicies"
    }
}
