//! PolicyServer CRD definition
//!
//! A PolicyServer declares a worker pool that evaluates admission policies.
//! The pool's Deployment is materialized by an external actor; this operator
//! maintains the pool's effective binding configuration and summarizes the
//! workload's replica readiness into the PolicyServer status.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// PolicyServer is the Schema for the policyservers API
///
/// PolicyServer resources are cluster-scoped. AdmissionPolicy and
/// ClusterAdmissionPolicy resources reference a PolicyServer by name to be
/// scheduled onto its worker pool.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "policies.example.com",
    version = "v1alpha1",
    kind = "PolicyServer",
    plural = "policyservers",
    shortname = "ps",
    status = "PolicyServerStatus",
    printcolumn = r#"{"name":"Image", "type":"string", "jsonPath":".spec.image"}"#,
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Ready", "type":"integer", "jsonPath":".status.readyReplicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PolicyServerSpec {
    /// Container image for the policy-server workers
    pub image: String,

    /// Number of worker replicas in the pool
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Resource requirements for worker pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Service account the worker pods run as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
}

fn default_replicas() -> i32 {
    1
}

/// Resource requirements for worker pods
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    /// CPU and memory limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceList>,

    /// CPU and memory requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceList>,
}

/// Resource quantities for CPU and memory
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
pub struct ResourceList {
    /// CPU quantity (e.g., "500m", "2")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    /// Memory quantity (e.g., "512Mi", "2Gi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

/// Status of the PolicyServer, summarized from the worker Deployment
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyServerStatus {
    /// Desired worker replicas observed from the workload
    #[serde(default)]
    pub replicas: i32,

    /// Ready worker replicas observed from the workload
    #[serde(default)]
    pub ready_replicas: i32,

    /// Kubernetes-style conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Kubernetes-style condition
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition: True, False, or Unknown
    pub status: String,

    /// Reason for the condition's last transition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    pub last_transition_time: String,

    /// Generation observed when condition was set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl PolicyServer {
    /// Whether the pool has all desired workers ready.
    ///
    /// A pool with zero desired replicas is never ready; bindings scheduled
    /// on it stay `scheduled` until the pool is scaled up.
    pub fn is_ready(&self) -> bool {
        let ready = self
            .status
            .as_ref()
            .map(|s| s.ready_replicas)
            .unwrap_or_default();
        self.spec.replicas > 0 && ready >= self.spec.replicas
    }
}
