//! Defaulting stage for managed resources
//!
//! Every PolicyServer, AdmissionPolicy and ClusterAdmissionPolicy gets the
//! deletion-guard finalizer at creation time so that cleanup always runs
//! before the object disappears. The stage is pure: it computes the JSON
//! Patch to apply (if any) and never rejects a request.

use serde::Serialize;
use serde_json::json;

use crate::crd::FINALIZER;

/// A single JSON Patch operation (RFC 6902)
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PatchOperation {
    pub op: String,
    pub path: String,
    pub value: serde_json::Value,
}

/// Compute the JSON Patch injecting the deletion-guard finalizer.
///
/// Returns `None` when the finalizer is already present, so reapplying the
/// defaulting stage to an already-defaulted object is a no-op.
pub fn finalizer_patch(finalizers: Option<&[String]>) -> Option<Vec<PatchOperation>> {
    match finalizers {
        None => Some(vec![PatchOperation {
            op: "add".to_string(),
            path: "/metadata/finalizers".to_string(),
            value: json!([FINALIZER]),
        }]),
        Some(existing) if existing.iter().any(|f| f == FINALIZER) => None,
        Some(_) => Some(vec![PatchOperation {
            op: "add".to_string(),
            path: "/metadata/finalizers/-".to_string(),
            value: json!(FINALIZER),
        }]),
    }
}
