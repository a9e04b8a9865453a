//! Admission webhooks for policy bindings and policy servers
//!
//! Two synchronous stages invoked by the API server on writes:
//! - defaulting (mutating): injects the deletion-guard finalizer
//! - validation: structural checks on AdmissionPolicy and
//!   ClusterAdmissionPolicy resources before they are persisted
//!
//! Both stages are pure functions over the submitted objects; the HTTP
//! server in [`server`] only parses AdmissionReview payloads and shapes
//! responses around them.

pub mod defaulter;
pub mod server;
pub mod validation;

pub use defaulter::{PatchOperation, finalizer_patch};
pub use server::{
    WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookError, run_webhook_server,
};
pub use validation::{ValidationResult, validate_policy};
