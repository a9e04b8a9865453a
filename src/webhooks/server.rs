//! Webhook HTTP server handlers
//!
//! Serves the mutating (defaulting) and validating admission endpoints for
//! AdmissionPolicy, ClusterAdmissionPolicy and PolicyServer resources. The
//! handlers parse AdmissionReview payloads, delegate to the pure stages in
//! [`super::defaulter`] and [`super::validation`], and shape the response.

use axum::{Json, Router, http::StatusCode, routing::post};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::defaulter::finalizer_patch;
use super::validation::validate_policy;
use crate::crd::{AdmissionPolicy, ClusterAdmissionPolicy, Policy};

/// Kubernetes AdmissionReview request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    pub api_version: String,
    pub kind: String,
    pub request: Option<AdmissionRequest>,
}

/// AdmissionRequest contains the details of the admission request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    pub uid: String,
    pub kind: GroupVersionKind,
    pub resource: GroupVersionResource,
    pub operation: String,
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub object: Option<serde_json::Value>,
    pub old_object: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupVersionResource {
    pub group: String,
    pub version: String,
    pub resource: String,
}

/// AdmissionReview response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewResponse {
    pub api_version: String,
    pub kind: String,
    pub response: AdmissionResponse,
}

/// AdmissionResponse contains the result
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    pub uid: String,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AdmissionStatus>,
    /// Base64-encoded JSON Patch applied by the API server on mutation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionStatus {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Create the webhook router
pub fn create_webhook_router() -> Router {
    Router::new()
        .route("/validate-admission-policy", post(validate_admission_policy))
        .route(
            "/validate-cluster-admission-policy",
            post(validate_cluster_admission_policy),
        )
        .route("/mutate-admission-policy", post(mutate_resource))
        .route("/mutate-cluster-admission-policy", post(mutate_resource))
        .route("/mutate-policy-server", post(mutate_resource))
}

/// Validate AdmissionPolicy admission webhook handler
pub async fn validate_admission_policy(
    Json(review): Json<AdmissionReview>,
) -> (StatusCode, Json<AdmissionReviewResponse>) {
    review_validation::<AdmissionPolicy>(review)
}

/// Validate ClusterAdmissionPolicy admission webhook handler
pub async fn validate_cluster_admission_policy(
    Json(review): Json<AdmissionReview>,
) -> (StatusCode, Json<AdmissionReviewResponse>) {
    review_validation::<ClusterAdmissionPolicy>(review)
}

/// Shared validation flow for both binding kinds
fn review_validation<P: Policy>(
    review: AdmissionReview,
) -> (StatusCode, Json<AdmissionReviewResponse>) {
    let request = match review.request {
        Some(req) => req,
        None => {
            error!("Admission review missing request");
            return (
                StatusCode::BAD_REQUEST,
                Json(create_response(
                    "",
                    false,
                    "Missing request in AdmissionReview",
                    None,
                )),
            );
        }
    };

    let uid = request.uid.clone();
    info!(
        uid = %uid,
        kind = %P::kind_plural(),
        operation = %request.operation,
        namespace = ?request.namespace,
        name = ?request.name,
        "Processing admission request"
    );

    // Deletions are never validated
    if request.operation == "DELETE" {
        info!(uid = %uid, "DELETE operation allowed");
        return (StatusCode::OK, Json(create_response(&uid, true, "", None)));
    }

    // Parse the new object
    let policy: P = match request.object {
        Some(obj) => match serde_json::from_value(obj) {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, kind = %P::kind_plural(), "Failed to parse object");
                return (
                    StatusCode::OK,
                    Json(create_response(
                        &uid,
                        false,
                        &format!("Failed to parse object: {}", e),
                        None,
                    )),
                );
            }
        },
        None => {
            return (
                StatusCode::OK,
                Json(create_response(
                    &uid,
                    false,
                    "Missing object in request",
                    None,
                )),
            );
        }
    };

    // Parse the old object for UPDATE operations
    let old_policy: Option<P> = match &request.old_object {
        Some(obj) => match serde_json::from_value(obj.clone()) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(error = %e, kind = %P::kind_plural(), "Failed to parse old object, treating as CREATE");
                None
            }
        },
        None => None,
    };

    let result = validate_policy(
        policy.policy_spec(),
        old_policy.as_ref().map(|p| p.policy_spec()),
    );

    if !result.allowed {
        let reason = result
            .reason
            .unwrap_or_else(|| "ValidationFailed".to_string());
        let message = result
            .message
            .unwrap_or_else(|| "Validation failed".to_string());
        warn!(uid = %uid, reason = %reason, message = %message, "Admission request denied");
        return (
            StatusCode::OK,
            Json(create_response(&uid, false, &message, Some(&reason))),
        );
    }

    info!(uid = %uid, "Admission request allowed");
    (StatusCode::OK, Json(create_response(&uid, true, "", None)))
}

/// Mutating webhook handler injecting the deletion-guard finalizer
///
/// Registered for all three managed kinds; the patch only touches
/// `metadata.finalizers`, so the handler works from the raw object. The
/// defaulting stage never rejects: any failure falls back to a plain allow.
pub async fn mutate_resource(
    Json(review): Json<AdmissionReview>,
) -> (StatusCode, Json<AdmissionReviewResponse>) {
    let request = match review.request {
        Some(req) => req,
        None => {
            error!("Admission review missing request");
            return (
                StatusCode::BAD_REQUEST,
                Json(create_response(
                    "",
                    false,
                    "Missing request in AdmissionReview",
                    None,
                )),
            );
        }
    };

    let uid = request.uid.clone();
    info!(
        uid = %uid,
        kind = %request.kind.kind,
        operation = %request.operation,
        namespace = ?request.namespace,
        name = ?request.name,
        "Processing mutation request"
    );

    if request.operation == "DELETE" {
        return (StatusCode::OK, Json(create_response(&uid, true, "", None)));
    }

    let finalizers: Option<Vec<String>> = request
        .object
        .as_ref()
        .and_then(|obj| obj.pointer("/metadata/finalizers"))
        .and_then(|v| serde_json::from_value(v.clone()).ok());

    let Some(ops) = finalizer_patch(finalizers.as_deref()) else {
        return (StatusCode::OK, Json(create_response(&uid, true, "", None)));
    };

    match serde_json::to_vec(&ops) {
        Ok(patch) => {
            info!(uid = %uid, kind = %request.kind.kind, "Injecting deletion-guard finalizer");
            (
                StatusCode::OK,
                Json(create_patch_response(&uid, &STANDARD.encode(patch))),
            )
        }
        Err(e) => {
            error!(error = %e, "Failed to serialize finalizer patch, allowing unmodified");
            (StatusCode::OK, Json(create_response(&uid, true, "", None)))
        }
    }
}

/// Create an AdmissionReview response
fn create_response(
    uid: &str,
    allowed: bool,
    message: &str,
    reason: Option<&str>,
) -> AdmissionReviewResponse {
    AdmissionReviewResponse {
        api_version: "admission.k8s.io/v1".to_string(),
        kind: "AdmissionReview".to_string(),
        response: AdmissionResponse {
            uid: uid.to_string(),
            allowed,
            status: if allowed {
                None
            } else {
                Some(AdmissionStatus {
                    code: 403,
                    message: message.to_string(),
                    reason: reason.map(String::from),
                })
            },
            patch: None,
            patch_type: None,
        },
    }
}

/// Create an AdmissionReview response carrying a JSON Patch
fn create_patch_response(uid: &str, patch: &str) -> AdmissionReviewResponse {
    AdmissionReviewResponse {
        api_version: "admission.k8s.io/v1".to_string(),
        kind: "AdmissionReview".to_string(),
        response: AdmissionResponse {
            uid: uid.to_string(),
            allowed: true,
            status: None,
            patch: Some(patch.to_string()),
            patch_type: Some("JSONPatch".to_string()),
        },
    }
}

/// Default path to webhook TLS certificate
pub const WEBHOOK_CERT_PATH: &str = "/etc/webhook/certs/tls.crt";
/// Default path to webhook TLS private key
pub const WEBHOOK_KEY_PATH: &str = "/etc/webhook/certs/tls.key";
/// Default webhook server port
pub const WEBHOOK_PORT: u16 = 8443;

/// Run the webhook server with TLS
///
/// Binds to 0.0.0.0:8443 and serves the validate and mutate endpoints.
/// TLS certificates are loaded from the paths specified.
pub async fn run_webhook_server(cert_path: &str, key_path: &str) -> Result<(), WebhookError> {
    use axum_server::tls_rustls::RustlsConfig;
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let app = create_webhook_router();

    let config = RustlsConfig::from_pem_file(PathBuf::from(cert_path), PathBuf::from(key_path))
        .await
        .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], WEBHOOK_PORT));
    info!("Webhook server listening on {} with TLS", addr);

    axum_server::bind_rustls(addr, config)
        .serve(app.into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))?;

    Ok(())
}

/// Errors that can occur when running the webhook server
#[derive(Debug)]
pub enum WebhookError {
    /// TLS configuration error
    TlsConfig(String),
    /// Server error
    Server(String),
}

impl std::fmt::Display for WebhookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookError::TlsConfig(msg) => write!(f, "TLS configuration error: {}", msg),
            WebhookError::Server(msg) => write!(f, "Webhook server error: {}", msg),
        }
    }
}

impl std::error::Error for WebhookError {}
