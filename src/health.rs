//! Health server for Kubernetes probes and Prometheus metrics
//!
//! Provides HTTP endpoints for:
//! - `/healthz` - Liveness probe (is the process alive?)
//! - `/readyz` - Readiness probe (is the operator ready to serve?)
//! - `/metrics` - Prometheus metrics

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

/// Labels for per-object reconciliation metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ReconcileLabels {
    pub controller: String,
    pub namespace: String,
    pub name: String,
}

impl prometheus_client::encoding::EncodeLabelSet for ReconcileLabels {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("controller", self.controller.as_str()).encode(encoder.encode_label())?;
        ("namespace", self.namespace.as_str()).encode(encoder.encode_label())?;
        ("name", self.name.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for PolicyServer replica gauges
///
/// `kind` is either `desired` or `ready`.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ReplicaLabels {
    pub name: String,
    pub kind: String,
}

impl prometheus_client::encoding::EncodeLabelSet for ReplicaLabels {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("name", self.name.as_str()).encode(encoder.encode_label())?;
        ("kind", self.kind.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics state
pub struct Metrics {
    /// Total reconciliations counter
    pub reconciliations_total: Family<ReconcileLabels, Counter>,
    /// Failed reconciliations counter
    pub reconciliation_errors_total: Family<ReconcileLabels, Counter>,
    /// Reconciliation duration histogram
    pub reconcile_duration_seconds: Family<ReconcileLabels, Histogram>,
    /// Desired and ready worker replicas per PolicyServer
    pub policy_server_replicas: Family<ReplicaLabels, Gauge>,

    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let reconciliations_total = Family::<ReconcileLabels, Counter>::default();
        registry.register(
            "policy_operator_reconciliations",
            "Total number of reconciliations",
            reconciliations_total.clone(),
        );

        let reconciliation_errors_total = Family::<ReconcileLabels, Counter>::default();
        registry.register(
            "policy_operator_reconciliation_errors",
            "Total number of reconciliation errors",
            reconciliation_errors_total.clone(),
        );

        let reconcile_duration_seconds =
            Family::<ReconcileLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 15))
            });
        registry.register(
            "policy_operator_reconcile_duration_seconds",
            "Duration of reconciliation in seconds",
            reconcile_duration_seconds.clone(),
        );

        let policy_server_replicas = Family::<ReplicaLabels, Gauge>::default();
        registry.register(
            "policy_operator_policy_server_replicas",
            "Desired and ready worker replicas per PolicyServer",
            policy_server_replicas.clone(),
        );

        Self {
            reconciliations_total,
            reconciliation_errors_total,
            reconcile_duration_seconds,
            policy_server_replicas,
            registry,
        }
    }

    /// Record a successful reconciliation
    pub fn record_reconcile(&self, controller: &str, namespace: &str, name: &str, duration_secs: f64) {
        let labels = ReconcileLabels {
            controller: controller.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        self.reconciliations_total.get_or_create(&labels).inc();
        self.reconcile_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record a failed reconciliation
    pub fn record_error(&self, controller: &str, namespace: &str, name: &str) {
        let labels = ReconcileLabels {
            controller: controller.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        self.reconciliation_errors_total
            .get_or_create(&labels)
            .inc();
    }

    /// Update worker replica gauges for a PolicyServer
    pub fn set_policy_server_replicas(&self, name: &str, desired: i64, ready: i64) {
        self.policy_server_replicas
            .get_or_create(&ReplicaLabels {
                name: name.to_string(),
                kind: "desired".to_string(),
            })
            .set(desired);
        self.policy_server_replicas
            .get_or_create(&ReplicaLabels {
                name: name.to_string(),
                kind: "ready".to_string(),
            })
            .set(ready);
    }

    /// Encode metrics to Prometheus text format
    ///
    /// Returns an empty string if encoding fails (should never happen with valid metrics).
    fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = encode(&mut buffer, &self.registry) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether the operator is ready (leadership held, controllers wired)
    pub ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    /// Mark the operator as ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the operator is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

/// Liveness probe handler
///
/// Returns 200 OK if the process is alive.
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
///
/// Returns 200 OK if the operator is ready to serve.
/// Returns 503 Service Unavailable if not ready.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
///
/// Returns Prometheus-formatted metrics.
async fn metrics(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Run the health server
///
/// Binds to 0.0.0.0:8080 and serves health/metrics endpoints.
pub async fn run_health_server(state: Arc<HealthState>) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let listener = TcpListener::bind("0.0.0.0:8080").await?;
    tracing::info!("Health server listening on 0.0.0.0:8080");

    axum::serve(listener, app).await
}
