use std::sync::Arc;
use std::time::Instant;

use kube::Client;

use crate::health::HealthState;

/// Shared context for the controllers
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Namespace holding the policy-server workloads and their binding ConfigMaps
    pub workers_namespace: String,
    /// Health/metrics state; `None` when running without the health server (tests)
    pub health: Option<Arc<HealthState>>,
}

impl Context {
    pub fn new(client: Client, workers_namespace: &str, health: Option<Arc<HealthState>>) -> Self {
        Self {
            client,
            workers_namespace: workers_namespace.to_string(),
            health,
        }
    }

    /// Record a completed reconciliation for the metrics endpoint
    pub fn record_reconcile(&self, controller: &str, namespace: &str, name: &str, start: Instant) {
        if let Some(health) = &self.health {
            health
                .metrics
                .record_reconcile(controller, namespace, name, start.elapsed().as_secs_f64());
        }
    }

    /// Record a failed reconciliation for the metrics endpoint
    pub fn record_error(&self, controller: &str, namespace: &str, name: &str) {
        if let Some(health) = &self.health {
            health.metrics.record_error(controller, namespace, name);
        }
    }

    /// Update the replica gauges for a PolicyServer
    pub fn record_replicas(&self, name: &str, desired: i32, ready: i32) {
        if let Some(health) = &self.health {
            health
                .metrics
                .set_policy_server_replicas(name, i64::from(desired), i64::from(ready));
        }
    }
}
