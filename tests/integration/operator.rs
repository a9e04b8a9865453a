//! Operator spawning utilities for integration tests
//!
//! Each test gets its own operator instance to avoid watch/state issues
//! between tests. The operator runs in the test's tokio runtime and drives
//! all three controllers: the PolicyServer pool controller plus the binding
//! controllers for both policy kinds.

use kube::Client;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use policy_operator::crd::{AdmissionPolicy, ClusterAdmissionPolicy};
use policy_operator::{Context, run_policy_controller, run_policy_server_controller};

/// A scoped operator that runs for the duration of a test
pub struct ScopedOperator {
    handle: JoinHandle<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ScopedOperator {
    /// Start a new operator instance
    ///
    /// Binding ConfigMaps are written to `workers_namespace`; tests pass
    /// their own namespace so runtime state is cleaned up with it. The
    /// operator is automatically stopped when dropped.
    pub async fn start(client: Client, workers_namespace: &str) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let ctx = Arc::new(Context::new(client, workers_namespace, None));

        tracing::info!("Starting scoped operator controllers...");

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = run_policy_server_controller(ctx.clone()) => {
                    tracing::debug!("PolicyServer controller exited normally");
                }
                _ = run_policy_controller::<AdmissionPolicy>(ctx.clone()) => {
                    tracing::debug!("AdmissionPolicy controller exited normally");
                }
                _ = run_policy_controller::<ClusterAdmissionPolicy>(ctx) => {
                    tracing::debug!("ClusterAdmissionPolicy controller exited normally");
                }
                _ = shutdown_rx => {
                    tracing::debug!("Operator received shutdown signal");
                }
            }
        });

        // Give the controllers a moment to start watching
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        Self {
            handle,
            shutdown_tx: Some(shutdown_tx),
        }
    }
}

impl Drop for ScopedOperator {
    fn drop(&mut self) {
        // Send shutdown signal (ignore error if receiver already dropped)
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        // Abort the task to ensure it stops
        self.handle.abort();
    }
}

/// Helper function that starts a scoped operator which will be properly
/// cleaned up when the returned guard drops
pub async fn ensure_operator_running(client: Client, workers_namespace: &str) -> ScopedOperator {
    ScopedOperator::start(client, workers_namespace).await
}
