pub mod controller;
pub mod crd;
pub mod health;
pub mod runtime;
pub mod webhooks;

pub use controller::{
    BackoffConfig, Context, Error, Result, error_policy, policy_server_error_policy,
    reconcile_policy, reconcile_policy_server,
};
pub use crd::{
    AdmissionPolicy, ClusterAdmissionPolicy, FINALIZER, Policy, PolicyServer, PolicyState,
};
pub use health::{HealthState, Metrics};
pub use webhooks::{
    WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookError, run_webhook_server,
};

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::runtime::Controller;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::Api;

/// Run the PolicyServer controller (cluster-wide).
///
/// Watches PolicyServer resources plus the binding ConfigMaps they own in
/// the workers namespace, so runtime drift triggers reconciliation. It can
/// be called from main.rs or spawned as a background task during
/// integration tests.
pub async fn run_policy_server_controller(ctx: Arc<Context>) {
    tracing::info!(
        workers_namespace = %ctx.workers_namespace,
        "Starting controller for PolicyServer resources"
    );

    // Mark as ready once the primary controller starts
    if let Some(ref state) = ctx.health {
        state.set_ready(true).await;
    }

    let servers: Api<PolicyServer> = Api::all(ctx.client.clone());
    let config_maps: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), &ctx.workers_namespace);

    // Use any_semantic() for more reliable resource discovery in test environments
    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(servers, watcher_config.clone())
        .owns(config_maps, watcher_config)
        .run(reconcile_policy_server, policy_server_error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    tracing::debug!("Reconciled policyserver: {}", obj.name);
                }
                Err(e) => {
                    // NotFound errors are expected after deletion when related
                    // watch events trigger reconciliation for a deleted object.
                    // Log these at debug level instead of error.
                    let is_not_found = matches!(
                        &e,
                        kube::runtime::controller::Error::ReconcilerFailed(err, _) if err.is_not_found()
                    );
                    if is_not_found {
                        tracing::debug!("Object no longer exists (likely deleted): {:?}", e);
                    } else {
                        tracing::error!("PolicyServer reconciliation error: {:?}", e);
                    }
                }
            }
        })
        .await;

    // This should never complete in normal operation
    tracing::error!("PolicyServer controller stream ended unexpectedly");
}

/// Run a binding controller (cluster-wide).
///
/// Instantiate with [`AdmissionPolicy`] or [`ClusterAdmissionPolicy`]; the
/// reconcile logic is shared through the [`Policy`] trait.
pub async fn run_policy_controller<P: Policy>(ctx: Arc<Context>) {
    tracing::info!("Starting controller for {} resources", P::kind(&()));

    let policies: Api<P> = P::all(ctx.client.clone());
    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(policies, watcher_config)
        .run(reconcile_policy::<P>, error_policy::<P>, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    tracing::debug!("Reconciled binding: {}", obj.name);
                }
                Err(e) => {
                    let is_not_found = matches!(
                        &e,
                        kube::runtime::controller::Error::ReconcilerFailed(err, _) if err.is_not_found()
                    );
                    if is_not_found {
                        tracing::debug!("Binding no longer exists (likely deleted): {:?}", e);
                    } else {
                        tracing::error!("Binding reconciliation error: {:?}", e);
                    }
                }
            }
        })
        .await;

    tracing::error!("{} controller stream ended unexpectedly", P::kind(&()));
}
