//! PolicyServer reconciler
//!
//! Converges each pool's effective binding configuration in the worker
//! runtime, summarizes workload readiness into the pool status, and gates
//! pool deletion on the recomputed reverse index: a pool cannot finish
//! deleting while any binding still references it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, error, info, instrument, warn};

use crate::controller::context::Context;
use crate::controller::error::{BackoffConfig, Error, Result};
use crate::controller::index::{bindings_referencing, describe_refs};
use crate::controller::status::ConditionBuilder;
use crate::crd::{PolicyServer, PolicyServerStatus, FINALIZER};
use crate::runtime::{self, FIELD_MANAGER};

/// Controller label used in metrics for this reconciler
const CONTROLLER: &str = "policyservers";

/// Steady-state requeue interval
const STEADY_REQUEUE: Duration = Duration::from_secs(30);

/// Requeue interval while deletion is blocked by referencing bindings
const BLOCKED_REQUEUE: Duration = Duration::from_secs(10);

/// Reconcile one PolicyServer pool
#[instrument(skip(server, ctx), fields(name = %server.name_any()))]
pub async fn reconcile_policy_server(
    server: Arc<PolicyServer>,
    ctx: Arc<Context>,
) -> Result<Action> {
    let start = Instant::now();
    let name = server.name_any();

    debug!("Reconciling PolicyServer");

    if server.metadata.deletion_timestamp.is_some() {
        let action = handle_deletion(&server, &ctx).await?;
        ctx.record_reconcile(CONTROLLER, "", &name, start);
        return Ok(action);
    }

    if !has_finalizer(&server) {
        add_finalizer(&server, &ctx).await?;
        ctx.record_reconcile(CONTROLLER, "", &name, start);
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    // Converge the pool's effective binding set in the worker runtime. The
    // reference set is recomputed from a fresh list on every pass.
    let refs = bindings_referencing(&ctx.client, &name).await?;
    runtime::apply_bindings(&ctx.client, &ctx.workers_namespace, &server, &refs).await?;

    // Summarize workload readiness into status.
    let observed = get_workload_status(&ctx, &name).await?;
    let (replicas, ready_replicas) = observed.unwrap_or((0, 0));
    update_status(&server, &ctx, observed).await?;
    ctx.record_replicas(&name, replicas, ready_replicas);

    ctx.record_reconcile(CONTROLLER, "", &name, start);
    Ok(Action::requeue(STEADY_REQUEUE))
}

/// Handle deletion of a PolicyServer
///
/// Deletion is blocked while any binding of either kind still references the
/// pool; blocked is a steady requeue, not an error. Once the reference set is
/// empty, runtime state is torn down before the deletion guard is released.
async fn handle_deletion(server: &PolicyServer, ctx: &Context) -> Result<Action> {
    if !has_finalizer(server) {
        return Ok(Action::await_change());
    }

    let name = server.name_any();
    let refs = bindings_referencing(&ctx.client, &name).await?;
    if !refs.is_empty() {
        info!(
            dependents = refs.len(),
            bindings = %describe_refs(&refs),
            "PolicyServer deletion blocked by referencing bindings"
        );
        return Ok(Action::requeue(BLOCKED_REQUEUE));
    }

    info!("No bindings reference the pool, tearing down runtime state");
    runtime::teardown(&ctx.client, &ctx.workers_namespace, &name).await?;
    remove_finalizer(server, ctx).await?;

    Ok(Action::await_change())
}

/// Name of the pool's worker Deployment, materialized by an external actor
fn workload_name(pool: &str) -> String {
    format!("policy-server-{}", pool)
}

/// Observed replica counts from the pool's worker Deployment
///
/// `None` means the Deployment does not exist yet; the pool then reads as
/// 0/0 and stays unready.
async fn get_workload_status(ctx: &Context, pool: &str) -> Result<Option<(i32, i32)>> {
    let deployments: Api<Deployment> =
        Api::namespaced(ctx.client.clone(), &ctx.workers_namespace);

    match deployments.get_opt(&workload_name(pool)).await? {
        Some(deployment) => {
            let status = deployment.status.unwrap_or_default();
            Ok(Some((
                status.replicas.unwrap_or(0),
                status.ready_replicas.unwrap_or(0),
            )))
        }
        None => Ok(None),
    }
}

/// Readiness verdict for the Ready condition
fn readiness(desired: i32, observed: Option<(i32, i32)>) -> (bool, &'static str, String) {
    let (_, ready) = observed.unwrap_or((0, 0));
    let is_ready = desired > 0 && ready >= desired;

    if is_ready {
        (
            true,
            "AllReplicasReady",
            format!("{}/{} worker replicas ready", ready, desired),
        )
    } else if observed.is_none() {
        (
            false,
            "WorkloadNotFound",
            "worker Deployment not found".to_string(),
        )
    } else {
        (
            false,
            "ReplicasNotReady",
            format!("{}/{} worker replicas ready", ready, desired),
        )
    }
}

/// Write the observed replica summary to the status subresource, only when
/// it differs from the current value
async fn update_status(
    server: &PolicyServer,
    ctx: &Context,
    observed: Option<(i32, i32)>,
) -> Result<()> {
    let name = server.name_any();
    let (replicas, ready_replicas) = observed.unwrap_or((0, 0));
    let (is_ready, reason, message) = readiness(server.spec.replicas, observed);

    let existing = server.status.clone().unwrap_or_default();
    let conditions =
        ConditionBuilder::from_existing(existing.conditions.clone(), server.metadata.generation)
            .ready(is_ready, reason, &message)
            .build();

    let status = PolicyServerStatus {
        replicas,
        ready_replicas,
        conditions,
    };
    if status == existing {
        return Ok(());
    }

    let api: Api<PolicyServer> = Api::all(ctx.client.clone());
    let patch = serde_json::json!({ "status": status });
    api.patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?;

    debug!(replicas, ready_replicas, ready = is_ready, "Updated PolicyServer status");
    Ok(())
}

/// Check whether the pool carries the deletion guard
fn has_finalizer(server: &PolicyServer) -> bool {
    server.finalizers().iter().any(|f| f.as_str() == FINALIZER)
}

/// Add the deletion guard, preserving any foreign finalizers
async fn add_finalizer(server: &PolicyServer, ctx: &Context) -> Result<()> {
    let mut finalizers = server.finalizers().to_vec();
    finalizers.push(FINALIZER.to_string());

    let patch = serde_json::json!({
        "metadata": { "finalizers": finalizers }
    });

    let api: Api<PolicyServer> = Api::all(ctx.client.clone());
    api.patch(
        &server.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;

    debug!("Added deletion guard finalizer");
    Ok(())
}

/// Release the deletion guard, leaving foreign finalizers in place
async fn remove_finalizer(server: &PolicyServer, ctx: &Context) -> Result<()> {
    let remaining: Vec<String> = server
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != FINALIZER)
        .cloned()
        .collect();

    let patch = if remaining.is_empty() {
        serde_json::json!({ "metadata": { "finalizers": null } })
    } else {
        serde_json::json!({ "metadata": { "finalizers": remaining } })
    };

    let api: Api<PolicyServer> = Api::all(ctx.client.clone());
    api.patch(
        &server.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;

    debug!("Released deletion guard finalizer");
    Ok(())
}

/// Error policy for PolicyServer reconciliation with exponential backoff
pub fn policy_server_error_policy(
    server: Arc<PolicyServer>,
    error: &Error,
    ctx: Arc<Context>,
) -> Action {
    let name = server.name_any();
    ctx.record_error(CONTROLLER, "", &name);

    let backoff = BackoffConfig::default();
    let delay = backoff.delay_for_error(error, 0);

    if error.is_retryable() {
        warn!(
            "Retryable error for policyserver {}: {}, requeuing in {:?}",
            name, error, delay
        );
    } else {
        error!(
            "Non-retryable error for policyserver {}: {}, requeuing in {:?}",
            name, error, delay
        );
    }

    Action::requeue(delay)
}
