//! Binding reconciler for AdmissionPolicy and ClusterAdmissionPolicy resources
//!
//! Generic over [`Policy`] so both kinds share one code path. Each pass runs
//! the same level-triggered sequence: deletion handling first (cleanup before
//! the deletion guard is released), then finalizer repair, then status
//! projection against the referenced PolicyServer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, error, info, instrument, warn};

use crate::controller::context::Context;
use crate::controller::error::{BackoffConfig, Error, Result};
use crate::controller::status::project;
use crate::crd::{Policy, PolicyServer, PolicyState, PolicyStatus, FINALIZER};
use crate::runtime::{self, FIELD_MANAGER};

/// Requeue cadence while a binding waits on its pool (missing or not ready)
const PENDING_REQUEUE: Duration = Duration::from_secs(10);

/// Requeue cadence once a binding has settled (active or unscheduled)
const SETTLED_REQUEUE: Duration = Duration::from_secs(60);

/// Reconcile one binding
#[instrument(skip(policy, ctx), fields(kind = %P::kind(&()), name = %policy.name_any(), namespace = policy.namespace().unwrap_or_default()))]
pub async fn reconcile_policy<P: Policy>(policy: Arc<P>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let name = policy.name_any();
    let namespace = policy.namespace().unwrap_or_default();

    debug!("Reconciling binding");

    if policy.meta().deletion_timestamp.is_some() {
        let action = handle_deletion(policy.as_ref(), &ctx).await?;
        ctx.record_reconcile(P::kind_plural(), &namespace, &name, start);
        return Ok(action);
    }

    // The defaulting webhook stamps the deletion guard on create; repair it
    // here for objects that predate the webhook or lost it.
    if !has_finalizer(policy.as_ref()) {
        add_finalizer(policy.as_ref(), &ctx).await?;
        ctx.record_reconcile(P::kind_plural(), &namespace, &name, start);
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    let spec = policy.policy_spec();
    let server = if spec.policy_server.is_empty() {
        None
    } else {
        let servers: Api<PolicyServer> = Api::all(ctx.client.clone());
        servers.get_opt(&spec.policy_server).await?
    };

    let desired = project(spec, server.as_ref());
    if policy.state().as_ref() != Some(&desired) {
        update_status(policy.as_ref(), &ctx, desired.clone()).await?;
        info!(status = %desired, "Updated binding status");
    }

    ctx.record_reconcile(P::kind_plural(), &namespace, &name, start);
    Ok(Action::requeue(requeue_after(&desired)))
}

/// Steady-state requeue interval for a binding in `state`
///
/// Waiting states poll faster so the binding picks up pool readiness changes
/// promptly; settled states only need a slow safety-net resync on top of the
/// watch stream.
fn requeue_after(state: &PolicyState) -> Duration {
    match state {
        PolicyState::Active | PolicyState::Unscheduled => SETTLED_REQUEUE,
        PolicyState::Scheduled | PolicyState::Unschedulable => PENDING_REQUEUE,
    }
}

/// Handle deletion of a binding
///
/// The binding's entry is removed from its pool's configuration before the
/// deletion guard is released. Any cleanup failure propagates, so the guard
/// stays in place and the pass is retried.
async fn handle_deletion<P: Policy>(policy: &P, ctx: &Context) -> Result<Action> {
    if !has_finalizer(policy) {
        // Cleanup already ran (or never applied); Kubernetes finishes the delete.
        return Ok(Action::await_change());
    }

    info!("Handling binding deletion");

    let spec = policy.policy_spec();
    if !spec.policy_server.is_empty() {
        runtime::remove_binding(
            &ctx.client,
            &ctx.workers_namespace,
            &spec.policy_server,
            &policy.binding_id(),
        )
        .await?;
    }

    remove_finalizer(policy, ctx).await?;
    Ok(Action::await_change())
}

/// Check whether the binding carries the deletion guard
fn has_finalizer<P: Policy>(policy: &P) -> bool {
    policy.finalizers().iter().any(|f| f.as_str() == FINALIZER)
}

/// Add the deletion guard, preserving any foreign finalizers
async fn add_finalizer<P: Policy>(policy: &P, ctx: &Context) -> Result<()> {
    let mut finalizers = policy.finalizers().to_vec();
    finalizers.push(FINALIZER.to_string());

    let patch = serde_json::json!({
        "metadata": { "finalizers": finalizers }
    });

    policy
        .api(ctx.client.clone())
        .patch(
            &policy.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;

    debug!("Added deletion guard finalizer");
    Ok(())
}

/// Release the deletion guard, leaving foreign finalizers in place
async fn remove_finalizer<P: Policy>(policy: &P, ctx: &Context) -> Result<()> {
    let remaining: Vec<String> = policy
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

    policy
        .api(ctx.client.clone())
        .patch(
            &policy.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;

    debug!("Released deletion guard finalizer");
    Ok(())
}

/// Write the projected scheduling state to the status subresource
async fn update_status<P: Policy>(policy: &P, ctx: &Context, state: PolicyState) -> Result<()> {
    let status = PolicyStatus {
        policy_status: state,
    };
    let patch = serde_json::json!({ "status": status });

    policy
        .api(ctx.client.clone())
        .patch_status(
            &policy.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;

    Ok(())
}

/// Error policy for binding reconciliation with exponential backoff
pub fn error_policy<P: Policy>(policy: Arc<P>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = policy.name_any();
    let namespace = policy.namespace().unwrap_or_default();
    ctx.record_error(P::kind_plural(), &namespace, &name);

    let backoff = BackoffConfig::default();
    let delay = backoff.delay_for_error(error, 0);

    if error.is_retryable() {
        warn!(
            "Retryable error for {} {}: {}, requeuing in {:?}",
            P::kind_plural(),
            name,
            error,
            delay
        );
    } else {
        error!(
            "Non-retryable error for {} {}: {}, requeuing in {:?}",
            P::kind_plural(),
            name,
            error,
            delay
        );
    }

    Action::requeue(delay)
}
