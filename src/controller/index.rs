//! Reverse index from PolicyServer pools to the bindings referencing them
//!
//! The index is recomputed from a fresh cluster-wide list on every pass and
//! never persisted, so it cannot go stale across operator restarts. Bindings
//! that are terminating still count as references: a pool must stay up until
//! their cleanup has run and their finalizers are gone.

use kube::api::ListParams;
use kube::Client;

use crate::controller::error::Result;
use crate::crd::{AdmissionPolicy, ClusterAdmissionPolicy, Policy};
use crate::runtime::BindingRef;

/// Project the bindings that reference `pool` out of a listed set
pub fn collect_binding_refs<P: Policy>(items: &[P], pool: &str) -> Vec<BindingRef> {
    items
        .iter()
        .filter(|policy| policy.policy_spec().policy_server == pool)
        .map(|policy| {
            let spec = policy.policy_spec();
            BindingRef {
                id: policy.binding_id(),
                module: spec.module.clone(),
                settings: spec.settings.clone(),
                failure_policy: spec.failure_policy.clone(),
                mutating: spec.mutating,
            }
        })
        .collect()
}

/// List both binding kinds cluster-wide and collect the references to `pool`
pub async fn bindings_referencing(client: &Client, pool: &str) -> Result<Vec<BindingRef>> {
    let params = ListParams::default();

    let policies = AdmissionPolicy::all(client.clone()).list(&params).await?;
    let cluster_policies = ClusterAdmissionPolicy::all(client.clone())
        .list(&params)
        .await?;

    let mut refs = collect_binding_refs(&policies.items, pool);
    refs.extend(collect_binding_refs(&cluster_policies.items, pool));
    Ok(refs)
}

/// Log-friendly summary of a reference set
pub fn describe_refs(refs: &[BindingRef]) -> String {
    refs.iter()
        .map(|r| r.id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
