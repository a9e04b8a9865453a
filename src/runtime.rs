//! Worker-runtime driver for PolicyServer pools
//!
//! A pool's effective binding configuration lives in a ConfigMap named
//! `policy-server-<pool>` in the workers namespace, owned by the PolicyServer
//! object so it is garbage-collected with the pool. The policy-server
//! workload watches this ConfigMap; the operator only writes it.
//!
//! Every operation here is idempotent: applying the same binding set twice,
//! removing an entry that is already gone, and tearing down a ConfigMap that
//! no longer exists are all no-op successes, so the reconcilers can retry
//! freely after partial failures.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{DeleteParams, ObjectMeta, Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::Serialize;
use tracing::debug;

use crate::controller::error::Result;
use crate::crd::{FailurePolicy, PolicyServer};

/// Operator field manager name for server-side apply
pub const FIELD_MANAGER: &str = "policy-operator";

/// ConfigMap key holding the serialized binding set
pub const BINDINGS_KEY: &str = "bindings.json";

/// One binding as projected into a pool's effective configuration
///
/// The `id` keys the entry in the rendered binding set; the remaining fields
/// are what the workers need to load and evaluate the policy module.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BindingRef {
    #[serde(skip)]
    pub id: String,
    pub module: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<serde_json::Value>,
    pub failure_policy: FailurePolicy,
    pub mutating: bool,
}

/// Name of the ConfigMap carrying a pool's binding set
pub fn config_map_name(pool: &str) -> String {
    format!("policy-server-{}", pool)
}

/// Render the binding set to ConfigMap data.
///
/// Entries are keyed by binding id in a BTreeMap, so the serialized JSON is
/// canonical: any permutation of the same binding set renders byte-identical
/// data and the server-side apply below becomes a no-op.
pub fn render_bindings(refs: &[BindingRef]) -> Result<BTreeMap<String, String>> {
    let mut entries = BTreeMap::new();
    for binding in refs {
        entries.insert(binding.id.clone(), serde_json::to_value(binding)?);
    }

    Ok(BTreeMap::from([(
        BINDINGS_KEY.to_string(),
        serde_json::to_string(&entries)?,
    )]))
}

/// Standard labels for a pool's runtime resources
fn pool_labels(pool: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), pool.to_string()),
        (
            "app.kubernetes.io/component".to_string(),
            "policy-server".to_string(),
        ),
        (
            "app.kubernetes.io/managed-by".to_string(),
            FIELD_MANAGER.to_string(),
        ),
        (
            "policies.example.com/policy-server".to_string(),
            pool.to_string(),
        ),
    ])
}

/// Owner reference tying a pool's runtime resources to the PolicyServer
///
/// PolicyServer is cluster-scoped, so it may own namespaced dependents in
/// any namespace.
fn owner_reference(server: &PolicyServer) -> OwnerReference {
    OwnerReference {
        api_version: PolicyServer::api_version(&()).to_string(),
        kind: PolicyServer::kind(&()).to_string(),
        name: server.name_any(),
        uid: server.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Build the ConfigMap carrying a pool's binding set
fn binding_config_map(
    server: &PolicyServer,
    namespace: &str,
    data: BTreeMap<String, String>,
) -> ConfigMap {
    let pool = server.name_any();
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(config_map_name(&pool)),
            namespace: Some(namespace.to_string()),
            labels: Some(pool_labels(&pool)),
            owner_references: Some(vec![owner_reference(server)]),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

/// Apply the full binding set to a pool's configuration using server-side apply
pub async fn apply_bindings(
    client: &Client,
    namespace: &str,
    server: &PolicyServer,
    refs: &[BindingRef],
) -> Result<()> {
    let config_map = binding_config_map(server, namespace, render_bindings(refs)?);
    let name = config_map.name_any();

    let api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    let params = PatchParams::apply(FIELD_MANAGER).force();
    api.patch(&name, &params, &Patch::Apply(&config_map)).await?;

    debug!(config_map = %name, bindings = refs.len(), "Applied binding set");
    Ok(())
}

/// Remove a single binding from a pool's configuration.
///
/// Read-modify-write on the ConfigMap; a missing ConfigMap or an entry that
/// is already absent is a no-op success, so deletion cleanup can be retried
/// after a crash without caring how far the previous attempt got.
pub async fn remove_binding(
    client: &Client,
    namespace: &str,
    pool: &str,
    binding_id: &str,
) -> Result<()> {
    let name = config_map_name(pool);
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);

    let Some(config_map) = api.get_opt(&name).await? else {
        debug!(config_map = %name, "Binding ConfigMap already gone, nothing to remove");
        return Ok(());
    };

    let Some(raw) = config_map.data.as_ref().and_then(|d| d.get(BINDINGS_KEY)) else {
        return Ok(());
    };

    let mut entries: BTreeMap<String, serde_json::Value> = serde_json::from_str(raw)?;
    if entries.remove(binding_id).is_none() {
        return Ok(());
    }

    let patch = serde_json::json!({
        "data": { BINDINGS_KEY: serde_json::to_string(&entries)? }
    });
    api.patch(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?;

    debug!(config_map = %name, binding = %binding_id, "Removed binding from pool configuration");
    Ok(())
}

/// Delete a pool's runtime configuration; already deleted is a no-op success
pub async fn teardown(client: &Client, namespace: &str, pool: &str) -> Result<()> {
    let name = config_map_name(pool);
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);

    match api.delete(&name, &DeleteParams::default()).await {
        Ok(_) => {
            debug!(config_map = %name, "Deleted binding ConfigMap");
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}
