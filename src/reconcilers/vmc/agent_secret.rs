// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Agent Secret: the kubeconfig the managed cluster agent uses to reach the admin cluster.
//!
//! The Secret `verrazzano-cluster-<name>-agent` holds a kubeconfig whose single user
//! authenticates with the managed cluster ServiceAccount token. The API server URL is
//! the Rancher URL when Rancher is enabled, otherwise the `server` key of the
//! `verrazzano-admin-cluster` ConfigMap.

use super::components::Components;
use super::{agent_secret_name, generate_managed_resource_name, secret_data};
use crate::constants::{
    ADMIN_CLUSTER_CONFIGMAP, ADMIN_CLUSTER_SERVER_KEY, CA_CRT_KEY, CATTLE_SYSTEM_NAMESPACE,
    KUBECONFIG_KEY, MANAGED_CLUSTER_NAME_KEY, MULTICLUSTER_NAMESPACE, PRIVATE_CA_BUNDLE_KEY,
    PRIVATE_CA_BUNDLE_SECRET, TOKEN_KEY, VERRAZZANO_SYSTEM_NAMESPACE, VERRAZZANO_TLS_SECRET,
};
use crate::crd::VerrazzanoManagedCluster;
use crate::errors::SyncError;
use crate::reconcilers::resources::{
    controller_owner_reference, create_or_update, set_controller_reference,
};
use crate::store::{self, read_secret_value, ObjectStore, OperationResult};
use base64::Engine;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, ServiceAccount};
use kube::ResourceExt;
use serde_json::json;
use tracing::debug;

const KUBECONFIG_CLUSTER: &str = "admin";
const KUBECONFIG_USER: &str = "mcAgent";
const KUBECONFIG_CONTEXT: &str = "defaultContext";

/// Create or update the agent Secret of a managed cluster.
///
/// # Errors
///
/// Returns an error when the ServiceAccount token or the admin API server URL cannot
/// be found, or when a store call fails.
pub async fn sync_agent_secret(
    store: &dyn ObjectStore,
    components: &Components,
    vmc: &VerrazzanoManagedCluster,
) -> Result<OperationResult, SyncError> {
    let namespace = vmc.namespace().unwrap_or_default();
    let name = vmc.name_any();
    let sa_name = vmc
        .spec
        .service_account
        .clone()
        .unwrap_or_else(|| generate_managed_resource_name(&name));

    let token = service_account_token(store, &namespace, &sa_name).await?;
    let server = admin_server_url(store, components).await?;
    let ca_data = admin_ca_data(store).await?;
    let kubeconfig = build_kubeconfig(&server, &ca_data, &token)?;
    let owner = controller_owner_reference(vmc)?;

    let data = secret_data([
        (KUBECONFIG_KEY, kubeconfig),
        (MANAGED_CLUSTER_NAME_KEY, name.clone()),
    ]);
    let (_, result) =
        create_or_update::<Secret, _>(store, &namespace, &agent_secret_name(&name), |secret| {
            secret.type_ = Some("Opaque".to_string());
            secret.data = Some(data);
            set_controller_reference(&mut secret.metadata, owner);
        })
        .await?;
    debug!(vmc = %name, server = %server, result = ?result, "Synced agent secret");
    Ok(result)
}

/// Token of the managed cluster ServiceAccount.
///
/// The token Secret is the first one the ServiceAccount lists, falling back to
/// `<service-account>-token`.
async fn service_account_token(
    store: &dyn ObjectStore,
    namespace: &str,
    sa_name: &str,
) -> Result<String, SyncError> {
    let listed = store::get_opt::<ServiceAccount>(store, namespace, sa_name)
        .await?
        .and_then(|sa| sa.secrets)
        .and_then(|secrets| secrets.into_iter().next())
        .and_then(|reference| reference.name);
    let secret_name = listed.unwrap_or_else(|| format!("{sa_name}-token"));

    read_secret_value(store, namespace, &secret_name, TOKEN_KEY)
        .await?
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            SyncError::Invalid(format!(
                "service account token secret {namespace}/{secret_name} has no {TOKEN_KEY}"
            ))
        })
}

async fn admin_server_url(
    store: &dyn ObjectStore,
    components: &Components,
) -> Result<String, SyncError> {
    if components.rancher_enabled() {
        if let Some(url) = components.rancher_url() {
            return Ok(url.to_string());
        }
        debug!("Rancher is enabled but has no URL yet, using the admin cluster ConfigMap");
    }

    store::get_opt::<ConfigMap>(store, MULTICLUSTER_NAMESPACE, ADMIN_CLUSTER_CONFIGMAP)
        .await?
        .and_then(|cm| cm.data)
        .and_then(|mut data| data.remove(ADMIN_CLUSTER_SERVER_KEY))
        .filter(|server| !server.is_empty())
        .ok_or_else(|| {
            SyncError::Invalid(format!(
                "failed to find the admin cluster API server URL in ConfigMap {MULTICLUSTER_NAMESPACE}/{ADMIN_CLUSTER_CONFIGMAP}"
            ))
        })
}

/// CA the agent trusts: the private CA bundle if present, else the Verrazzano CA.
async fn admin_ca_data(store: &dyn ObjectStore) -> Result<String, SyncError> {
    if let Some(bundle) = read_secret_value(
        store,
        CATTLE_SYSTEM_NAMESPACE,
        PRIVATE_CA_BUNDLE_SECRET,
        PRIVATE_CA_BUNDLE_KEY,
    )
    .await?
    .filter(|b| !b.is_empty())
    {
        return Ok(bundle);
    }
    Ok(
        read_secret_value(store, VERRAZZANO_SYSTEM_NAMESPACE, VERRAZZANO_TLS_SECRET, CA_CRT_KEY)
            .await?
            .unwrap_or_default(),
    )
}

/// Render a kubeconfig for the admin cluster authenticated by `token`.
///
/// # Errors
///
/// Returns [`SyncError::Serialize`] if the YAML cannot be produced.
pub fn build_kubeconfig(server: &str, ca_data: &str, token: &str) -> Result<String, SyncError> {
    let kubeconfig = json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{
            "name": KUBECONFIG_CLUSTER,
            "cluster": {
                "server": server,
                "certificate-authority-data":
                    base64::engine::general_purpose::STANDARD.encode(ca_data),
            },
        }],
        "users": [{
            "name": KUBECONFIG_USER,
            "user": { "token": token },
        }],
        "contexts": [{
            "name": KUBECONFIG_CONTEXT,
            "context": { "cluster": KUBECONFIG_CLUSTER, "user": KUBECONFIG_USER },
        }],
        "current-context": KUBECONFIG_CONTEXT,
    });
    serde_yaml::to_string(&kubeconfig).map_err(|e| SyncError::serialize("agent kubeconfig", e))
}

#[cfg(test)]
#[path = "agent_secret_tests.rs"]
mod agent_secret_tests;
