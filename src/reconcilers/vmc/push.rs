// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Push the agent and registration Secrets to the managed cluster through Rancher.
//!
//! Once the Rancher agent on the managed cluster is connected, there is no need to wait
//! for someone to apply the manifest: the Secrets are written straight into
//! `verrazzano-system` over the Rancher Kubernetes proxy, as the Verrazzano cluster
//! user.

use super::manifest::rancher_cluster_id;
use super::{agent_secret_name, registration_secret_name};
use crate::constants::{MCAGENT_SECRET, MCREGISTRATION_SECRET, VERRAZZANO_SYSTEM_NAMESPACE};
use crate::context::Context;
use crate::crd::VerrazzanoManagedCluster;
use crate::errors::SyncError;
use crate::rancher::proxy::{create_or_update_secret_rancher_proxy, managed_namespace_exists};
use crate::rancher::registration::is_managed_cluster_active_in_rancher;
use crate::store;
use k8s_openapi::api::core::v1::Secret;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use tracing::{debug, info};

/// Copy the agent and registration Secrets onto the managed cluster.
///
/// Returns `true` when both Secrets were pushed. Nothing is pushed while the VMC has
/// no ClusterID, the cluster is not active in Rancher, or the managed cluster has no
/// `verrazzano-system` namespace yet.
///
/// # Errors
///
/// Returns an error when a local Secret is missing or a Rancher call fails.
pub async fn push_manifest_objects(
    ctx: &Context,
    vmc: &VerrazzanoManagedCluster,
) -> Result<bool, SyncError> {
    let cluster_id = rancher_cluster_id(vmc);
    if cluster_id.is_empty() {
        return Ok(false);
    }

    let store = ctx.store();
    let config = ctx.rancher.verrazzano_cluster_user_config(store).await?;
    if !is_managed_cluster_active_in_rancher(&config, &cluster_id).await? {
        debug!(cluster_id = %cluster_id, "Managed cluster is not active yet, not pushing manifest objects");
        return Ok(false);
    }
    if !managed_namespace_exists(&config, &cluster_id, VERRAZZANO_SYSTEM_NAMESPACE).await? {
        debug!(cluster_id = %cluster_id, "Managed cluster has no verrazzano-system namespace yet");
        return Ok(false);
    }

    let namespace = vmc.namespace().unwrap_or_default();
    let name = vmc.name_any();
    for (source, target) in [
        (agent_secret_name(&name), MCAGENT_SECRET),
        (registration_secret_name(&name), MCREGISTRATION_SECRET),
    ] {
        let local = store::get::<Secret>(store, &namespace, &source).await?;
        let mut remote = Secret {
            metadata: ObjectMeta {
                name: Some(target.to_string()),
                namespace: Some(VERRAZZANO_SYSTEM_NAMESPACE.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let result = create_or_update_secret_rancher_proxy(&mut remote, &config, &cluster_id, |secret| {
            secret.data = local.data.clone();
            secret.type_ = local.type_.clone();
            Ok(())
        })
        .await?;
        debug!(cluster_id = %cluster_id, secret = %target, result = ?result, "Pushed secret to managed cluster");
    }

    info!(vmc = %name, cluster_id = %cluster_id, "Manifest objects pushed to the managed cluster");
    Ok(true)
}

#[cfg(test)]
#[path = "push_tests.rs"]
mod push_tests;
