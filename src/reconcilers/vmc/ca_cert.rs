// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CA certificate of the managed cluster, copied into `ca-secret-<name>`.

use super::manifest::rancher_cluster_id;
use super::{ca_secret_name, secret_data};
use crate::constants::{
    CAPI_KUBECONFIG_KEY, CAPI_KUBECONFIG_SECRET_SUFFIX, CA_CRT_KEY, CA_SECRET_KEY,
    VERRAZZANO_SYSTEM_NAMESPACE, VERRAZZANO_TLS_CA_SECRET,
};
use crate::context::Context;
use crate::crd::{ClusterReference, VerrazzanoManagedCluster};
use crate::errors::SyncError;
use crate::rancher::registration::{
    get_ca_cert_from_managed_cluster, is_managed_cluster_active_in_rancher,
};
use crate::reconcilers::resources::{
    controller_owner_reference, create_or_update, set_controller_reference,
};
use crate::store::{self, read_secret_value};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tracing::{debug, info};

/// Fetch the managed cluster CA and store it on the admin cluster.
///
/// Returns `true` only when the CA Secret was written and `spec.caSecret` set. Nothing
/// happens for a VMC whose `spec.caSecret` is already set.
///
/// ClusterAPI clusters are read directly through their `<cluster>-kubeconfig` Secret:
/// a `verrazzano-system/verrazzano-tls-ca` Secret marks a self-signed CA, and its
/// absence means the cluster's certificates are already trusted. Imported clusters go
/// through Rancher, need a ClusterID and must be active; the Rancher additional CA or
/// the Verrazzano TLS CA is used.
///
/// # Errors
///
/// Returns an error when the managed cluster cannot be reached or the Secret or VMC
/// write fails.
pub async fn sync_ca_cert_secret(
    ctx: &Context,
    vmc: &mut VerrazzanoManagedCluster,
) -> Result<bool, SyncError> {
    if vmc.spec.ca_secret.as_deref().is_some_and(|s| !s.is_empty()) {
        return Ok(false);
    }

    let cluster_ref = vmc.status.as_ref().and_then(|s| s.cluster_ref.clone());
    let ca_cert = match cluster_ref {
        Some(cluster_ref) => workload_cluster_ca(ctx, &cluster_ref).await?,
        None => rancher_cluster_ca(ctx, vmc).await?,
    };
    let Some(ca_cert) = ca_cert.filter(|ca| !ca.is_empty()) else {
        return Ok(false);
    };

    let store = ctx.store();
    let namespace = vmc.namespace().unwrap_or_default();
    let name = vmc.name_any();
    let secret_name = ca_secret_name(&name);
    info!(vmc = %name, secret = %secret_name, "Retrieved CA cert from managed cluster");

    let owner = controller_owner_reference(vmc)?;
    let data = secret_data([(CA_SECRET_KEY, ca_cert)]);
    create_or_update::<Secret, _>(store, &namespace, &secret_name, |secret| {
        secret.type_ = Some("Opaque".to_string());
        secret.data = Some(data);
        set_controller_reference(&mut secret.metadata, owner);
    })
    .await?;

    vmc.spec.ca_secret = Some(secret_name);
    let updated = store::update(store, vmc).await?;
    vmc.metadata = updated.metadata;
    Ok(true)
}

/// CA of a ClusterAPI workload cluster, read with its ClusterAPI kubeconfig.
async fn workload_cluster_ca(
    ctx: &Context,
    cluster_ref: &ClusterReference,
) -> Result<Option<String>, SyncError> {
    let kubeconfig_secret = format!("{}{CAPI_KUBECONFIG_SECRET_SUFFIX}", cluster_ref.name);
    let Some(kubeconfig) = read_secret_value(
        ctx.store(),
        &cluster_ref.namespace,
        &kubeconfig_secret,
        CAPI_KUBECONFIG_KEY,
    )
    .await?
    else {
        info!(
            namespace = %cluster_ref.namespace,
            secret = %kubeconfig_secret,
            "Waiting for ClusterAPI kubeconfig before fetching CA cert"
        );
        return Ok(None);
    };

    let workload = ctx.workload.connect(&kubeconfig).await?;
    let ca = read_secret_value(
        workload.as_ref(),
        VERRAZZANO_SYSTEM_NAMESPACE,
        VERRAZZANO_TLS_CA_SECRET,
        CA_CRT_KEY,
    )
    .await?;
    if ca.is_none() {
        debug!(cluster = %cluster_ref.name, "Workload cluster has no self-signed CA secret");
    }
    Ok(ca)
}

/// CA of an imported cluster, read through the Rancher proxy once the cluster is active.
async fn rancher_cluster_ca(
    ctx: &Context,
    vmc: &VerrazzanoManagedCluster,
) -> Result<Option<String>, SyncError> {
    let cluster_id = rancher_cluster_id(vmc);
    if cluster_id.is_empty() {
        return Ok(None);
    }

    let config = ctx.rancher.admin_config(ctx.store()).await?;
    if !is_managed_cluster_active_in_rancher(&config, &cluster_id).await? {
        info!(cluster_id = %cluster_id, "Waiting for managed cluster to become active before fetching CA cert");
        return Ok(None);
    }
    Ok(Some(get_ca_cert_from_managed_cluster(&config, &cluster_id).await?))
}

#[cfg(test)]
#[path = "ca_cert_tests.rs"]
mod ca_cert_tests;
