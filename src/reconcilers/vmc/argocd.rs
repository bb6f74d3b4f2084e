// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Argo CD registration of a managed cluster.
//!
//! Argo CD reaches the managed cluster through the Rancher proxy, authenticated as the
//! dedicated Argo CD Rancher user. Registration therefore needs three things:
//!
//! 1. a CRTB `crtb-argocd-<id>` making that user `cluster-owner` of the cluster
//! 2. the cluster to be active in Rancher
//! 3. a cluster Secret `argocd/<name>-cluster-secret`, which Argo CD discovers by its
//!    `argocd.argoproj.io/secret-type=cluster` label
//!
//! The outcome is reported in `status.argoCDRegistration`.

use super::components::Components;
use super::manifest::rancher_cluster_id;
use super::rancher_crtb::bind_rancher_user;
use super::secret_data;
use crate::constants::{
    ARGOCD_CLUSTER_USERNAME, ARGOCD_NAMESPACE, ARGOCD_ROLE_TEMPLATE, ARGOCD_SECRET_TYPE_LABEL,
};
use crate::context::Context;
use crate::crd::{ArgoCDRegistration, ArgoCDRegistrationStatus, VerrazzanoManagedCluster};
use crate::errors::SyncError;
use crate::rancher::config::rancher_root_ca;
use crate::rancher::registration::{is_managed_cluster_active_in_rancher, k8s_proxy_path};
use crate::rancher::RancherUser;
use crate::reconcilers::resources::create_or_update;
use crate::store::{self, ObjectStore, OperationResult};
use base64::Engine;
use chrono::Utc;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

const CLUSTER_SECRET_SUFFIX: &str = "cluster-secret";

/// Argo CD registration failed.
///
/// `registration` is the Failed registration the VMC status should show.
#[derive(Debug, thiserror::Error)]
#[error("{}: {}", .registration.message, .source)]
pub struct ArgoCDRegistrationError {
    pub registration: ArgoCDRegistration,
    #[source]
    pub source: SyncError,
}

impl ArgoCDRegistrationError {
    fn new(message: &str, source: impl Into<SyncError>) -> Self {
        Self {
            registration: new_registration(ArgoCDRegistrationStatus::Failed, message),
            source: source.into(),
        }
    }
}

/// A registration stamped with the current time.
#[must_use]
pub fn new_registration(status: ArgoCDRegistrationStatus, message: &str) -> ArgoCDRegistration {
    ArgoCDRegistration {
        status,
        message: message.to_string(),
        timestamp: Some(Utc::now().to_rfc3339()),
    }
}

/// Name of the Argo CD cluster Secret of a managed cluster.
#[must_use]
pub fn cluster_secret_name(vmc_name: &str) -> String {
    format!("{vmc_name}-{CLUSTER_SECRET_SUFFIX}")
}

/// Make the Argo CD Rancher user owner of the managed cluster.
///
/// Does nothing until the VMC has a Rancher ClusterID.
///
/// # Errors
///
/// Returns an error when the user cannot be found or the CRTB write fails.
pub async fn sync_argocd_crtb(
    store: &dyn ObjectStore,
    vmc: &VerrazzanoManagedCluster,
) -> Result<OperationResult, SyncError> {
    let cluster_id = rancher_cluster_id(vmc);
    if cluster_id.is_empty() {
        debug!(vmc = %vmc.name_any(), "Waiting for a Rancher ClusterID before creating the Argo CD ClusterRoleTemplateBinding");
        return Ok(OperationResult::None);
    }
    bind_rancher_user(
        store,
        &cluster_id,
        &format!("crtb-argocd-{cluster_id}"),
        ARGOCD_CLUSTER_USERNAME,
        ARGOCD_ROLE_TEMPLATE,
    )
    .await
}

/// Register the managed cluster with Argo CD.
///
/// Returns the registration to record, or `None` when the cluster is already
/// registered and nothing was attempted.
///
/// # Errors
///
/// Returns [`ArgoCDRegistrationError`] carrying a Failed registration when a step
/// fails. Waiting on Rancher is not an error.
pub async fn register_managed_cluster_with_argocd(
    ctx: &Context,
    components: &Components,
    vmc: &VerrazzanoManagedCluster,
) -> Result<Option<ArgoCDRegistration>, ArgoCDRegistrationError> {
    let cluster_id = rancher_cluster_id(vmc);
    if cluster_id.is_empty() {
        return Ok(Some(new_registration(
            ArgoCDRegistrationStatus::PendingRancherClusterRegistration,
            "Waiting for Rancher manifest to be applied on the managed cluster",
        )));
    }

    let current = vmc
        .status
        .as_ref()
        .and_then(|s| s.argocd_registration.as_ref())
        .map(|r| r.status);
    if current == Some(ArgoCDRegistrationStatus::Completed) {
        return Ok(None);
    }

    let store = ctx.store();
    let rancher = ctx.rancher.admin_config(store).await.map_err(|e| {
        ArgoCDRegistrationError::new(
            "Could not create rancher config that authenticates with the admin user",
            e,
        )
    })?;
    let active = is_managed_cluster_active_in_rancher(&rancher, &cluster_id)
        .await
        .unwrap_or(false);
    if !active {
        return Ok(Some(new_registration(
            ArgoCDRegistrationStatus::PendingRancherClusterRegistration,
            &format!(
                "Waiting for managed cluster with id {cluster_id} to become active before registering in Argo CD"
            ),
        )));
    }

    let Some(rancher_url) = components.rancher_url() else {
        return Err(ArgoCDRegistrationError::new(
            "No instance information found in Verrazzano resource status",
            SyncError::Invalid(
                "Unable to find instance information in Verrazzano resource status".to_string(),
            ),
        ));
    };
    let server = format!("{rancher_url}{}", k8s_proxy_path(&cluster_id));

    let ca_cert = rancher_root_ca(store)
        .await
        .map_err(|e| ArgoCDRegistrationError::new("Failed to get Argo CD TLS CA", e))?;

    let argocd = ctx
        .argocd
        .admin_config(store)
        .await
        .map_err(|e| ArgoCDRegistrationError::new("Failed to create ArgoCD API client", e))?;

    let name = vmc.name_any();
    let registered = argocd
        .is_cluster_registered(&name)
        .await
        .map_err(|e| ArgoCDRegistrationError::new("Failed to call Argo CD clusters GET API", e))?;
    if registered {
        return Ok(Some(new_registration(
            ArgoCDRegistrationStatus::Completed,
            "Cluster is already registered in Argo CD",
        )));
    }

    add_cluster(ctx, &name, &server, &ca_cert)
        .await
        .map_err(|e| ArgoCDRegistrationError::new("Failed to create Argo CD cluster secret", e))?;
    info!(vmc = %name, cluster_id = %cluster_id, "Successfully registered managed cluster in Argo CD");
    Ok(Some(new_registration(
        ArgoCDRegistrationStatus::Completed,
        "Successfully registered managed cluster in ArgoCD",
    )))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClusterConfig<'a> {
    bearer_token: &'a str,
    tls_client_config: TlsClientConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TlsClientConfig {
    ca_data: String,
    insecure: bool,
}

/// Write the Argo CD cluster Secret, authenticated as the Argo CD Rancher user.
async fn add_cluster(
    ctx: &Context,
    name: &str,
    server: &str,
    ca_cert: &str,
) -> Result<OperationResult, SyncError> {
    let store = ctx.store();
    let rancher = ctx.rancher.config_for(store, RancherUser::ArgoCDUser).await?;

    let config = serde_json::to_string(&ClusterConfig {
        bearer_token: &rancher.api_access_token,
        tls_client_config: TlsClientConfig {
            ca_data: base64::engine::general_purpose::STANDARD.encode(ca_cert),
            insecure: false,
        },
    })
    .map_err(|e| SyncError::serialize("Argo CD cluster config", e))?;

    let data = secret_data([("name", name), ("server", server), ("config", config.as_str())]);
    let (_, result) = create_or_update::<Secret, _>(
        store,
        ARGOCD_NAMESPACE,
        &cluster_secret_name(name),
        |secret| {
            secret.type_ = Some("Opaque".to_string());
            secret.metadata.labels = Some(BTreeMap::from([(
                ARGOCD_SECRET_TYPE_LABEL.to_string(),
                "cluster".to_string(),
            )]));
            secret.data = Some(data);
        },
    )
    .await?;
    Ok(result)
}

/// Remove the managed cluster from Argo CD by deleting its cluster Secret.
///
/// # Errors
///
/// Returns any store error other than NotFound.
pub async fn unregister_cluster_from_argocd(
    store: &dyn ObjectStore,
    vmc: &VerrazzanoManagedCluster,
) -> Result<(), SyncError> {
    store::delete_ignore_not_found::<Secret>(store, ARGOCD_NAMESPACE, &cluster_secret_name(&vmc.name_any()))
        .await?;
    Ok(())
}

#[cfg(test)]
#[path = "argocd_tests.rs"]
mod argocd_tests;
