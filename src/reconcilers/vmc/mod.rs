// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `VerrazzanoManagedCluster` reconciliation.
//!
//! A VMC represents one managed cluster registered with the admin cluster. Each pass
//! makes the admin cluster side of the registration converge:
//!
//! 1. finalizer
//! 2. ServiceAccount, token Secret and RoleBinding for the managed cluster agent
//! 3. agent and registration Secrets, then the manifest Secret and Rancher import
//! 4. managed cluster CA, Rancher CRTB and the push of the Secrets through Rancher
//! 5. Argo CD registration, the Ready condition, metrics federation and Keycloak
//!
//! A failed step sets `Ready=False` with the step's message and the pass ends with a
//! requeue after a short jittered delay instead of an error. Deleting a VMC removes its monitoring configuration,
//! Argo CD registration and Rancher cluster before the finalizer is released; the
//! owned Secrets are garbage collected.

pub mod agent_secret;
pub mod argocd;
pub mod ca_cert;
pub mod components;
pub mod federation;
pub mod keycloak;
pub mod manifest;
pub mod push;
pub mod rancher_crtb;
pub mod registration_secret;
pub mod service_account;

use crate::constants::VMC_FINALIZER;
use crate::context::{Context, OperatorConfig};
use crate::crd::{ConditionStatus, ConditionType, RancherRegistrationStatus, VerrazzanoManagedCluster};
use crate::errors::SyncError;
use crate::metrics::{record_reconcile_error, record_reconcile_success};
use crate::rancher::registration::delete_cluster_from_rancher;
use crate::reconcilers::finalizers::{ensure_finalizer, has_finalizer, remove_finalizer};
use crate::reconcilers::retry::jittered_requeue;
use crate::reconcilers::status::{set_condition, update_rancher_status, update_status};
use crate::store::{self, ObjectStore, StoreError};
use anyhow::Result;
use components::Components;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::ByteString;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Common name of the admin cluster resources created for a managed cluster.
#[must_use]
pub fn generate_managed_resource_name(vmc_name: &str) -> String {
    format!("verrazzano-cluster-{vmc_name}")
}

#[must_use]
pub fn agent_secret_name(vmc_name: &str) -> String {
    format!("{}-agent", generate_managed_resource_name(vmc_name))
}

#[must_use]
pub fn registration_secret_name(vmc_name: &str) -> String {
    format!("{}-registration", generate_managed_resource_name(vmc_name))
}

#[must_use]
pub fn manifest_secret_name(vmc_name: &str) -> String {
    format!("{}-manifest", generate_managed_resource_name(vmc_name))
}

/// Secret holding the managed cluster CA when the operator fetched it itself.
#[must_use]
pub fn ca_secret_name(vmc_name: &str) -> String {
    format!("ca-secret-{vmc_name}")
}

/// Secret `data` from string keys and values.
pub(crate) fn secret_data<I, K, V>(entries: I) -> BTreeMap<String, ByteString>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: AsRef<[u8]>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), ByteString(v.as_ref().to_vec())))
        .collect()
}

/// Host of the first rule of an ingress, or `None` when the ingress or host is absent.
pub(crate) async fn ingress_host(
    store: &dyn ObjectStore,
    namespace: &str,
    name: &str,
) -> Result<Option<String>, StoreError> {
    let Some(ingress) = store::get_opt::<Ingress>(store, namespace, name).await? else {
        return Ok(None);
    };
    Ok(ingress
        .spec
        .and_then(|spec| spec.rules)
        .and_then(|rules| rules.into_iter().next())
        .and_then(|rule| rule.host)
        .filter(|host| !host.is_empty()))
}

/// Requeue used after a failed pass.
#[must_use]
pub fn error_requeue(config: &OperatorConfig) -> Action {
    Action::requeue(jittered_requeue(
        config.error_requeue_min_secs,
        config.error_requeue_max_secs,
    ))
}

/// Reconcile one VMC and record the reconcile metrics.
///
/// The VMC handed in by the watcher is only used for its key: the current copy is
/// read from the store, and a VMC that no longer exists is done.
///
/// # Errors
///
/// A failed sync step is not an error: it records `Ready=False` and returns
/// [`error_requeue`]. Errors are left for failures outside the sync steps, such as
/// reading the VMC or running the delete cleanup, and the caller requeues those with
/// [`error_requeue`] too.
pub async fn reconcile_vmc(
    vmc: Arc<VerrazzanoManagedCluster>,
    ctx: Arc<Context>,
) -> Result<Action> {
    let start = Instant::now();
    let result = reconcile(&ctx, &vmc).await;
    match &result {
        Ok(_) => record_reconcile_success(start.elapsed()),
        Err(e) => {
            error!(namespace = ?vmc.namespace(), name = %vmc.name_any(), error = %e, "Failed to reconcile VerrazzanoManagedCluster");
            record_reconcile_error(start.elapsed());
        }
    }
    result
}

async fn reconcile(ctx: &Context, vmc: &VerrazzanoManagedCluster) -> Result<Action> {
    let store = ctx.store();
    let namespace = vmc.namespace().unwrap_or_default();
    let name = vmc.name_any();

    let Some(mut vmc) = store::get_opt::<VerrazzanoManagedCluster>(store, &namespace, &name).await?
    else {
        debug!(namespace = %namespace, name = %name, "VerrazzanoManagedCluster no longer exists");
        return Ok(Action::await_change());
    };

    let components = match Components::load(store).await {
        Ok(components) => components,
        Err(e) => return Ok(handle_error(ctx, &mut vmc, "Failed to read the Verrazzano resource", e).await),
    };

    if vmc.metadata.deletion_timestamp.is_some() {
        if has_finalizer(&vmc, VMC_FINALIZER) {
            reconcile_managed_cluster_delete(ctx, &components, &mut vmc).await?;
            remove_finalizer(store, &mut vmc, VMC_FINALIZER).await?;
        }
        return Ok(Action::await_change());
    }

    info!(namespace = %namespace, name = %name, "Reconciling VerrazzanoManagedCluster");
    ensure_finalizer(store, &mut vmc, VMC_FINALIZER).await?;
    reconcile_managed_cluster(ctx, &components, &mut vmc).await
}

async fn reconcile_managed_cluster(
    ctx: &Context,
    components: &Components,
    vmc: &mut VerrazzanoManagedCluster,
) -> Result<Action> {
    let store = ctx.store();
    let name = vmc.name_any();

    debug!(vmc = %name, "Syncing the ServiceAccount");
    if let Err(e) = service_account::sync_service_account(store, vmc).await {
        return Ok(handle_error(ctx, vmc, "Failed to sync the ServiceAccount", e).await);
    }

    debug!(vmc = %name, "Syncing the RoleBinding");
    if let Err(e) = service_account::sync_managed_role_binding(store, vmc).await {
        return Ok(handle_error(ctx, vmc, "Failed to sync the RoleBinding", e).await);
    }

    debug!(vmc = %name, "Syncing the agent secret");
    if let Err(e) = agent_secret::sync_agent_secret(store, components, vmc).await {
        return Ok(handle_error(ctx, vmc, "Failed to sync the agent secret", e).await);
    }

    debug!(vmc = %name, "Syncing the registration secret");
    if let Err(e) = registration_secret::sync_registration_secret(store, components, vmc).await {
        return Ok(handle_error(ctx, vmc, "Failed to sync the registration secret", e).await);
    }

    debug!(vmc = %name, "Syncing the manifest secret");
    match manifest::sync_manifest_secret(ctx, components, vmc).await {
        Ok(true) => {
            debug!(vmc = %name, "Waiting for the Rancher ClusterID to be set");
            return Ok(error_requeue(&ctx.config));
        }
        Ok(false) => {}
        Err(e) => {
            return Ok(handle_error(ctx, vmc, "Failed to sync the Manifest secret", e).await);
        }
    }

    // CA retrieval is best effort
    match ca_cert::sync_ca_cert_secret(ctx, vmc).await {
        Ok(true) => set_condition(
            vmc,
            ConditionType::ManagedCARetrieved,
            ConditionStatus::True,
            "Managed cluster CA cert retrieved successfully",
        ),
        Ok(false) => {}
        Err(e) => {
            let message = format!(
                "Unable to get CA cert from managed cluster {name} with id {}: {e}",
                manifest::rancher_cluster_id(vmc)
            );
            info!(vmc = %name, "{message}");
            set_condition(vmc, ConditionType::ManagedCARetrieved, ConditionStatus::False, message);
        }
    }

    debug!(vmc = %name, "Updating the Rancher ClusterRoleTemplateBinding");
    if let Err(e) = rancher_crtb::sync_rancher_crtb(store, vmc).await {
        return Ok(handle_error(ctx, vmc, "Failed to update Rancher ClusterRoleBindingTemplate", e).await);
    }

    debug!(vmc = %name, "Pushing the manifest objects");
    match push::push_manifest_objects(ctx, vmc).await {
        Ok(true) => set_condition(
            vmc,
            ConditionType::ManifestPushed,
            ConditionStatus::True,
            "Manifest objects pushed to the managed cluster",
        ),
        Ok(false) => {}
        Err(e) => {
            set_condition(
                vmc,
                ConditionType::ManifestPushed,
                ConditionStatus::False,
                format!("Failed to push the manifest objects to the managed cluster: {e}"),
            );
            return Ok(handle_error(ctx, vmc, "Failed to push the Manifest objects", e).await);
        }
    }

    if components.argocd_enabled() {
        debug!(vmc = %name, "Registering the managed cluster with Argo CD");
        if let Err(e) = argocd::sync_argocd_crtb(store, vmc).await {
            return Ok(handle_error(ctx, vmc, "Failed to update Argo CD ClusterRoleBindingTemplate", e).await);
        }
        match argocd::register_managed_cluster_with_argocd(ctx, components, vmc).await {
            Ok(Some(registration)) => {
                vmc.status.get_or_insert_with(Default::default).argocd_registration =
                    Some(registration);
            }
            Ok(None) => {}
            Err(e) => {
                vmc.status.get_or_insert_with(Default::default).argocd_registration =
                    Some(e.registration.clone());
                return Ok(handle_error(ctx, vmc, "Failed to register managed cluster with Argo CD", e.source).await);
            }
        }
    }

    set_condition(vmc, ConditionType::Ready, ConditionStatus::True, "Ready");
    if let Err(e) = update_status(store, vmc).await {
        error!(vmc = %name, error = %e, "Failed to update status to ready");
    }

    if let Err(e) = federation::sync_metrics_federation(store, components, vmc).await {
        return Ok(handle_error(ctx, vmc, "Failed to setup the prometheus scraper for managed cluster", e).await);
    }

    debug!(vmc = %name, "Creating or updating the Keycloak client");
    if let Err(e) = keycloak::sync_keycloak_client(ctx, components, vmc).await {
        return Ok(handle_error(ctx, vmc, "Failed to create or update Keycloak client for managed cluster", e).await);
    }

    Ok(Action::requeue(ctx.config.requeue_interval))
}

/// Record a failed step as `Ready=False` and requeue the pass after a jittered delay.
///
/// The failure never reaches the controller as an error. The status write is best
/// effort.
async fn handle_error(
    ctx: &Context,
    vmc: &mut VerrazzanoManagedCluster,
    message: &str,
    err: impl Into<SyncError>,
) -> Action {
    let full_message = format!("{message}: {}", err.into());
    error!(namespace = ?vmc.namespace(), name = %vmc.name_any(), "{full_message}");
    set_condition(vmc, ConditionType::Ready, ConditionStatus::False, full_message.clone());
    if let Err(e) = update_status(ctx.store(), vmc).await {
        error!(name = %vmc.name_any(), error = %e, "Failed to update the VMC status");
    }
    error_requeue(&ctx.config)
}

/// Clean up everything the VMC set up outside its owned objects.
///
/// # Errors
///
/// Returns the first cleanup failure; the finalizer stays until a later pass succeeds.
pub async fn reconcile_managed_cluster_delete(
    ctx: &Context,
    components: &Components,
    vmc: &mut VerrazzanoManagedCluster,
) -> Result<(), SyncError> {
    let store = ctx.store();
    let name = vmc.name_any();
    info!(namespace = ?vmc.namespace(), name = %name, "Cleaning up deleted VerrazzanoManagedCluster");

    federation::delete_scrape_job(store, &name).await?;
    if components.argocd_enabled() {
        argocd::unregister_cluster_from_argocd(store, vmc).await?;
    }
    federation::remove_thanos_host(store, components, &name).await?;
    federation::remove_managed_ca_cert(store, &name).await?;
    delete_rancher_cluster(ctx, vmc).await
}

/// Delete the VMC's cluster from Rancher, if it was ever imported.
async fn delete_rancher_cluster(
    ctx: &Context,
    vmc: &mut VerrazzanoManagedCluster,
) -> Result<(), SyncError> {
    let cluster_id = manifest::rancher_cluster_id(vmc);
    if cluster_id.is_empty() {
        debug!(name = %vmc.name_any(), "VMC has no Rancher cluster id, skipping delete");
        return Ok(());
    }
    let store = ctx.store();

    let config = match ctx.rancher.admin_config(store).await {
        Ok(config) => config,
        Err(e) => {
            update_rancher_status(
                store,
                vmc,
                RancherRegistrationStatus::DeleteFailed,
                &cluster_id,
                "Failed to create Rancher API client",
            )
            .await;
            error!(error = %e, "Unable to connect to Rancher API on admin cluster while attempting delete operation");
            return Err(e.into());
        }
    };
    if let Err(e) = delete_cluster_from_rancher(&config, &cluster_id).await {
        update_rancher_status(
            store,
            vmc,
            RancherRegistrationStatus::DeleteFailed,
            &cluster_id,
            "Failed deleting cluster",
        )
        .await;
        error!(name = %vmc.name_any(), cluster_id = %cluster_id, error = %e, "Unable to delete Rancher cluster");
        return Err(e.into());
    }
    info!(name = %vmc.name_any(), cluster_id = %cluster_id, "Deleted cluster from Rancher");
    Ok(())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
