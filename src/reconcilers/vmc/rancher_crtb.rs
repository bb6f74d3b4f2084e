// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Rancher ClusterRoleTemplateBindings for the Verrazzano Rancher users.
//!
//! A CRTB lives in the namespace named after the Rancher ClusterID and grants one
//! Rancher user a role template on that cluster. The binding refers to the user by its
//! Rancher-generated id, which is looked up from the `management.cattle.io/v3` Users.

use super::manifest::rancher_cluster_id;
use crate::constants::{VERRAZZANO_CLUSTER_ROLE_TEMPLATE, VERRAZZANO_CLUSTER_USERNAME};
use crate::crd::VerrazzanoManagedCluster;
use crate::errors::SyncError;
use crate::external::{object_name, rancher_crtb, rancher_user, rancher_username};
use crate::reconcilers::resources::create_or_update_value;
use crate::store::{ObjectKey, ObjectStore, OperationResult};
use kube::ResourceExt;
use serde_json::json;
use tracing::debug;

/// Rancher user id (the User's `metadata.name`) for `username`.
///
/// # Errors
///
/// Returns an error when Users cannot be listed or none has that username.
pub async fn rancher_user_id(store: &dyn ObjectStore, username: &str) -> Result<String, SyncError> {
    let users = store.list(&rancher_user(), None, None).await?;
    users
        .iter()
        .find(|user| rancher_username(user) == Some(username))
        .and_then(object_name)
        .map(str::to_string)
        .ok_or_else(|| {
            SyncError::Invalid(format!("Failed to find a Rancher user with username {username}"))
        })
}

/// Bind `username` to `role_template` on the cluster `cluster_id`.
///
/// # Errors
///
/// Returns an error when the user cannot be found or the CRTB write fails.
pub async fn bind_rancher_user(
    store: &dyn ObjectStore,
    cluster_id: &str,
    binding_name: &str,
    username: &str,
    role_template: &str,
) -> Result<OperationResult, SyncError> {
    let user_id = rancher_user_id(store, username).await?;
    let key = ObjectKey::namespaced(cluster_id, binding_name);
    let result = create_or_update_value(store, &rancher_crtb(), &key, |crtb| {
        crtb["clusterName"] = json!(cluster_id);
        crtb["userName"] = json!(user_id);
        crtb["roleTemplateName"] = json!(role_template);
    })
    .await
    .map_err(|e| {
        SyncError::Invalid(format!("Failed configuring ClusterRoleTemplateBinding {binding_name}: {e}"))
    })?;
    Ok(result)
}

/// Grant the Verrazzano cluster user its registrar role on the managed cluster.
///
/// Does nothing until the VMC has a Rancher ClusterID.
///
/// # Errors
///
/// Returns an error when the user cannot be found or the CRTB write fails.
pub async fn sync_rancher_crtb(
    store: &dyn ObjectStore,
    vmc: &VerrazzanoManagedCluster,
) -> Result<OperationResult, SyncError> {
    let cluster_id = rancher_cluster_id(vmc);
    if cluster_id.is_empty() {
        debug!(vmc = %vmc.name_any(), "Waiting for a Rancher ClusterID before creating the ClusterRoleTemplateBinding");
        return Ok(OperationResult::None);
    }
    bind_rancher_user(
        store,
        &cluster_id,
        &format!("crtb-verrazzano-cluster-{cluster_id}"),
        VERRAZZANO_CLUSTER_USERNAME,
        VERRAZZANO_CLUSTER_ROLE_TEMPLATE,
    )
    .await
}

#[cfg(test)]
#[path = "rancher_crtb_tests.rs"]
mod rancher_crtb_tests;
