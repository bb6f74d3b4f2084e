// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! ServiceAccount, token Secret and RoleBinding for a managed cluster.
//!
//! The managed cluster agent authenticates to the admin cluster as the ServiceAccount
//! `verrazzano-cluster-<name>`. Its long-lived token lives in the Secret
//! `<service-account>-token`, and the RoleBinding grants it the
//! `verrazzano-managed-cluster` ClusterRole in `verrazzano-mc`.
//!
//! The ServiceAccount and RoleBinding are owned by the VMC and the token Secret by the
//! ServiceAccount, so deleting the VMC garbage-collects all three.

use super::generate_managed_resource_name;
use crate::constants::{
    MANAGED_CLUSTER_CLUSTER_ROLE, MULTICLUSTER_NAMESPACE, SERVICE_ACCOUNT_NAME_ANNOTATION,
    SERVICE_ACCOUNT_TOKEN_SECRET_TYPE,
};
use crate::crd::VerrazzanoManagedCluster;
use crate::errors::SyncError;
use crate::reconcilers::resources::{
    controller_owner_reference, create_or_update, set_controller_reference,
};
use crate::store::{self, ObjectStore, OperationResult};
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
use kube::ResourceExt;
use tracing::{debug, info};

/// Name of the token Secret of a ServiceAccount.
#[must_use]
pub fn token_secret_name(service_account: &str) -> String {
    format!("{service_account}-token")
}

/// Create or update the ServiceAccount, its token Secret, and `spec.serviceAccount`.
///
/// The token Secret is only created while the ServiceAccount lists no secrets.
///
/// # Errors
///
/// Returns a store error from any read or write.
pub async fn sync_service_account(
    store: &dyn ObjectStore,
    vmc: &mut VerrazzanoManagedCluster,
) -> Result<(), SyncError> {
    let namespace = vmc.namespace().unwrap_or_default();
    let sa_name = generate_managed_resource_name(&vmc.name_any());
    let owner = controller_owner_reference(vmc)?;

    let (service_account, _) =
        create_or_update::<ServiceAccount, _>(store, &namespace, &sa_name, |sa| {
            set_controller_reference(&mut sa.metadata, owner);
        })
        .await?;

    if service_account.secrets.as_ref().is_none_or(Vec::is_empty) {
        create_service_account_token_secret(store, &service_account).await?;
    }

    if vmc.spec.service_account.as_deref() != Some(sa_name.as_str()) {
        info!(
            vmc = %vmc.name_any(),
            from = ?vmc.spec.service_account,
            to = %sa_name,
            "Updating VMC service account"
        );
        vmc.spec.service_account = Some(sa_name);
        let updated = store::update(store, vmc).await?;
        vmc.metadata = updated.metadata;
    }
    Ok(())
}

async fn create_service_account_token_secret(
    store: &dyn ObjectStore,
    service_account: &ServiceAccount,
) -> Result<OperationResult, SyncError> {
    let namespace = service_account.namespace().unwrap_or_default();
    let sa_name = service_account.name_any();
    let owner = controller_owner_reference(service_account)?;

    let (_, result) =
        create_or_update::<Secret, _>(store, &namespace, &token_secret_name(&sa_name), |secret| {
            secret.type_ = Some(SERVICE_ACCOUNT_TOKEN_SECRET_TYPE.to_string());
            secret
                .metadata
                .annotations
                .get_or_insert_with(Default::default)
                .insert(SERVICE_ACCOUNT_NAME_ANNOTATION.to_string(), sa_name.clone());
            set_controller_reference(&mut secret.metadata, owner);
        })
        .await?;
    debug!(service_account = %sa_name, result = ?result, "Synced service account token secret");
    Ok(result)
}

/// Create or update the RoleBinding for the managed cluster ServiceAccount.
///
/// The binding carries the VMC's labels and binds `spec.serviceAccount`.
///
/// # Errors
///
/// Returns a store error from the read or the write.
pub async fn sync_managed_role_binding(
    store: &dyn ObjectStore,
    vmc: &VerrazzanoManagedCluster,
) -> Result<OperationResult, SyncError> {
    let namespace = vmc.namespace().unwrap_or_default();
    let name = generate_managed_resource_name(&vmc.name_any());
    let owner = controller_owner_reference(vmc)?;
    let labels = vmc.metadata.labels.clone();
    let service_account = vmc.spec.service_account.clone().unwrap_or_default();

    let (_, result) = create_or_update::<RoleBinding, _>(store, &namespace, &name, |binding| {
        binding.metadata.labels = labels;
        binding.role_ref = RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: MANAGED_CLUSTER_CLUSTER_ROLE.to_string(),
        };
        binding.subjects = Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: service_account,
            namespace: Some(MULTICLUSTER_NAMESPACE.to_string()),
            api_group: None,
        }]);
        set_controller_reference(&mut binding.metadata, owner);
    })
    .await?;
    Ok(result)
}

#[cfg(test)]
#[path = "service_account_tests.rs"]
mod service_account_tests;
