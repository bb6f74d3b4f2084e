// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Keycloak OIDC client for the managed cluster API endpoint.

use super::components::Components;
use crate::context::Context;
use crate::crd::VerrazzanoManagedCluster;
use crate::errors::SyncError;
use crate::keycloak::OidcClient;
use crate::store::OperationResult;
use kube::ResourceExt;
use tracing::debug;

/// Client ID of the managed cluster's OIDC client in the Verrazzano realm.
#[must_use]
pub fn keycloak_client_id(vmc_name: &str) -> String {
    format!("verrazzano-{vmc_name}")
}

/// Create or update the OIDC client for the managed cluster's API URL.
///
/// Skipped when Keycloak is disabled or the VMC has no `status.apiUrl` yet.
///
/// # Errors
///
/// Returns an error when Keycloak cannot be logged into or the client write fails.
pub async fn sync_keycloak_client(
    ctx: &Context,
    components: &Components,
    vmc: &VerrazzanoManagedCluster,
) -> Result<OperationResult, SyncError> {
    let name = vmc.name_any();
    if !components.keycloak_enabled() {
        debug!(vmc = %name, "Keycloak is disabled, skipping the OIDC client");
        return Ok(OperationResult::None);
    }
    let api_url = vmc
        .status
        .as_ref()
        .map(|s| s.api_url.as_str())
        .unwrap_or_default();
    if api_url.is_empty() {
        debug!(vmc = %name, "Managed cluster API URL not known yet, skipping the OIDC client");
        return Ok(OperationResult::None);
    }

    let keycloak = ctx.keycloak.admin_config(ctx.store()).await?;
    let client = OidcClient::for_managed_cluster(&keycloak_client_id(&name), api_url);
    Ok(keycloak.create_or_update_client(&client).await?)
}

#[cfg(test)]
#[path = "keycloak_tests.rs"]
mod keycloak_tests;
