// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Manifest Secret and Rancher registration.
//!
//! The Secret `verrazzano-cluster-<name>-manifest` holds the YAML a user applies on the
//! managed cluster to join it: the agent and registration Secrets re-targeted to
//! `verrazzano-system`, followed by the Rancher import manifest when registration with
//! Rancher succeeded in this pass. Documents are separated by `---`.
//!
//! Registering with Rancher is best effort. A failure is recorded in
//! `status.rancherRegistration` and the manifest is written without the Rancher YAML.

use super::components::Components;
use super::{
    agent_secret_name, manifest_secret_name, registration_secret_name, secret_data,
};
use crate::constants::{
    CREATED_BY_LABEL, CREATED_BY_VERRAZZANO, MCAGENT_SECRET, MCREGISTRATION_SECRET,
    VERRAZZANO_SYSTEM_NAMESPACE, YAML_KEY,
};
use crate::context::Context;
use crate::crd::{RancherRegistrationStatus, VerrazzanoManagedCluster};
use crate::errors::SyncError;
use crate::rancher::registration::register_managed_cluster_with_rancher;
use crate::reconcilers::resources::{
    controller_owner_reference, create_or_update, set_controller_reference,
};
use crate::reconcilers::status::update_rancher_status;
use crate::store::{self, ObjectStore};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use serde_json::json;
use tracing::{debug, info};

const YAML_SEPARATOR: &str = "---\n";

/// Rancher ClusterID recorded on the VMC, or an empty string.
#[must_use]
pub fn rancher_cluster_id(vmc: &VerrazzanoManagedCluster) -> String {
    vmc.status
        .as_ref()
        .map(|s| s.rancher_registration.cluster_id.clone())
        .unwrap_or_default()
}

/// True for a VMC created by Verrazzano that has no Rancher ClusterID yet.
#[must_use]
pub fn waiting_for_cluster_id(vmc: &VerrazzanoManagedCluster) -> bool {
    vmc.labels().get(CREATED_BY_LABEL).map(String::as_str) == Some(CREATED_BY_VERRAZZANO)
        && rancher_cluster_id(vmc).is_empty()
}

/// Create or update the manifest Secret, registering with Rancher on the way.
///
/// Returns `true` when the VMC is waiting for its ClusterID, in which case Rancher is
/// not contacted and the caller should requeue.
///
/// # Errors
///
/// Returns an error when the agent or registration Secret is missing, a write
/// fails, or Rancher returned an empty import manifest.
pub async fn sync_manifest_secret(
    ctx: &Context,
    components: &Components,
    vmc: &mut VerrazzanoManagedCluster,
) -> Result<bool, SyncError> {
    let store = ctx.store();
    let namespace = vmc.namespace().unwrap_or_default();
    let name = vmc.name_any();

    let mut manifest = String::new();
    for (source, target) in [
        (agent_secret_name(&name), MCAGENT_SECRET),
        (registration_secret_name(&name), MCREGISTRATION_SECRET),
    ] {
        manifest.push_str(YAML_SEPARATOR);
        manifest.push_str(
            &secret_as_yaml(store, &namespace, &source, VERRAZZANO_SYSTEM_NAMESPACE, target).await?,
        );
    }

    let waiting = waiting_for_cluster_id(vmc);
    let mut empty_manifest_for = None;
    if waiting {
        info!(vmc = %name, "Waiting for Verrazzano-created VMC to have a cluster id before fetching the Rancher manifest");
    } else if !components.rancher_enabled() {
        debug!(vmc = %name, "Rancher is disabled, manifest will not contain Rancher YAML");
    } else {
        match ctx.rancher.admin_config(store).await {
            Err(e) => {
                info!(vmc = %name, error = %e, "Unable to connect to Rancher API on admin cluster, manifest secret will not contain Rancher YAML");
                update_rancher_status(
                    store,
                    vmc,
                    RancherRegistrationStatus::RegistrationFailed,
                    "",
                    "Failed to create Rancher API client",
                )
                .await;
            }
            Ok(config) => {
                let cluster_id = rancher_cluster_id(vmc);
                match register_managed_cluster_with_rancher(&config, &name, &cluster_id, None).await {
                    Err(e) => {
                        info!(vmc = %name, error = %e, "Failed to register managed cluster, manifest secret will not contain Rancher YAML");
                        update_rancher_status(
                            store,
                            vmc,
                            RancherRegistrationStatus::RegistrationFailed,
                            &cluster_id,
                            "Failed to register managed cluster with Rancher",
                        )
                        .await;
                    }
                    Ok((rancher_yaml, cluster_id)) if rancher_yaml.is_empty() => {
                        update_rancher_status(
                            store,
                            vmc,
                            RancherRegistrationStatus::RegistrationFailed,
                            &cluster_id,
                            "Empty Rancher manifest YAML",
                        )
                        .await;
                        empty_manifest_for = Some(cluster_id);
                    }
                    Ok((rancher_yaml, cluster_id)) => {
                        let msg = format!(
                            "Registration of managed cluster completed successfully for cluster {name} with ID {cluster_id}"
                        );
                        info!(vmc = %name, cluster_id = %cluster_id, "{msg}");
                        update_rancher_status(
                            store,
                            vmc,
                            RancherRegistrationStatus::RegistrationCompleted,
                            &cluster_id,
                            &msg,
                        )
                        .await;
                        manifest.push_str(&rancher_yaml);
                    }
                }
            }
        }
    }

    let owner = controller_owner_reference(vmc)?;
    let data = secret_data([(YAML_KEY, manifest)]);
    let manifest_secret = manifest_secret_name(&name);
    create_or_update::<Secret, _>(store, &namespace, &manifest_secret, |secret| {
        secret.type_ = Some("Opaque".to_string());
        secret.data = Some(data);
        set_controller_reference(&mut secret.metadata, owner);
    })
    .await?;

    if vmc.spec.managed_cluster_manifest_secret.as_deref() != Some(manifest_secret.as_str()) {
        vmc.spec.managed_cluster_manifest_secret = Some(manifest_secret);
        let updated = store::update(store, vmc).await?;
        vmc.metadata = updated.metadata;
    }

    if let Some(cluster_id) = empty_manifest_for {
        return Err(SyncError::Invalid(format!(
            "Failed retrieving Rancher manifest, YAML is an empty string for cluster ID {cluster_id}"
        )));
    }
    Ok(waiting)
}

/// Render a Secret as YAML under a different namespace and name.
///
/// Only the name and namespace are kept from the metadata.
async fn secret_as_yaml(
    store: &dyn ObjectStore,
    namespace: &str,
    name: &str,
    target_namespace: &str,
    target_name: &str,
) -> Result<String, SyncError> {
    let secret = store::get::<Secret>(store, namespace, name).await?;
    let retargeted = json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": { "name": target_name, "namespace": target_namespace },
        "type": secret.type_,
        "data": secret.data,
    });
    serde_yaml::to_string(&retargeted)
        .map_err(|e| SyncError::serialize(&format!("secret {namespace}/{name}"), e))
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod manifest_tests;
