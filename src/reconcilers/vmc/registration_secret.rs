// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Registration Secret: what the managed cluster needs to know about the admin cluster.
//!
//! The Secret `verrazzano-cluster-<name>-registration` carries the cluster name, the
//! Keycloak URL, the admin CA bundle, and the OpenSearch endpoint and credentials that
//! managed cluster logging ships to. Jaeger OpenSearch settings are added when the
//! admin cluster has them.
//!
//! ## OpenSearch selection
//!
//! The Fluentd `opensearchURL` of the Verrazzano resource decides where logs go:
//!
//! - unset or the VMI default: the `vmi-system-os-ingest` ingress, internal credentials
//! - the OpenSearch operator default: the `verrazzano-logging/opensearch` ingress,
//!   internal credentials
//! - anything else: the URL as is, with credentials and CA from `opensearchSecret`

use super::components::Components;
use super::{ingress_host, registration_secret_name, secret_data};
use crate::constants::{
    ADMIN_CA_BUNDLE_KEY, CA_CRT_KEY, CATTLE_SYSTEM_NAMESPACE, DEFAULT_OPENSEARCH_SECRET,
    DEFAULT_OPENSEARCH_URL, DEFAULT_OPERATOR_OPENSEARCH_URL, ES_CA_BUNDLE_KEY,
    ES_INTERNAL_SECRET, ES_URL_KEY, JAEGER_OPENSEARCH_SECRET, JAEGER_OS_CA_KEY,
    JAEGER_OS_PASSWORD_KEY, JAEGER_OS_URL_KEY, JAEGER_OS_USERNAME_KEY, KEYCLOAK_INGRESS,
    KEYCLOAK_NAMESPACE, KEYCLOAK_URL_KEY, MANAGED_CLUSTER_NAME_KEY, OPERATOR_OPENSEARCH_INGRESS,
    PASSWORD_KEY, PRIVATE_CA_BUNDLE_KEY, PRIVATE_CA_BUNDLE_SECRET, USERNAME_KEY,
    VERRAZZANO_LOGGING_NAMESPACE, VERRAZZANO_MONITORING_NAMESPACE, VERRAZZANO_SYSTEM_NAMESPACE,
    VERRAZZANO_TLS_SECRET, VMI_OPENSEARCH_INGRESS,
};
use crate::crd::VerrazzanoManagedCluster;
use crate::errors::SyncError;
use crate::reconcilers::resources::{
    controller_owner_reference, create_or_update, set_controller_reference,
};
use crate::store::{self, read_secret_value, secret_value, ObjectStore, OperationResult, StoreError};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tracing::debug;

/// Where managed cluster logs are shipped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OpenSearchEndpoint {
    pub url: String,
    pub ca_bundle: String,
    pub username: String,
    pub password: String,
}

/// Create or update the registration Secret of a managed cluster.
///
/// # Errors
///
/// Returns a store error when a source object cannot be read or the write fails.
pub async fn sync_registration_secret(
    store: &dyn ObjectStore,
    components: &Components,
    vmc: &VerrazzanoManagedCluster,
) -> Result<OperationResult, SyncError> {
    let namespace = vmc.namespace().unwrap_or_default();
    let name = vmc.name_any();

    let admin_ca_bundle = admin_ca_bundle(store).await?;
    let opensearch = opensearch_endpoint(store, components, &admin_ca_bundle).await?;
    let keycloak_url = keycloak_url(store, components).await?;

    let mut entries = vec![
        (MANAGED_CLUSTER_NAME_KEY, name.clone()),
        (KEYCLOAK_URL_KEY, keycloak_url),
        (ADMIN_CA_BUNDLE_KEY, admin_ca_bundle),
        (ES_URL_KEY, opensearch.url),
        (ES_CA_BUNDLE_KEY, opensearch.ca_bundle),
        (USERNAME_KEY, opensearch.username),
        (PASSWORD_KEY, opensearch.password),
    ];
    entries.extend(jaeger_entries(store).await?);

    let owner = controller_owner_reference(vmc)?;
    let data = secret_data(entries);
    let (_, result) = create_or_update::<Secret, _>(
        store,
        &namespace,
        &registration_secret_name(&name),
        |secret| {
            secret.type_ = Some("Opaque".to_string());
            secret.data = Some(data);
            set_controller_reference(&mut secret.metadata, owner);
        },
    )
    .await?;
    debug!(vmc = %name, result = ?result, "Synced registration secret");
    Ok(result)
}

/// Admin cluster CA bundle: the private CA bundle plus the Verrazzano CA.
///
/// The Verrazzano CA is only appended when the bundle does not already contain it,
/// ignoring whitespace around the Verrazzano CA.
///
/// # Errors
///
/// Returns any store error other than NotFound.
pub async fn admin_ca_bundle(store: &dyn ObjectStore) -> Result<String, StoreError> {
    let mut bundle = read_secret_value(
        store,
        CATTLE_SYSTEM_NAMESPACE,
        PRIVATE_CA_BUNDLE_SECRET,
        PRIVATE_CA_BUNDLE_KEY,
    )
    .await?
    .unwrap_or_default();

    let verrazzano_ca =
        read_secret_value(store, VERRAZZANO_SYSTEM_NAMESPACE, VERRAZZANO_TLS_SECRET, CA_CRT_KEY)
            .await?
            .unwrap_or_default();
    let trimmed = verrazzano_ca.trim();
    if !trimmed.is_empty() && !bundle.contains(trimmed) {
        bundle.push_str(&verrazzano_ca);
    }
    Ok(bundle)
}

/// OpenSearch endpoint for managed cluster logging.
///
/// # Errors
///
/// Returns any store error other than NotFound.
pub async fn opensearch_endpoint(
    store: &dyn ObjectStore,
    components: &Components,
    admin_ca_bundle: &str,
) -> Result<OpenSearchEndpoint, StoreError> {
    let (url, secret) = components.fluentd_opensearch();
    let ingress = match url {
        None | Some(DEFAULT_OPENSEARCH_URL) => {
            Some((VERRAZZANO_SYSTEM_NAMESPACE, VMI_OPENSEARCH_INGRESS))
        }
        Some(DEFAULT_OPERATOR_OPENSEARCH_URL) => {
            Some((VERRAZZANO_LOGGING_NAMESPACE, OPERATOR_OPENSEARCH_INGRESS))
        }
        Some(_) => None,
    };

    if let Some((namespace, name)) = ingress {
        let url = ingress_host(store, namespace, name)
            .await?
            .map(|host| format!("https://{host}:443"))
            .unwrap_or_default();
        let (username, password) = credentials(store, ES_INTERNAL_SECRET).await?;
        return Ok(OpenSearchEndpoint {
            url,
            ca_bundle: admin_ca_bundle.to_string(),
            username,
            password,
        });
    }

    let url = url.unwrap_or_default().to_string();
    match secret.filter(|s| *s != DEFAULT_OPENSEARCH_SECRET) {
        Some(secret_name) => {
            let secret =
                store::get_opt::<Secret>(store, VERRAZZANO_SYSTEM_NAMESPACE, secret_name).await?;
            let value = |key: &str| {
                secret
                    .as_ref()
                    .and_then(|s| secret_value(s, key))
                    .unwrap_or_default()
            };
            Ok(OpenSearchEndpoint {
                url,
                ca_bundle: value(ADMIN_CA_BUNDLE_KEY),
                username: value(USERNAME_KEY),
                password: value(PASSWORD_KEY),
            })
        }
        None => {
            let (username, password) = credentials(store, ES_INTERNAL_SECRET).await?;
            Ok(OpenSearchEndpoint {
                url,
                ca_bundle: admin_ca_bundle.to_string(),
                username,
                password,
            })
        }
    }
}

async fn credentials(store: &dyn ObjectStore, name: &str) -> Result<(String, String), StoreError> {
    let secret = store::get_opt::<Secret>(store, VERRAZZANO_SYSTEM_NAMESPACE, name).await?;
    let value = |key: &str| {
        secret
            .as_ref()
            .and_then(|s| secret_value(s, key))
            .unwrap_or_default()
    };
    Ok((value(USERNAME_KEY), value(PASSWORD_KEY)))
}

/// `https://<keycloak host>` when Keycloak is enabled and has an ingress, else empty.
async fn keycloak_url(store: &dyn ObjectStore, components: &Components) -> Result<String, StoreError> {
    if !components.keycloak_enabled() {
        return Ok(String::new());
    }
    Ok(ingress_host(store, KEYCLOAK_NAMESPACE, KEYCLOAK_INGRESS)
        .await?
        .map(|host| format!("https://{host}"))
        .unwrap_or_default())
}

async fn jaeger_entries(
    store: &dyn ObjectStore,
) -> Result<Vec<(&'static str, String)>, StoreError> {
    let Some(secret) =
        store::get_opt::<Secret>(store, VERRAZZANO_MONITORING_NAMESPACE, JAEGER_OPENSEARCH_SECRET)
            .await?
    else {
        return Ok(Vec::new());
    };

    let mapping = [
        ("url", JAEGER_OS_URL_KEY),
        (ADMIN_CA_BUNDLE_KEY, JAEGER_OS_CA_KEY),
        (USERNAME_KEY, JAEGER_OS_USERNAME_KEY),
        (PASSWORD_KEY, JAEGER_OS_PASSWORD_KEY),
    ];
    Ok(mapping
        .into_iter()
        .filter_map(|(source, target)| secret_value(&secret, source).map(|v| (target, v)))
        .collect())
}

#[cfg(test)]
#[path = "registration_secret_tests.rs"]
mod registration_secret_tests;
