// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Writes to a managed cluster through the Rancher Kubernetes proxy.
//!
//! Once a managed cluster's Rancher agent is connected, the admin cluster can reach the
//! managed cluster's API server at `/k8s/clusters/<id>/...`. This is how the agent and
//! registration secrets are pushed without the managed cluster applying a manifest.

use super::config::RancherConfig;
use super::registration::k8s_proxy_path;
use super::RancherError;
use crate::store::OperationResult;
use k8s_openapi::api::core::v1::Secret;
use reqwest::{Method, StatusCode};
use tracing::{debug, info};

fn secret_identity(secret: &Secret) -> (String, String) {
    (
        secret.metadata.namespace.clone().unwrap_or_default(),
        secret.metadata.name.clone().unwrap_or_default(),
    )
}

/// Create or update `secret` on the managed cluster `cluster_id`.
///
/// The secret's namespace and name select the target. When the secret exists, its
/// current content is loaded into `secret` before `mutate` runs, and nothing is
/// written if the mutation leaves it unchanged.
///
/// # Errors
///
/// Returns an error when a proxy call answers an unexpected status, the mutation
/// fails, or the mutation changes the secret's namespace or name.
pub async fn create_or_update_secret_rancher_proxy<F>(
    secret: &mut Secret,
    config: &RancherConfig,
    cluster_id: &str,
    mutate: F,
) -> Result<OperationResult, RancherError>
where
    F: FnOnce(&mut Secret) -> anyhow::Result<()>,
{
    let (namespace, name) = secret_identity(secret);
    let key = format!("{namespace}/{name}");
    let collection_url = config.url(&format!(
        "{}/api/v1/namespaces/{namespace}/secrets",
        k8s_proxy_path(cluster_id)
    ));
    let secret_url = format!("{collection_url}/{name}");

    match get_secret(config, &secret_url, &key).await {
        Err(e) if e.is_not_found() => {
            mutate(secret).map_err(|e| RancherError::Mutate(key.clone(), e.to_string()))?;
            if secret_identity(secret) != (namespace, name) {
                return Err(RancherError::IdentityChanged);
            }

            let body = serde_json::to_string(secret).map_err(|e| RancherError::parse(&key, e))?;
            let resp = config
                .send_request(Method::POST, &collection_url, &[], Some(body))
                .await?;
            if resp.status != StatusCode::CREATED {
                return Err(RancherError::unexpected("POST", &collection_url, &resp));
            }
            info!(cluster_id = %cluster_id, secret = %key, "Created secret on managed cluster");
            Ok(OperationResult::Created)
        }
        Err(e) => Err(e),
        Ok(existing) => {
            *secret = existing.clone();
            mutate(secret).map_err(|e| RancherError::Mutate(key.clone(), e.to_string()))?;
            if secret_identity(secret) != (namespace, name) {
                return Err(RancherError::IdentityChanged);
            }
            if *secret == existing {
                debug!(cluster_id = %cluster_id, secret = %key, "Secret on managed cluster is up to date");
                return Ok(OperationResult::None);
            }

            let body = serde_json::to_string(secret).map_err(|e| RancherError::parse(&key, e))?;
            let resp = config
                .send_request(Method::PUT, &secret_url, &[], Some(body))
                .await?;
            if resp.status != StatusCode::OK && resp.status != StatusCode::CREATED {
                return Err(RancherError::unexpected("PUT", &secret_url, &resp));
            }
            info!(cluster_id = %cluster_id, secret = %key, "Updated secret on managed cluster");
            Ok(OperationResult::Updated)
        }
    }
}

async fn get_secret(config: &RancherConfig, url: &str, key: &str) -> Result<Secret, RancherError> {
    let resp = config.send_request(Method::GET, url, &[], None).await?;
    match resp.status {
        StatusCode::OK => serde_json::from_str(&resp.body).map_err(|e| RancherError::parse(url, e)),
        StatusCode::NOT_FOUND => Err(RancherError::NotFound(format!("secret {key}"))),
        _ => Err(RancherError::unexpected("GET", url, &resp)),
    }
}

/// True when `namespace` exists on the managed cluster.
///
/// # Errors
///
/// Returns an error for statuses other than 200 and 404.
pub async fn managed_namespace_exists(
    config: &RancherConfig,
    cluster_id: &str,
    namespace: &str,
) -> Result<bool, RancherError> {
    let url = config.url(&format!(
        "{}/api/v1/namespaces/{namespace}",
        k8s_proxy_path(cluster_id)
    ));
    let resp = config.send_request(Method::GET, &url, &[], None).await?;
    match resp.status {
        StatusCode::OK => Ok(true),
        StatusCode::NOT_FOUND => Ok(false),
        _ => Err(RancherError::unexpected("GET", &url, &resp)),
    }
}

#[cfg(test)]
#[path = "proxy_tests.rs"]
mod proxy_tests;
