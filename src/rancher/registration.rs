// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Rancher cluster registration protocol.
//!
//! A managed cluster is identified in Rancher by its ClusterID (e.g. `c-7fdxq`).
//! Registration imports the cluster, obtains an active registration token and
//! downloads the import manifest that the managed cluster must apply. Once the
//! Rancher agent connects, the cluster reports `state=active`.
//!
//! ## Rancher v3 paths
//!
//! | Operation          | Method | Path                                                        |
//! |--------------------|--------|-------------------------------------------------------------|
//! | Import             | POST   | `/v3/cluster`                                               |
//! | Lookup by name     | GET    | `/v3/clusters?name=<name>`                                  |
//! | List tokens        | GET    | `/v3/clusterregistrationtoken?state=active&&clusterId=<id>` |
//! | Create token       | POST   | `/v3/clusterregistrationtoken`                              |
//! | Import manifest    | GET    | `/v3/import/<token>_<id>.yaml`                              |
//! | Cluster state      | GET    | `/v3/clusters/<id>`                                         |
//! | Delete             | DELETE | `/v3/clusters/<id>`                                         |
//! | Managed-side proxy | any    | `/k8s/clusters/<id>/api/v1/...`                             |

use super::config::RancherConfig;
use super::RancherError;
use crate::constants::{
    CA_CRT_KEY, CATTLE_SYSTEM_NAMESPACE, RANCHER_ADDITIONAL_CA_KEY, RANCHER_ADDITIONAL_CA_SECRET,
    VERRAZZANO_SYSTEM_NAMESPACE, VERRAZZANO_TLS_SECRET,
};
use base64::Engine;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, info};

const CLUSTER_PATH: &str = "/v3/cluster";
const CLUSTERS_PATH: &str = "/v3/clusters";
const CLUSTER_REGISTRATION_TOKEN_PATH: &str = "/v3/clusterregistrationtoken";
const IMPORT_PATH: &str = "/v3/import";

/// Path prefix for API calls proxied to a managed cluster.
#[must_use]
pub fn k8s_proxy_path(cluster_id: &str) -> String {
    format!("/k8s/clusters/{cluster_id}")
}

fn parse_json(url: &str, body: &str) -> Result<Value, RancherError> {
    serde_json::from_str(body).map_err(|e| RancherError::parse(url, e))
}

fn str_field<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value.get(field).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Import a cluster and return its ClusterID.
///
/// When Rancher answers 422 the cluster already exists and its id is looked up by
/// name instead.
///
/// # Errors
///
/// Returns an error for any other status or an unparseable response.
pub async fn import_cluster_to_rancher(
    config: &RancherConfig,
    cluster_name: &str,
    labels: Option<&BTreeMap<String, String>>,
) -> Result<String, RancherError> {
    let url = config.url(CLUSTER_PATH);
    let mut payload = json!({
        "type": "cluster",
        "name": cluster_name,
        "dockerRootDir": "/var/lib/docker",
        "enableClusterAlerting": "false",
        "enableClusterMonitoring": "false",
        "enableNetworkPolicy": "false",
    });
    if let Some(labels) = labels.filter(|l| !l.is_empty()) {
        payload["labels"] = json!(labels);
    }

    let resp = config
        .send_request(Method::POST, &url, &[], Some(payload.to_string()))
        .await?;

    match resp.status {
        StatusCode::UNPROCESSABLE_ENTITY => {
            debug!(cluster = %cluster_name, "Cluster already exists in Rancher, looking up its id");
            get_cluster_id_from_name(config, cluster_name).await
        }
        StatusCode::CREATED => {
            let body = parse_json(&url, &resp.body)?;
            let id = str_field(&body, "id")
                .ok_or_else(|| RancherError::parse(&url, "response has no cluster id"))?;
            info!(cluster = %cluster_name, cluster_id = %id, "Imported cluster into Rancher");
            Ok(id.to_string())
        }
        _ => Err(RancherError::unexpected("POST", &url, &resp)),
    }
}

/// Look up a ClusterID by cluster name.
///
/// # Errors
///
/// Returns an error unless Rancher answers 200 with at least one match.
pub async fn get_cluster_id_from_name(
    config: &RancherConfig,
    cluster_name: &str,
) -> Result<String, RancherError> {
    let encoded: String = url::form_urlencoded::byte_serialize(cluster_name.as_bytes()).collect();
    let url = config.url(&format!("{CLUSTERS_PATH}?name={encoded}"));
    let resp = config.send_request(Method::GET, &url, &[], None).await?;
    if resp.status != StatusCode::OK {
        return Err(RancherError::unexpected("GET", &url, &resp));
    }

    let body = parse_json(&url, &resp.body)?;
    body.get("data")
        .and_then(Value::as_array)
        .and_then(|data| data.first())
        .and_then(|cluster| str_field(cluster, "id"))
        .map(str::to_string)
        .ok_or_else(|| RancherError::parse(&url, format!("no cluster named {cluster_name}")))
}

/// Return an active registration token for the cluster, creating one if needed.
///
/// # Errors
///
/// Returns an error when listing fails or creation does not answer 201.
pub async fn get_registration_token(
    config: &RancherConfig,
    cluster_id: &str,
) -> Result<String, RancherError> {
    let url = config.url(&format!(
        "{CLUSTER_REGISTRATION_TOKEN_PATH}?state=active&&clusterId={cluster_id}"
    ));
    let resp = config.send_request(Method::GET, &url, &[], None).await?;
    if resp.status != StatusCode::OK {
        return Err(RancherError::unexpected("GET", &url, &resp));
    }

    let body = parse_json(&url, &resp.body)?;
    let existing = body
        .get("data")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|t| str_field(t, "clusterId") == Some(cluster_id))
        .filter(|t| str_field(t, "state") == Some("active"))
        .find_map(|t| str_field(t, "token"));
    if let Some(token) = existing {
        return Ok(token.to_string());
    }

    let url = config.url(CLUSTER_REGISTRATION_TOKEN_PATH);
    let payload = json!({ "type": "clusterRegistrationToken", "clusterId": cluster_id });
    let resp = config
        .send_request(Method::POST, &url, &[], Some(payload.to_string()))
        .await?;
    if resp.status != StatusCode::CREATED {
        return Err(RancherError::unexpected("POST", &url, &resp));
    }

    let body = parse_json(&url, &resp.body)?;
    str_field(&body, "token")
        .map(str::to_string)
        .ok_or_else(|| RancherError::parse(&url, "response has no token"))
}

/// Download the import manifest for a registration token.
///
/// # Errors
///
/// Returns an error unless Rancher answers 200.
pub async fn get_import_manifest(
    config: &RancherConfig,
    cluster_id: &str,
    token: &str,
) -> Result<String, RancherError> {
    let url = config.url(&format!("{IMPORT_PATH}/{token}_{cluster_id}.yaml"));
    let resp = config.send_request(Method::GET, &url, &[], None).await?;
    if resp.status != StatusCode::OK {
        return Err(RancherError::unexpected("GET", &url, &resp));
    }
    Ok(resp.body)
}

/// Import manifest for a cluster that is already registered.
///
/// # Errors
///
/// Propagates token and manifest errors.
pub async fn get_registration_yaml(
    config: &RancherConfig,
    cluster_id: &str,
) -> Result<String, RancherError> {
    let token = get_registration_token(config, cluster_id).await?;
    get_import_manifest(config, cluster_id, &token).await
}

/// Register a cluster and return its manifest and ClusterID.
///
/// An empty `cluster_id` triggers an import first; otherwise the existing id is used.
///
/// # Errors
///
/// Propagates import, token and manifest errors.
pub async fn register_managed_cluster_with_rancher(
    config: &RancherConfig,
    cluster_name: &str,
    cluster_id: &str,
    labels: Option<&BTreeMap<String, String>>,
) -> Result<(String, String), RancherError> {
    let cluster_id = if cluster_id.is_empty() {
        import_cluster_to_rancher(config, cluster_name, labels).await?
    } else {
        cluster_id.to_string()
    };
    let yaml = get_registration_yaml(config, &cluster_id).await?;
    Ok((yaml, cluster_id))
}

/// True when the cluster is `active` and its agent image is known.
///
/// # Errors
///
/// Returns an error unless Rancher answers 200.
pub async fn is_managed_cluster_active_in_rancher(
    config: &RancherConfig,
    cluster_id: &str,
) -> Result<bool, RancherError> {
    let url = config.url(&format!("{CLUSTERS_PATH}/{cluster_id}"));
    let resp = config.send_request(Method::GET, &url, &[], None).await?;
    if resp.status != StatusCode::OK {
        return Err(RancherError::unexpected("GET", &url, &resp));
    }

    let body = parse_json(&url, &resp.body)?;
    Ok(str_field(&body, "state") == Some("active") && str_field(&body, "agentImage").is_some())
}

/// Delete a cluster from Rancher. A cluster that is already gone counts as deleted.
///
/// # Errors
///
/// Returns an error for any status other than 200 or 404.
pub async fn delete_cluster_from_rancher(
    config: &RancherConfig,
    cluster_id: &str,
) -> Result<(), RancherError> {
    let url = config.url(&format!("{CLUSTERS_PATH}/{cluster_id}"));
    let resp = config.send_request(Method::DELETE, &url, &[], None).await?;
    match resp.status {
        StatusCode::OK | StatusCode::NOT_FOUND => {
            info!(cluster_id = %cluster_id, "Deleted cluster from Rancher");
            Ok(())
        }
        _ => Err(RancherError::unexpected("DELETE", &url, &resp)),
    }
}

/// Read one key of a Secret on the managed cluster. 404 means absent.
///
/// # Errors
///
/// Returns an error for non-200/404 statuses or undecodable data.
pub async fn get_secret_value_from_managed_cluster(
    config: &RancherConfig,
    cluster_id: &str,
    namespace: &str,
    name: &str,
    key: &str,
) -> Result<Option<String>, RancherError> {
    let url = config.url(&format!(
        "{}/api/v1/namespaces/{namespace}/secrets/{name}",
        k8s_proxy_path(cluster_id)
    ));
    let resp = config.send_request(Method::GET, &url, &[], None).await?;
    match resp.status {
        StatusCode::NOT_FOUND => return Ok(None),
        StatusCode::OK => {}
        _ => return Err(RancherError::unexpected("GET", &url, &resp)),
    }

    let secret = parse_json(&url, &resp.body)?;
    let Some(encoded) = secret.pointer(&format!("/data/{key}")).and_then(Value::as_str) else {
        return Ok(None);
    };
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| RancherError::parse(&url, e))?;
    String::from_utf8(decoded)
        .map(Some)
        .map_err(|e| RancherError::parse(&url, e))
}

/// CA certificate of the managed cluster, or an empty string when it has none.
///
/// The Rancher additional CA takes precedence over the Verrazzano TLS CA.
///
/// # Errors
///
/// Propagates proxy errors other than 404.
pub async fn get_ca_cert_from_managed_cluster(
    config: &RancherConfig,
    cluster_id: &str,
) -> Result<String, RancherError> {
    let sources = [
        (CATTLE_SYSTEM_NAMESPACE, RANCHER_ADDITIONAL_CA_SECRET, RANCHER_ADDITIONAL_CA_KEY),
        (VERRAZZANO_SYSTEM_NAMESPACE, VERRAZZANO_TLS_SECRET, CA_CRT_KEY),
    ];
    for (namespace, name, key) in sources {
        if let Some(ca) =
            get_secret_value_from_managed_cluster(config, cluster_id, namespace, name, key).await?
        {
            if !ca.is_empty() {
                return Ok(ca);
            }
        }
    }
    Ok(String::new())
}

/// A cluster entry of the Rancher cluster list.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct RancherCluster {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Deserialize)]
struct ClusterPage {
    #[serde(default)]
    data: Vec<RancherCluster>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Deserialize)]
struct Pagination {
    #[serde(default)]
    next: Option<String>,
}

/// Every cluster known to Rancher, following pagination.
///
/// Also returns a hex SHA-256 of the concatenated page bodies, so callers can tell
/// cheaply whether the cluster list changed.
///
/// # Errors
///
/// Returns an error when any page is not a 200 or cannot be parsed.
pub async fn get_all_clusters_in_rancher(
    config: &RancherConfig,
) -> Result<(Vec<RancherCluster>, String), RancherError> {
    let mut clusters = Vec::new();
    let mut hasher = Sha256::new();
    let mut next = Some(config.url(CLUSTERS_PATH));

    while let Some(url) = next.take() {
        let resp = config.send_request(Method::GET, &url, &[], None).await?;
        if resp.status != StatusCode::OK {
            return Err(RancherError::unexpected("GET", &url, &resp));
        }
        hasher.update(resp.body.as_bytes());

        let page: ClusterPage =
            serde_json::from_str(&resp.body).map_err(|e| RancherError::parse(&url, e))?;
        clusters.extend(page.data);
        next = page
            .pagination
            .and_then(|p| p.next)
            .filter(|n| !n.is_empty());
    }

    Ok((clusters, format!("{:x}", hasher.finalize())))
}

#[cfg(test)]
#[path = "registration_tests.rs"]
mod registration_tests;
