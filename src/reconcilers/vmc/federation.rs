// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Metrics federation for managed clusters.
//!
//! The admin cluster collects managed cluster metrics in one of two ways:
//!
//! - **Thanos**: when Thanos is enabled and the managed cluster publishes a Thanos
//!   query store, its gRPC endpoint is listed in the `verrazzano-thanos-endpoints`
//!   ConfigMap that Thanos Query reads through file service discovery.
//! - **Prometheus federation**: otherwise a `/federate` scrape job for the cluster is
//!   written into the `additional-scrape-configs` Secret, with the cluster CA stored
//!   in `managed-cluster-ca-certs` under `ca-<name>`.
//!
//! Switching strategy removes the other one, so a cluster is never scraped twice.

use super::components::Components;
use crate::constants::{
    CA_SECRET_KEY, PASSWORD_SECRET_KEY, PROMETHEUS_CA_MOUNT_PATH, PROMETHEUS_INTERNAL_SECRET,
    PROMETHEUS_INTERNAL_USERNAME, PROMETHEUS_MANAGED_CA_SECRET, PROMETHEUS_SCRAPE_CONFIGS_KEY,
    PROMETHEUS_SCRAPE_CONFIGS_SECRET, THANOS_CLUSTER_LABEL, THANOS_ENDPOINTS_CONFIGMAP,
    THANOS_GRPC_PORT, THANOS_SERVICE_DISCOVERY_KEY, VERRAZZANO_MONITORING_NAMESPACE,
    VERRAZZANO_SYSTEM_NAMESPACE,
};
use crate::crd::VerrazzanoManagedCluster;
use crate::errors::SyncError;
use crate::reconcilers::resources::create_or_update;
use crate::store::{self, api_resource, read_secret_value, secret_value, ObjectKey, ObjectStore};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use k8s_openapi::ByteString;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Scrape interval of the federation job.
const SCRAPE_INTERVAL: &str = "20s";

/// Scrape timeout of the federation job.
const SCRAPE_TIMEOUT: &str = "15s";

/// One entry of the Thanos file service discovery list.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ThanosServiceDiscovery {
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ThanosServiceDiscovery {
    fn is_cluster(&self, vmc_name: &str) -> bool {
        self.labels.get(THANOS_CLUSTER_LABEL).map(String::as_str) == Some(vmc_name)
    }
}

fn grpc_target(host: &str) -> String {
    format!("{host}:{THANOS_GRPC_PORT}")
}

/// Name of the key holding a managed cluster CA in [`PROMETHEUS_MANAGED_CA_SECRET`].
#[must_use]
pub fn managed_ca_key(vmc_name: &str) -> String {
    format!("ca-{vmc_name}")
}

/// Configure metrics federation for the cluster, choosing Thanos or Prometheus.
///
/// Does nothing until `status.prometheusHost` is known.
///
/// # Errors
///
/// Returns an error when a monitoring object cannot be read or written.
pub async fn sync_metrics_federation(
    store: &dyn ObjectStore,
    components: &Components,
    vmc: &VerrazzanoManagedCluster,
) -> Result<(), SyncError> {
    let name = vmc.name_any();
    let status = vmc.status.clone().unwrap_or_default();
    if status.prometheus_host.is_empty() {
        info!(vmc = %name, "Managed cluster Prometheus host not found in VMC status, waiting for the VMC to be registered");
        return Ok(());
    }

    if components.thanos_enabled() && !status.thanos_query_store.is_empty() {
        debug!(vmc = %name, "Syncing the Thanos query endpoint");
        add_thanos_host(store, &status.thanos_query_store, &name).await?;
        delete_scrape_job(store, &name).await
    } else {
        debug!(vmc = %name, "Syncing the Prometheus scraper");
        sync_prometheus_scraper(store, vmc).await?;
        remove_thanos_host(store, components, &name).await
    }
}

/// Read and parse the Thanos endpoints list.
///
/// A missing key is an empty list.
///
/// # Errors
///
/// Returns the YAML error when the list cannot be parsed.
pub fn parse_thanos_endpoints(
    config_map: &ConfigMap,
) -> Result<Vec<ThanosServiceDiscovery>, serde_yaml::Error> {
    match config_map
        .data
        .as_ref()
        .and_then(|data| data.get(THANOS_SERVICE_DISCOVERY_KEY))
    {
        Some(yaml) if !yaml.trim().is_empty() => serde_yaml::from_str(yaml),
        _ => Ok(Vec::new()),
    }
}

async fn write_thanos_endpoints(
    store: &dyn ObjectStore,
    mut config_map: ConfigMap,
    endpoints: &[ThanosServiceDiscovery],
    vmc_name: &str,
) -> Result<(), SyncError> {
    let yaml =
        serde_yaml::to_string(endpoints).map_err(|e| SyncError::serialize("Thanos endpoints", e))?;
    config_map
        .data
        .get_or_insert_with(BTreeMap::new)
        .insert(THANOS_SERVICE_DISCOVERY_KEY.to_string(), yaml);
    store::update(store, &config_map).await.map_err(|e| {
        SyncError::Invalid(format!(
            "Failed to update Thanos endpoints config map for VMC {vmc_name}: {e}"
        ))
    })?;
    info!(vmc = %vmc_name, "The Thanos endpoints ConfigMap has been modified");
    Ok(())
}

/// List the managed cluster's Thanos store endpoint `host:443`.
///
/// An entry with the cluster label but another host gets its targets replaced. An
/// unparsable list is reset.
///
/// # Errors
///
/// Returns an error when the ConfigMap does not exist or cannot be written.
pub async fn add_thanos_host(
    store: &dyn ObjectStore,
    host: &str,
    vmc_name: &str,
) -> Result<(), SyncError> {
    let config_map = store::get::<ConfigMap>(
        store,
        VERRAZZANO_MONITORING_NAMESPACE,
        THANOS_ENDPOINTS_CONFIGMAP,
    )
    .await?;
    let mut endpoints = parse_thanos_endpoints(&config_map).unwrap_or_else(|e| {
        warn!(error = %e, "Clearing and repopulating Thanos endpoints ConfigMap due to parse error");
        Vec::new()
    });

    let target = grpc_target(host);
    if let Some(entry) = endpoints.iter_mut().find(|e| e.is_cluster(vmc_name)) {
        if entry.targets.contains(&target) {
            debug!(vmc = %vmc_name, target = %target, "Managed cluster endpoint already present in the Thanos endpoints");
            return Ok(());
        }
        debug!(vmc = %vmc_name, target = %target, "Modifying managed cluster Thanos endpoint");
        entry.targets = vec![target];
    } else {
        debug!(vmc = %vmc_name, target = %target, "Adding managed cluster Thanos endpoint");
        endpoints.push(ThanosServiceDiscovery {
            targets: vec![target],
            labels: BTreeMap::from([(THANOS_CLUSTER_LABEL.to_string(), vmc_name.to_string())]),
        });
    }
    write_thanos_endpoints(store, config_map, &endpoints, vmc_name).await
}

/// Drop the managed cluster from the Thanos endpoints.
///
/// Does nothing when Thanos is disabled, the ConfigMap is absent, or the list cannot
/// be parsed.
///
/// # Errors
///
/// Returns an error when the ConfigMap cannot be read or written.
pub async fn remove_thanos_host(
    store: &dyn ObjectStore,
    components: &Components,
    vmc_name: &str,
) -> Result<(), SyncError> {
    if !components.thanos_enabled() {
        return Ok(());
    }
    let Some(config_map) = store::get_opt::<ConfigMap>(
        store,
        VERRAZZANO_MONITORING_NAMESPACE,
        THANOS_ENDPOINTS_CONFIGMAP,
    )
    .await?
    else {
        return Ok(());
    };
    let Ok(mut endpoints) = parse_thanos_endpoints(&config_map) else {
        return Ok(());
    };
    let Some(index) = endpoints.iter().position(|e| e.is_cluster(vmc_name)) else {
        return Ok(());
    };
    endpoints.remove(index);
    write_thanos_endpoints(store, config_map, &endpoints, vmc_name).await
}

/// The `/federate` scrape job for a managed cluster.
///
/// `tls_config` is only set when the cluster CA is known.
#[must_use]
pub fn scrape_job(vmc_name: &str, prometheus_host: &str, password: &str, has_ca: bool) -> serde_json::Value {
    let mut job = json!({
        "job_name": vmc_name,
        "scrape_interval": SCRAPE_INTERVAL,
        "scrape_timeout": SCRAPE_TIMEOUT,
        "scheme": "https",
        "honor_labels": true,
        "metrics_path": "/federate",
        "params": {"match[]": ["{__name__=~\".+\"}"]},
        "basic_auth": {
            "username": PROMETHEUS_INTERNAL_USERNAME,
            "password": password
        },
        "static_configs": [{
            "targets": [prometheus_host],
            "labels": {THANOS_CLUSTER_LABEL: vmc_name}
        }],
        "metric_relabel_configs": [{
            "action": "replace",
            "source_labels": [THANOS_CLUSTER_LABEL],
            "target_label": THANOS_CLUSTER_LABEL,
            "replacement": vmc_name
        }]
    });
    if has_ca {
        job["tls_config"] = json!({
            "ca_file": format!("{PROMETHEUS_CA_MOUNT_PATH}/{}", managed_ca_key(vmc_name))
        });
    }
    job
}

fn job_name(job: &serde_yaml::Value) -> Option<&str> {
    job.get("job_name").and_then(serde_yaml::Value::as_str)
}

fn parse_jobs(secret: &Secret) -> Result<Vec<serde_yaml::Value>, SyncError> {
    match secret_value(secret, PROMETHEUS_SCRAPE_CONFIGS_KEY) {
        Some(yaml) if !yaml.trim().is_empty() => serde_yaml::from_str(&yaml).map_err(|e| {
            SyncError::Invalid(format!(
                "Failed to parse the Prometheus scrape configs in {PROMETHEUS_SCRAPE_CONFIGS_SECRET}: {e}"
            ))
        }),
        _ => Ok(Vec::new()),
    }
}

async fn write_jobs(
    store: &dyn ObjectStore,
    mut secret: Secret,
    jobs: &[serde_yaml::Value],
) -> Result<(), SyncError> {
    let yaml = serde_yaml::to_string(jobs).map_err(|e| SyncError::serialize("scrape configs", e))?;
    secret
        .data
        .get_or_insert_with(BTreeMap::new)
        .insert(PROMETHEUS_SCRAPE_CONFIGS_KEY.to_string(), ByteString(yaml.into_bytes()));
    store::update(store, &secret).await?;
    Ok(())
}

/// Write the Prometheus federation scrape job and CA for the managed cluster.
///
/// Skipped when the admin cluster has no `verrazzano-monitoring` namespace.
///
/// # Errors
///
/// Returns an error when the scrape configs or the internal Prometheus password are
/// missing, or a write fails.
pub async fn sync_prometheus_scraper(
    store: &dyn ObjectStore,
    vmc: &VerrazzanoManagedCluster,
) -> Result<(), SyncError> {
    let name = vmc.name_any();
    let namespace = vmc.namespace().unwrap_or_default();
    let prometheus_host = vmc
        .status
        .as_ref()
        .map(|s| s.prometheus_host.clone())
        .unwrap_or_default();

    let ca_cert = match vmc.spec.ca_secret.as_deref().filter(|s| !s.is_empty()) {
        Some(ca_secret) => read_secret_value(store, &namespace, ca_secret, CA_SECRET_KEY)
            .await?
            .filter(|ca| !ca.is_empty()),
        None => None,
    };

    match store
        .get(
            &api_resource::<Namespace>(),
            &ObjectKey::cluster(VERRAZZANO_MONITORING_NAMESPACE),
        )
        .await
    {
        Ok(_) => {}
        Err(e) if e.is_not_found() => {
            debug!(vmc = %name, "No verrazzano-monitoring namespace, skipping the Prometheus scraper");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    if let Some(ca) = &ca_cert {
        let key = managed_ca_key(&name);
        create_or_update::<Secret, _>(
            store,
            VERRAZZANO_MONITORING_NAMESPACE,
            PROMETHEUS_MANAGED_CA_SECRET,
            |secret| {
                secret
                    .data
                    .get_or_insert_with(BTreeMap::new)
                    .insert(key, ByteString(ca.clone().into_bytes()));
            },
        )
        .await?;
    }

    let secret = store::get::<Secret>(
        store,
        VERRAZZANO_MONITORING_NAMESPACE,
        PROMETHEUS_SCRAPE_CONFIGS_SECRET,
    )
    .await?;
    let mut jobs = parse_jobs(&secret)?;

    let password = read_secret_value(
        store,
        VERRAZZANO_SYSTEM_NAMESPACE,
        PROMETHEUS_INTERNAL_SECRET,
        PASSWORD_SECRET_KEY,
    )
    .await?
    .ok_or_else(|| {
        SyncError::Invalid(format!(
            "Secret {VERRAZZANO_SYSTEM_NAMESPACE}/{PROMETHEUS_INTERNAL_SECRET} has no {PASSWORD_SECRET_KEY}"
        ))
    })?;

    let job = serde_yaml::to_value(scrape_job(&name, &prometheus_host, &password, ca_cert.is_some()))
        .map_err(|e| SyncError::serialize("scrape job", e))?;
    match jobs.iter_mut().find(|j| job_name(j) == Some(name.as_str())) {
        Some(existing) if *existing == job => {
            debug!(vmc = %name, "Prometheus scrape job is up to date");
            return Ok(());
        }
        Some(existing) => *existing = job,
        None => jobs.push(job),
    }
    write_jobs(store, secret, &jobs).await?;
    info!(vmc = %name, "Updated the Prometheus scrape job for the managed cluster");
    Ok(())
}

/// Remove the managed cluster scrape job.
///
/// # Errors
///
/// Returns an error when the scrape configs cannot be parsed or written.
pub async fn delete_scrape_job(store: &dyn ObjectStore, vmc_name: &str) -> Result<(), SyncError> {
    let Some(secret) = store::get_opt::<Secret>(
        store,
        VERRAZZANO_MONITORING_NAMESPACE,
        PROMETHEUS_SCRAPE_CONFIGS_SECRET,
    )
    .await?
    else {
        return Ok(());
    };
    let mut jobs = parse_jobs(&secret)?;
    let before = jobs.len();
    jobs.retain(|j| job_name(j) != Some(vmc_name));
    if jobs.len() == before {
        return Ok(());
    }
    write_jobs(store, secret, &jobs).await?;
    info!(vmc = %vmc_name, "Removed the Prometheus scrape job for the managed cluster");
    Ok(())
}

/// Remove the managed cluster CA from the Prometheus managed CA Secret.
///
/// # Errors
///
/// Returns an error when the Secret cannot be read or written.
pub async fn remove_managed_ca_cert(
    store: &dyn ObjectStore,
    vmc_name: &str,
) -> Result<(), SyncError> {
    let Some(mut secret) = store::get_opt::<Secret>(
        store,
        VERRAZZANO_MONITORING_NAMESPACE,
        PROMETHEUS_MANAGED_CA_SECRET,
    )
    .await?
    else {
        return Ok(());
    };
    let removed = secret
        .data
        .as_mut()
        .and_then(|data| data.remove(&managed_ca_key(vmc_name)))
        .is_some();
    if removed {
        store::update(store, &secret).await?;
        debug!(vmc = %vmc_name, "Removed the managed cluster CA from the Prometheus CA secret");
    }
    Ok(())
}

#[cfg(test)]
#[path = "federation_tests.rs"]
mod federation_tests;
