// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Direct access to ClusterAPI workload clusters.
//!
//! ClusterAPI writes a `<cluster>-kubeconfig` Secret on the admin cluster for every
//! workload cluster it provisions. [`WorkloadClusters`] turns that kubeconfig into an
//! [`ObjectStore`] talking to the workload cluster's own API server, so reads do not
//! depend on the cluster being registered with Rancher.

use crate::constants::{HTTP_CONNECT_TIMEOUT_SECS, HTTP_READ_TIMEOUT_SECS};
use crate::store::{KubeStore, ObjectStore};
use async_trait::async_trait;
use kube::config::{KubeConfigOptions, Kubeconfig, KubeconfigError};
use kube::{Client, Config};
use std::sync::Arc;
use std::time::Duration;

/// Failure to reach a workload cluster from its kubeconfig.
#[derive(Debug, thiserror::Error)]
pub enum WorkloadError {
    #[error("invalid workload cluster kubeconfig: {0}")]
    Kubeconfig(#[from] KubeconfigError),

    #[error("failed to build workload cluster client: {0}")]
    Client(#[from] kube::Error),
}

/// Opens object stores on workload clusters.
#[async_trait]
pub trait WorkloadClusters: Send + Sync {
    /// Connect to the cluster described by `kubeconfig` (YAML).
    async fn connect(&self, kubeconfig: &str) -> Result<Arc<dyn ObjectStore>, WorkloadError>;
}

/// [`WorkloadClusters`] that builds a [`KubeStore`] from the kubeconfig's current context,
/// with the same connect and read timeouts as the operator's HTTP clients.
#[derive(Clone, Copy, Debug, Default)]
pub struct KubeconfigConnector;

#[async_trait]
impl WorkloadClusters for KubeconfigConnector {
    async fn connect(&self, kubeconfig: &str) -> Result<Arc<dyn ObjectStore>, WorkloadError> {
        let kubeconfig = Kubeconfig::from_yaml(kubeconfig)?;
        let mut config =
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
        config.connect_timeout = Some(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS));
        config.read_timeout = Some(Duration::from_secs(HTTP_READ_TIMEOUT_SECS));
        let client = Client::try_from(config)?;
        Ok(Arc::new(KubeStore::new(client)))
    }
}

#[cfg(test)]
#[path = "workload_tests.rs"]
mod workload_tests;
