// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the VMC controller.
//!
//! The controller receives an `Arc<Context>` that contains:
//! - the [`ObjectStore`] for every admin cluster read and write
//! - the Rancher, Argo CD and Keycloak API clients
//! - the connector for ClusterAPI workload clusters
//! - the operator settings from the command line
//!
//! Nothing in here is global. Tests build a context around a `FakeStore` and clients
//! pointed at a mock HTTP server.

use crate::argocd::ArgoCDClient;
use crate::constants::{
    ERROR_REQUEUE_MAX_SECS, ERROR_REQUEUE_MIN_SECS, RECONCILE_REQUEUE_INTERVAL_SECS,
};
use crate::keycloak::KeycloakClient;
use crate::rancher::{RancherClient, RequestSender};
use crate::reconcilers::retry::RetryPolicy;
use crate::store::ObjectStore;
use crate::workload::{KubeconfigConnector, WorkloadClusters};
use std::sync::Arc;
use std::time::Duration;

/// Operator settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Requeue delay after a successful pass
    pub requeue_interval: Duration,

    /// Lower bound of the jittered requeue after a failed step, in seconds
    pub error_requeue_min_secs: u64,

    /// Upper bound of the jittered requeue after a failed step, in seconds
    pub error_requeue_max_secs: u64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            requeue_interval: Duration::from_secs(RECONCILE_REQUEUE_INTERVAL_SECS),
            error_requeue_min_secs: ERROR_REQUEUE_MIN_SECS,
            error_requeue_max_secs: ERROR_REQUEUE_MAX_SECS,
        }
    }
}

/// Shared context passed to the VMC controller.
#[derive(Clone)]
pub struct Context {
    /// Admin cluster object access
    pub store: Arc<dyn ObjectStore>,

    /// Rancher API client and token cache
    pub rancher: RancherClient,

    /// Argo CD API client
    pub argocd: ArgoCDClient,

    /// Keycloak admin API client
    pub keycloak: KeycloakClient,

    /// Opens stores on workload clusters from their ClusterAPI kubeconfig
    pub workload: Arc<dyn WorkloadClusters>,

    pub config: OperatorConfig,
}

impl Context {
    /// Build a context whose HTTP clients share one sender and retry policy.
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        sender: Arc<dyn RequestSender>,
        retry: RetryPolicy,
        config: OperatorConfig,
    ) -> Self {
        Self {
            store,
            rancher: RancherClient::new(Arc::clone(&sender), retry.clone()),
            argocd: ArgoCDClient::new(Arc::clone(&sender), retry.clone()),
            keycloak: KeycloakClient::new(sender, retry),
            workload: Arc::new(KubeconfigConnector),
            config,
        }
    }

    /// Object store as a trait object reference.
    #[must_use]
    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    /// Replace the workload cluster connector.
    #[must_use]
    pub fn with_workload_clusters(mut self, workload: Arc<dyn WorkloadClusters>) -> Self {
        self.workload = workload;
        self
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
