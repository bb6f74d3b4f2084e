// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Which Verrazzano components are installed on the admin cluster.
//!
//! The installed `Verrazzano` resource is read once per pass. Without one, Rancher and
//! Keycloak count as enabled since they are on by default, while Argo CD and Thanos,
//! which must be opted into, count as disabled.

use crate::external::{
    verrazzano, verrazzano_component_enabled, verrazzano_component_opted_in,
    verrazzano_fluentd_opensearch, verrazzano_rancher_url,
};
use crate::store::{ObjectStore, StoreError};
use serde_json::Value;
use tracing::debug;

/// Snapshot of the installed Verrazzano resource.
#[derive(Clone, Debug, Default)]
pub struct Components {
    verrazzano: Option<Value>,
}

impl Components {
    /// Read the first `Verrazzano` resource on the cluster.
    ///
    /// # Errors
    ///
    /// Returns the store error of the list call.
    pub async fn load(store: &dyn ObjectStore) -> Result<Self, StoreError> {
        let verrazzano = store.list(&verrazzano(), None, None).await?.into_iter().next();
        if verrazzano.is_none() {
            debug!("No Verrazzano resource found, using component defaults");
        }
        Ok(Self { verrazzano })
    }

    #[must_use]
    pub fn from_resource(resource: Option<Value>) -> Self {
        Self {
            verrazzano: resource,
        }
    }

    /// The installed Verrazzano resource, if any.
    #[must_use]
    pub fn resource(&self) -> Option<&Value> {
        self.verrazzano.as_ref()
    }

    fn enabled(&self, component: &str) -> bool {
        self.verrazzano
            .as_ref()
            .is_none_or(|vz| verrazzano_component_enabled(vz, component))
    }

    fn opted_in(&self, component: &str) -> bool {
        self.verrazzano
            .as_ref()
            .is_some_and(|vz| verrazzano_component_opted_in(vz, component))
    }

    #[must_use]
    pub fn rancher_enabled(&self) -> bool {
        self.enabled("rancher")
    }

    #[must_use]
    pub fn keycloak_enabled(&self) -> bool {
        self.enabled("keycloak")
    }

    #[must_use]
    pub fn argocd_enabled(&self) -> bool {
        self.opted_in("argoCD")
    }

    #[must_use]
    pub fn thanos_enabled(&self) -> bool {
        self.opted_in("thanos")
    }

    /// `status.instance.rancherUrl`, when set and non-empty.
    #[must_use]
    pub fn rancher_url(&self) -> Option<&str> {
        self.verrazzano
            .as_ref()
            .and_then(verrazzano_rancher_url)
            .filter(|url| !url.is_empty())
    }

    /// Fluentd OpenSearch URL and credentials secret, when configured.
    #[must_use]
    pub fn fluentd_opensearch(&self) -> (Option<&str>, Option<&str>) {
        self.verrazzano
            .as_ref()
            .map_or((None, None), verrazzano_fluentd_opensearch)
    }
}

#[cfg(test)]
#[path = "components_tests.rs"]
mod components_tests;
