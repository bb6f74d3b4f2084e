// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # vz-cluster-operator - Verrazzano managed cluster operator
//!
//! Kubernetes operator that runs on a Verrazzano admin cluster and reconciles
//! `VerrazzanoManagedCluster` (VMC) resources. Each VMC stands for a managed cluster:
//! the operator imports it into Rancher, generates the Secrets its agent needs, pushes
//! them through the Rancher proxy, and wires the cluster into Argo CD, Keycloak and
//! metrics federation.
//!
//! ## Modules
//!
//! - [`crd`] - the `VerrazzanoManagedCluster` custom resource and its status
//! - [`reconcilers`] - the VMC controller and its sync steps
//! - [`rancher`] - Rancher API client, cluster import and the Kubernetes proxy
//! - [`argocd`] / [`keycloak`] - admin API clients for Argo CD and Keycloak
//! - [`store`] - the object store abstraction over the Kubernetes API
//! - [`workload`] - direct connections to ClusterAPI workload clusters
//! - [`context`] - shared controller context and operator settings
//! - [`metrics`] - Prometheus metrics
//!
//! ## Example
//!
//! ```rust
//! use vz_cluster_operator::crd::{VerrazzanoManagedCluster, VerrazzanoManagedClusterSpec};
//!
//! let vmc = VerrazzanoManagedCluster::new("managed1", VerrazzanoManagedClusterSpec::default());
//! assert_eq!(vmc.metadata.name.as_deref(), Some("managed1"));
//! ```

pub mod argocd;
pub mod constants;
pub mod context;
pub mod crd;
pub mod errors;
pub mod external;
pub mod keycloak;
pub mod metrics;
pub mod rancher;
pub mod reconcilers;
pub mod store;
pub mod workload;

#[cfg(test)]
pub(crate) mod test_support;
