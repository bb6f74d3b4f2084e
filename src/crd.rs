// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definition for Verrazzano managed clusters.
//!
//! A [`VerrazzanoManagedCluster`] (VMC) lives in the `verrazzano-mc` namespace of the
//! admin cluster and represents one managed (workload) cluster. The controller derives
//! every spec field on its own and writes it back; users normally create a VMC with an
//! empty spec and the controller fills in the rest.
//!
//! # Example
//!
//! ```yaml
//! apiVersion: clusters.verrazzano.io/v1alpha1
//! kind: VerrazzanoManagedCluster
//! metadata:
//!   name: managed1
//!   namespace: verrazzano-mc
//! spec:
//!   description: "Test managed cluster"
//! ```
//!
//! After the first reconcile the spec contains the generated names:
//!
//! ```yaml
//! spec:
//!   serviceAccount: verrazzano-cluster-managed1
//!   managedClusterManifestSecret: verrazzano-cluster-managed1-manifest
//!   caSecret: ca-secret-managed1
//! ```

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `VerrazzanoManagedCluster` registers a managed cluster with the admin cluster.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "clusters.verrazzano.io",
    version = "v1alpha1",
    kind = "VerrazzanoManagedCluster",
    namespaced,
    shortname = "vmc",
    doc = "VerrazzanoManagedCluster represents a cluster managed by the Verrazzano admin cluster. The controller registers it with Rancher, generates the agent, registration and manifest secrets, and publishes its observed state.",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Provider","type":"string","jsonPath":".status.provider"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[kube(status = "VerrazzanoManagedClusterStatus")]
#[serde(rename_all = "camelCase")]
pub struct VerrazzanoManagedClusterSpec {
    /// Human-readable description of the managed cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Name of the ServiceAccount the managed cluster agent authenticates as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,

    /// Name of the secret holding the managed cluster CA certificate.
    ///
    /// Only set when the managed cluster uses a CA that is not already trusted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_secret: Option<String>,

    /// Name of the secret holding the YAML to apply on the managed cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_cluster_manifest_secret: Option<String>,
}

/// Observed state of a managed cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ClusterState {
    Pending,
    Active,
    Inactive,
    Provisioning,
    Provisioned,
    Deleting,
    Unknown,
    Failed,
}

impl ClusterState {
    /// Map a ClusterAPI `status.phase` through the allow-list of known states.
    ///
    /// Unrecognized phases, including Active/Inactive which only apply to imported
    /// clusters, map to [`ClusterState::Unknown`].
    #[must_use]
    pub fn from_capi_phase(phase: &str) -> Self {
        match phase {
            "Pending" => Self::Pending,
            "Provisioning" => Self::Provisioning,
            "Provisioned" => Self::Provisioned,
            "Deleting" => Self::Deleting,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

/// Condition types published on a VMC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionType {
    /// The last reconcile pass completed
    Ready,
    /// The managed cluster CA certificate was retrieved
    ManagedCARetrieved,
    /// The agent and registration secrets were pushed to the managed cluster
    ManifestPushed,
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ready => "Ready",
            Self::ManagedCARetrieved => "ManagedCARetrieved",
            Self::ManifestPushed => "ManifestPushed",
        };
        f.write_str(s)
    }
}

/// Status of a [`Condition`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Condition represents an observation of a VMC's current state.
///
/// A VMC carries at most one condition per [`ConditionType`]; use
/// [`crate::reconcilers::status::set_status_condition`] to change the list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition.
    pub r#type: ConditionType,

    /// Status of the condition: True, False, or Unknown.
    pub status: ConditionStatus,

    /// Human-readable message indicating details about the transition.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Last time the condition transitioned (RFC3339 format).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Progress of registering the cluster with Rancher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum RancherRegistrationStatus {
    RegistrationApplied,
    RegistrationCompleted,
    RegistrationFailed,
    DeleteFailed,
    RegistrationPendingRancher,
}

/// Rancher registration state of a managed cluster.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RancherRegistration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RancherRegistrationStatus>,

    /// Rancher cluster ID. Once set it is never cleared.
    #[serde(default, rename = "clusterID", skip_serializing_if = "String::is_empty")]
    pub cluster_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Progress of registering the cluster with Argo CD.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ArgoCDRegistrationStatus {
    Completed,
    Failed,
    PendingRancherClusterRegistration,
}

/// Argo CD registration state of a managed cluster.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArgoCDRegistration {
    pub status: ArgoCDRegistrationStatus,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Reference to the ClusterAPI `Cluster` backing a managed cluster.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClusterReference {
    pub name: String,
    pub namespace: String,
}

/// Kubernetes details reported for the managed cluster.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KubernetesInformation {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

/// `VerrazzanoManagedCluster` status
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerrazzanoManagedClusterStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ClusterState>,

    /// True when no ClusterAPI cluster backs this VMC.
    #[serde(default)]
    pub imported: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider: String,

    #[serde(default)]
    pub rancher_registration: RancherRegistration,

    #[serde(
        default,
        rename = "argoCDRegistration",
        skip_serializing_if = "Option::is_none"
    )]
    pub argocd_registration: Option<ArgoCDRegistration>,

    /// Heartbeat written by the managed cluster agent (RFC3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_agent_connect_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_ref: Option<ClusterReference>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prometheus_host: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thanos_host: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thanos_query_store: String,

    #[serde(default)]
    pub kubernetes: KubernetesInformation,
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
