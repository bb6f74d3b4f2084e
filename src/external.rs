// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Read-only accessors for resources owned by other operators.
//!
//! ClusterAPI `Cluster`/`ClusterClass`, Rancher `ClusterRoleTemplateBinding`/`User`
//! and the `Verrazzano` install resource are read as unstructured JSON. Each accessor
//! extracts one named field and returns `None` when it is absent, so the schema
//! details stay in this module.

use crate::store::unstructured_resource;
use kube::api::ApiResource;
use serde_json::Value;

/// ClusterAPI `Cluster`
#[must_use]
pub fn capi_cluster() -> ApiResource {
    unstructured_resource("cluster.x-k8s.io", "v1beta1", "Cluster", "clusters")
}

/// ClusterAPI `ClusterClass`
#[must_use]
pub fn capi_cluster_class() -> ApiResource {
    unstructured_resource("cluster.x-k8s.io", "v1beta1", "ClusterClass", "clusterclasses")
}

/// Rancher `ClusterRoleTemplateBinding`
#[must_use]
pub fn rancher_crtb() -> ApiResource {
    unstructured_resource(
        "management.cattle.io",
        "v3",
        "ClusterRoleTemplateBinding",
        "clusterroletemplatebindings",
    )
}

/// Rancher `User` (cluster-scoped)
#[must_use]
pub fn rancher_user() -> ApiResource {
    unstructured_resource("management.cattle.io", "v3", "User", "users")
}

/// Verrazzano install resource
#[must_use]
pub fn verrazzano() -> ApiResource {
    unstructured_resource("install.verrazzano.io", "v1beta1", "Verrazzano", "verrazzanos")
}

/// Resource for an arbitrary `apiVersion`/`kind` pair, such as a control plane ref.
#[must_use]
pub fn from_api_version(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = api_version.rsplit_once('/').unwrap_or(("", api_version));
    let plural = format!("{}s", kind.to_ascii_lowercase());
    unstructured_resource(group, version, kind, &plural)
}

fn str_at<'a>(obj: &'a Value, pointer: &str) -> Option<&'a str> {
    obj.pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

// ============================================================================
// ClusterAPI Cluster
// ============================================================================

/// `status.phase` of a Cluster.
#[must_use]
pub fn cluster_phase(cluster: &Value) -> Option<&str> {
    str_at(cluster, "/status/phase")
}

/// `spec.topology.class` of a Cluster, present when it was built from a ClusterClass.
#[must_use]
pub fn cluster_topology_class(cluster: &Value) -> Option<&str> {
    str_at(cluster, "/spec/topology/class")
}

/// True when the Cluster has a `spec.topology` section at all.
#[must_use]
pub fn cluster_has_topology(cluster: &Value) -> bool {
    cluster
        .pointer("/spec/topology")
        .is_some_and(|t| !t.is_null())
}

/// `spec.infrastructureRef.kind` of a Cluster.
#[must_use]
pub fn cluster_infrastructure_kind(cluster: &Value) -> Option<&str> {
    str_at(cluster, "/spec/infrastructureRef/kind")
}

/// `spec.controlPlaneRef.kind` of a Cluster.
#[must_use]
pub fn cluster_control_plane_kind(cluster: &Value) -> Option<&str> {
    str_at(cluster, "/spec/controlPlaneRef/kind")
}

/// `spec.controlPlaneRef.apiVersion` of a Cluster.
#[must_use]
pub fn cluster_control_plane_api_version(cluster: &Value) -> Option<&str> {
    str_at(cluster, "/spec/controlPlaneRef/apiVersion")
}

// ============================================================================
// ClusterAPI ClusterClass
// ============================================================================

/// `spec.infrastructure.ref.kind` of a ClusterClass.
#[must_use]
pub fn cluster_class_infrastructure_kind(class: &Value) -> Option<&str> {
    str_at(class, "/spec/infrastructure/ref/kind")
}

/// `spec.controlPlane.ref.kind` of a ClusterClass.
#[must_use]
pub fn cluster_class_control_plane_kind(class: &Value) -> Option<&str> {
    str_at(class, "/spec/controlPlane/ref/kind")
}

/// `status.version` of a control plane object.
#[must_use]
pub fn control_plane_version(control_plane: &Value) -> Option<&str> {
    str_at(control_plane, "/status/version")
}

// ============================================================================
// Rancher
// ============================================================================

/// Top-level `username` attribute of a Rancher User.
#[must_use]
pub fn rancher_username(user: &Value) -> Option<&str> {
    str_at(user, "/username")
}

/// `metadata.name` of any object.
#[must_use]
pub fn object_name(obj: &Value) -> Option<&str> {
    str_at(obj, "/metadata/name")
}

// ============================================================================
// Verrazzano
// ============================================================================

/// `status.instance.rancherUrl` of the Verrazzano resource.
#[must_use]
pub fn verrazzano_rancher_url(vz: &Value) -> Option<&str> {
    str_at(vz, "/status/instance/rancherUrl")
}

/// Whether a component is enabled in the Verrazzano resource.
///
/// Components default to enabled unless `spec.components.<name>.enabled` is false.
#[must_use]
pub fn verrazzano_component_enabled(vz: &Value, component: &str) -> bool {
    vz.pointer(&format!("/spec/components/{component}/enabled"))
        .and_then(Value::as_bool)
        .unwrap_or(true)
}

/// Whether a component that defaults to disabled has been switched on.
#[must_use]
pub fn verrazzano_component_opted_in(vz: &Value, component: &str) -> bool {
    vz.pointer(&format!("/spec/components/{component}/enabled"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Fluentd OpenSearch URL and secret from the Verrazzano resource.
#[must_use]
pub fn verrazzano_fluentd_opensearch(vz: &Value) -> (Option<&str>, Option<&str>) {
    (
        str_at(vz, "/spec/components/fluentd/opensearchURL"),
        str_at(vz, "/spec/components/fluentd/opensearchSecret"),
    )
}

#[cfg(test)]
#[path = "external_tests.rs"]
mod external_tests;
