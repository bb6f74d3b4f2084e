// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status and condition model for `VerrazzanoManagedCluster`.
//!
//! A reconcile pass builds up conditions on its in-memory copy of the VMC and then
//! publishes them with [`update_status`]. Publishing re-fetches the VMC and merges the
//! generated fields into the fresh copy, so fields written concurrently by the
//! managed cluster agent (heartbeat, API URL, Prometheus host) are never lost.
//!
//! # Condition Format
//!
//! A VMC carries at most one condition per [`ConditionType`]:
//! - `type`: Ready, ManagedCARetrieved or ManifestPushed
//! - `status`: "True", "False", or "Unknown"
//! - `message`: A human-readable explanation
//! - `lastTransitionTime`: RFC3339 timestamp when the condition changed
//!
//! # Example
//!
//! ```rust
//! use vz_cluster_operator::crd::{ConditionStatus, ConditionType, VerrazzanoManagedClusterStatus};
//! use vz_cluster_operator::reconcilers::status::{new_condition, set_status_condition};
//!
//! let mut status = VerrazzanoManagedClusterStatus::default();
//! set_status_condition(&mut status, new_condition(ConditionType::Ready, ConditionStatus::True, "Ready"), false);
//! set_status_condition(&mut status, new_condition(ConditionType::Ready, ConditionStatus::False, "Failed"), false);
//! assert_eq!(status.conditions.len(), 1);
//! ```

use crate::constants::{MAX_TIMES_VMC_AGENT_POLLING, VMC_AGENT_POLLING_INTERVAL_SECS};
use crate::crd::{
    ClusterReference, ClusterState, Condition, ConditionStatus, ConditionType,
    RancherRegistrationStatus, VerrazzanoManagedCluster, VerrazzanoManagedClusterStatus,
};
use crate::errors::{ErrorAggregator, SyncError};
use crate::external::{
    capi_cluster, capi_cluster_class, cluster_class_control_plane_kind,
    cluster_class_infrastructure_kind, cluster_control_plane_api_version,
    cluster_control_plane_kind, cluster_has_topology, cluster_infrastructure_kind, cluster_phase,
    cluster_topology_class, control_plane_version, from_api_version,
};
use crate::store::{self, ObjectKey, ObjectStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use kube::ResourceExt;
use serde_json::Value;
use tracing::{debug, error, warn};

/// Provider shown for clusters that are not backed by ClusterAPI.
pub const IMPORTED_PROVIDER: &str = "Imported";

const OCNE_PROVIDER: &str = "Oracle OCNE on OCI";
const OKE_PROVIDER: &str = "Oracle OKE";

const OCNE_INFRASTRUCTURE_KIND: &str = "OCICluster";
const OCNE_CONTROL_PLANE_KIND: &str = "OCNEControlPlane";
const OKE_INFRASTRUCTURE_KIND: &str = "OCIManagedCluster";
const OKE_CONTROL_PLANE_KIND: &str = "OCIManagedControlPlane";

/// Create a condition stamped with the current time.
///
/// # Arguments
///
/// * `condition_type` - Which aspect of the VMC is reported
/// * `status` - True, False or Unknown
/// * `message` - A human-readable explanation
#[must_use]
pub fn new_condition(
    condition_type: ConditionType,
    status: ConditionStatus,
    message: impl Into<String>,
) -> Condition {
    Condition {
        r#type: condition_type,
        status,
        message: message.into(),
        last_transition_time: Some(Utc::now().to_rfc3339()),
    }
}

/// Add or replace a condition, keeping at most one condition per type.
///
/// A condition identical in type, status and message to an existing one is a no-op.
/// With `compare_on_time` the timestamp must match as well, so a fresh timestamp
/// replaces the old one. A condition whose type already exists overwrites it in place;
/// anything else is appended.
pub fn set_status_condition(
    status: &mut VerrazzanoManagedClusterStatus,
    condition: Condition,
    compare_on_time: bool,
) {
    for existing in &mut status.conditions {
        if existing.r#type != condition.r#type {
            continue;
        }
        let identical = existing.status == condition.status
            && existing.message == condition.message
            && (!compare_on_time || existing.last_transition_time == condition.last_transition_time);
        if !identical {
            existing.status = condition.status;
            existing.message = condition.message;
            existing.last_transition_time = condition.last_transition_time;
        }
        return;
    }
    status.conditions.push(condition);
}

/// Set a condition on the VMC's in-memory status.
///
/// ManifestPushed is compared on time so every successful push refreshes it.
pub fn set_condition(
    vmc: &mut VerrazzanoManagedCluster,
    condition_type: ConditionType,
    status: ConditionStatus,
    message: impl Into<String>,
) {
    let condition = new_condition(condition_type, status, message);
    let status = vmc.status.get_or_insert_with(Default::default);
    set_status_condition(
        status,
        condition,
        condition_type == ConditionType::ManifestPushed,
    );
}

/// State of an imported cluster derived from the agent heartbeat.
///
/// The heartbeat window is `now + interval × max_misses`. When the gap between that
/// window and the last heartbeat exceeds `max_misses` whole minutes the cluster is
/// Inactive; otherwise an unset state becomes Pending and any other becomes Active.
#[must_use]
pub fn state_from_heartbeat(
    current: Option<ClusterState>,
    last_agent_connect_time: DateTime<Utc>,
    now: DateTime<Utc>,
) -> ClusterState {
    let max_polling_time =
        now + Duration::seconds(VMC_AGENT_POLLING_INTERVAL_SECS * MAX_TIMES_VMC_AGENT_POLLING);
    let diff = max_polling_time - last_agent_connect_time;
    if diff.num_minutes() > MAX_TIMES_VMC_AGENT_POLLING {
        ClusterState::Inactive
    } else if current.is_none() {
        ClusterState::Pending
    } else {
        ClusterState::Active
    }
}

/// Display string for a ClusterAPI infrastructure/control plane provider pair.
#[must_use]
pub fn provider_display_name(infrastructure: &str, control_plane: &str) -> String {
    match (infrastructure, control_plane) {
        (OCNE_INFRASTRUCTURE_KIND, OCNE_CONTROL_PLANE_KIND) => OCNE_PROVIDER.to_string(),
        (OKE_INFRASTRUCTURE_KIND, OKE_CONTROL_PLANE_KIND) => OKE_PROVIDER.to_string(),
        _ => format!("{control_plane} on {infrastructure} Infrastructure"),
    }
}

fn strip_template_suffix(kind: &str) -> String {
    kind.strip_suffix("Template").unwrap_or(kind).to_string()
}

async fn get_capi_cluster(
    store: &dyn ObjectStore,
    cluster_ref: &ClusterReference,
) -> Result<Option<Value>, StoreError> {
    let key = ObjectKey::namespaced(&cluster_ref.namespace, &cluster_ref.name);
    match store.get(&capi_cluster(), &key).await {
        Ok(cluster) => Ok(Some(cluster)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Recompute `status.state`.
///
/// Imported clusters use the heartbeat; ClusterAPI clusters mirror the Cluster phase.
/// A missing Cluster leaves the state unchanged.
///
/// # Errors
///
/// Returns a store error when the Cluster cannot be read.
pub async fn update_state(
    store: &dyn ObjectStore,
    vmc: &mut VerrazzanoManagedCluster,
) -> Result<(), StoreError> {
    let name = vmc.name_any();
    let status = vmc.status.get_or_insert_with(Default::default);

    let Some(cluster_ref) = status.cluster_ref.clone() else {
        if let Some(last) = status.last_agent_connect_time.as_deref() {
            match DateTime::parse_from_rfc3339(last) {
                Ok(last) => {
                    status.state = Some(state_from_heartbeat(
                        status.state,
                        last.with_timezone(&Utc),
                        Utc::now(),
                    ));
                }
                Err(e) => {
                    warn!(vmc = %name, value = %last, error = %e, "Ignoring unparseable lastAgentConnectTime");
                }
            }
        }
        return Ok(());
    };

    if let Some(cluster) = get_capi_cluster(store, &cluster_ref).await? {
        let phase = cluster_phase(&cluster).unwrap_or_default();
        let state = ClusterState::from_capi_phase(phase);
        if state == ClusterState::Unknown && phase != "Unknown" {
            debug!(vmc = %name, phase = %phase, "ClusterAPI Cluster reports a phase the VMC does not track");
        }
        status.state = Some(state);
    }
    Ok(())
}

/// Recompute `status.provider`.
///
/// # Errors
///
/// Returns every missing provider reference at once, or a store error.
pub async fn update_provider(
    store: &dyn ObjectStore,
    vmc: &mut VerrazzanoManagedCluster,
) -> Result<(), SyncError> {
    let status = vmc.status.get_or_insert_with(Default::default);
    let Some(cluster_ref) = status.cluster_ref.clone() else {
        status.provider = IMPORTED_PROVIDER.to_string();
        return Ok(());
    };
    let Some(cluster) = get_capi_cluster(store, &cluster_ref).await? else {
        return Ok(());
    };

    let (source, infra, control_plane) = if cluster_has_topology(&cluster) {
        let class_name = cluster_topology_class(&cluster).unwrap_or_default();
        let key = ObjectKey::namespaced(&cluster_ref.namespace, class_name);
        let class = match store.get(&capi_cluster_class(), &key).await {
            Ok(class) => class,
            Err(e) if e.is_not_found() => {
                status.provider = String::new();
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        (
            format!("cluster class {key}"),
            cluster_class_infrastructure_kind(&class).map(strip_template_suffix),
            cluster_class_control_plane_kind(&class).map(strip_template_suffix),
        )
    } else {
        (
            format!("clusterAPI cluster {}/{}", cluster_ref.namespace, cluster_ref.name),
            cluster_infrastructure_kind(&cluster).map(str::to_string),
            cluster_control_plane_kind(&cluster).map(str::to_string),
        )
    };

    let mut errs = ErrorAggregator::new("\n");
    if infra.is_none() {
        errs.add(format!("{source} has no infrastructure provider"));
    }
    if control_plane.is_none() {
        errs.add(format!("{source} has no control plane provider"));
    }
    errs.into_result()?;

    status.provider = provider_display_name(
        infra.as_deref().unwrap_or_default(),
        control_plane.as_deref().unwrap_or_default(),
    );
    Ok(())
}

/// Copy the Kubernetes version of a ClusterAPI cluster from its control plane.
///
/// # Errors
///
/// Returns an error when no control plane object, or no `status.version`, is found.
pub async fn update_kubernetes_version(
    store: &dyn ObjectStore,
    vmc: &mut VerrazzanoManagedCluster,
) -> Result<(), SyncError> {
    let status = vmc.status.get_or_insert_with(Default::default);
    let Some(cluster_ref) = status.cluster_ref.clone() else {
        return Ok(());
    };
    let Some(cluster) = get_capi_cluster(store, &cluster_ref).await? else {
        return Ok(());
    };
    let (Some(api_version), Some(kind)) = (
        cluster_control_plane_api_version(&cluster),
        cluster_control_plane_kind(&cluster),
    ) else {
        return Ok(());
    };

    let control_planes = store
        .list(
            &from_api_version(api_version, kind),
            Some(&cluster_ref.namespace),
            None,
        )
        .await?;
    let first = control_planes
        .first()
        .ok_or_else(|| SyncError::Invalid(format!("failed to find {kind} objects")))?;
    let version = control_plane_version(first).ok_or_else(|| {
        SyncError::Invalid(format!("could not find status.version field in {kind} object"))
    })?;

    status.kubernetes.version = version.to_string();
    Ok(())
}

/// Publish the status generated by this pass.
///
/// Recomputes state, imported, provider and Kubernetes version, then merges them and
/// the generated conditions into a freshly fetched copy of the VMC before writing
/// the status subresource.
///
/// # Errors
///
/// Returns an error when a derived field cannot be computed or the write fails.
pub async fn update_status(
    store: &dyn ObjectStore,
    vmc: &mut VerrazzanoManagedCluster,
) -> Result<(), SyncError> {
    update_state(store, vmc).await?;
    {
        let status = vmc.status.get_or_insert_with(Default::default);
        status.imported = status.cluster_ref.is_none();
    }
    update_provider(store, vmc).await?;
    update_kubernetes_version(store, vmc).await?;

    let namespace = vmc.namespace().unwrap_or_default();
    let name = vmc.name_any();
    let mut existing = store::get::<VerrazzanoManagedCluster>(store, &namespace, &name).await?;

    let generated = vmc.status.clone().unwrap_or_default();
    let target = existing.status.get_or_insert_with(Default::default);
    for condition in generated.conditions {
        let on_time = condition.r#type == ConditionType::ManifestPushed;
        set_status_condition(target, condition, on_time);
    }
    target.state = generated.state;
    target.argocd_registration = generated.argocd_registration;
    target.imported = generated.imported;
    target.provider = generated.provider;
    target.kubernetes.version = generated.kubernetes.version;

    debug!(namespace = %namespace, name = %name, "Updating VMC status");
    let written = store::update_status(store, &existing).await?;
    vmc.metadata.resource_version = written.metadata.resource_version;
    Ok(())
}

/// Record the Rancher registration outcome.
///
/// Nothing is written when status, message and cluster ID are unchanged. An empty
/// `cluster_id` never clears a known one. Only `status.rancherRegistration` of a
/// freshly fetched VMC is replaced. Failures are logged, not returned.
pub async fn update_rancher_status(
    store: &dyn ObjectStore,
    vmc: &mut VerrazzanoManagedCluster,
    registration_status: RancherRegistrationStatus,
    cluster_id: &str,
    message: &str,
) {
    let namespace = vmc.namespace().unwrap_or_default();
    let name = vmc.name_any();
    let registration = &mut vmc.status.get_or_insert_with(Default::default).rancher_registration;

    let effective_id = if cluster_id.is_empty() {
        registration.cluster_id.as_str()
    } else {
        cluster_id
    };
    if registration.status == Some(registration_status)
        && registration.message == message
        && registration.cluster_id == effective_id
    {
        return;
    }

    registration.status = Some(registration_status);
    if !cluster_id.is_empty() {
        registration.cluster_id = cluster_id.to_string();
    }
    registration.message = message.to_string();
    registration.timestamp = Some(Utc::now().to_rfc3339());
    let registration = registration.clone();

    let mut existing = match store::get::<VerrazzanoManagedCluster>(store, &namespace, &name).await {
        Ok(existing) => existing,
        Err(e) => {
            error!(namespace = %namespace, name = %name, error = %e, "Failed to get the existing VMC");
            return;
        }
    };
    existing.status.get_or_insert_with(Default::default).rancher_registration = registration;

    match store::update_status(store, &existing).await {
        Ok(written) => vmc.metadata.resource_version = written.metadata.resource_version,
        Err(e) => {
            error!(namespace = %namespace, name = %name, error = %e, "Failed to update Rancher registration status");
        }
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
