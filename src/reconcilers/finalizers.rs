// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generic finalizer management for namespaced resources.
//!
//! The finalizer list is written with a plain update through the [`ObjectStore`], so a
//! stale copy is rejected as a conflict instead of silently overwriting someone
//! else's change. On success the in-memory object takes the written metadata, which
//! keeps later updates in the same pass from conflicting with this one.
//!
//! # Example
//!
//! ```rust,no_run
//! use vz_cluster_operator::constants::VMC_FINALIZER;
//! use vz_cluster_operator::crd::VerrazzanoManagedCluster;
//! use vz_cluster_operator::reconcilers::finalizers::{ensure_finalizer, has_finalizer};
//! use vz_cluster_operator::store::ObjectStore;
//!
//! async fn reconcile(store: &dyn ObjectStore, mut vmc: VerrazzanoManagedCluster) -> anyhow::Result<()> {
//!     ensure_finalizer(store, &mut vmc, VMC_FINALIZER).await?;
//!     assert!(has_finalizer(&vmc, VMC_FINALIZER));
//!     Ok(())
//! }
//! ```

use crate::store::{self, ObjectStore, StoreError};
use kube::core::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

/// True when `finalizer` is present on the resource.
#[must_use]
pub fn has_finalizer<T: Resource>(resource: &T, finalizer: &str) -> bool {
    resource
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == finalizer))
}

/// Add a finalizer to a resource if not already present.
///
/// Returns `true` when the finalizer was added by this call.
///
/// # Errors
///
/// Returns the store error of the update, including [`StoreError::Conflict`] when
/// the resource changed since it was read.
pub async fn ensure_finalizer<T>(
    store: &dyn ObjectStore,
    resource: &mut T,
    finalizer: &str,
) -> Result<bool, StoreError>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope> + Serialize + DeserializeOwned,
{
    if has_finalizer(resource, finalizer) {
        return Ok(false);
    }

    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();
    info!(
        kind = %T::kind(&()),
        namespace = %namespace,
        name = %name,
        finalizer = %finalizer,
        "Adding finalizer"
    );

    resource
        .meta_mut()
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(finalizer.to_string());
    let updated = store::update(store, resource).await?;
    *resource.meta_mut() = updated.meta().clone();
    Ok(true)
}

/// Remove a finalizer from a resource.
///
/// A conflict is ignored: the resource is being deleted and the next pass sees the
/// fresh copy and retries the removal.
///
/// # Errors
///
/// Returns any store error other than [`StoreError::Conflict`].
pub async fn remove_finalizer<T>(
    store: &dyn ObjectStore,
    resource: &mut T,
    finalizer: &str,
) -> Result<(), StoreError>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope> + Serialize + DeserializeOwned,
{
    if !has_finalizer(resource, finalizer) {
        return Ok(());
    }

    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();
    info!(
        kind = %T::kind(&()),
        namespace = %namespace,
        name = %name,
        finalizer = %finalizer,
        "Removing finalizer"
    );

    if let Some(finalizers) = resource.meta_mut().finalizers.as_mut() {
        finalizers.retain(|f| f != finalizer);
    }
    match store::update(store, resource).await {
        Ok(updated) => {
            *resource.meta_mut() = updated.meta().clone();
            Ok(())
        }
        Err(e) if e.is_conflict() => {
            debug!(namespace = %namespace, name = %name, error = %e, "Conflict removing finalizer, ignoring");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "finalizers_tests.rs"]
mod finalizers_tests;
