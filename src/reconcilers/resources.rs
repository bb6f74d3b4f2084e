// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generic create-or-update helpers for objects on the admin cluster.
//!
//! Every object the VMC controller owns is written the same way: fetch it (or start
//! from an empty object carrying only the name and namespace), run a mutate closure,
//! and write only when the closure changed something. The outcome is reported as an
//! [`OperationResult`].
//!
//! # Example
//!
//! ```rust,no_run
//! use vz_cluster_operator::reconcilers::resources::create_or_update;
//! use vz_cluster_operator::store::{ObjectStore, OperationResult};
//! use k8s_openapi::api::core::v1::ServiceAccount;
//!
//! async fn example(store: &dyn ObjectStore) -> anyhow::Result<()> {
//!     let (_sa, result) = create_or_update::<ServiceAccount, _>(
//!         store,
//!         "verrazzano-mc",
//!         "verrazzano-cluster-managed1",
//!         |_sa| {},
//!     )
//!     .await?;
//!     assert_ne!(result, OperationResult::Updated);
//!     Ok(())
//! }
//! ```

use crate::store::{self, ObjectKey, ObjectStore, OperationResult, StoreError};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{ApiResource, ObjectMeta};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

/// Create or update a typed namespaced object.
///
/// When the object exists, `mutate` runs on the fetched copy and the object is
/// written back only if it changed. Otherwise `mutate` runs on an empty object
/// carrying `namespace` and `name`, which is then created.
///
/// # Errors
///
/// Returns any store error from the read or the write.
pub async fn create_or_update<K, F>(
    store: &dyn ObjectStore,
    namespace: &str,
    name: &str,
    mutate: F,
) -> Result<(K, OperationResult), StoreError>
where
    K: Resource<DynamicType = ()> + Default + Clone + PartialEq + Serialize + DeserializeOwned,
    F: FnOnce(&mut K),
{
    let kind = K::kind(&()).to_string();

    match store::get_opt::<K>(store, namespace, name).await? {
        Some(existing) => {
            let mut object = existing.clone();
            mutate(&mut object);
            if object == existing {
                debug!(kind = %kind, namespace = %namespace, name = %name, "Resource is up to date");
                return Ok((existing, OperationResult::None));
            }
            let updated = store::update(store, &object).await?;
            info!(kind = %kind, namespace = %namespace, name = %name, "Updated resource");
            Ok((updated, OperationResult::Updated))
        }
        None => {
            let mut object = K::default();
            object.meta_mut().name = Some(name.to_string());
            object.meta_mut().namespace = Some(namespace.to_string());
            mutate(&mut object);
            let created = store::create(store, &object).await?;
            info!(kind = %kind, namespace = %namespace, name = %name, "Created resource");
            Ok((created, OperationResult::Created))
        }
    }
}

/// Create or update an unstructured object such as a Rancher resource.
///
/// # Errors
///
/// Returns any store error from the read or the write.
pub async fn create_or_update_value<F>(
    store: &dyn ObjectStore,
    resource: &ApiResource,
    key: &ObjectKey,
    mutate: F,
) -> Result<OperationResult, StoreError>
where
    F: FnOnce(&mut Value),
{
    match store.get(resource, key).await {
        Ok(existing) => {
            let mut object = existing.clone();
            mutate(&mut object);
            if object == existing {
                return Ok(OperationResult::None);
            }
            store.update(resource, object).await?;
            info!(kind = %resource.kind, key = %key, "Updated resource");
            Ok(OperationResult::Updated)
        }
        Err(e) if e.is_not_found() => {
            let mut metadata = json!({ "name": key.name });
            if let Some(ns) = &key.namespace {
                metadata["namespace"] = json!(ns);
            }
            let mut object = json!({
                "apiVersion": resource.api_version,
                "kind": resource.kind,
                "metadata": metadata,
            });
            mutate(&mut object);
            store.create(resource, object).await?;
            info!(kind = %resource.kind, key = %key, "Created resource");
            Ok(OperationResult::Created)
        }
        Err(e) => Err(e),
    }
}

/// Controller owner reference pointing at `owner`.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] when the owner has not been persisted yet and so
/// has no UID.
pub fn controller_owner_reference<O>(owner: &O) -> Result<OwnerReference, StoreError>
where
    O: Resource<DynamicType = ()>,
{
    let mut reference = owner
        .controller_owner_ref(&())
        .ok_or_else(|| StoreError::Invalid {
            kind: O::kind(&()).to_string(),
            message: "owner has no uid".to_string(),
        })?;
    reference.block_owner_deletion = Some(true);
    Ok(reference)
}

/// Make `owner` the controller of the object described by `meta`.
///
/// Replaces any existing controller reference so an object never has two.
pub fn set_controller_reference(meta: &mut ObjectMeta, owner: OwnerReference) {
    let refs = meta.owner_references.get_or_insert_with(Vec::new);
    refs.retain(|r| r.controller != Some(true) || r.uid == owner.uid);
    match refs.iter_mut().find(|r| r.uid == owner.uid) {
        Some(existing) => *existing = owner,
        None => refs.push(owner),
    }
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod resources_tests;
