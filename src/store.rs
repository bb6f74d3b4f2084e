// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes object store abstraction.
//!
//! Reconcilers never talk to [`kube::Api`] directly. They go through the
//! [`ObjectStore`] capability set (get/create/update/update-status/list/delete),
//! which exchanges objects as JSON values and reports NotFound, Conflict and
//! AlreadyExists as distinct error kinds. Two implementations exist:
//!
//! - [`KubeStore`] - backed by a live cluster through `Api<DynamicObject>`
//! - `FakeStore` - an in-memory map, compiled for unit tests only
//!
//! The typed helpers ([`get`], [`create`], [`update`], ...) convert between JSON and
//! `k8s-openapi` / CRD types so callers stay strongly typed.

use crate::reconcilers::retry::{retry_kube_call, RetryPolicy};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::core::GroupVersionKind;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use tracing::debug;

/// Namespace and name of an object. Cluster-scoped objects have no namespace.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    #[must_use]
    pub fn namespaced(namespace: &str, name: &str) -> Self {
        Self {
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
        }
    }

    #[must_use]
    pub fn cluster(name: &str) -> Self {
        Self {
            namespace: None,
            name: name.to_string(),
        }
    }

    /// Extract the key from an object's metadata.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when the object has no `metadata.name`.
    pub fn of(resource: &ApiResource, object: &Value) -> Result<Self, StoreError> {
        let name = object
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::Invalid {
                kind: resource.kind.clone(),
                message: "metadata.name is required".to_string(),
            })?;
        let namespace = object
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self {
            namespace,
            name: name.to_string(),
        })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Errors returned by an [`ObjectStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: String },

    #[error("conflict writing {kind} {key}: {message}")]
    Conflict {
        kind: String,
        key: String,
        message: String,
    },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: String, key: String },

    #[error("invalid {kind} object: {message}")]
    Invalid { kind: String, message: String },

    #[error("failed to convert {kind} object: {source}")]
    Serialization {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Kubernetes API error: {0}")]
    Api(#[source] kube::Error),
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    fn not_found(resource: &ApiResource, key: &ObjectKey) -> Self {
        Self::NotFound {
            kind: resource.kind.clone(),
            key: key.to_string(),
        }
    }
}

/// The Kubernetes capability set consumed by the reconcilers.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one object, or [`StoreError::NotFound`].
    async fn get(&self, resource: &ApiResource, key: &ObjectKey) -> Result<Value, StoreError>;

    /// Create an object, or [`StoreError::AlreadyExists`].
    async fn create(&self, resource: &ApiResource, object: Value) -> Result<Value, StoreError>;

    /// Replace an object, or [`StoreError::Conflict`] on a stale resource version.
    async fn update(&self, resource: &ApiResource, object: Value) -> Result<Value, StoreError>;

    /// Replace only the status subresource of an object.
    async fn update_status(&self, resource: &ApiResource, object: Value)
        -> Result<Value, StoreError>;

    /// List objects, optionally filtered by namespace and label selector.
    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Value>, StoreError>;

    /// Delete an object, or [`StoreError::NotFound`].
    async fn delete(&self, resource: &ApiResource, key: &ObjectKey) -> Result<(), StoreError>;
}

// ============================================================================
// Typed helpers
// ============================================================================

/// [`ApiResource`] of a statically typed Kubernetes resource.
#[must_use]
pub fn api_resource<K: Resource<DynamicType = ()>>() -> ApiResource {
    ApiResource::erase::<K>(&())
}

fn from_value<K: Resource<DynamicType = ()> + DeserializeOwned>(
    value: Value,
) -> Result<K, StoreError> {
    serde_json::from_value(value).map_err(|source| StoreError::Serialization {
        kind: K::kind(&()).to_string(),
        source,
    })
}

fn to_value<K: Resource<DynamicType = ()> + Serialize>(object: &K) -> Result<Value, StoreError> {
    let mut value = serde_json::to_value(object).map_err(|source| StoreError::Serialization {
        kind: K::kind(&()).to_string(),
        source,
    })?;
    if let Some(map) = value.as_object_mut() {
        map.insert("apiVersion".to_string(), json!(K::api_version(&())));
        map.insert("kind".to_string(), json!(K::kind(&())));
    }
    Ok(value)
}

/// Fetch a typed namespaced object.
///
/// # Errors
///
/// Returns [`StoreError::NotFound`] when the object does not exist.
pub async fn get<K>(store: &dyn ObjectStore, namespace: &str, name: &str) -> Result<K, StoreError>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    let value = store
        .get(&api_resource::<K>(), &ObjectKey::namespaced(namespace, name))
        .await?;
    from_value(value)
}

/// Fetch a typed namespaced object, mapping NotFound to `None`.
///
/// # Errors
///
/// Returns any store error other than NotFound.
pub async fn get_opt<K>(
    store: &dyn ObjectStore,
    namespace: &str,
    name: &str,
) -> Result<Option<K>, StoreError>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    match get::<K>(store, namespace, name).await {
        Ok(obj) => Ok(Some(obj)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Create a typed object.
///
/// # Errors
///
/// Returns [`StoreError::AlreadyExists`] for duplicates.
pub async fn create<K>(store: &dyn ObjectStore, object: &K) -> Result<K, StoreError>
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
{
    let created = store.create(&api_resource::<K>(), to_value(object)?).await?;
    from_value(created)
}

/// Replace a typed object.
///
/// # Errors
///
/// Returns [`StoreError::Conflict`] on a stale resource version.
pub async fn update<K>(store: &dyn ObjectStore, object: &K) -> Result<K, StoreError>
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
{
    let updated = store.update(&api_resource::<K>(), to_value(object)?).await?;
    from_value(updated)
}

/// Replace the status subresource of a typed object.
///
/// # Errors
///
/// Returns [`StoreError::Conflict`] on a stale resource version.
pub async fn update_status<K>(store: &dyn ObjectStore, object: &K) -> Result<K, StoreError>
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
{
    let updated = store
        .update_status(&api_resource::<K>(), to_value(object)?)
        .await?;
    from_value(updated)
}

/// List typed objects in a namespace (or cluster-wide with `None`).
///
/// # Errors
///
/// Returns any store error.
pub async fn list<K>(
    store: &dyn ObjectStore,
    namespace: Option<&str>,
    label_selector: Option<&str>,
) -> Result<Vec<K>, StoreError>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    store
        .list(&api_resource::<K>(), namespace, label_selector)
        .await?
        .into_iter()
        .map(from_value)
        .collect()
}

/// Delete a typed namespaced object, treating NotFound as success.
///
/// # Errors
///
/// Returns any store error other than NotFound.
pub async fn delete_ignore_not_found<K>(
    store: &dyn ObjectStore,
    namespace: &str,
    name: &str,
) -> Result<(), StoreError>
where
    K: Resource<DynamicType = ()>,
{
    match store
        .delete(&api_resource::<K>(), &ObjectKey::namespaced(namespace, name))
        .await
    {
        Err(e) if !e.is_not_found() => Err(e),
        _ => Ok(()),
    }
}

// ============================================================================
// Live cluster implementation
// ============================================================================

/// [`ObjectStore`] backed by the Kubernetes API server.
///
/// Transient API errors (429, 5xx, transport) are retried with a short policy
/// before they reach the reconciler.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    retry: RetryPolicy,
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            retry: RetryPolicy {
                steps: 4,
                initial_interval: std::time::Duration::from_millis(100),
                ..RetryPolicy::default()
            },
        }
    }

    fn api(&self, resource: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, resource),
            None => Api::all_with(self.client.clone(), resource),
        }
    }

    fn dynamic(resource: &ApiResource, object: Value) -> Result<DynamicObject, StoreError> {
        serde_json::from_value(object).map_err(|source| StoreError::Serialization {
            kind: resource.kind.clone(),
            source,
        })
    }

    fn value(resource: &ApiResource, object: &DynamicObject) -> Result<Value, StoreError> {
        serde_json::to_value(object).map_err(|source| StoreError::Serialization {
            kind: resource.kind.clone(),
            source,
        })
    }
}

/// Translate a kube error into the store's error kinds.
fn map_kube_error(resource: &ApiResource, key: &ObjectKey, err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => StoreError::not_found(resource, key),
        kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
            StoreError::AlreadyExists {
                kind: resource.kind.clone(),
                key: key.to_string(),
            }
        }
        kube::Error::Api(ae) if ae.code == 409 => StoreError::Conflict {
            kind: resource.kind.clone(),
            key: key.to_string(),
            message: ae.message,
        },
        other => StoreError::Api(other),
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get(&self, resource: &ApiResource, key: &ObjectKey) -> Result<Value, StoreError> {
        let api = self.api(resource, key.namespace.as_deref());
        let op = format!("get {} {key}", resource.kind);
        let obj = retry_kube_call(&self.retry, || api.get(&key.name), &op)
            .await
            .map_err(|e| map_kube_error(resource, key, e))?;
        Self::value(resource, &obj)
    }

    async fn create(&self, resource: &ApiResource, object: Value) -> Result<Value, StoreError> {
        let key = ObjectKey::of(resource, &object)?;
        let api = self.api(resource, key.namespace.as_deref());
        let obj = Self::dynamic(resource, object)?;
        let op = format!("create {} {key}", resource.kind);
        debug!(kind = %resource.kind, key = %key, "Creating object");
        let pp = PostParams::default();
        let created = retry_kube_call(
            &self.retry,
            || api.create(&pp, &obj),
            &op,
        )
        .await
        .map_err(|e| map_kube_error(resource, &key, e))?;
        Self::value(resource, &created)
    }

    async fn update(&self, resource: &ApiResource, object: Value) -> Result<Value, StoreError> {
        let key = ObjectKey::of(resource, &object)?;
        let api = self.api(resource, key.namespace.as_deref());
        let obj = Self::dynamic(resource, object)?;
        let op = format!("replace {} {key}", resource.kind);
        debug!(kind = %resource.kind, key = %key, "Replacing object");
        let pp = PostParams::default();
        let updated = retry_kube_call(
            &self.retry,
            || api.replace(&key.name, &pp, &obj),
            &op,
        )
        .await
        .map_err(|e| map_kube_error(resource, &key, e))?;
        Self::value(resource, &updated)
    }

    async fn update_status(
        &self,
        resource: &ApiResource,
        object: Value,
    ) -> Result<Value, StoreError> {
        let key = ObjectKey::of(resource, &object)?;
        let api = self.api(resource, key.namespace.as_deref());
        let mut patch = json!({
            "status": object.get("status").cloned().unwrap_or(Value::Null),
        });
        // Carry the resource version so a stale status write is rejected as a conflict.
        if let Some(version) = object.pointer("/metadata/resourceVersion") {
            patch["metadata"] = json!({ "resourceVersion": version });
        }
        let op = format!("patch status {} {key}", resource.kind);
        let pp = PatchParams::default();
        let merge = Patch::Merge(&patch);
        let updated = retry_kube_call(
            &self.retry,
            || api.patch_status(&key.name, &pp, &merge),
            &op,
        )
        .await
        .map_err(|e| map_kube_error(resource, &key, e))?;
        Self::value(resource, &updated)
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Value>, StoreError> {
        let api = self.api(resource, namespace);
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let op = format!("list {}", resource.kind);
        let objects = retry_kube_call(&self.retry, || api.list(&params), &op)
            .await
            .map_err(StoreError::Api)?;
        objects
            .items
            .iter()
            .map(|obj| Self::value(resource, obj))
            .collect()
    }

    async fn delete(&self, resource: &ApiResource, key: &ObjectKey) -> Result<(), StoreError> {
        let api = self.api(resource, key.namespace.as_deref());
        let op = format!("delete {} {key}", resource.kind);
        let dp = DeleteParams::default();
        retry_kube_call(
            &self.retry,
            || api.delete(&key.name, &dp),
            &op,
        )
        .await
        .map_err(|e| map_kube_error(resource, key, e))?;
        Ok(())
    }
}

// ============================================================================
// In-memory implementation
// ============================================================================

#[cfg(test)]
pub use fake::FakeStore;


/// Outcome of a create-or-update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationResult {
    /// The object did not exist and was created
    Created,
    /// The object existed and was changed
    Updated,
    /// The object already matched, nothing was written
    None,
}

/// String value of a Secret data key, if present and valid UTF-8.
#[must_use]
pub fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .and_then(|bytes| String::from_utf8(bytes.0.clone()).ok())
}

/// Read one key of a Secret, treating a missing Secret or key as `None`.
///
/// # Errors
///
/// Returns any store error other than NotFound.
pub async fn read_secret_value(
    store: &dyn ObjectStore,
    namespace: &str,
    name: &str,
    key: &str,
) -> Result<Option<String>, StoreError> {
    Ok(get_opt::<Secret>(store, namespace, name)
        .await?
        .and_then(|secret| secret_value(&secret, key)))
}

/// Build an [`ApiResource`] for a resource the operator does not own a type for.
#[must_use]
pub fn unstructured_resource(group: &str, version: &str, kind: &str, plural: &str) -> ApiResource {
    ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(group, version, kind), plural)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod store_tests;
