// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the object store abstraction and its in-memory fake.

#[cfg(test)]
mod tests {
    use super::super::{
        api_resource, create, get, get_opt, list, map_kube_error, update, update_status,
        FakeStore, ObjectKey, ObjectStore,
    };
    use k8s_openapi::api::core::v1::{ConfigMap, Secret};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn config_map(name: &str, labels: &[(&str, &str)]) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("verrazzano-mc".to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(
            kube::core::Status {
                status: Some(kube::core::response::StatusSummary::Failure),
                message: "boom".to_string(),
                reason: reason.to_string(),
                code,
                metadata: None,
                details: None,
            }
            .boxed(),
        )
    }

    #[test]
    fn test_object_key_display() {
        assert_eq!(ObjectKey::namespaced("ns", "a").to_string(), "ns/a");
        assert_eq!(ObjectKey::cluster("a").to_string(), "a");
    }

    #[test]
    fn test_map_kube_error_kinds() {
        let resource = api_resource::<Secret>();
        let key = ObjectKey::namespaced("ns", "s");

        assert!(map_kube_error(&resource, &key, api_error(404, "NotFound")).is_not_found());
        assert!(map_kube_error(&resource, &key, api_error(409, "Conflict")).is_conflict());
        assert!(
            map_kube_error(&resource, &key, api_error(409, "AlreadyExists")).is_already_exists()
        );
        let other = map_kube_error(&resource, &key, api_error(500, "InternalError"));
        assert!(!other.is_not_found() && !other.is_conflict());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = FakeStore::new();
        let err = get::<Secret>(&store, "ns", "missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(get_opt::<Secret>(&store, "ns", "missing")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_create_twice_is_already_exists() {
        let store = FakeStore::new();
        let cm = config_map("a", &[]);
        create(&store, &cm).await.unwrap();
        let err = create(&store, &cm).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_stale_update_is_conflict() {
        let store = FakeStore::new();
        let created = create(&store, &config_map("a", &[])).await.unwrap();

        let mut first = created.clone();
        first.data = Some(BTreeMap::from([("k".to_string(), "1".to_string())]));
        update(&store, &first).await.unwrap();

        let mut stale = created;
        stale.data = Some(BTreeMap::from([("k".to_string(), "2".to_string())]));
        let err = update(&store, &stale).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_list_filters_by_label() {
        let store = FakeStore::new();
        create(&store, &config_map("a", &[("app", "x")])).await.unwrap();
        create(&store, &config_map("b", &[("app", "y")])).await.unwrap();

        let all = list::<ConfigMap>(&store, Some("verrazzano-mc"), None)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let only_x = list::<ConfigMap>(&store, Some("verrazzano-mc"), Some("app=x"))
            .await
            .unwrap();
        assert_eq!(only_x.len(), 1);
        assert_eq!(only_x[0].metadata.name.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = FakeStore::new();
        let err = store
            .delete(&api_resource::<Secret>(), &ObjectKey::namespaced("ns", "x"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = FakeStore::new();
        store.fail_on("create", "ConfigMap", "a");
        let err = create(&store, &config_map("a", &[])).await.unwrap_err();
        assert!(err.is_conflict());
        create(&store, &config_map("b", &[])).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_status_keeps_spec_and_update_keeps_status() {
        use crate::crd::{
            ClusterState, VerrazzanoManagedCluster, VerrazzanoManagedClusterSpec,
            VerrazzanoManagedClusterStatus,
        };

        let store = FakeStore::new();
        let mut vmc = VerrazzanoManagedCluster::new("c1", VerrazzanoManagedClusterSpec::default());
        vmc.metadata.namespace = Some("verrazzano-mc".to_string());
        let mut vmc = create(&store, &vmc).await.unwrap();

        vmc.status = Some(VerrazzanoManagedClusterStatus {
            state: Some(ClusterState::Active),
            ..Default::default()
        });
        let vmc = update_status(&store, &vmc).await.unwrap();

        let mut changed = vmc.clone();
        changed.spec.description = Some("hello".to_string());
        changed.status = None;
        update(&store, &changed).await.unwrap();

        let stored: VerrazzanoManagedCluster = get(&store, "verrazzano-mc", "c1").await.unwrap();
        assert_eq!(stored.spec.description.as_deref(), Some("hello"));
        assert_eq!(
            stored.status.and_then(|s| s.state),
            Some(ClusterState::Active)
        );
    }
}
