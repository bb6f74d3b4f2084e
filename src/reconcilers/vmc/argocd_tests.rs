// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `argocd.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::constants::{
        ARGOCD_CLUSTER_USER_SECRET, CATTLE_SYSTEM_NAMESPACE, CA_CRT_KEY, MULTICLUSTER_NAMESPACE,
        PASSWORD_SECRET_KEY, RANCHER_TLS_SECRET,
    };
    use crate::external::{rancher_crtb, rancher_user};
    use crate::store::{secret_value, FakeStore, ObjectKey};
    use crate::test_support::{
        add_argocd, mock_argocd_login, mock_login, mock_rancher_cluster, persisted_vmc,
        rancher_store, registered_vmc, secret, test_context, vmc, RANCHER_TOKEN,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RANCHER_URL: &str = "https://rancher.example.com";

    fn components() -> Components {
        Components::from_resource(Some(json!({
            "spec": {"components": {"argoCD": {"enabled": true}}},
            "status": {"instance": {"rancherUrl": RANCHER_URL}}
        })))
    }

    fn store() -> Arc<FakeStore> {
        let store = rancher_store();
        add_argocd(&store);
        store
            .insert(&secret(
                MULTICLUSTER_NAMESPACE,
                ARGOCD_CLUSTER_USER_SECRET,
                &[(PASSWORD_SECRET_KEY, "argo-user-pw")],
            ))
            .unwrap();
        store
            .insert(&secret(
                CATTLE_SYSTEM_NAMESPACE,
                RANCHER_TLS_SECRET,
                &[(CA_CRT_KEY, "rancher-ca")],
            ))
            .unwrap();
        Arc::new(store)
    }

    async fn mock_argocd_clusters(server: &MockServer, names: &[&str]) {
        let items: Vec<Value> = names.iter().map(|n| json!({ "name": n })).collect();
        Mock::given(method("GET"))
            .and(path("/api/v1/clusters"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": items })))
            .mount(server)
            .await;
    }

    fn with_registration(
        mut vmc: VerrazzanoManagedCluster,
        status: ArgoCDRegistrationStatus,
    ) -> VerrazzanoManagedCluster {
        vmc.status.get_or_insert_with(Default::default).argocd_registration =
            Some(new_registration(status, "previous"));
        vmc
    }

    #[tokio::test]
    async fn test_pending_without_cluster_id() {
        let server = MockServer::start().await;
        let store = store();
        let ctx = test_context(&store, &server);

        let registration = register_managed_cluster_with_argocd(&ctx, &components(), &vmc("managed1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            registration.status,
            ArgoCDRegistrationStatus::PendingRancherClusterRegistration
        );
        assert_eq!(
            registration.message,
            "Waiting for Rancher manifest to be applied on the managed cluster"
        );
        assert!(registration.timestamp.is_some());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_completed_registration_is_left_alone() {
        let server = MockServer::start().await;
        let store = store();
        let ctx = test_context(&store, &server);
        let vmc = with_registration(
            registered_vmc("managed1", "c-abc12"),
            ArgoCDRegistrationStatus::Completed,
        );

        let registration = register_managed_cluster_with_argocd(&ctx, &components(), &vmc)
            .await
            .unwrap();
        assert!(registration.is_none());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_until_cluster_active() {
        let server = MockServer::start().await;
        mock_login(&server).await;
        mock_rancher_cluster(&server, "c-abc12", "provisioning").await;
        let store = store();
        let ctx = test_context(&store, &server);

        let registration = register_managed_cluster_with_argocd(
            &ctx,
            &components(),
            &registered_vmc("managed1", "c-abc12"),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(
            registration.status,
            ArgoCDRegistrationStatus::PendingRancherClusterRegistration
        );
        assert_eq!(
            registration.message,
            "Waiting for managed cluster with id c-abc12 to become active before registering in Argo CD"
        );
    }

    #[tokio::test]
    async fn test_missing_rancher_url_fails() {
        let server = MockServer::start().await;
        mock_login(&server).await;
        mock_rancher_cluster(&server, "c-abc12", "active").await;
        let store = store();
        let ctx = test_context(&store, &server);

        let err = register_managed_cluster_with_argocd(
            &ctx,
            &Components::from_resource(None),
            &registered_vmc("managed1", "c-abc12"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.registration.status, ArgoCDRegistrationStatus::Failed);
        assert_eq!(
            err.registration.message,
            "No instance information found in Verrazzano resource status"
        );
    }

    #[tokio::test]
    async fn test_already_registered_cluster() {
        let server = MockServer::start().await;
        mock_login(&server).await;
        mock_rancher_cluster(&server, "c-abc12", "active").await;
        mock_argocd_login(&server).await;
        mock_argocd_clusters(&server, &["in-cluster", "managed1"]).await;
        let store = store();
        let ctx = test_context(&store, &server);

        let registration = register_managed_cluster_with_argocd(
            &ctx,
            &components(),
            &registered_vmc("managed1", "c-abc12"),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(registration.status, ArgoCDRegistrationStatus::Completed);
        assert_eq!(registration.message, "Cluster is already registered in Argo CD");
        assert!(store
            .peek_typed::<Secret>(ARGOCD_NAMESPACE, "managed1-cluster-secret")
            .is_none());
    }

    #[tokio::test]
    async fn test_registers_cluster_secret() {
        let server = MockServer::start().await;
        mock_login(&server).await;
        mock_rancher_cluster(&server, "c-abc12", "active").await;
        mock_argocd_login(&server).await;
        mock_argocd_clusters(&server, &["in-cluster"]).await;
        let store = store();
        let ctx = test_context(&store, &server);
        let vmc = with_registration(
            registered_vmc("managed1", "c-abc12"),
            ArgoCDRegistrationStatus::Failed,
        );

        let registration = register_managed_cluster_with_argocd(&ctx, &components(), &vmc)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(registration.status, ArgoCDRegistrationStatus::Completed);
        assert_eq!(
            registration.message,
            "Successfully registered managed cluster in ArgoCD"
        );

        let secret = store
            .peek_typed::<Secret>(ARGOCD_NAMESPACE, "managed1-cluster-secret")
            .unwrap();
        assert_eq!(
            secret.metadata.labels.as_ref().unwrap()[ARGOCD_SECRET_TYPE_LABEL],
            "cluster"
        );
        assert_eq!(secret_value(&secret, "name").unwrap(), "managed1");
        assert_eq!(
            secret_value(&secret, "server").unwrap(),
            "https://rancher.example.com/k8s/clusters/c-abc12"
        );
        let config: Value = serde_json::from_str(&secret_value(&secret, "config").unwrap()).unwrap();
        assert_eq!(config["bearerToken"], RANCHER_TOKEN);
        assert_eq!(config["tlsClientConfig"]["insecure"], false);
        assert_eq!(
            config["tlsClientConfig"]["caData"],
            base64::engine::general_purpose::STANDARD.encode("rancher-ca")
        );
    }

    #[tokio::test]
    async fn test_argocd_list_failure() {
        let server = MockServer::start().await;
        mock_login(&server).await;
        mock_rancher_cluster(&server, "c-abc12", "active").await;
        mock_argocd_login(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/v1/clusters"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let store = store();
        let ctx = test_context(&store, &server);

        let err = register_managed_cluster_with_argocd(
            &ctx,
            &components(),
            &registered_vmc("managed1", "c-abc12"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.registration.status, ArgoCDRegistrationStatus::Failed);
        assert_eq!(err.registration.message, "Failed to call Argo CD clusters GET API");
        assert!(err.to_string().starts_with("Failed to call Argo CD clusters GET API: "));
    }

    #[tokio::test]
    async fn test_argocd_crtb() {
        let store = FakeStore::new();
        store
            .insert_value(
                &rancher_user(),
                json!({
                    "apiVersion": "management.cattle.io/v3",
                    "kind": "User",
                    "metadata": {"name": "u-argo"},
                    "username": ARGOCD_CLUSTER_USERNAME
                }),
            )
            .unwrap();

        assert_eq!(
            sync_argocd_crtb(&store, &vmc("managed1")).await.unwrap(),
            OperationResult::None
        );
        assert_eq!(
            sync_argocd_crtb(&store, &registered_vmc("managed1", "c-abc12"))
                .await
                .unwrap(),
            OperationResult::Created
        );
        let crtb = store
            .peek(&rancher_crtb(), &ObjectKey::namespaced("c-abc12", "crtb-argocd-c-abc12"))
            .unwrap();
        assert_eq!(crtb["userName"], "u-argo");
        assert_eq!(crtb["roleTemplateName"], ARGOCD_ROLE_TEMPLATE);
    }

    #[tokio::test]
    async fn test_unregister_deletes_cluster_secret() {
        let store = FakeStore::new();
        let vmc = persisted_vmc(&store, &vmc("managed1"));
        unregister_cluster_from_argocd(&store, &vmc).await.unwrap();

        store
            .insert(&secret(ARGOCD_NAMESPACE, "managed1-cluster-secret", &[("name", "managed1")]))
            .unwrap();
        unregister_cluster_from_argocd(&store, &vmc).await.unwrap();
        assert!(store
            .peek_typed::<Secret>(ARGOCD_NAMESPACE, "managed1-cluster-secret")
            .is_none());
    }
}
