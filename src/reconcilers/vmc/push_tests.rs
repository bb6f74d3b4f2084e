// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `push.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::constants::MULTICLUSTER_NAMESPACE;
    use crate::test_support::{
        mock_login, mock_rancher_cluster, persisted_vmc, rancher_store, registered_vmc, secret,
        test_context, vmc,
    };
    use std::sync::Arc;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const NS: &str = MULTICLUSTER_NAMESPACE;
    const PROXY: &str = "/k8s/clusters/c-abc12/api/v1/namespaces/verrazzano-system";

    fn store() -> Arc<crate::store::FakeStore> {
        let store = rancher_store();
        store
            .insert(&secret(NS, "verrazzano-cluster-managed1-agent", &[("admin-kubeconfig", "kc")]))
            .unwrap();
        store
            .insert(&secret(
                NS,
                "verrazzano-cluster-managed1-registration",
                &[("managed-cluster-name", "managed1")],
            ))
            .unwrap();
        Arc::new(store)
    }

    async fn mock_namespace(server: &MockServer, status: u16) {
        Mock::given(method("GET"))
            .and(path(PROXY))
            .respond_with(ResponseTemplate::new(status))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_push_creates_both_secrets() {
        let server = MockServer::start().await;
        mock_login(&server).await;
        mock_rancher_cluster(&server, "c-abc12", "active").await;
        mock_namespace(&server, 200).await;
        for name in [MCAGENT_SECRET, MCREGISTRATION_SECRET] {
            Mock::given(method("GET"))
                .and(path(format!("{PROXY}/secrets/{name}")))
                .respond_with(ResponseTemplate::new(404))
                .mount(&server)
                .await;
        }
        Mock::given(method("POST"))
            .and(path(format!("{PROXY}/secrets")))
            .and(body_string_contains(MCAGENT_SECRET))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{PROXY}/secrets")))
            .and(body_string_contains(MCREGISTRATION_SECRET))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let store = store();
        let ctx = test_context(&store, &server);
        let vmc = persisted_vmc(&store, &registered_vmc("managed1", "c-abc12"));

        assert!(push_manifest_objects(&ctx, &vmc).await.unwrap());
    }

    #[tokio::test]
    async fn test_push_skipped_without_cluster_id() {
        let server = MockServer::start().await;
        let store = store();
        let ctx = test_context(&store, &server);
        let vmc = persisted_vmc(&store, &vmc("managed1"));

        assert!(!push_manifest_objects(&ctx, &vmc).await.unwrap());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_push_waits_for_active_cluster() {
        let server = MockServer::start().await;
        mock_login(&server).await;
        mock_rancher_cluster(&server, "c-abc12", "provisioning").await;
        let store = store();
        let ctx = test_context(&store, &server);
        let vmc = persisted_vmc(&store, &registered_vmc("managed1", "c-abc12"));

        assert!(!push_manifest_objects(&ctx, &vmc).await.unwrap());
    }

    #[tokio::test]
    async fn test_push_waits_for_verrazzano_system_namespace() {
        let server = MockServer::start().await;
        mock_login(&server).await;
        mock_rancher_cluster(&server, "c-abc12", "active").await;
        mock_namespace(&server, 404).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .named("no secret writes")
            .mount(&server)
            .await;
        let store = store();
        let ctx = test_context(&store, &server);
        let vmc = persisted_vmc(&store, &registered_vmc("managed1", "c-abc12"));

        assert!(!push_manifest_objects(&ctx, &vmc).await.unwrap());
    }

    #[tokio::test]
    async fn test_push_fails_on_proxy_error() {
        let server = MockServer::start().await;
        mock_login(&server).await;
        mock_rancher_cluster(&server, "c-abc12", "active").await;
        mock_namespace(&server, 200).await;
        Mock::given(method("GET"))
            .and(path(format!("{PROXY}/secrets/{MCAGENT_SECRET}")))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        let store = store();
        let ctx = test_context(&store, &server);
        let vmc = persisted_vmc(&store, &registered_vmc("managed1", "c-abc12"));

        let err = push_manifest_objects(&ctx, &vmc).await.unwrap_err();
        assert!(matches!(err, SyncError::Rancher(_)));
    }
}
