// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `keycloak.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::store::FakeStore;
    use crate::test_support::{add_keycloak, mock_keycloak_login, test_context, vmc};
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CLIENTS: &str = "/auth/admin/realms/verrazzano-system/clients";

    fn vmc_with_api_url(api_url: &str) -> VerrazzanoManagedCluster {
        let mut vmc = vmc("managed1");
        vmc.status.get_or_insert_with(Default::default).api_url = api_url.to_string();
        vmc
    }

    fn store() -> Arc<FakeStore> {
        let store = FakeStore::new();
        add_keycloak(&store);
        Arc::new(store)
    }

    #[test]
    fn test_keycloak_client_id() {
        assert_eq!(keycloak_client_id("managed1"), "verrazzano-managed1");
    }

    #[tokio::test]
    async fn test_creates_client_for_api_url() {
        let server = MockServer::start().await;
        mock_keycloak_login(&server).await;
        Mock::given(method("GET"))
            .and(path(CLIENTS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(CLIENTS))
            .and(body_string_contains("verrazzano-managed1"))
            .and(body_string_contains("https://api.managed1.example.com/*"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        let store = store();
        let ctx = test_context(&store, &server);

        let result = sync_keycloak_client(
            &ctx,
            &Components::from_resource(None),
            &vmc_with_api_url("https://api.managed1.example.com"),
        )
        .await
        .unwrap();
        assert_eq!(result, OperationResult::Created);
    }

    #[tokio::test]
    async fn test_skipped_without_api_url() {
        let server = MockServer::start().await;
        let store = store();
        let ctx = test_context(&store, &server);

        let result = sync_keycloak_client(&ctx, &Components::from_resource(None), &vmc("managed1"))
            .await
            .unwrap();
        assert_eq!(result, OperationResult::None);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_skipped_when_keycloak_disabled() {
        let server = MockServer::start().await;
        let store = store();
        let ctx = test_context(&store, &server);
        let components = Components::from_resource(Some(json!({
            "spec": {"components": {"keycloak": {"enabled": false}}}
        })));

        let result = sync_keycloak_client(
            &ctx,
            &components,
            &vmc_with_api_url("https://api.managed1.example.com"),
        )
        .await
        .unwrap();
        assert_eq!(result, OperationResult::None);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_login_failure_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let store = store();
        let ctx = test_context(&store, &server);

        let err = sync_keycloak_client(
            &ctx,
            &Components::from_resource(None),
            &vmc_with_api_url("https://api.managed1.example.com"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SyncError::Keycloak(_)));
    }
}
