// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the VMC controller

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::constants::{
        ADMIN_CLUSTER_CONFIGMAP, ADMIN_CLUSTER_SERVER_KEY, CREATED_BY_LABEL,
        CREATED_BY_VERRAZZANO, MULTICLUSTER_NAMESPACE, PROMETHEUS_SCRAPE_CONFIGS_KEY,
        PROMETHEUS_SCRAPE_CONFIGS_SECRET, TOKEN_KEY, VERRAZZANO_MONITORING_NAMESPACE,
    };
    use crate::crd::Condition;
    use crate::external::verrazzano;
    use crate::store::{secret_value, FakeStore};
    use crate::test_support::{
        config_map, ingress, mock_login, persisted_vmc, rancher_store, registered_vmc, secret,
        test_context, vmc,
    };
    use k8s_openapi::api::core::v1::Secret;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const NS: &str = MULTICLUSTER_NAMESPACE;

    /// Admin cluster with Rancher and Keycloak turned off, so a pass needs no HTTP.
    fn standalone_store() -> FakeStore {
        let store = FakeStore::new();
        store
            .insert_value(
                &verrazzano(),
                json!({
                    "apiVersion": "install.verrazzano.io/v1beta1",
                    "kind": "Verrazzano",
                    "metadata": {"name": "verrazzano", "namespace": "default"},
                    "spec": {"components": {
                        "rancher": {"enabled": false},
                        "keycloak": {"enabled": false}
                    }}
                }),
            )
            .unwrap();
        store
            .insert(&config_map(
                NS,
                ADMIN_CLUSTER_CONFIGMAP,
                &[(ADMIN_CLUSTER_SERVER_KEY, "https://api.admin:6443")],
            ))
            .unwrap();
        store
            .insert(&secret(NS, "verrazzano-cluster-managed1-token", &[(TOKEN_KEY, "sa-token")]))
            .unwrap();
        store
    }

    fn stored_vmc(store: &FakeStore) -> VerrazzanoManagedCluster {
        store.peek_typed(NS, "managed1").unwrap()
    }

    fn condition(vmc: &VerrazzanoManagedCluster, condition_type: ConditionType) -> Option<Condition> {
        vmc.status
            .as_ref()?
            .conditions
            .iter()
            .find(|c| c.r#type == condition_type)
            .cloned()
    }

    fn deleting(mut vmc: VerrazzanoManagedCluster) -> VerrazzanoManagedCluster {
        vmc.metadata.deletion_timestamp =
            Some(serde_json::from_value(json!("2025-01-01T00:00:00Z")).unwrap());
        vmc.metadata.finalizers = Some(vec![VMC_FINALIZER.to_string()]);
        vmc
    }

    #[test]
    fn test_resource_names() {
        assert_eq!(generate_managed_resource_name("m1"), "verrazzano-cluster-m1");
        assert_eq!(agent_secret_name("m1"), "verrazzano-cluster-m1-agent");
        assert_eq!(registration_secret_name("m1"), "verrazzano-cluster-m1-registration");
        assert_eq!(manifest_secret_name("m1"), "verrazzano-cluster-m1-manifest");
        assert_eq!(ca_secret_name("m1"), "ca-secret-m1");
    }

    #[test]
    fn test_secret_data() {
        let data = secret_data([("a", "1"), ("b", "2")]);
        assert_eq!(data["a"], ByteString(b"1".to_vec()));
        assert_eq!(data.len(), 2);
    }

    #[tokio::test]
    async fn test_ingress_host() {
        let store = FakeStore::new();
        store.insert(&ingress("ns", "with-host", "example.com")).unwrap();
        store.insert(&ingress("ns", "empty-host", "")).unwrap();

        assert_eq!(
            ingress_host(&store, "ns", "with-host").await.unwrap().as_deref(),
            Some("example.com")
        );
        assert!(ingress_host(&store, "ns", "empty-host").await.unwrap().is_none());
        assert!(ingress_host(&store, "ns", "missing").await.unwrap().is_none());
    }

    #[test]
    fn test_error_requeue_uses_configured_bounds() {
        let config = OperatorConfig {
            error_requeue_min_secs: 5,
            error_requeue_max_secs: 5,
            ..OperatorConfig::default()
        };
        assert_eq!(error_requeue(&config), Action::requeue(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_reconcile_missing_vmc_is_done() {
        let server = MockServer::start().await;
        let store = Arc::new(FakeStore::new());
        let ctx = Arc::new(test_context(&store, &server));

        let action = reconcile_vmc(Arc::new(vmc("managed1")), ctx).await.unwrap();
        assert_eq!(action, Action::await_change());
    }

    #[tokio::test]
    async fn test_full_pass_without_rancher() {
        let server = MockServer::start().await;
        let store = Arc::new(standalone_store());
        let vmc = persisted_vmc(&store, &vmc("managed1"));
        let ctx = Arc::new(test_context(&store, &server));

        let action = reconcile_vmc(Arc::new(vmc), ctx).await.unwrap();
        assert_eq!(action, Action::requeue(Duration::from_secs(180)));
        assert!(server.received_requests().await.unwrap().is_empty());

        let vmc = stored_vmc(&store);
        assert!(has_finalizer(&vmc, VMC_FINALIZER));
        assert_eq!(
            vmc.spec.service_account.as_deref(),
            Some("verrazzano-cluster-managed1")
        );
        let ready = condition(&vmc, ConditionType::Ready).unwrap();
        assert_eq!(ready.status, ConditionStatus::True);
        assert_eq!(ready.message, "Ready");
        let status = vmc.status.unwrap();
        assert!(status.imported);
        assert_eq!(status.provider, "Imported");

        let agent: Secret = store.peek_typed(NS, "verrazzano-cluster-managed1-agent").unwrap();
        assert!(secret_value(&agent, "admin-kubeconfig").unwrap().contains("https://api.admin:6443"));
        assert!(store
            .peek_typed::<Secret>(NS, "verrazzano-cluster-managed1-registration")
            .is_some());
    }

    #[tokio::test]
    async fn test_failed_step_sets_ready_false_and_requeues() {
        let server = MockServer::start().await;
        let store = Arc::new(standalone_store());
        store.fail_on("create", "ServiceAccount", "verrazzano-cluster-managed1");
        let vmc = persisted_vmc(&store, &vmc("managed1"));
        let mut ctx = test_context(&store, &server);
        ctx.config = OperatorConfig {
            error_requeue_min_secs: 7,
            error_requeue_max_secs: 7,
            ..OperatorConfig::default()
        };

        let action = reconcile_vmc(Arc::new(vmc), Arc::new(ctx)).await.unwrap();
        assert_eq!(action, Action::requeue(Duration::from_secs(7)));

        let vmc = stored_vmc(&store);
        assert!(has_finalizer(&vmc, VMC_FINALIZER));
        let ready = condition(&vmc, ConditionType::Ready).unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
        assert!(ready.message.starts_with("Failed to sync the ServiceAccount: "));
    }

    #[tokio::test]
    async fn test_waiting_for_cluster_id_requeues_short() {
        let server = MockServer::start().await;
        let store = Arc::new(standalone_store());
        let mut waiting = vmc("managed1");
        waiting.metadata.labels = Some(BTreeMap::from([(
            CREATED_BY_LABEL.to_string(),
            CREATED_BY_VERRAZZANO.to_string(),
        )]));
        let waiting = persisted_vmc(&store, &waiting);
        let ctx = Arc::new(test_context(&store, &server));

        let action = reconcile_vmc(Arc::new(waiting), ctx).await.unwrap();
        assert_ne!(action, Action::requeue(Duration::from_secs(180)));
        assert_ne!(action, Action::await_change());
        assert!(condition(&stored_vmc(&store), ConditionType::Ready).is_none());
    }

    #[tokio::test]
    async fn test_delete_removes_finalizer_after_rancher_delete() {
        let server = MockServer::start().await;
        mock_login(&server).await;
        Mock::given(method("DELETE"))
            .and(path("/v3/clusters/c-abc12"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        let store = Arc::new(rancher_store());
        store
            .insert(&secret(
                VERRAZZANO_MONITORING_NAMESPACE,
                PROMETHEUS_SCRAPE_CONFIGS_SECRET,
                &[(PROMETHEUS_SCRAPE_CONFIGS_KEY, "- job_name: managed1\n- job_name: other\n")],
            ))
            .unwrap();
        let vmc = persisted_vmc(&store, &deleting(registered_vmc("managed1", "c-abc12")));
        let ctx = Arc::new(test_context(&store, &server));

        let action = reconcile_vmc(Arc::new(vmc), ctx).await.unwrap();
        assert_eq!(action, Action::await_change());
        assert!(!has_finalizer(&stored_vmc(&store), VMC_FINALIZER));

        let jobs: Secret = store
            .peek_typed(VERRAZZANO_MONITORING_NAMESPACE, PROMETHEUS_SCRAPE_CONFIGS_SECRET)
            .unwrap();
        let jobs = secret_value(&jobs, PROMETHEUS_SCRAPE_CONFIGS_KEY).unwrap();
        assert!(!jobs.contains("managed1"));
        assert!(jobs.contains("other"));
    }

    #[tokio::test]
    async fn test_delete_without_cluster_id_skips_rancher() {
        let server = MockServer::start().await;
        let store = Arc::new(FakeStore::new());
        let vmc = persisted_vmc(&store, &deleting(vmc("managed1")));
        let ctx = Arc::new(test_context(&store, &server));

        reconcile_vmc(Arc::new(vmc), ctx).await.unwrap();
        assert!(server.received_requests().await.unwrap().is_empty());
        assert!(!has_finalizer(&stored_vmc(&store), VMC_FINALIZER));
    }

    #[tokio::test]
    async fn test_delete_failure_keeps_finalizer() {
        let server = MockServer::start().await;
        mock_login(&server).await;
        Mock::given(method("DELETE"))
            .and(path("/v3/clusters/c-abc12"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;
        let store = Arc::new(rancher_store());
        let vmc = persisted_vmc(&store, &deleting(registered_vmc("managed1", "c-abc12")));
        let ctx = Arc::new(test_context(&store, &server));

        assert!(reconcile_vmc(Arc::new(vmc), ctx).await.is_err());

        let vmc = stored_vmc(&store);
        assert!(has_finalizer(&vmc, VMC_FINALIZER));
        let registration = vmc.status.unwrap().rancher_registration;
        assert_eq!(
            registration.status,
            Some(RancherRegistrationStatus::DeleteFailed)
        );
        assert_eq!(registration.message, "Failed deleting cluster");
        assert_eq!(registration.cluster_id, "c-abc12");
    }

    #[tokio::test]
    async fn test_delete_without_rancher_credentials() {
        let server = MockServer::start().await;
        let store = Arc::new(FakeStore::new());
        let vmc = persisted_vmc(&store, &deleting(registered_vmc("managed1", "c-abc12")));
        let ctx = Arc::new(test_context(&store, &server));

        assert!(reconcile_vmc(Arc::new(vmc), ctx).await.is_err());

        let registration = stored_vmc(&store).status.unwrap().rancher_registration;
        assert_eq!(
            registration.message,
            "Failed to create Rancher API client"
        );
    }
}
