// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

// Common test utilities for unit tests

use crate::argocd::ArgoCDClient;
use crate::constants::{
    ARGOCD_ADMIN_SECRET, ARGOCD_INGRESS, ARGOCD_NAMESPACE, CATTLE_SYSTEM_NAMESPACE,
    KEYCLOAK_ADMIN_SECRET, KEYCLOAK_INGRESS, KEYCLOAK_NAMESPACE, MULTICLUSTER_NAMESPACE,
    PASSWORD_SECRET_KEY, RANCHER_ADMIN_SECRET, RANCHER_INGRESS, VERRAZZANO_CLUSTER_USER_SECRET,
};
use crate::context::{Context, OperatorConfig};
use crate::crd::{VerrazzanoManagedCluster, VerrazzanoManagedClusterSpec};
use crate::keycloak::KeycloakClient;
use crate::rancher::{RancherClient, RancherConfig, ReqwestSender};
use crate::reconcilers::retry::RetryPolicy;
use crate::store::{FakeStore, ObjectStore};
use crate::workload::{WorkloadClusters, WorkloadError};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Host of the fake Rancher ingress
pub const RANCHER_HOST: &str = "rancher.example.com";

/// Token returned by [`mock_login`]
pub const RANCHER_TOKEN: &str = "token-xyz:secret";

pub fn meta(namespace: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

pub fn secret(namespace: &str, name: &str, data: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: meta(namespace, name),
        data: Some(
            data.iter()
                .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
                .collect::<BTreeMap<_, _>>(),
        ),
        ..Default::default()
    }
}

pub fn config_map(namespace: &str, name: &str, data: &[(&str, &str)]) -> ConfigMap {
    ConfigMap {
        metadata: meta(namespace, name),
        data: Some(
            data.iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        ),
        ..Default::default()
    }
}

pub fn ingress(namespace: &str, name: &str, host: &str) -> Ingress {
    serde_json::from_value(json!({
        "metadata": {"name": name, "namespace": namespace},
        "spec": {"rules": [{"host": host}]}
    }))
    .unwrap()
}

pub fn vmc(name: &str) -> VerrazzanoManagedCluster {
    let mut vmc = VerrazzanoManagedCluster::new(name, VerrazzanoManagedClusterSpec::default());
    vmc.metadata.namespace = Some(MULTICLUSTER_NAMESPACE.to_string());
    vmc
}

/// Insert `vmc` into `store` and return the stored copy, which carries a uid.
pub fn persisted_vmc(store: &FakeStore, vmc: &VerrazzanoManagedCluster) -> VerrazzanoManagedCluster {
    store.insert(vmc).unwrap();
    let name = vmc.metadata.name.clone().unwrap_or_default();
    store.peek_typed(MULTICLUSTER_NAMESPACE, &name).unwrap()
}

/// Store holding the Rancher ingress and the admin and cluster-user passwords.
pub fn rancher_store() -> FakeStore {
    let store = FakeStore::new();
    store
        .insert(&ingress(CATTLE_SYSTEM_NAMESPACE, RANCHER_INGRESS, RANCHER_HOST))
        .unwrap();
    store
        .insert(&secret(
            CATTLE_SYSTEM_NAMESPACE,
            RANCHER_ADMIN_SECRET,
            &[(PASSWORD_SECRET_KEY, "admin-pw")],
        ))
        .unwrap();
    store
        .insert(&secret(
            MULTICLUSTER_NAMESPACE,
            VERRAZZANO_CLUSTER_USER_SECRET,
            &[(PASSWORD_SECRET_KEY, "user-pw")],
        ))
        .unwrap();
    store
}

/// Rancher client pointed at a mock server with an immediate two-attempt retry policy.
pub fn rancher_client(server: &MockServer) -> RancherClient {
    RancherClient::new(Arc::new(ReqwestSender), RetryPolicy::immediate(2)).with_endpoint(server.uri())
}

/// Admin config for a mock server, logging in through [`mock_login`].
pub async fn rancher_config(server: &MockServer) -> RancherConfig {
    mock_login(server).await;
    rancher_client(server)
        .admin_config(&rancher_store())
        .await
        .unwrap()
}

/// Answer the local-provider login with [`RANCHER_TOKEN`].
pub async fn mock_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v3-public/localProviders/local"))
        .and(query_param("action", "login"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "token": RANCHER_TOKEN })))
        .mount(server)
        .await;
}

/// Host of the fake Argo CD ingress
pub const ARGOCD_HOST: &str = "argocd.example.com";

/// Host of the fake Keycloak ingress
pub const KEYCLOAK_HOST: &str = "keycloak.example.com";

/// Add the Argo CD ingress and admin password to `store`.
pub fn add_argocd(store: &FakeStore) {
    store
        .insert(&ingress(ARGOCD_NAMESPACE, ARGOCD_INGRESS, ARGOCD_HOST))
        .unwrap();
    store
        .insert(&secret(
            ARGOCD_NAMESPACE,
            ARGOCD_ADMIN_SECRET,
            &[(PASSWORD_SECRET_KEY, "argo-pw")],
        ))
        .unwrap();
}

/// Add the Keycloak ingress and admin password to `store`.
pub fn add_keycloak(store: &FakeStore) {
    store
        .insert(&ingress(KEYCLOAK_NAMESPACE, KEYCLOAK_INGRESS, KEYCLOAK_HOST))
        .unwrap();
    store
        .insert(&secret(
            KEYCLOAK_NAMESPACE,
            KEYCLOAK_ADMIN_SECRET,
            &[(PASSWORD_SECRET_KEY, "kc-pw")],
        ))
        .unwrap();
}

pub fn argocd_client(server: &MockServer) -> ArgoCDClient {
    ArgoCDClient::new(Arc::new(ReqwestSender), RetryPolicy::immediate(2)).with_endpoint(server.uri())
}

pub fn keycloak_client(server: &MockServer) -> KeycloakClient {
    KeycloakClient::new(Arc::new(ReqwestSender), RetryPolicy::immediate(2))
        .with_endpoint(server.uri())
}

/// Answer the Argo CD session login with `argo-token`.
pub async fn mock_argocd_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "argo-token" })))
        .mount(server)
        .await;
}

/// Answer the Keycloak admin token request with `kc-token`.
pub async fn mock_keycloak_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/realms/master/protocol/openid-connect/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "access_token": "kc-token" })),
        )
        .mount(server)
        .await;
}

/// Context whose Rancher, Argo CD and Keycloak clients all talk to `server`.
pub fn test_context(store: &Arc<FakeStore>, server: &MockServer) -> Context {
    let shared: Arc<dyn ObjectStore> = store.clone();
    Context {
        store: shared,
        rancher: rancher_client(server),
        argocd: argocd_client(server),
        keycloak: keycloak_client(server),
        workload: Arc::new(FakeWorkloadClusters::default()),
        config: OperatorConfig::default(),
    }
}

/// [`WorkloadClusters`] that hands out one in-memory store and records every kubeconfig.
#[derive(Default)]
pub struct FakeWorkloadClusters {
    pub store: Arc<FakeStore>,
    pub kubeconfigs: Mutex<Vec<String>>,
}

#[async_trait]
impl WorkloadClusters for FakeWorkloadClusters {
    async fn connect(&self, kubeconfig: &str) -> Result<Arc<dyn ObjectStore>, WorkloadError> {
        self.kubeconfigs.lock().unwrap().push(kubeconfig.to_string());
        let store: Arc<dyn ObjectStore> = self.store.clone();
        Ok(store)
    }
}

/// Answer the import, registration token and manifest calls so that registering
/// any cluster yields `yaml` for `cluster_id`.
pub async fn mock_rancher_registration(server: &MockServer, cluster_id: &str, yaml: &str) {
    Mock::given(method("POST"))
        .and(path("/v3/cluster"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": cluster_id })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/clusterregistrationtoken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "clusterId": cluster_id, "state": "active", "token": "reg-token" }]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v3/import/reg-token_{cluster_id}.yaml")))
        .respond_with(ResponseTemplate::new(200).set_body_string(yaml))
        .mount(server)
        .await;
}

/// Answer the cluster lookup for `cluster_id` with `state`.
pub async fn mock_rancher_cluster(server: &MockServer, cluster_id: &str, state: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/v3/clusters/{cluster_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": cluster_id,
            "state": state,
            "agentImage": "rancher/rancher-agent:v2.7"
        })))
        .mount(server)
        .await;
}

/// VMC whose status already carries a Rancher ClusterID.
pub fn registered_vmc(name: &str, cluster_id: &str) -> VerrazzanoManagedCluster {
    let mut vmc = vmc(name);
    vmc.status
        .get_or_insert_with(Default::default)
        .rancher_registration
        .cluster_id = cluster_id.to_string();
    vmc
}
