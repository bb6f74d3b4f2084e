// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `workload.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::constants::{CA_CRT_KEY, VERRAZZANO_SYSTEM_NAMESPACE, VERRAZZANO_TLS_CA_SECRET};
    use crate::store::read_secret_value;
    use base64::Engine;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn kubeconfig(server: &str) -> String {
        format!(
            r"apiVersion: v1
kind: Config
clusters:
- name: workload
  cluster:
    server: {server}
contexts:
- name: workload
  context:
    cluster: workload
    user: workload-admin
current-context: workload
users:
- name: workload-admin
  user:
    token: workload-token
"
        )
    }

    fn install_crypto_provider() {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }

    #[tokio::test]
    async fn test_connect_reads_from_kubeconfig_server() {
        install_crypto_provider();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!(
                "/api/v1/namespaces/{VERRAZZANO_SYSTEM_NAMESPACE}/secrets/{VERRAZZANO_TLS_CA_SECRET}"
            )))
            .and(header("authorization", "Bearer workload-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "v1",
                "kind": "Secret",
                "metadata": {"name": VERRAZZANO_TLS_CA_SECRET, "namespace": VERRAZZANO_SYSTEM_NAMESPACE},
                "data": {CA_CRT_KEY: base64::engine::general_purpose::STANDARD.encode("workload-ca")}
            })))
            .mount(&server)
            .await;

        let store = KubeconfigConnector
            .connect(&kubeconfig(&server.uri()))
            .await
            .unwrap();
        let ca = read_secret_value(
            store.as_ref(),
            VERRAZZANO_SYSTEM_NAMESPACE,
            VERRAZZANO_TLS_CA_SECRET,
            CA_CRT_KEY,
        )
        .await
        .unwrap();

        assert_eq!(ca.as_deref(), Some("workload-ca"));
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_kubeconfig() {
        install_crypto_provider();
        let result = KubeconfigConnector.connect("clusters: [unterminated").await;
        assert!(matches!(result, Err(WorkloadError::Kubeconfig(_))));
    }
}
