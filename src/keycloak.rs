// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Keycloak admin client.
//!
//! Every managed cluster gets an OIDC client named `verrazzano-<cluster>` in the
//! `verrazzano-system` realm, with the managed cluster's API URL as redirect and web
//! origin. The admin token is obtained with a password grant against the `master`
//! realm using `admin-cli`.

use crate::constants::{
    CA_CRT_KEY, KEYCLOAK_ADMIN_SECRET, KEYCLOAK_ADMIN_USER, KEYCLOAK_INGRESS, KEYCLOAK_NAMESPACE,
    KEYCLOAK_REALM, PASSWORD_SECRET_KEY, VERRAZZANO_SYSTEM_NAMESPACE, VERRAZZANO_TLS_SECRET,
};
use crate::rancher::config::read_optional_secret;
use crate::rancher::transport::{build_http_client, send_with_retry};
use crate::rancher::{HttpRequest, HttpResponse, RancherError, RequestSender, TransportError};
use crate::reconcilers::retry::RetryPolicy;
use crate::store::{self, ObjectStore, OperationResult, StoreError};
use k8s_openapi::api::networking::v1::Ingress;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

const TOKEN_PATH: &str = "/auth/realms/master/protocol/openid-connect/token";

/// Errors raised while talking to Keycloak.
#[derive(Debug, Error)]
pub enum KeycloakError {
    #[error("failed to get Keycloak ingress {namespace}/{name}: {source}")]
    IngressLookup {
        namespace: String,
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("Keycloak ingress {namespace}/{name} is missing host names")]
    MissingIngressHost { namespace: String, name: String },

    #[error("failed to read Keycloak credentials: {0}")]
    Credentials(#[source] RancherError),

    #[error("failed to create Keycloak HTTP client: {0}")]
    Client(String),

    #[error("{method} {url} failed: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("{method} {url} returned unexpected status {status}: {body}")]
    UnexpectedStatus {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("failed to parse response from {url}: {message}")]
    Parse { url: String, message: String },
}

/// OIDC client representation as accepted by the Keycloak admin API.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OidcClient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub client_id: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub public_client: bool,
    #[serde(default)]
    pub standard_flow_enabled: bool,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub web_origins: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl OidcClient {
    /// Public PKCE client for the managed cluster reachable at `api_url`.
    #[must_use]
    pub fn for_managed_cluster(client_id: &str, api_url: &str) -> Self {
        let api_url = api_url.trim_end_matches('/');
        Self {
            id: None,
            client_id: client_id.to_string(),
            enabled: true,
            public_client: true,
            standard_flow_enabled: true,
            protocol: "openid-connect".to_string(),
            redirect_uris: vec![format!("{api_url}/*")],
            web_origins: vec![api_url.to_string()],
            attributes: BTreeMap::from([(
                "pkce.code.challenge.method".to_string(),
                "S256".to_string(),
            )]),
        }
    }
}

/// Factory for authenticated [`KeycloakConfig`]s.
#[derive(Clone)]
pub struct KeycloakClient {
    sender: Arc<dyn RequestSender>,
    retry: RetryPolicy,
    endpoint: Option<String>,
}

impl KeycloakClient {
    #[must_use]
    pub fn new(sender: Arc<dyn RequestSender>, retry: RetryPolicy) -> Self {
        Self {
            sender,
            retry,
            endpoint: None,
        }
    }

    /// Send all requests to `endpoint` instead of `https://<ingress host>`.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into().trim_end_matches('/').to_string());
        self
    }

    /// Log in as the Keycloak admin user.
    ///
    /// # Errors
    ///
    /// Returns an error when the ingress, CA or password cannot be read, or the token
    /// request fails.
    pub async fn admin_config(
        &self,
        store: &dyn ObjectStore,
    ) -> Result<KeycloakConfig, KeycloakError> {
        let host = ingress_host(store).await?;
        let ca = read_optional_secret(
            store,
            VERRAZZANO_SYSTEM_NAMESPACE,
            VERRAZZANO_TLS_SECRET,
            CA_CRT_KEY,
        )
        .await
        .map_err(KeycloakError::Credentials)?
        .unwrap_or_default();
        let http = build_http_client(&[&ca]).map_err(KeycloakError::Client)?;

        let mut config = KeycloakConfig {
            base_url: self
                .endpoint
                .clone()
                .unwrap_or_else(|| format!("https://{host}")),
            host,
            access_token: String::new(),
            http,
            sender: Arc::clone(&self.sender),
            retry: self.retry.clone(),
        };

        let password = read_optional_secret(
            store,
            KEYCLOAK_NAMESPACE,
            KEYCLOAK_ADMIN_SECRET,
            PASSWORD_SECRET_KEY,
        )
        .await
        .map_err(KeycloakError::Credentials)?
        .ok_or_else(|| {
            KeycloakError::Credentials(RancherError::MissingSecretKey {
                namespace: KEYCLOAK_NAMESPACE.to_string(),
                name: KEYCLOAK_ADMIN_SECRET.to_string(),
                key: PASSWORD_SECRET_KEY.to_string(),
            })
        })?;
        config.access_token = config.login(&password).await?;
        debug!(host = %config.host, "Obtained Keycloak admin token");
        Ok(config)
    }
}

/// An authenticated connection to the Keycloak admin API.
pub struct KeycloakConfig {
    pub host: String,
    pub base_url: String,
    pub access_token: String,
    http: reqwest::Client,
    sender: Arc<dyn RequestSender>,
    retry: RetryPolicy,
}

impl KeycloakConfig {
    async fn send(
        &self,
        method: Method,
        path: &str,
        content_type: Option<&str>,
        body: Option<String>,
    ) -> Result<(String, HttpResponse), KeycloakError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = HttpRequest::new(method.clone(), url.clone()).header("Host", self.host.clone());
        if !self.access_token.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.access_token));
        }
        if let (Some(content_type), Some(body)) = (content_type, body) {
            request = request.header("Content-Type", content_type).body(body);
        }

        let resp = send_with_retry(self.sender.as_ref(), &self.http, &request, &self.retry)
            .await
            .map_err(|source| KeycloakError::Transport {
                method: method.to_string(),
                url: url.clone(),
                source,
            })?;
        Ok((url, resp))
    }

    fn unexpected(method: &str, url: String, resp: HttpResponse) -> KeycloakError {
        KeycloakError::UnexpectedStatus {
            method: method.to_string(),
            url,
            status: resp.status.as_u16(),
            body: resp.body,
        }
    }

    async fn login(&self, password: &str) -> Result<String, KeycloakError> {
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "password")
            .append_pair("client_id", "admin-cli")
            .append_pair("username", KEYCLOAK_ADMIN_USER)
            .append_pair("password", password)
            .finish();
        let (url, resp) = self
            .send(
                Method::POST,
                TOKEN_PATH,
                Some("application/x-www-form-urlencoded"),
                Some(form),
            )
            .await?;
        if resp.status != StatusCode::OK {
            return Err(Self::unexpected("POST", url, resp));
        }

        serde_json::from_str::<Value>(&resp.body)
            .ok()
            .and_then(|v| v.get("access_token").and_then(Value::as_str).map(str::to_string))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| KeycloakError::Parse {
                url,
                message: "no access_token in response".to_string(),
            })
    }

    fn clients_path() -> String {
        format!("/auth/admin/realms/{KEYCLOAK_REALM}/clients")
    }

    /// Look up a client in the Verrazzano realm by its client ID.
    ///
    /// # Errors
    ///
    /// Returns an error unless Keycloak answers 200 with a client list.
    pub async fn get_client(&self, client_id: &str) -> Result<Option<OidcClient>, KeycloakError> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("clientId", client_id)
            .finish();
        let path = format!("{}?{query}", Self::clients_path());
        let (url, resp) = self.send(Method::GET, &path, None, None).await?;
        if resp.status != StatusCode::OK {
            return Err(Self::unexpected("GET", url, resp));
        }
        let clients: Vec<OidcClient> =
            serde_json::from_str(&resp.body).map_err(|e| KeycloakError::Parse {
                url,
                message: e.to_string(),
            })?;
        Ok(clients.into_iter().find(|c| c.client_id == client_id))
    }

    /// Create the client, or replace the existing client with the same client ID.
    ///
    /// # Errors
    ///
    /// Returns an error when the lookup or the write fails.
    pub async fn create_or_update_client(
        &self,
        desired: &OidcClient,
    ) -> Result<OperationResult, KeycloakError> {
        let existing = self.get_client(&desired.client_id).await?;
        let body = serde_json::to_string(desired).map_err(|e| KeycloakError::Parse {
            url: Self::clients_path(),
            message: e.to_string(),
        })?;

        match existing {
            Some(current) => {
                let id = current.id.clone().unwrap_or_default();
                let comparable = OidcClient {
                    id: None,
                    ..current
                };
                if comparable == *desired {
                    return Ok(OperationResult::None);
                }
                let path = format!("{}/{id}", Self::clients_path());
                let (url, resp) = self
                    .send(Method::PUT, &path, Some("application/json"), Some(body))
                    .await?;
                if !resp.status.is_success() {
                    return Err(Self::unexpected("PUT", url, resp));
                }
                info!(client_id = %desired.client_id, "Updated Keycloak client");
                Ok(OperationResult::Updated)
            }
            None => {
                let (url, resp) = self
                    .send(
                        Method::POST,
                        &Self::clients_path(),
                        Some("application/json"),
                        Some(body),
                    )
                    .await?;
                if resp.status != StatusCode::CREATED {
                    return Err(Self::unexpected("POST", url, resp));
                }
                info!(client_id = %desired.client_id, "Created Keycloak client");
                Ok(OperationResult::Created)
            }
        }
    }
}

async fn ingress_host(store: &dyn ObjectStore) -> Result<String, KeycloakError> {
    let ingress = store::get::<Ingress>(store, KEYCLOAK_NAMESPACE, KEYCLOAK_INGRESS)
        .await
        .map_err(|source| KeycloakError::IngressLookup {
            namespace: KEYCLOAK_NAMESPACE.to_string(),
            name: KEYCLOAK_INGRESS.to_string(),
            source,
        })?;
    ingress
        .spec
        .and_then(|spec| spec.rules)
        .and_then(|rules| rules.into_iter().next())
        .and_then(|rule| rule.host)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| KeycloakError::MissingIngressHost {
            namespace: KEYCLOAK_NAMESPACE.to_string(),
            name: KEYCLOAK_INGRESS.to_string(),
        })
}

#[cfg(test)]
#[path = "keycloak_tests.rs"]
mod keycloak_tests;
