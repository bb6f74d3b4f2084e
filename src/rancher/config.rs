// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Rancher connection configuration and login.
//!
//! A [`RancherConfig`] is built per reconcile from cluster state: the Rancher host
//! comes from the `cattle-system/rancher` ingress, CA data from the Rancher TLS
//! secrets, and the API token from a login as one of the [`RancherUser`]s. Tokens are
//! cached on the [`RancherClient`] keyed by host and user, so a login only happens
//! when no token is cached or after a 401 invalidated it.

use super::transport::{http_client_builder, send_with_retry, HttpRequest, HttpResponse, RequestSender};
use super::RancherError;
use crate::constants::{
    ARGOCD_CLUSTER_USERNAME, ARGOCD_CLUSTER_USER_SECRET, CATTLE_SYSTEM_NAMESPACE, CA_CRT_KEY,
    MULTICLUSTER_NAMESPACE, PASSWORD_SECRET_KEY, RANCHER_ADDITIONAL_CA_KEY,
    RANCHER_ADDITIONAL_CA_SECRET, RANCHER_ADMIN_SECRET, RANCHER_ADMIN_USERNAME, RANCHER_INGRESS,
    RANCHER_INGRESS_SERVICE_HOST, RANCHER_INGRESS_SERVICE_PORT, RANCHER_TLS_SECRET, VERRAZZANO_CLUSTER_USERNAME, VERRAZZANO_CLUSTER_USER_SECRET,
    VERRAZZANO_SYSTEM_NAMESPACE, VERRAZZANO_TLS_SECRET,
};
use crate::metrics;
use crate::reconcilers::retry::RetryPolicy;
use crate::store::{self, read_secret_value, ObjectStore};
use k8s_openapi::api::networking::v1::Ingress;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Path of the local-provider login action.
const LOGIN_PATH: &str = "/v3-public/localProviders/local?action=login";

/// The Rancher identities the operator logs in as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RancherUser {
    /// The Rancher `admin` user
    Admin,
    /// The restricted user that owns managed cluster registrations
    VerrazzanoClusterUser,
    /// The user whose token Argo CD uses to reach managed clusters
    ArgoCDUser,
}

impl RancherUser {
    #[must_use]
    pub fn username(self) -> &'static str {
        match self {
            Self::Admin => RANCHER_ADMIN_USERNAME,
            Self::VerrazzanoClusterUser => VERRAZZANO_CLUSTER_USERNAME,
            Self::ArgoCDUser => ARGOCD_CLUSTER_USERNAME,
        }
    }

    /// Namespace and name of the Secret holding the user's password.
    #[must_use]
    pub fn password_secret(self) -> (&'static str, &'static str) {
        match self {
            Self::Admin => (CATTLE_SYSTEM_NAMESPACE, RANCHER_ADMIN_SECRET),
            Self::VerrazzanoClusterUser => (MULTICLUSTER_NAMESPACE, VERRAZZANO_CLUSTER_USER_SECRET),
            Self::ArgoCDUser => (MULTICLUSTER_NAMESPACE, ARGOCD_CLUSTER_USER_SECRET),
        }
    }
}

/// Rancher API tokens keyed by (host, user).
#[derive(Debug, Default)]
pub struct TokenCache {
    tokens: Mutex<HashMap<(String, String), String>>,
}

impl TokenCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, host: &str, user: &str) -> Option<String> {
        self.tokens
            .lock()
            .ok()
            .and_then(|t| t.get(&(host.to_string(), user.to_string())).cloned())
    }

    pub fn insert(&self, host: &str, user: &str, token: String) {
        if let Ok(mut t) = self.tokens.lock() {
            t.insert((host.to_string(), user.to_string()), token);
        }
    }

    /// Drop a token, e.g. after Rancher answered 401.
    pub fn invalidate(&self, host: &str, user: &str) {
        if let Ok(mut t) = self.tokens.lock() {
            t.remove(&(host.to_string(), user.to_string()));
        }
    }
}

/// Factory for [`RancherConfig`]s.
///
/// Holds the injected [`RequestSender`], the retry policy and the token cache.
///
/// Requests are addressed to `https://<ingress host>` but connect to the in-cluster
/// ingress controller service, so TLS server name and `Host` header both carry the
/// Rancher host while traffic never leaves the cluster. Tests point `endpoint` at a
/// mock server instead.
#[derive(Clone)]
pub struct RancherClient {
    sender: Arc<dyn RequestSender>,
    retry: RetryPolicy,
    tokens: Arc<TokenCache>,
    endpoint: Option<String>,
    ingress_service: String,
}

impl RancherClient {
    #[must_use]
    pub fn new(sender: Arc<dyn RequestSender>, retry: RetryPolicy) -> Self {
        Self {
            sender,
            retry,
            tokens: Arc::new(TokenCache::new()),
            endpoint: None,
            ingress_service: RANCHER_INGRESS_SERVICE_HOST.to_string(),
        }
    }

    /// Send all requests to `endpoint` instead of the ingress host.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into().trim_end_matches('/').to_string());
        self
    }

    /// Connect to `service` instead of the default ingress controller service.
    #[must_use]
    pub fn with_ingress_service(mut self, service: impl Into<String>) -> Self {
        self.ingress_service = service.into();
        self
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    #[must_use]
    pub fn sender(&self) -> Arc<dyn RequestSender> {
        Arc::clone(&self.sender)
    }

    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Build a config authenticated as `user`.
    ///
    /// # Errors
    ///
    /// Returns an error naming the failing step: ingress lookup, secret lookup, HTTP
    /// client construction or login.
    pub async fn config_for(
        &self,
        store: &dyn ObjectStore,
        user: RancherUser,
    ) -> Result<RancherConfig, RancherError> {
        let host = rancher_host(store).await?;
        let certificate_authority_data = rancher_root_ca(store).await?;
        let additional_ca = read_optional_secret(
            store,
            CATTLE_SYSTEM_NAMESPACE,
            RANCHER_ADDITIONAL_CA_SECRET,
            RANCHER_ADDITIONAL_CA_KEY,
        )
        .await?
        .unwrap_or_default();

        let mut builder = http_client_builder(&[&certificate_authority_data, &additional_ca])
            .map_err(RancherError::Client)?;
        let (base_url, ingress_addr) = match &self.endpoint {
            Some(endpoint) => (endpoint.clone(), None),
            None => {
                let addr = resolve_ingress_service(&self.ingress_service).await;
                if let Some(addr) = addr {
                    builder = builder.resolve(&host, addr);
                }
                (format!("https://{host}"), addr)
            }
        };
        let http = builder
            .build()
            .map_err(|e| RancherError::Client(format!("failed to build HTTP client: {e}")))?;

        let mut config = RancherConfig {
            host,
            base_url,
            ingress_addr,
            api_access_token: String::new(),
            certificate_authority_data,
            additional_ca,
            user: user.username().to_string(),
            http,
            sender: Arc::clone(&self.sender),
            retry: self.retry.clone(),
            tokens: Arc::clone(&self.tokens),
        };

        if let Some(token) = self.tokens.get(&config.host, &config.user) {
            debug!(host = %config.host, user = %config.user, "Using cached Rancher token");
            config.api_access_token = token;
            return Ok(config);
        }

        let (ns, name) = user.password_secret();
        let password = read_optional_secret(store, ns, name, PASSWORD_SECRET_KEY)
            .await?
            .ok_or_else(|| RancherError::MissingSecretKey {
                namespace: ns.to_string(),
                name: name.to_string(),
                key: PASSWORD_SECRET_KEY.to_string(),
            })?;

        let token = config.login(&password).await?;
        self.tokens.insert(&config.host, &config.user, token.clone());
        config.api_access_token = token;
        Ok(config)
    }

    /// Config for the Rancher `admin` user.
    ///
    /// # Errors
    ///
    /// See [`RancherClient::config_for`].
    pub async fn admin_config(&self, store: &dyn ObjectStore) -> Result<RancherConfig, RancherError> {
        self.config_for(store, RancherUser::Admin).await
    }

    /// Config for the Verrazzano cluster user.
    ///
    /// # Errors
    ///
    /// See [`RancherClient::config_for`].
    pub async fn verrazzano_cluster_user_config(
        &self,
        store: &dyn ObjectStore,
    ) -> Result<RancherConfig, RancherError> {
        self.config_for(store, RancherUser::VerrazzanoClusterUser).await
    }
}

/// An authenticated connection to Rancher.
#[derive(Clone)]
pub struct RancherConfig {
    /// Rancher host name, sent as the `Host` header
    pub host: String,
    /// Scheme and authority requests are sent to
    pub base_url: String,
    /// Address `host` connects to, when it is routed to the ingress controller service
    pub ingress_addr: Option<SocketAddr>,
    /// Bearer token for the API
    pub api_access_token: String,
    /// PEM root CA of the Rancher ingress (may be empty)
    pub certificate_authority_data: String,
    /// PEM additional CA (may be empty)
    pub additional_ca: String,
    /// User the token belongs to
    pub user: String,
    http: reqwest::Client,
    sender: Arc<dyn RequestSender>,
    retry: RetryPolicy,
    tokens: Arc<TokenCache>,
}

impl std::fmt::Debug for RancherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RancherConfig")
            .field("host", &self.host)
            .field("base_url", &self.base_url)
            .field("ingress_addr", &self.ingress_addr)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl RancherConfig {
    /// Absolute URL for an API path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send an authenticated request to Rancher.
    ///
    /// Adds the bearer token and the `Host` header, retries transient failures, and
    /// drops the cached token when Rancher answers 401.
    ///
    /// # Errors
    ///
    /// Returns [`RancherError::Transport`] when no response was received.
    pub async fn send_request(
        &self,
        method: Method,
        url: &str,
        headers: &[(&str, &str)],
        body: Option<String>,
    ) -> Result<HttpResponse, RancherError> {
        let mut request = HttpRequest::new(method.clone(), url)
            .header("Host", self.host.clone())
            .header("Accept", "application/json");
        if !self.api_access_token.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_access_token));
        }
        for (name, value) in headers {
            request = request.header(name, *value);
        }
        if let Some(body) = body {
            request = request
                .header("Content-Type", "application/json")
                .body(body);
        }

        let result = send_with_retry(self.sender.as_ref(), &self.http, &request, &self.retry).await;
        let status_label = match &result {
            Ok(resp) => resp.status.as_u16().to_string(),
            Err(_) => "error".to_string(),
        };
        metrics::record_rancher_request(method.as_str(), &status_label);

        let resp = result.map_err(|source| RancherError::Transport {
            method: method.to_string(),
            url: url.to_string(),
            source,
        })?;

        if resp.status == StatusCode::UNAUTHORIZED {
            warn!(host = %self.host, user = %self.user, "Rancher rejected token, invalidating cache");
            self.tokens.invalidate(&self.host, &self.user);
        }
        Ok(resp)
    }

    /// Log in with the local auth provider and return the API token.
    async fn login(&self, password: &str) -> Result<String, RancherError> {
        let url = self.url(LOGIN_PATH);
        let body = json!({ "Username": self.user, "Password": password }).to_string();
        let resp = self
            .send_request(Method::POST, &url, &[], Some(body))
            .await
            .map_err(|e| RancherError::Login {
                user: self.user.clone(),
                message: e.to_string(),
            })?;

        if resp.status != StatusCode::CREATED {
            return Err(RancherError::Login {
                user: self.user.clone(),
                message: format!("unexpected status {}", resp.status.as_u16()),
            });
        }

        let token = serde_json::from_str::<Value>(&resp.body)
            .ok()
            .and_then(|v| v.get("token").and_then(Value::as_str).map(str::to_string))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RancherError::Login {
                user: self.user.clone(),
                message: "response has no token".to_string(),
            })?;

        info!(host = %self.host, user = %self.user, "Logged in to Rancher");
        Ok(token)
    }
}

/// Host of the Rancher ingress.
async fn rancher_host(store: &dyn ObjectStore) -> Result<String, RancherError> {
    let ingress = store::get::<Ingress>(store, CATTLE_SYSTEM_NAMESPACE, RANCHER_INGRESS)
        .await
        .map_err(|source| RancherError::IngressLookup {
            namespace: CATTLE_SYSTEM_NAMESPACE.to_string(),
            name: RANCHER_INGRESS.to_string(),
            source,
        })?;

    ingress
        .spec
        .and_then(|spec| spec.rules)
        .and_then(|rules| rules.into_iter().next())
        .and_then(|rule| rule.host)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| RancherError::MissingIngressHost {
            namespace: CATTLE_SYSTEM_NAMESPACE.to_string(),
            name: RANCHER_INGRESS.to_string(),
        })
}

/// Address of the in-cluster ingress controller service.
///
/// `None` when the service name does not resolve, e.g. when running outside the
/// cluster; requests then resolve the Rancher host through DNS.
async fn resolve_ingress_service(service: &str) -> Option<SocketAddr> {
    match tokio::net::lookup_host((service, RANCHER_INGRESS_SERVICE_PORT)).await {
        Ok(mut addrs) => addrs.next(),
        Err(e) => {
            warn!(
                service = %service,
                error = %e,
                "Ingress controller service did not resolve, using DNS for the Rancher host"
            );
            None
        }
    }
}

/// Root CA of the Rancher ingress, falling back to the Verrazzano CA.
pub(crate) async fn rancher_root_ca(store: &dyn ObjectStore) -> Result<String, RancherError> {
    if let Some(ca) =
        read_optional_secret(store, CATTLE_SYSTEM_NAMESPACE, RANCHER_TLS_SECRET, CA_CRT_KEY).await?
    {
        return Ok(ca);
    }
    Ok(
        read_optional_secret(store, VERRAZZANO_SYSTEM_NAMESPACE, VERRAZZANO_TLS_SECRET, CA_CRT_KEY)
            .await?
            .unwrap_or_default(),
    )
}

pub(crate) async fn read_optional_secret(
    store: &dyn ObjectStore,
    namespace: &str,
    name: &str,
    key: &str,
) -> Result<Option<String>, RancherError> {
    read_secret_value(store, namespace, name, key)
        .await
        .map(|v| v.filter(|s| !s.is_empty()))
        .map_err(|source| RancherError::SecretLookup {
            namespace: namespace.to_string(),
            name: name.to_string(),
            source,
        })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
