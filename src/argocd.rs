// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Argo CD API client.
//!
//! Only two calls are needed: a session login as the built-in `admin` user and a
//! listing of the registered clusters. Managed clusters themselves are registered by
//! writing a cluster secret in the `argocd` namespace, which Argo CD picks up on its
//! own (see `reconcilers::vmc::argocd`).
//!
//! Requests go to the in-cluster `argocd-server` service with the `Host` header set to
//! the Argo CD ingress host, through the same [`RequestSender`] and retry policy as the
//! Rancher client.

use crate::constants::{
    ARGOCD_ADMIN_SECRET, ARGOCD_ADMIN_USERNAME, ARGOCD_INGRESS, ARGOCD_NAMESPACE, ARGOCD_SERVER_URL,
    CATTLE_SYSTEM_NAMESPACE, PASSWORD_SECRET_KEY, RANCHER_ADDITIONAL_CA_KEY,
    RANCHER_ADDITIONAL_CA_SECRET,
};
use crate::rancher::config::{rancher_root_ca, read_optional_secret};
use crate::rancher::transport::{build_http_client, send_with_retry};
use crate::rancher::{HttpRequest, HttpResponse, RancherError, RequestSender, TransportError};
use crate::reconcilers::retry::RetryPolicy;
use crate::store::{self, ObjectStore, StoreError};
use k8s_openapi::api::networking::v1::Ingress;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

const SESSION_PATH: &str = "/api/v1/session";
const CLUSTERS_PATH: &str = "/api/v1/clusters";

/// Errors raised while talking to Argo CD.
#[derive(Debug, Error)]
pub enum ArgoCDError {
    #[error("failed to get Argo CD ingress {namespace}/{name}: {source}")]
    IngressLookup {
        namespace: String,
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("Argo CD ingress {namespace}/{name} is missing host names")]
    MissingIngressHost { namespace: String, name: String },

    /// The CA bundle or the admin password could not be read
    #[error("failed to read Argo CD credentials: {0}")]
    Credentials(#[source] RancherError),

    #[error("failed to create Argo CD HTTP client: {0}")]
    Client(String),

    #[error("{method} {url} failed: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("{method} {url} returned unexpected status {status}")]
    UnexpectedStatus {
        method: String,
        url: String,
        status: u16,
    },

    #[error("failed to parse response from {url}: {message}")]
    Parse { url: String, message: String },
}

/// Factory for authenticated [`ArgoCDConfig`]s.
#[derive(Clone)]
pub struct ArgoCDClient {
    sender: Arc<dyn RequestSender>,
    retry: RetryPolicy,
    endpoint: Option<String>,
}

impl ArgoCDClient {
    #[must_use]
    pub fn new(sender: Arc<dyn RequestSender>, retry: RetryPolicy) -> Self {
        Self {
            sender,
            retry,
            endpoint: None,
        }
    }

    /// Send all requests to `endpoint` instead of the in-cluster service.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into().trim_end_matches('/').to_string());
        self
    }

    /// Log in as the Argo CD admin user.
    ///
    /// # Errors
    ///
    /// Returns an error naming the failing step: ingress lookup, CA or password
    /// lookup, HTTP client construction or login.
    pub async fn admin_config(&self, store: &dyn ObjectStore) -> Result<ArgoCDConfig, ArgoCDError> {
        debug!("Getting Argo CD ingress host name");
        let host = ingress_host(store).await?;

        let certificate_authority_data = rancher_root_ca(store)
            .await
            .map_err(ArgoCDError::Credentials)?;
        let additional_ca = read_optional_secret(
            store,
            CATTLE_SYSTEM_NAMESPACE,
            RANCHER_ADDITIONAL_CA_SECRET,
            RANCHER_ADDITIONAL_CA_KEY,
        )
        .await
        .map_err(ArgoCDError::Credentials)?
        .unwrap_or_default();

        let http = build_http_client(&[&certificate_authority_data, &additional_ca])
            .map_err(ArgoCDError::Client)?;

        let mut config = ArgoCDConfig {
            host,
            base_url: self
                .endpoint
                .clone()
                .unwrap_or_else(|| ARGOCD_SERVER_URL.to_string()),
            api_access_token: String::new(),
            http,
            sender: Arc::clone(&self.sender),
            retry: self.retry.clone(),
        };

        let password =
            read_optional_secret(store, ARGOCD_NAMESPACE, ARGOCD_ADMIN_SECRET, PASSWORD_SECRET_KEY)
                .await
                .map_err(ArgoCDError::Credentials)?
                .ok_or_else(|| {
                    ArgoCDError::Credentials(RancherError::MissingSecretKey {
                        namespace: ARGOCD_NAMESPACE.to_string(),
                        name: ARGOCD_ADMIN_SECRET.to_string(),
                        key: PASSWORD_SECRET_KEY.to_string(),
                    })
                })?;
        config.api_access_token = config.login(&password).await?;
        info!(host = %config.host, "Logged in to Argo CD");
        Ok(config)
    }
}

/// An authenticated connection to the Argo CD API server.
pub struct ArgoCDConfig {
    pub host: String,
    pub base_url: String,
    pub api_access_token: String,
    http: reqwest::Client,
    sender: Arc<dyn RequestSender>,
    retry: RetryPolicy,
}

#[derive(Debug, Default, Deserialize)]
struct ClusterList {
    #[serde(default)]
    items: Vec<ClusterItem>,
}

#[derive(Debug, Default, Deserialize)]
struct ClusterItem {
    #[serde(default)]
    name: String,
}

impl ArgoCDConfig {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<(String, HttpResponse), ArgoCDError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = HttpRequest::new(method.clone(), url.clone())
            .header("Host", self.host.clone())
            .header("Accept", "*/*");
        if !self.api_access_token.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_access_token));
        }
        if let Some(body) = body {
            request = request.header("Content-Type", "application/json").body(body);
        }

        let resp = send_with_retry(self.sender.as_ref(), &self.http, &request, &self.retry)
            .await
            .map_err(|source| ArgoCDError::Transport {
                method: method.to_string(),
                url: url.clone(),
                source,
            })?;
        Ok((url, resp))
    }

    async fn login(&self, password: &str) -> Result<String, ArgoCDError> {
        let body = json!({ "Username": ARGOCD_ADMIN_USERNAME, "Password": password }).to_string();
        let (url, resp) = self.send(Method::POST, SESSION_PATH, Some(body)).await?;
        if resp.status != StatusCode::OK {
            return Err(ArgoCDError::UnexpectedStatus {
                method: "POST".to_string(),
                url,
                status: resp.status.as_u16(),
            });
        }

        serde_json::from_str::<Value>(&resp.body)
            .ok()
            .and_then(|v| v.get("token").and_then(Value::as_str).map(str::to_string))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ArgoCDError::Parse {
                url,
                message: "unable to find token in Argo CD response".to_string(),
            })
    }

    /// True when a cluster named `cluster_name` is registered in Argo CD.
    ///
    /// # Errors
    ///
    /// Returns an error unless Argo CD answers 200 with a cluster list.
    pub async fn is_cluster_registered(&self, cluster_name: &str) -> Result<bool, ArgoCDError> {
        let (url, resp) = self.send(Method::GET, CLUSTERS_PATH, None).await?;
        if resp.status != StatusCode::OK {
            return Err(ArgoCDError::UnexpectedStatus {
                method: "GET".to_string(),
                url,
                status: resp.status.as_u16(),
            });
        }
        let clusters: ClusterList =
            serde_json::from_str(&resp.body).map_err(|e| ArgoCDError::Parse {
                url,
                message: e.to_string(),
            })?;
        Ok(clusters.items.iter().any(|c| c.name == cluster_name))
    }
}

async fn ingress_host(store: &dyn ObjectStore) -> Result<String, ArgoCDError> {
    let ingress = store::get::<Ingress>(store, ARGOCD_NAMESPACE, ARGOCD_INGRESS)
        .await
        .map_err(|source| ArgoCDError::IngressLookup {
            namespace: ARGOCD_NAMESPACE.to_string(),
            name: ARGOCD_INGRESS.to_string(),
            source,
        })?;
    ingress
        .spec
        .and_then(|spec| spec.rules)
        .and_then(|rules| rules.into_iter().next())
        .and_then(|rule| rule.host)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ArgoCDError::MissingIngressHost {
            namespace: ARGOCD_NAMESPACE.to_string(),
            name: ARGOCD_INGRESS.to_string(),
        })
}

#[cfg(test)]
#[path = "argocd_tests.rs"]
mod argocd_tests;
