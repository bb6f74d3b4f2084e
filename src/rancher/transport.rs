// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP transport for the Rancher, Argo CD and Keycloak APIs.
//!
//! Every outbound request goes through a [`RequestSender`], a single `send` seam that
//! production code implements with `reqwest` and tests replace with scripted fakes.
//! [`send_with_retry`] wraps the sender with a [`RetryPolicy`]: timeouts, connection
//! and DNS failures, and HTTP 5xx responses are retried; every other outcome is
//! returned to the caller after the first attempt.

use crate::constants::{HTTP_CLIENT_TIMEOUT_SECS, HTTP_CONNECT_TIMEOUT_SECS, HTTP_READ_TIMEOUT_SECS};
use crate::reconcilers::retry::{is_retryable_http_status, RetryPolicy};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// A fully buffered HTTP request.
///
/// The body is held as bytes so every retry attempt resends identical content.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A response with its body fully read.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Transport-level failure (no HTTP response was received).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Timeouts and connection (including DNS) failures are worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connect(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// The seam around a single HTTP round trip.
#[async_trait]
pub trait RequestSender: Send + Sync {
    async fn send(
        &self,
        client: &reqwest::Client,
        request: &HttpRequest,
    ) -> Result<HttpResponse, TransportError>;
}

/// [`RequestSender`] that delegates to `reqwest`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReqwestSender;

#[async_trait]
impl RequestSender for ReqwestSender {
    async fn send(
        &self,
        client: &reqwest::Client,
        request: &HttpRequest,
    ) -> Result<HttpResponse, TransportError> {
        let mut builder = client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

/// Execute a request, retrying transient failures according to `policy`.
///
/// A 5xx response that is still failing when the attempts run out is returned as
/// a normal response so the caller can report the status.
///
/// # Errors
///
/// Returns the transport error of the last attempt when no response was received.
pub async fn send_with_retry(
    sender: &dyn RequestSender,
    client: &reqwest::Client,
    request: &HttpRequest,
    policy: &RetryPolicy,
) -> Result<HttpResponse, TransportError> {
    let mut backoff = policy.backoff();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let result = sender.send(client, request).await;

        let retry_reason = match &result {
            Ok(resp) if is_retryable_http_status(resp.status) => {
                format!("HTTP {}", resp.status.as_u16())
            }
            Err(e) if e.is_retryable() => e.to_string(),
            _ => {
                debug!(
                    method = %request.method,
                    url = %request.url,
                    attempt = attempt,
                    "HTTP request completed"
                );
                return result;
            }
        };

        match backoff.next_backoff() {
            Some(duration) => {
                warn!(
                    method = %request.method,
                    url = %request.url,
                    attempt = attempt,
                    retry_after = ?duration,
                    reason = %retry_reason,
                    "Retryable HTTP error, will retry"
                );
                tokio::time::sleep(duration).await;
            }
            None => {
                warn!(
                    method = %request.method,
                    url = %request.url,
                    attempt = attempt,
                    reason = %retry_reason,
                    "Backoff exhausted, giving up"
                );
                return result;
            }
        }
    }
}

/// First proxy URL found in `https_proxy`, `HTTPS_PROXY`, `http_proxy`, `HTTP_PROXY`.
#[must_use]
pub fn proxy_url_from_env() -> Option<String> {
    ["https_proxy", "HTTPS_PROXY", "http_proxy", "HTTP_PROXY"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.is_empty())
}

/// Client builder that trusts the given PEM bundles.
///
/// The client requires TLS 1.2 or later and routes through the proxy from the
/// environment when one is set. Connecting, TLS included, is bounded by 10 seconds.
/// Every read is bounded by 10 seconds too, so a server that accepts the request but
/// never sends response headers fails long before the 30 second overall timeout.
///
/// # Errors
///
/// Returns an error when a CA bundle is not valid PEM or the proxy URL is invalid.
pub fn http_client_builder(ca_bundles: &[&str]) -> Result<reqwest::ClientBuilder, String> {
    let mut builder = reqwest::Client::builder()
        .min_tls_version(reqwest::tls::Version::TLS_1_2)
        .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
        .read_timeout(Duration::from_secs(HTTP_READ_TIMEOUT_SECS))
        .timeout(Duration::from_secs(HTTP_CLIENT_TIMEOUT_SECS));

    for bundle in ca_bundles.iter().filter(|b| !b.trim().is_empty()) {
        let certs = reqwest::Certificate::from_pem_bundle(bundle.as_bytes())
            .map_err(|e| format!("invalid CA bundle: {e}"))?;
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
    }

    if let Some(proxy) = proxy_url_from_env() {
        let proxy = reqwest::Proxy::all(&proxy).map_err(|e| format!("invalid proxy URL: {e}"))?;
        builder = builder.proxy(proxy);
    }

    Ok(builder)
}

/// Build an HTTP client from [`http_client_builder`].
///
/// # Errors
///
/// Returns an error when a CA bundle is not valid PEM or the proxy URL is invalid.
pub fn build_http_client(ca_bundles: &[&str]) -> Result<reqwest::Client, String> {
    http_client_builder(ca_bundles)?
        .build()
        .map_err(|e| format!("failed to build HTTP client: {e}"))
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod transport_tests;
