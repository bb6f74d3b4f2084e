// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Rancher API client.
//!
//! Managed clusters are imported into the Rancher instance running on the admin
//! cluster. This module holds everything that talks to Rancher over HTTP:
//!
//! - [`transport`] - the [`transport::RequestSender`] seam and retrying send loop
//! - [`config`] - [`config::RancherConfig`] construction, login and the token cache
//! - [`registration`] - import, registration token, manifest, liveness and delete
//! - [`proxy`] - create-or-update of Secrets on a managed cluster via the Rancher proxy

pub mod config;
pub mod proxy;
pub mod registration;
pub mod transport;

pub use config::{RancherClient, RancherConfig, RancherUser, TokenCache};
pub use crate::store::OperationResult;
pub use proxy::create_or_update_secret_rancher_proxy;
pub use transport::{HttpRequest, HttpResponse, RequestSender, ReqwestSender, TransportError};

use crate::store::StoreError;
use thiserror::Error;

/// Errors raised while talking to Rancher.
#[derive(Debug, Error)]
pub enum RancherError {
    /// The Rancher ingress could not be read
    #[error("failed to read Rancher ingress {namespace}/{name}: {source}")]
    IngressLookup {
        namespace: String,
        name: String,
        #[source]
        source: StoreError,
    },

    /// The Rancher ingress has no host rule
    #[error("Rancher ingress {namespace}/{name} has no host")]
    MissingIngressHost { namespace: String, name: String },

    /// A Secret holding credentials or CA data could not be read
    #[error("failed to read secret {namespace}/{name}: {source}")]
    SecretLookup {
        namespace: String,
        name: String,
        #[source]
        source: StoreError,
    },

    /// A Secret exists but lacks the expected key
    #[error("secret {namespace}/{name} has no {key} key")]
    MissingSecretKey {
        namespace: String,
        name: String,
        key: String,
    },

    /// Login to Rancher failed
    #[error("failed to log in to Rancher as {user}: {message}")]
    Login { user: String, message: String },

    /// The HTTP client could not be constructed
    #[error("failed to create Rancher HTTP client: {0}")]
    Client(String),

    /// No response was received
    #[error("{method} {url} failed: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: TransportError,
    },

    /// The response had a status the operation does not accept
    #[error("{method} {url} returned unexpected status {status}: {body}")]
    UnexpectedStatus {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    /// The response body could not be decoded
    #[error("failed to parse response from {url}: {message}")]
    Parse { url: String, message: String },

    /// The object was not found on the managed cluster
    #[error("{0} not found")]
    NotFound(String),

    /// A secret proxy mutation changed the secret's identity
    #[error("mutate function cannot change secret name or namespace")]
    IdentityChanged,

    /// A secret proxy mutation failed
    #[error("failed to mutate secret {0}: {1}")]
    Mutate(String, String),
}

impl RancherError {
    /// True for [`RancherError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub(crate) fn unexpected(method: &str, url: &str, resp: &HttpResponse) -> Self {
        Self::UnexpectedStatus {
            method: method.to_string(),
            url: url.to_string(),
            status: resp.status.as_u16(),
            body: resp.body.clone(),
        }
    }

    pub(crate) fn parse(url: &str, err: impl std::fmt::Display) -> Self {
        Self::Parse {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}
