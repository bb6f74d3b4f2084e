// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types shared by the VMC sub-reconcilers.
//!
//! [`SyncError`] is what every sync step returns. [`ErrorAggregator`] collects several
//! independent failures so they can be reported together instead of stopping at the
//! first one.
//!
//! ```rust
//! use vz_cluster_operator::errors::ErrorAggregator;
//!
//! let mut errs = ErrorAggregator::new("\n");
//! errs.add("missing infrastructure reference");
//! errs.add("missing control plane reference");
//! assert!(errs.has_errors());
//! assert_eq!(
//!     errs.into_result().unwrap_err().to_string(),
//!     "missing infrastructure reference\nmissing control plane reference"
//! );
//! ```

use crate::argocd::ArgoCDError;
use crate::keycloak::KeycloakError;
use crate::rancher::RancherError;
use crate::store::StoreError;
use crate::workload::WorkloadError;
use std::fmt;

/// Failure of one VMC sync step.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Rancher(#[from] RancherError),

    #[error(transparent)]
    ArgoCD(#[from] ArgoCDError),

    #[error(transparent)]
    Keycloak(#[from] KeycloakError),

    #[error(transparent)]
    Workload(#[from] WorkloadError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// Cluster state the step cannot work with
    #[error("{0}")]
    Invalid(String),

    /// An object could not be rendered as JSON or YAML
    #[error("failed to serialize {what}: {message}")]
    Serialize { what: String, message: String },
}

impl SyncError {
    pub(crate) fn serialize(what: &str, err: impl fmt::Display) -> Self {
        Self::Serialize {
            what: what.to_string(),
            message: err.to_string(),
        }
    }
}

/// Collects error messages in the order they were added.
#[derive(Clone, Debug, Default)]
pub struct ErrorAggregator {
    separator: String,
    messages: Vec<String>,
}

impl ErrorAggregator {
    /// Create an aggregator that joins messages with `separator`.
    #[must_use]
    pub fn new(separator: &str) -> Self {
        Self {
            separator: separator.to_string(),
            messages: Vec::new(),
        }
    }

    /// Record one failure.
    pub fn add(&mut self, err: impl fmt::Display) {
        self.messages.push(err.to_string());
    }

    /// Record the error of a result, if any, and return its value.
    pub fn check<T, E: fmt::Display>(&mut self, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.add(e);
                None
            }
        }
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.messages.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// `Ok(())` when nothing was recorded, otherwise one combined error.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError`] holding every recorded message.
    pub fn into_result(self) -> Result<(), AggregateError> {
        if self.messages.is_empty() {
            Ok(())
        } else {
            Err(AggregateError {
                separator: self.separator,
                messages: self.messages,
            })
        }
    }
}

/// Several failures reported as one error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregateError {
    separator: String,
    messages: Vec<String>,
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages.join(&self.separator))
    }
}

impl std::error::Error for AggregateError {}

impl AggregateError {
    /// The individual messages, in the order they were recorded.
    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
