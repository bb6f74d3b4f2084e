// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes reconciliation for `VerrazzanoManagedCluster` resources.
//!
//! The operator follows the standard controller pattern:
//!
//! 1. **Watch** - VMCs and the Secrets they own
//! 2. **Reconcile** - run every sync step for the managed cluster in order
//! 3. **Status** - publish conditions, Rancher and Argo CD registration state
//!
//! # Building blocks
//!
//! - [`finalizers`] - finalizer bookkeeping on the VMC
//! - [`resources`] - create-or-update helpers and owner references
//! - [`status`] - condition and registration status writes
//! - [`retry`] - jittered requeue intervals
//! - [`vmc`] - the VMC controller and its sync steps
//!
//! # Example
//!
//! ```rust,no_run
//! use vz_cluster_operator::context::Context;
//! use vz_cluster_operator::crd::VerrazzanoManagedCluster;
//! use vz_cluster_operator::reconcilers::reconcile_vmc;
//! use std::sync::Arc;
//!
//! async fn run_once(vmc: VerrazzanoManagedCluster, ctx: Arc<Context>) -> anyhow::Result<()> {
//!     let action = reconcile_vmc(Arc::new(vmc), ctx).await?;
//!     tracing::info!(?action, "Reconciled");
//!     Ok(())
//! }
//! ```

pub mod finalizers;
pub mod resources;
pub mod retry;
pub mod status;
pub mod vmc;

pub use vmc::{error_requeue, reconcile_vmc};
