// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use axum::{http::StatusCode, routing::get, Router};
use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    runtime::{controller::Action, watcher::Config, Controller},
    Api, Client, ResourceExt,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use vz_cluster_operator::{
    constants::{ERROR_REQUEUE_MAX_SECS, ERROR_REQUEUE_MIN_SECS, RECONCILE_REQUEUE_INTERVAL_SECS},
    context::{Context, OperatorConfig},
    crd::VerrazzanoManagedCluster,
    metrics::gather_metrics,
    rancher::ReqwestSender,
    reconcilers::{error_requeue, reconcile_vmc, retry::RetryPolicy},
    store::KubeStore,
};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

/// Verrazzano managed cluster operator
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Requeue delay after a successful reconcile, in seconds
    #[arg(long, env = "VMC_REQUEUE_INTERVAL_SECS", default_value_t = RECONCILE_REQUEUE_INTERVAL_SECS)]
    requeue_interval_secs: u64,

    /// Lower bound of the requeue delay after a failed reconcile, in seconds
    #[arg(long, default_value_t = ERROR_REQUEUE_MIN_SECS)]
    error_requeue_min_secs: u64,

    /// Upper bound of the requeue delay after a failed reconcile, in seconds
    #[arg(long, default_value_t = ERROR_REQUEUE_MAX_SECS)]
    error_requeue_max_secs: u64,

    /// Address the Prometheus metrics endpoint listens on
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: SocketAddr,

    /// Tokio worker threads
    #[arg(long, default_value_t = 4)]
    worker_threads: usize,

    /// Log output format: `text` or `json`
    #[arg(long, env = "RUST_LOG_FORMAT", default_value = "text")]
    log_format: String,
}

impl Cli {
    fn operator_config(&self) -> OperatorConfig {
        OperatorConfig {
            requeue_interval: Duration::from_secs(self.requeue_interval_secs),
            error_requeue_min_secs: self.error_requeue_min_secs,
            error_requeue_max_secs: self.error_requeue_max_secs.max(self.error_requeue_min_secs),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cli.worker_threads)
        .thread_name("vz-cluster-operator")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

/// Format: timestamp file:line LEVEL message. `RUST_LOG` overrides the default `info` filter.
fn init_tracing(log_format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(cli: Cli) -> Result<()> {
    init_tracing(&cli.log_format);
    info!("Starting Verrazzano managed cluster operator");

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;

    let ctx = Arc::new(Context::new(
        Arc::new(KubeStore::new(client.clone())),
        Arc::new(ReqwestSender),
        RetryPolicy::default(),
        cli.operator_config(),
    ));

    // Neither task should return; whichever does first takes the process down
    tokio::select! {
        result = run_vmc_controller(client, ctx) => {
            error!("CRITICAL: VerrazzanoManagedCluster controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("VerrazzanoManagedCluster controller exited unexpectedly without error")
        }
        result = serve_metrics(cli.metrics_addr) => {
            error!("CRITICAL: metrics server exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("metrics server exited unexpectedly without error")
        }
    }
}

/// Run the `VerrazzanoManagedCluster` controller
async fn run_vmc_controller(client: Client, ctx: Arc<Context>) -> Result<()> {
    info!("Starting VerrazzanoManagedCluster controller");

    let api = Api::<VerrazzanoManagedCluster>::all(client.clone());

    Controller::new(api, Config::default())
        .owns(Api::<Secret>::all(client), Config::default())
        .run(reconcile_vmc_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Reconcile wrapper for `VerrazzanoManagedCluster`
async fn reconcile_vmc_wrapper(
    vmc: Arc<VerrazzanoManagedCluster>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    debug!(
        vmc = %vmc.name_any(),
        namespace = ?vmc.namespace(),
        "Reconcile wrapper called for VerrazzanoManagedCluster"
    );

    Ok(reconcile_vmc(vmc, ctx).await?)
}

/// Error policy for the VMC controller
fn error_policy(
    vmc: Arc<VerrazzanoManagedCluster>,
    err: &ReconcileError,
    ctx: Arc<Context>,
) -> Action {
    debug!(vmc = %vmc.name_any(), error = %err, "Requeueing after a failed reconcile");
    error_requeue(&ctx.config)
}

/// Serve `/metrics` in the Prometheus text format
async fn serve_metrics(addr: SocketAddr) -> Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler));

    info!(%addr, "Serving metrics");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}

async fn metrics_handler() -> (StatusCode, String) {
    match gather_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to gather metrics: {e}"),
        ),
    }
}
