// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the cluster operator.
//!
//! All metrics share the `vz_cluster_operator_` prefix and live in
//! [`METRICS_REGISTRY`], which `main` serves on `/metrics`.
//!
//! # Example
//!
//! ```rust,no_run
//! use vz_cluster_operator::metrics::record_reconcile_success;
//!
//! record_reconcile_success(std::time::Duration::from_millis(350));
//! ```

use prometheus::{Counter, CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all operator metrics
const METRICS_NAMESPACE: &str = "vz_cluster_operator";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

fn register<T: prometheus::core::Collector + Clone + 'static>(metric: T) -> T {
    if let Err(e) = METRICS_REGISTRY.register(Box::new(metric.clone())) {
        tracing::warn!(error = %e, "Failed to register metric");
    }
    metric
}

// ============================================================================
// VMC Reconcile Metrics
// ============================================================================

/// Duration of the most recent VMC reconcile, in seconds
pub static VMC_RECONCILE_DURATION_SECONDS: LazyLock<Gauge> = LazyLock::new(|| {
    register(
        Gauge::with_opts(Opts::new(
            format!("{METRICS_NAMESPACE}_reconcile_vmc_duration_seconds"),
            "The duration in seconds of vmc reconcile process",
        ))
        .expect("valid gauge options"),
    )
});

/// Total number of failed VMC reconciles
pub static VMC_RECONCILE_ERROR_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    register(
        Counter::with_opts(Opts::new(
            format!("{METRICS_NAMESPACE}_reconcile_vmc_error_total"),
            "The total number of failed reconciles for the VMC resource",
        ))
        .expect("valid counter options"),
    )
});

/// Total number of successful VMC reconciles
pub static VMC_RECONCILE_SUCCESS_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    register(
        Counter::with_opts(Opts::new(
            format!("{METRICS_NAMESPACE}_reconcile_vmc_success_total"),
            "The total number of successful reconciles for the VMC resource",
        ))
        .expect("valid counter options"),
    )
});

// ============================================================================
// Rancher API Metrics
// ============================================================================

/// Requests sent to Rancher
///
/// Labels:
/// - `method`: HTTP method
/// - `status`: HTTP status code, or `error` when no response was received
pub static RANCHER_REQUESTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register(
        CounterVec::new(
            Opts::new(
                format!("{METRICS_NAMESPACE}_rancher_requests_total"),
                "Total number of requests sent to Rancher by method and status",
            ),
            &["method", "status"],
        )
        .expect("valid counter options"),
    )
});

/// Record a successful reconcile and its duration.
pub fn record_reconcile_success(duration: Duration) {
    VMC_RECONCILE_SUCCESS_TOTAL.inc();
    VMC_RECONCILE_DURATION_SECONDS.set(duration.as_secs_f64());
}

/// Record a failed reconcile and its duration.
pub fn record_reconcile_error(duration: Duration) {
    VMC_RECONCILE_ERROR_TOTAL.inc();
    VMC_RECONCILE_DURATION_SECONDS.set(duration.as_secs_f64());
}

/// Count one Rancher request.
pub fn record_rancher_request(method: &str, status: &str) {
    RANCHER_REQUESTS_TOTAL
        .with_label_values(&[method, status])
        .inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
