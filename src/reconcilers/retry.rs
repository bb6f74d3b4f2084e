// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Retry policies with exponential backoff.
//!
//! A [`RetryPolicy`] is a plain value injected wherever retries happen (the Rancher
//! transport, the Kubernetes object store) so that tests can swap in a zero-delay
//! policy without touching process-wide state.

use rand::Rng;
use reqwest::StatusCode;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Default number of attempts made by [`RetryPolicy::default`]
const DEFAULT_RETRY_STEPS: u32 = 10;

/// Default delay before the first retry (1 second)
const DEFAULT_INITIAL_INTERVAL_SECS: u64 = 1;

/// Backoff multiplier (exponential growth factor)
const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Jitter added on top of each delay (up to +10%)
const DEFAULT_JITTER: f64 = 0.1;

/// Bounded exponential backoff parameters.
///
/// Delays grow as `initial_interval * factor^n`, each extended by a random fraction of
/// up to `jitter`. At most `steps` attempts are made in total.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub steps: u32,
    /// Delay before the first retry
    pub initial_interval: Duration,
    /// Multiplier applied to the delay after every retry
    pub factor: f64,
    /// Maximum extra fraction of the delay added as jitter
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            steps: DEFAULT_RETRY_STEPS,
            initial_interval: Duration::from_secs(DEFAULT_INITIAL_INTERVAL_SECS),
            factor: DEFAULT_BACKOFF_FACTOR,
            jitter: DEFAULT_JITTER,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes a single attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            steps: 1,
            ..Self::default()
        }
    }

    /// A policy with `steps` attempts and no delay between them.
    #[must_use]
    pub fn immediate(steps: u32) -> Self {
        Self {
            steps,
            initial_interval: Duration::ZERO,
            factor: 1.0,
            jitter: 0.0,
        }
    }

    /// Start a new backoff sequence for this policy.
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        Backoff {
            current_interval: self.initial_interval,
            remaining: self.steps.saturating_sub(1),
            factor: self.factor,
            jitter: self.jitter,
        }
    }
}

/// One in-flight backoff sequence.
pub struct Backoff {
    current_interval: Duration,
    remaining: u32,
    factor: f64,
    jitter: f64,
}

impl Backoff {
    /// Get the delay before the next attempt, or None when the attempts are used up.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let interval = self.current_interval;
        let next = interval.as_secs_f64() * self.factor;
        self.current_interval = Duration::from_secs_f64(next);

        Some(apply_jitter(interval, self.jitter))
    }
}

/// Extend an interval by a random fraction of up to `jitter`.
fn apply_jitter(interval: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 || interval.is_zero() {
        return interval;
    }

    let secs = interval.as_secs_f64();
    let mut rng = rand::thread_rng();
    let extra = rng.gen_range(0.0..=secs * jitter);

    Duration::from_secs_f64(secs + extra)
}

/// Pick a random requeue delay between `min_secs` and `max_secs` seconds.
///
/// Used after a failed reconcile so that many failing VMCs do not requeue in lockstep.
#[must_use]
pub fn jittered_requeue(min_secs: u64, max_secs: u64) -> Duration {
    if max_secs <= min_secs {
        return Duration::from_secs(min_secs);
    }
    let mut rng = rand::thread_rng();
    let millis = rng.gen_range(min_secs * 1000..=max_secs * 1000);
    Duration::from_millis(millis)
}

/// Check if an HTTP status code is retryable.
///
/// Only server errors (5xx) are retried. Every other response, including 4xx,
/// is returned to the caller as is.
#[must_use]
pub fn is_retryable_http_status(status: StatusCode) -> bool {
    status.is_server_error()
}

/// Retry a Kubernetes API call with the given policy.
///
/// Retries on 429, 5xx, and transport errors. Every other error is returned
/// immediately with its original type so callers can still match on it.
///
/// # Errors
///
/// Returns the last error once it is non-retryable or the attempts are used up.
pub async fn retry_kube_call<T, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
    operation_name: &str,
) -> Result<T, kube::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, kube::Error>>,
{
    let mut backoff = policy.backoff();
    let start_time = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        "Kubernetes API call succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(e) => {
                if !is_retryable_kube_error(&e) {
                    return Err(e);
                }

                if let Some(duration) = backoff.next_backoff() {
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        retry_after = ?duration,
                        error = %e,
                        "Retryable Kubernetes API error, will retry"
                    );
                    tokio::time::sleep(duration).await;
                } else {
                    error!(
                        operation = operation_name,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        error = %e,
                        "Backoff exhausted, giving up"
                    );
                    return Err(e);
                }
            }
        }
    }
}

/// Determine if a Kubernetes error is retryable.
///
/// - **HTTP 429** and **HTTP 5xx** are transient API server conditions
/// - **Service errors** are network/connection issues
///
/// Not-found, conflict and other client errors are not retried; the reconcile loop
/// handles them.
pub(crate) fn is_retryable_kube_error(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(api_err) => {
            api_err.code == 429 || (api_err.code >= 500 && api_err.code < 600)
        }
        kube::Error::Service(_) => true,
        _ => false,
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
