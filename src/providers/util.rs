use crate::core::config::RequestConfig;
use anyhow::{Context, Result};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

pub const USER_AGENT: &str = concat!("quotefx/", env!("CARGO_PKG_VERSION"));

/// How often and how patiently transport failures are retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(request: &RequestConfig) -> Self {
        Self {
            retries: request.retries,
            delay: Duration::from_millis(request.retry_delay_ms),
        }
    }

    pub fn none() -> Self {
        Self {
            retries: 0,
            delay: Duration::ZERO,
        }
    }
}

/// Builds the shared HTTP client with the configured timeout.
pub fn build_client(request: &RequestConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(request.timeout())
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to build HTTP client")
}

/// Retries an async operation with configurable attempts and delays
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `policy`: Number of retry attempts (total runs = 1 initial + retries)
///   and the pause between them
///
/// # Returns
/// Either the successful result or the error from the last attempt
pub async fn with_retry<F, Fut, T, E>(mut operation: F, policy: RetryPolicy) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt > policy.retries {
                    return Err(err);
                }
                debug!(attempt, retries = policy.retries, error = %err, "Attempt failed, retrying");
                attempt += 1;
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}
