//! Rate limiting and retry for outbound HTTP
//!
//! Every indexer and the download client talk through a [`RateLimitedClient`];
//! transient failures are retried with exponential backoff via [`retry_async`].

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::{Client, RequestBuilder};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    /// Short bursts allowed above the steady rate
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 2,
            burst_size: 5,
        }
    }
}

/// HTTP client that waits for a governor permit before each request
#[derive(Clone)]
pub struct RateLimitedClient {
    client: Client,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    name: String,
}

impl RateLimitedClient {
    pub fn new(name: &str, config: RateLimitConfig, timeout: Duration) -> Result<Self> {
        let quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN),
        )
        .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN));

        let client = Client::builder()
            .user_agent(concat!("tvhound/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            limiter: Arc::new(RateLimiter::direct(quota)),
            name: name.to_string(),
        })
    }

    /// Client for RSS and Newznab indexers; kept conservative
    pub fn for_indexers(timeout: Duration) -> Result<Self> {
        Self::new(
            "indexer",
            RateLimitConfig {
                requests_per_second: 1,
                burst_size: 3,
            },
            timeout,
        )
    }

    /// Client for the local download client API
    pub fn for_download_client(timeout: Duration) -> Result<Self> {
        Self::new(
            "download_client",
            RateLimitConfig {
                requests_per_second: 5,
                burst_size: 10,
            },
            timeout,
        )
    }

    /// Wait for a permit and start a GET request
    pub async fn get(&self, url: &str) -> RequestBuilder {
        self.limiter.until_ready().await;
        debug!(client = %self.name, url = %url, "Making rate-limited GET request");
        self.client.get(url)
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No waiting between attempts; used by tests
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    pub fn to_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_interval,
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            randomization_factor: 0.0,
            max_elapsed_time: Some(Duration::from_secs(120)),
            ..Default::default()
        }
    }
}

/// Run `operation` until it succeeds, the error is not retryable, or retries run out
pub async fn retry_async<T, E, Fut, F, R>(
    operation: F,
    is_retryable: R,
    config: &RetryConfig,
    operation_name: &str,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempts = 0;
    let mut backoff = config.to_backoff();

    loop {
        attempts += 1;
        let error = match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !is_retryable(&error) {
            return Err(error);
        }

        if attempts >= config.max_retries {
            warn!(
                operation = %operation_name,
                attempts = attempts,
                error = %error,
                "Operation failed after max retries"
            );
            return Err(error);
        }

        let Some(duration) = backoff.next_backoff() else {
            return Err(error);
        };

        warn!(
            operation = %operation_name,
            attempt = attempts,
            error = %error,
            retry_in_ms = duration.as_millis() as u64,
            "Operation failed, retrying"
        );
        tokio::time::sleep(duration).await;
    }
}
