//! Retrying HTTP transport for playlist-dl
//!
//! Every JSON/text request made by the resolver and the location fetcher goes
//! through a [`Transport`]. The HTTP implementation retries transient
//! failures a fixed number of times with a constant pause in between.

use std::time::Duration;

use futures::future::BoxFuture;
use log::{debug, warn};
use once_cell::sync::Lazy;
use reqwest::{Client, ClientBuilder};

use crate::core::error::{Error, Result};

/// Global HTTP client shared by the transport and the transfer engine
///
/// No overall timeout is set here: short requests pass their own timeout and
/// long streams are guarded per read.
pub(crate) static GLOBAL_CLIENT: Lazy<Client> = Lazy::new(|| {
    ClientBuilder::new()
        .tcp_keepalive(Duration::from_secs(60))
        .pool_idle_timeout(Duration::from_secs(90))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(format!("playlist-dl/{}", env!("PLAYLIST_DL_VERSION")))
        .build()
        .expect("Failed to create HTTP client")
});

/// Fixed-count, fixed-interval retry policy
///
/// The interval never grows and carries no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Pause between two attempts
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

/// Run `operation` until it succeeds, fails permanently, or attempts run out
///
/// Only transient errors (see [`Error::is_transient`]) are retried. On
/// exhaustion the error of the last attempt is returned unchanged.
pub async fn retry_with_fixed_delay<F, Fut, T>(
    policy: &RetryPolicy,
    label: &str,
    operation: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.interval;
                warn!(
                    "⚠️  {label}: attempt {attempt}/{} failed: {e}. Retrying in {}ms...",
                    policy.max_attempts,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// A single logical fetch returning the response body as text
pub trait Transport: Send + Sync {
    /// Fetch `url`, giving each attempt at most `timeout`
    fn fetch<'a>(&'a self, url: &'a str, timeout: Duration) -> BoxFuture<'a, Result<String>>;
}

/// HTTP transport backed by reqwest
pub struct HttpTransport {
    client: Client,
    policy: RetryPolicy,
}

impl HttpTransport {
    /// Create a transport on the shared client
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_client(GLOBAL_CLIENT.clone(), policy)
    }

    /// Create a transport on a caller-provided client
    pub fn with_client(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    async fn fetch_once(&self, url: &str, timeout: Duration) -> Result<String> {
        debug!("GET {url}");
        let response = self.client.get(url).timeout(timeout).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpError(format!("{status} from {url}")));
        }

        Ok(response.text().await?)
    }
}

impl Transport for HttpTransport {
    fn fetch<'a>(&'a self, url: &'a str, timeout: Duration) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            retry_with_fixed_delay(&self.policy, url, || self.fetch_once(url, timeout)).await
        })
    }
}
