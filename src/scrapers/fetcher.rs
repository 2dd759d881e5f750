use crate::config::FetchConfig;
use crate::error::FetchError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::clock::Clock;
use governor::middleware::NoOpMiddleware;
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};
use url::Url;

/// Which politeness interval applies to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Index,
    Detail,
}

/// One network attempt, no retries and no delays
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<String, FetchError>;
}

/// HTTP transport backed by reqwest
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(err.to_string())
    } else {
        FetchError::Network(err.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                code: status.as_u16(),
                url: url.to_string(),
            });
        }

        response.text().await.map_err(classify)
    }
}

/// Monotonic clock for the rate limiters that follows tokio's timer, so a
/// paused test runtime drives politeness deterministically
#[derive(Debug, Clone, Copy)]
struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    type Instant = Duration;

    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

type HostLimiter = RateLimiter<String, DashMapStateStore<String>, TokioClock, NoOpMiddleware<Duration>>;

/// Minimum spacing between consecutive requests to the same host, one
/// interval for index pages and one for detail pages.
///
/// Shared by every fetcher that talks to a host, so parallel runs against
/// sources on one site still queue behind each other. Requests to other
/// hosts are never held up.
pub struct Politeness {
    clock: TokioClock,
    index: Option<HostLimiter>,
    detail: Option<HostLimiter>,
}

impl Politeness {
    pub fn new(config: &FetchConfig) -> Self {
        let clock = TokioClock::new();
        let limiter = |interval: Duration| {
            Quota::with_period(interval).map(|quota| RateLimiter::dashmap_with_clock(quota, clock))
        };
        Self {
            clock,
            index: limiter(config.index_delay),
            detail: limiter(config.detail_delay),
        }
    }

    /// Sleep until the host of `url` may take another request of `kind`
    pub async fn wait(&self, url: &str, kind: PageKind) {
        let limiter = match kind {
            PageKind::Index => &self.index,
            PageKind::Detail => &self.detail,
        };
        let Some(limiter) = limiter else {
            return;
        };

        let host = host_of(url);
        while let Err(not_until) = limiter.check_key(&host) {
            let remaining = not_until.wait_time_from(self.clock.now());
            debug!(host = %host, "Politeness delay {:?}", remaining);
            sleep(remaining).await;
        }
    }
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

/// Bounded exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_backoff: config.base_backoff,
            max_backoff: config.max_backoff,
        }
    }
}

/// Rate-limited, retrying page fetcher
#[derive(Clone)]
pub struct PageFetcher {
    transport: Arc<dyn Transport>,
    politeness: Arc<Politeness>,
    retry: RetryPolicy,
}

impl PageFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        politeness: Arc<Politeness>,
        config: &FetchConfig,
    ) -> Self {
        Self {
            transport,
            politeness,
            retry: RetryPolicy::from(config),
        }
    }

    /// Fetch `url`, retrying transient failures with backoff. Terminal
    /// failures (4xx other than 429) are returned after a single attempt.
    pub async fn fetch(&self, url: &str, kind: PageKind) -> Result<String, FetchError> {
        let mut attempt = 1;
        loop {
            self.politeness.wait(url, kind).await;

            match self.transport.get(url).await {
                Ok(body) => {
                    debug!(url = %url, attempt, "Fetched {} bytes", body.len());
                    return Ok(body);
                }
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(url = %url, attempt, "Fetch failed: {}; retrying in {:?}", e, delay);
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(url = %url, attempt, "Fetch failed: {}", e);
                    return Err(e);
                }
            }
        }
    }
}
