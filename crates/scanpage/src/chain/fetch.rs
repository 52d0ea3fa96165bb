//! Explorer HTTP client with rate limiting, retries and an optional response cache.

use crate::chain::cache::{Cache, CacheError};
use crate::chain::limiter::RateLimiter;
use crate::provider::ProviderError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const RATE_LIMIT_MS: u64 = 200;
const PAGE_DELAY_MS: u64 = 500;
const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF_MS: u64 = 500;
const MAX_PAGES: u32 = 1_000;
const HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug)]
pub struct FetchConfig {
    /// Minimum gap between any two requests.
    pub rate_limit_ms: u64,
    /// Extra pause after each successful page.
    pub page_delay_ms: u64,
    pub max_retries: u32,
    /// First retry delay; doubles per attempt.
    pub retry_backoff_ms: u64,
    /// Hard stop for pagination.
    pub max_pages: u32,
    /// Serve only from cache. Online runs always hit the network and write through.
    pub offline: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            rate_limit_ms: RATE_LIMIT_MS,
            page_delay_ms: PAGE_DELAY_MS,
            max_retries: MAX_RETRIES,
            retry_backoff_ms: RETRY_BACKOFF_MS,
            max_pages: MAX_PAGES,
            offline: false,
        }
    }
}

impl FetchConfig {
    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(
            self.retry_backoff_ms
                .saturating_mul(1u64 << attempt.min(16)),
        )
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("url: {0}")]
    Url(#[from] url::ParseError),
    #[error("{0}")]
    Other(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 5xx and 429 are worth retrying; other failures are not.
    pub fn is_transient(&self) -> bool {
        self.status >= 500 || self.status == 429
    }
}

/// One GET against a base URL with query parameters.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(
        &self,
        base_url: &str,
        params: &[(String, String)],
    ) -> Result<HttpResponse, TransportError>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(
        &self,
        base_url: &str,
        params: &[(String, String)],
    ) -> Result<HttpResponse, TransportError> {
        let url = url::Url::parse_with_params(base_url, params)?;
        let res = self.client.get(url).send().await?;
        let status = res.status().as_u16();
        let body = res.text().await?;
        Ok(HttpResponse { status, body })
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("http status {status}: {body}")]
    Http { status: u16, body: String },
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
    #[error(transparent)]
    Provider(ProviderError),
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("cache: {0}")]
    Cache(#[from] CacheError),
    #[error("offline mode: no cached data for key")]
    OfflineMiss,
}

/// Sequential page fetcher. One request in flight at a time; every attempt waits on the limiter.
pub struct Fetcher {
    config: FetchConfig,
    transport: Arc<dyn Transport>,
    limiter: RateLimiter,
    cache: Option<Cache>,
    request_count: AtomicU64,
}

impl Fetcher {
    pub fn new(config: FetchConfig, transport: Arc<dyn Transport>, cache: Option<Cache>) -> Self {
        let limiter = RateLimiter::from_millis(config.rate_limit_ms);
        Self {
            config,
            transport,
            limiter,
            cache,
            request_count: AtomicU64::new(0),
        }
    }

    /// Fetcher over real HTTP.
    pub fn http(config: FetchConfig, cache: Option<Cache>) -> Result<Self, FetchError> {
        let transport = Arc::new(HttpTransport::new()?);
        Ok(Self::new(config, transport, cache))
    }

    /// Use an existing limiter, e.g. one shared with other fetchers on the same provider.
    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Number of HTTP requests issued, retries included.
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// GET and parse, retrying transport errors, 5xx/429 and provider backpressure.
    /// Bodies that parse successfully are cached under `cache_key` when given; the
    /// cache is only read back in offline mode.
    pub async fn fetch<T>(
        &self,
        base_url: &str,
        params: &[(String, String)],
        cache_key: Option<&str>,
        parse: impl Fn(&str) -> Result<T, ProviderError> + Send + Sync,
    ) -> Result<T, FetchError> {
        if self.config.offline {
            let cached = match (&self.cache, cache_key) {
                (Some(cache), Some(key)) => cache.get_json(key)?,
                _ => None,
            };
            return match cached {
                Some(body) => {
                    debug!(key = ?cache_key, "cache hit");
                    parse(&body).map_err(FetchError::Provider)
                }
                None => Err(FetchError::OfflineMiss),
            };
        }

        let max_retries = self.config.max_retries;
        let mut last = String::new();
        for attempt in 0..=max_retries {
            self.limiter.acquire().await;
            self.request_count.fetch_add(1, Ordering::Relaxed);
            match self.transport.get(base_url, params).await {
                Ok(res) if res.is_success() => match parse(&res.body) {
                    Ok(parsed) => {
                        if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
                            if let Err(e) = cache.set_json(key, &res.body) {
                                warn!(error = %e, "cache write failed");
                            }
                        }
                        return Ok(parsed);
                    }
                    Err(e) if e.is_retryable() => last = e.to_string(),
                    Err(e) => return Err(FetchError::Provider(e)),
                },
                Ok(res) if res.is_transient() => {
                    last = format!("http status {}", res.status);
                }
                Ok(res) => {
                    return Err(FetchError::Http {
                        status: res.status,
                        body: res.body,
                    })
                }
                Err(e) => last = e.to_string(),
            }
            if attempt < max_retries {
                let delay = self.config.backoff(attempt);
                warn!(attempt, ms = delay.as_millis() as u64, reason = %last, "retry after error");
                tokio::time::sleep(delay).await;
            }
        }
        Err(FetchError::RetriesExhausted {
            attempts: max_retries + 1,
            last,
        })
    }
}
