//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests made for an analysis:
//! - Building the shared HTTP client with the bot user agent string
//! - Manual redirect handling with loop detection
//! - Size-capped body reads
//! - Best-effort robots.txt lookup through the per-origin cache
//! - Error classification into retryable and terminal failures

use crate::config::{FetcherConfig, UserAgentConfig};
use crate::crawler::page::{Page, RedirectHop};
use crate::robots::{origin_key, robots_url, CachedRobots, RobotsCache};
use crate::state::{is_retryable_status, ErrorKind, JobError};
use chrono::Utc;
use reqwest::{header, redirect::Policy, Client, Response};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};
use url::Url;

/// Category of a failed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    InvalidUrl,
    /// DNS, connect, TLS or mid-body transport failure
    Network,
    Timeout,
    /// Final response was not 2xx
    HttpStatus(u16),
    /// Redirect limit exceeded or a redirect loop
    TooManyRedirects,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl => write!(f, "invalid URL"),
            Self::Network => write!(f, "network error"),
            Self::Timeout => write!(f, "timeout"),
            Self::HttpStatus(code) => write!(f, "HTTP {}", code),
            Self::TooManyRedirects => write!(f, "too many redirects"),
        }
    }
}

/// Error returned by [`Fetcher::fetch`]
#[derive(Debug, Clone, Error)]
#[error("{kind} fetching {url}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub url: String,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, url: &Url, message: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.to_string(),
            message: message.into(),
        }
    }

    /// Classifies a transport error from reqwest
    fn from_reqwest(url: &Url, err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            FetchErrorKind::Timeout
        } else if err.is_builder() {
            FetchErrorKind::InvalidUrl
        } else {
            FetchErrorKind::Network
        };
        Self::new(kind, url, err.to_string())
    }

    /// Network, timeout, 5xx, 408 and 429 failures may succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            FetchErrorKind::Network | FetchErrorKind::Timeout => true,
            FetchErrorKind::HttpStatus(code) => is_retryable_status(code),
            FetchErrorKind::InvalidUrl | FetchErrorKind::TooManyRedirects => false,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self.kind {
            FetchErrorKind::HttpStatus(code) => Some(code),
            _ => None,
        }
    }

    /// Converts into the failure record stored on the job
    pub fn to_job_error(&self) -> JobError {
        let kind = match self.kind {
            FetchErrorKind::InvalidUrl => ErrorKind::InvalidUrl,
            FetchErrorKind::Network => ErrorKind::Network,
            FetchErrorKind::Timeout => ErrorKind::Timeout,
            FetchErrorKind::HttpStatus(_) => ErrorKind::HttpStatus,
            FetchErrorKind::TooManyRedirects => ErrorKind::TooManyRedirects,
        };
        JobError::new(kind, self.to_string(), self.status_code())
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - Identification sent with every request
/// * `config` - Fetcher limits
///
/// # Example
///
/// ```no_run
/// use autoseo::config::{FetcherConfig, UserAgentConfig};
/// use autoseo::crawler::build_http_client;
///
/// let user_agent = UserAgentConfig {
///     crawler_name: "AutoSEO".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/bot".to_string(),
///     contact_email: "bot@example.com".to_string(),
/// };
///
/// let client = build_http_client(&user_agent, &FetcherConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    config: &FetcherConfig,
) -> Result<Client, reqwest::Error> {
    // Overall time is bounded per fetch by the caller's budget, not here
    Client::builder()
        .user_agent(user_agent.header_value())
        .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
        .redirect(Policy::none()) // Handle redirects manually
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches pages for analysis
///
/// Cheap to share: the client pools connections and the robots.txt cache is
/// internally synchronized.
#[derive(Debug)]
pub struct Fetcher {
    client: Client,
    robots: RobotsCache,
    max_body_bytes: usize,
    fetch_robots: bool,
}

impl Fetcher {
    pub fn new(user_agent: &UserAgentConfig, config: &FetcherConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(build_http_client(user_agent, config)?, config))
    }

    pub fn with_client(client: Client, config: &FetcherConfig) -> Self {
        Self {
            client,
            robots: RobotsCache::new(chrono::Duration::hours(config.robots_ttl_hours)),
            max_body_bytes: config.max_body_bytes,
            fetch_robots: config.fetch_robots,
        }
    }

    pub fn robots_cache(&self) -> &RobotsCache {
        &self.robots
    }

    /// Fetches `url`, following at most `max_redirects` redirects
    ///
    /// # Request Flow
    ///
    /// 1. GET the URL without automatic redirects
    /// 2. On 3xx, resolve `Location` and repeat; a revisited URL or more
    ///    than `max_redirects` hops fails with `TooManyRedirects`
    /// 3. Any other non-2xx final status fails with `HttpStatus`
    /// 4. Read the body up to the configured limit
    /// 5. Look up the final origin's robots.txt in whatever budget remains
    ///
    /// `timeout` bounds the whole flow.
    pub async fn fetch(
        &self,
        url: &Url,
        timeout: Duration,
        max_redirects: u32,
    ) -> Result<Page, FetchError> {
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(FetchError::new(
                FetchErrorKind::InvalidUrl,
                url,
                "only absolute http(s) URLs can be fetched",
            ));
        }

        let started = Instant::now();
        let deadline = started + timeout;

        let mut page = match timeout_at(deadline, self.fetch_document(url, max_redirects)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(FetchError::new(
                    FetchErrorKind::Timeout,
                    url,
                    format!("no complete response within {}ms", timeout.as_millis()),
                ))
            }
        };

        if self.fetch_robots {
            page.robots_txt = self.robots_for(&page.url, deadline).await;
        }
        page.elapsed = started.elapsed();

        debug!(
            "Fetched {} ({}, {} bytes, {} redirects) in {:?}",
            page.url,
            page.status_code,
            page.body_bytes,
            page.redirect_chain.len(),
            page.elapsed
        );

        Ok(page)
    }

    async fn fetch_document(&self, url: &Url, max_redirects: u32) -> Result<Page, FetchError> {
        let mut current = url.clone();
        let mut redirect_chain = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(current.to_string());

        loop {
            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| FetchError::from_reqwest(&current, e))?;
            let status = response.status();

            if status.is_redirection() {
                let Some(next) = redirect_target(&current, &response) else {
                    // A 3xx without a usable Location is a final response
                    return Err(FetchError::new(
                        FetchErrorKind::HttpStatus(status.as_u16()),
                        &current,
                        "redirect without a valid Location header",
                    ));
                };

                redirect_chain.push(RedirectHop {
                    url: current.to_string(),
                    status: status.as_u16(),
                });

                if redirect_chain.len() > max_redirects as usize {
                    return Err(FetchError::new(
                        FetchErrorKind::TooManyRedirects,
                        url,
                        format!("more than {} redirects", max_redirects),
                    ));
                }

                if !visited.insert(next.to_string()) {
                    return Err(FetchError::new(
                        FetchErrorKind::TooManyRedirects,
                        url,
                        format!("redirect loop back to {}", next),
                    ));
                }

                if !matches!(next.scheme(), "http" | "https") {
                    return Err(FetchError::new(
                        FetchErrorKind::InvalidUrl,
                        &next,
                        "redirect to a non-http(s) URL",
                    ));
                }

                debug!("Redirect {} -> {} ({})", current, next, status.as_u16());
                current = next;
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::new(
                    FetchErrorKind::HttpStatus(status.as_u16()),
                    &current,
                    status.canonical_reason().unwrap_or("unexpected status"),
                ));
            }

            let headers = collect_headers(&response);
            let (body, body_bytes, truncated) = self.read_body(&current, response).await?;

            if truncated {
                warn!(
                    "Body of {} exceeded {} bytes and was truncated",
                    current, self.max_body_bytes
                );
            }

            return Ok(Page {
                url: current,
                requested_url: url.clone(),
                status_code: status.as_u16(),
                headers,
                body,
                body_bytes,
                truncated,
                fetched_at: Utc::now(),
                redirect_chain,
                robots_txt: None,
                elapsed: Duration::ZERO,
            });
        }
    }

    /// Reads at most `max_body_bytes`; returns `(body, bytes received, truncated)`
    async fn read_body(
        &self,
        url: &Url,
        mut response: Response,
    ) -> Result<(String, usize, bool), FetchError> {
        let mut buffer: Vec<u8> = Vec::new();
        let mut received = 0usize;
        let mut truncated = false;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?
        {
            received += chunk.len();
            let room = self.max_body_bytes - buffer.len();
            if chunk.len() > room {
                buffer.extend_from_slice(&chunk[..room]);
                truncated = true;
                break;
            }
            buffer.extend_from_slice(&chunk);
        }

        Ok((String::from_utf8_lossy(&buffer).into_owned(), received, truncated))
    }

    /// Returns the robots.txt body for the origin of `url`, if it has one
    ///
    /// Lookups that fail or run past `deadline` are not cached.
    async fn robots_for(&self, url: &Url, deadline: Instant) -> Option<String> {
        let origin = origin_key(url);
        if let Some(cached) = self.robots.get(&origin) {
            return cached.body;
        }

        let location = robots_url(url)?;
        match timeout_at(deadline, self.download_robots(&location)).await {
            Ok(Ok(body)) => {
                self.robots.insert(&origin, CachedRobots::new(body.clone()));
                body
            }
            Ok(Err(e)) => {
                debug!("robots.txt lookup for {} failed: {}", origin, e);
                None
            }
            Err(_) => {
                debug!("robots.txt lookup for {} ran out of time", origin);
                None
            }
        }
    }

    /// `Ok(None)` means the origin answered without a robots.txt
    async fn download_robots(&self, location: &Url) -> Result<Option<String>, reqwest::Error> {
        let response = self.client.get(location.clone()).send().await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        Ok(Some(response.text().await?))
    }
}

fn redirect_target(current: &Url, response: &Response) -> Option<Url> {
    let location = response.headers().get(header::LOCATION)?.to_str().ok()?;
    current.join(location.trim()).ok()
}

fn collect_headers(response: &Response) -> BTreeMap<String, String> {
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in response.headers() {
        let Ok(value) = value.to_str() else {
            continue;
        };
        headers
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    headers
}
