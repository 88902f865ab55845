//! Bounded-concurrency HTTP client with anti-detection policies.
//!
//! One `Fetcher` serves a whole crawl: a semaphore caps in-flight requests,
//! a jittered inter-request delay and a per-host `Retry-After` table keep
//! the crawler polite, a rotating User-Agent pool plus browser-grade
//! headers keep it un-fingerprintable, and every URL (including each
//! redirect hop) passes the SSRF guard before a socket is opened.
//!
//! Redirects are driven manually so rate limiting, bot-challenge
//! detection, and per-hop SSRF validation can each see every response.

pub mod headers;
pub mod types;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dashmap::DashMap;
use futures_util::StreamExt;
use rand::Rng;
use reqwest::cookie::Jar;
use reqwest::header::{CONTENT_TYPE, HeaderMap, LOCATION, RETRY_AFTER};
use tokio::sync::{Notify, Semaphore, watch};
use url::Url;

pub use types::{FetchError, FetchErrorKind, FetchResult};

use crate::config::CrawlConfig;
use crate::ssrf;
use crate::utils::constants::{
    BACKOFF_BASE_MS, BOT_INTERSTITIAL_PHRASES, FETCH_ATTEMPTS, SERVICE_UNAVAILABLE_RETRY_SECS,
    USER_AGENT_POOL,
};

/// Fallback wait for a 429 that carries no Retry-After header, seconds.
const RATE_LIMIT_DEFAULT_RETRY_SECS: u64 = 2;

/// Backoff ceiling for transport retries.
const BACKOFF_CAP_MS: u64 = 30_000;

/// Why a single request attempt did not produce a usable response.
#[derive(Debug)]
enum AttemptError {
    RateLimited { retry_after: Duration },
    Forbidden,
    ServiceUnavailable { retry_after: Duration },
    Transport { message: String, timeout: bool },
    Ssrf(String),
    TooLarge(String),
    RedirectLimit(u32),
    Http(u16),
}

/// Shared HTTP front-end for the crawl engine.
pub struct Fetcher {
    client: reqwest::Client,
    config: Arc<CrawlConfig>,
    semaphore: Arc<Semaphore>,
    /// host -> earliest instant the next request may go out.
    host_retry_after: DashMap<String, Instant>,
    ua_index: AtomicUsize,
    aborted: AtomicBool,
    abort_notify: Notify,
    pause_tx: watch::Sender<bool>,
    pause_rx: watch::Receiver<bool>,
}

impl Fetcher {
    /// Build the client and seed the cookie jar from the config.
    ///
    /// # Errors
    ///
    /// Returns an error when the TLS/client stack fails to initialise.
    pub fn new(config: Arc<CrawlConfig>) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        if let Some(cookies) = config.cookies() {
            let seed = config.seed();
            for cookie in cookies.split(';').map(str::trim).filter(|c| !c.is_empty()) {
                jar.add_cookie_str(cookie, &seed);
            }
        }

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .cookie_provider(Arc::clone(&jar))
            .timeout(Duration::from_millis(config.timeout_ms()))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;

        let (pause_tx, pause_rx) = watch::channel(false);
        let concurrency = config.concurrency();
        let ua_start = rand::rng().random_range(0..USER_AGENT_POOL.len());

        Ok(Self {
            client,
            config,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            host_retry_after: DashMap::new(),
            ua_index: AtomicUsize::new(ua_start),
            aborted: AtomicBool::new(false),
            abort_notify: Notify::new(),
            pause_tx,
            pause_rx,
        })
    }

    /// The underlying reqwest client, for one-shot side requests
    /// (robots.txt) that share the jar and TLS stack.
    #[must_use]
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// The User-Agent the next request will carry.
    #[must_use]
    pub fn current_user_agent(&self) -> String {
        match self.config.user_agent() {
            Some(ua) => ua.to_string(),
            None => {
                let idx = self.ua_index.load(Ordering::Relaxed) % USER_AGENT_POOL.len();
                USER_AGENT_POOL[idx].to_string()
            }
        }
    }

    fn rotate_user_agent(&self) {
        // A configured UA is pinned; rotation only applies to the pool.
        if self.config.user_agent().is_none() {
            self.ua_index.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Stop admitting new work; in-flight requests continue.
    pub fn pause(&self) {
        let _ = self.pause_tx.send(true);
    }

    /// Resume admitting work.
    pub fn resume(&self) {
        let _ = self.pause_tx.send(false);
    }

    /// Abort: pending sleeps wake and fail, pool waiters are released,
    /// and new fetches refuse to start.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        self.semaphore.close();
        self.abort_notify.notify_waiters();
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Resolve once no request holds a pool slot.
    pub async fn drain(&self) {
        let permits = u32::try_from(self.config.concurrency()).unwrap_or(u32::MAX);
        if let Ok(all) = self.semaphore.acquire_many(permits).await {
            drop(all);
        }
    }

    /// Fetch one URL with the full policy stack.
    ///
    /// # Errors
    ///
    /// A [`FetchError`] carrying the terminal error code once every
    /// applicable retry budget is exhausted.
    pub async fn fetch(&self, url: &Url, referer: Option<&str>) -> Result<FetchResult, FetchError> {
        if self.is_aborted() {
            return Err(FetchError::aborted());
        }
        self.wait_while_paused().await?;

        // Respect an active Retry-After window for this host before even
        // taking a pool slot, so other hosts are not blocked behind it.
        if let Some(host) = url.host_str() {
            let wait = self
                .host_retry_after
                .get(host)
                .and_then(|until| until.checked_duration_since(Instant::now()));
            if let Some(wait) = wait {
                log::debug!("host {host} is rate-limited, sleeping {wait:?}");
                self.sleep_abortable(wait).await?;
            }
        }

        if self.config.delay_ms() > 0 {
            self.sleep_abortable(jittered(self.config.delay_ms())).await?;
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| FetchError::aborted())?;

        ssrf::validate(
            url,
            self.config.allowed_protocols(),
            self.config.allow_private_networks(),
        )
        .await
        .map_err(|e| FetchError::new(FetchErrorKind::Ssrf, e.to_string(), false))?;

        let mut attempt: u32 = 1;
        loop {
            if self.is_aborted() {
                return Err(FetchError::aborted());
            }

            let outcome = self.attempt(url, referer).await;
            match outcome {
                Ok(result) => {
                    if is_bot_interstitial(&result) {
                        if attempt >= FETCH_ATTEMPTS {
                            return Err(FetchError::new(
                                FetchErrorKind::Unknown,
                                format!("bot interstitial persisted after {attempt} attempts"),
                                false,
                            ));
                        }
                        log::warn!("bot interstitial detected at {url}, rotating user agent");
                        self.rotate_user_agent();
                        self.sleep_abortable(jittered(1000)).await?;
                    } else {
                        return Ok(result);
                    }
                }
                Err(AttemptError::RateLimited { retry_after }) => {
                    self.throttle_host(url, retry_after);
                    if attempt >= FETCH_ATTEMPTS {
                        return Err(FetchError::new(
                            FetchErrorKind::RateLimited,
                            format!("still rate-limited after {attempt} attempts"),
                            false,
                        ));
                    }
                    log::debug!("429 from {url}, waiting {retry_after:?}");
                    self.sleep_abortable(retry_after).await?;
                    self.rotate_user_agent();
                }
                Err(AttemptError::Forbidden) => {
                    if attempt >= FETCH_ATTEMPTS {
                        return Err(FetchError::new(
                            FetchErrorKind::Unknown,
                            format!("403 forbidden after {attempt} attempts"),
                            false,
                        ));
                    }
                    self.rotate_user_agent();
                    self.sleep_abortable(jittered(1000)).await?;
                }
                Err(AttemptError::ServiceUnavailable { retry_after }) => {
                    if attempt >= FETCH_ATTEMPTS {
                        return Err(FetchError::new(
                            FetchErrorKind::Unknown,
                            format!("503 service unavailable after {attempt} attempts"),
                            false,
                        ));
                    }
                    self.sleep_abortable(retry_after).await?;
                }
                Err(AttemptError::Transport { message, timeout }) => {
                    if attempt >= FETCH_ATTEMPTS {
                        let kind = if timeout {
                            FetchErrorKind::Timeout
                        } else {
                            FetchErrorKind::Network
                        };
                        return Err(FetchError::new(kind, message, false));
                    }
                    log::debug!("transport error on {url} (attempt {attempt}): {message}");
                    if attempt >= 2 {
                        self.rotate_user_agent();
                    }
                    self.sleep_abortable(backoff_delay(attempt)).await?;
                }
                Err(AttemptError::Ssrf(message)) => {
                    return Err(FetchError::new(FetchErrorKind::Ssrf, message, false));
                }
                Err(AttemptError::TooLarge(message)) => {
                    return Err(FetchError::new(FetchErrorKind::TooLarge, message, false));
                }
                Err(AttemptError::RedirectLimit(limit)) => {
                    return Err(FetchError::new(
                        FetchErrorKind::Unknown,
                        format!("redirect chain exceeded {limit} hops"),
                        false,
                    ));
                }
                Err(AttemptError::Http(status)) => {
                    return Err(FetchError::new(
                        FetchErrorKind::Unknown,
                        format!("HTTP {status}"),
                        false,
                    ));
                }
            }
            attempt += 1;
        }
    }

    /// One request, following redirects manually until a final response.
    async fn attempt(&self, url: &Url, referer: Option<&str>) -> Result<FetchResult, AttemptError> {
        let mut current = url.clone();
        let mut referer_value = referer
            .map(str::to_string)
            .unwrap_or_else(|| self.config.seed_url().to_string());
        let mut chain: Vec<String> = Vec::new();
        let user_agent = self.current_user_agent();

        loop {
            let request_headers = headers::build_headers(&current, &referer_value, &user_agent);
            let response = self
                .client
                .get(current.as_str())
                .headers(request_headers)
                .send()
                .await
                .map_err(classify_transport)?;

            // Inbound cookies are merged into the jar by the cookie
            // provider, scoped to the response URL per their own
            // Domain/Path attributes.

            let status = response.status().as_u16();
            match status {
                429 => {
                    return Err(AttemptError::RateLimited {
                        retry_after: parse_retry_after(response.headers())
                            .unwrap_or(Duration::from_secs(RATE_LIMIT_DEFAULT_RETRY_SECS)),
                    });
                }
                403 => return Err(AttemptError::Forbidden),
                503 => {
                    return Err(AttemptError::ServiceUnavailable {
                        retry_after: parse_retry_after(response.headers())
                            .unwrap_or(Duration::from_secs(SERVICE_UNAVAILABLE_RETRY_SECS)),
                    });
                }
                301 | 302 | 303 | 307 | 308 if self.config.follow_redirects() => {
                    let location = response
                        .headers()
                        .get(LOCATION)
                        .and_then(|v| v.to_str().ok())
                        .ok_or(AttemptError::Http(status))?;
                    let next = current.join(location).map_err(|e| AttemptError::Transport {
                        message: format!("unparseable redirect location '{location}': {e}"),
                        timeout: false,
                    })?;

                    ssrf::validate(
                        &next,
                        self.config.allowed_protocols(),
                        self.config.allow_private_networks(),
                    )
                    .await
                    .map_err(|e| AttemptError::Ssrf(e.to_string()))?;

                    if chain.len() as u32 + 1 > self.config.max_redirects() {
                        return Err(AttemptError::RedirectLimit(self.config.max_redirects()));
                    }

                    log::debug!("{current} redirected ({status}) to {next}");
                    chain.push(current.to_string());
                    referer_value = next.to_string();
                    current = next;
                }
                _ => {
                    if !response.status().is_success() {
                        return Err(AttemptError::Http(status));
                    }

                    if let Some(declared) = response.content_length()
                        && declared > self.config.max_file_size()
                    {
                        return Err(AttemptError::TooLarge(format!(
                            "declared Content-Length {declared} exceeds the {} byte ceiling",
                            self.config.max_file_size()
                        )));
                    }

                    let final_url = response.url().clone();
                    let response_headers = response.headers().clone();
                    let content_type = response_headers
                        .get(CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);

                    let mut body: Vec<u8> = Vec::new();
                    let mut stream = response.bytes_stream();
                    while let Some(chunk) = stream.next().await {
                        let chunk = chunk.map_err(classify_transport)?;
                        if (body.len() + chunk.len()) as u64 > self.config.max_file_size() {
                            return Err(AttemptError::TooLarge(format!(
                                "body exceeded the {} byte ceiling mid-stream",
                                self.config.max_file_size()
                            )));
                        }
                        body.extend_from_slice(&chunk);
                    }

                    return Ok(FetchResult {
                        url: url.clone(),
                        final_url,
                        status,
                        headers: response_headers,
                        content_type,
                        body,
                        redirect_chain: chain,
                    });
                }
            }
        }
    }

    fn throttle_host(&self, url: &Url, wait: Duration) {
        if let Some(host) = url.host_str() {
            let until = Instant::now() + wait;
            let mut entry = self
                .host_retry_after
                .entry(host.to_string())
                .or_insert(until);
            if *entry < until {
                *entry = until;
            }
        }
    }

    async fn wait_while_paused(&self) -> Result<(), FetchError> {
        let mut rx = self.pause_rx.clone();
        while *rx.borrow() {
            if self.is_aborted() {
                return Err(FetchError::aborted());
            }
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
                () = self.abort_notify.notified() => return Err(FetchError::aborted()),
            }
        }
        Ok(())
    }

    async fn sleep_abortable(&self, duration: Duration) -> Result<(), FetchError> {
        if self.is_aborted() {
            return Err(FetchError::aborted());
        }
        tokio::select! {
            () = tokio::time::sleep(duration) => Ok(()),
            () = self.abort_notify.notified() => Err(FetchError::aborted()),
        }
    }
}

/// Exponential transport backoff: 2^attempt seconds, jittered x0.5-1.5,
/// capped at 30 s.
#[must_use]
pub fn backoff_delay(attempt: u32) -> Duration {
    let base = BACKOFF_BASE_MS.saturating_mul(1 << attempt.min(5));
    jittered(base.min(BACKOFF_CAP_MS))
}

/// Uniform jitter on [0.5, 1.5) x base.
fn jittered(base_ms: u64) -> Duration {
    let factor: f64 = rand::rng().random_range(0.5..1.5);
    Duration::from_millis((base_ms as f64 * factor) as u64)
}

/// Parse Retry-After as delta-seconds or an HTTP-date.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let when = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = when.signed_duration_since(chrono::Utc::now());
    delta.to_std().ok()
}

fn classify_transport(error: reqwest::Error) -> AttemptError {
    AttemptError::Transport {
        message: error.to_string(),
        timeout: error.is_timeout(),
    }
}

/// Heuristic bot-challenge detector, deliberately narrow: only HTTP-200
/// HTML bodies are probed, and the caller caps the retry budget.
fn is_bot_interstitial(result: &FetchResult) -> bool {
    if result.status != 200 {
        return false;
    }
    if result.content_type_token().as_deref() != Some("text/html") {
        return false;
    }
    let body = String::from_utf8_lossy(&result.body).to_lowercase();
    BOT_INTERSTITIAL_PHRASES.iter().any(|phrase| body.contains(phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(status: u16, content_type: &str, body: &str) -> FetchResult {
        FetchResult {
            url: Url::parse("https://a.test/").unwrap(),
            final_url: Url::parse("https://a.test/").unwrap(),
            status,
            headers: HeaderMap::new(),
            content_type: Some(content_type.to_string()),
            body: body.as_bytes().to_vec(),
            redirect_chain: Vec::new(),
        }
    }

    #[test]
    fn interstitial_detection_is_scoped() {
        assert!(is_bot_interstitial(&result_with(
            200,
            "text/html",
            "<html>Just a moment...</html>"
        )));
        // Non-200 and non-HTML responses are never probed.
        assert!(!is_bot_interstitial(&result_with(
            403,
            "text/html",
            "just a moment"
        )));
        assert!(!is_bot_interstitial(&result_with(
            200,
            "application/json",
            "\"checking your browser\""
        )));
        assert!(!is_bot_interstitial(&result_with(
            200,
            "text/html",
            "<html>regular page</html>"
        )));
    }

    #[test]
    fn retry_after_seconds_and_http_date() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));

        let future = chrono::Utc::now() + chrono::Duration::seconds(30);
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, future.to_rfc2822().parse().unwrap());
        let parsed = parse_retry_after(&headers).unwrap();
        assert!(parsed <= Duration::from_secs(31), "{parsed:?}");
        assert!(parsed >= Duration::from_secs(25), "{parsed:?}");

        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "garbage".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn backoff_grows_exponentially_within_jitter_bounds() {
        for attempt in 1..=4u32 {
            let expected = BACKOFF_BASE_MS * (1 << attempt);
            let delay = backoff_delay(attempt).as_millis() as u64;
            assert!(delay >= expected / 2, "attempt {attempt}: {delay}ms");
            assert!(delay < expected * 3 / 2, "attempt {attempt}: {delay}ms");
        }
        // Capped.
        assert!(backoff_delay(30) <= Duration::from_millis(BACKOFF_CAP_MS * 3 / 2));
    }

    #[tokio::test]
    async fn aborted_fetcher_refuses_work() {
        let config = Arc::new(
            CrawlConfig::builder()
                .seed_url("https://a.test/")
                .build()
                .unwrap(),
        );
        let fetcher = Fetcher::new(config).unwrap();
        fetcher.abort();
        let err = fetcher
            .fetch(&Url::parse("https://a.test/").unwrap(), None)
            .await
            .unwrap_err();
        assert!(!err.retryable);
    }

    #[tokio::test]
    async fn drain_resolves_when_idle_and_after_abort() {
        let config = Arc::new(
            CrawlConfig::builder()
                .seed_url("https://a.test/")
                .build()
                .unwrap(),
        );
        let fetcher = Fetcher::new(Arc::clone(&config)).unwrap();
        // No work in flight: drain returns immediately.
        fetcher.drain().await;

        // After abort the pool is closed; drain must still not hang.
        fetcher.abort();
        fetcher.drain().await;
    }

    #[tokio::test]
    async fn user_agent_rotation_walks_the_pool() {
        let config = Arc::new(
            CrawlConfig::builder()
                .seed_url("https://a.test/")
                .build()
                .unwrap(),
        );
        let fetcher = Fetcher::new(config).unwrap();
        let first = fetcher.current_user_agent();
        fetcher.rotate_user_agent();
        assert_ne!(fetcher.current_user_agent(), first);

        // A pinned UA never rotates.
        let pinned = Arc::new(
            CrawlConfig::builder()
                .seed_url("https://a.test/")
                .user_agent("Pinned/1.0")
                .build()
                .unwrap(),
        );
        let fetcher = Fetcher::new(pinned).unwrap();
        fetcher.rotate_user_agent();
        assert_eq!(fetcher.current_user_agent(), "Pinned/1.0");
    }
}
