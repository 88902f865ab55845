//! Crawl orchestration: the façade the job layer drives.
//!
//! One engine owns one job: it seeds the frontier, keeps up to
//! `concurrency` fetches in flight, and serialises registration, storage
//! writes, extraction, and enqueueing on its own loop, so the frontier and
//! registry never see concurrent mutation. When the
//! frontier drains, a rewrite pass walks every stored HTML and CSS file
//! and substitutes registered URLs with relative local paths.
//!
//! Control surface: `start()` blocks until terminal; `pause()`/`resume()`
//! gate pool admission without dropping in-flight requests; `cancel()`
//! aborts at the next I/O boundary and skips the rewrite pass.

pub mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

pub use types::{CrawlError, CrawlOutcome, EngineState, ProgressSnapshot, UrlError};

use crate::config::CrawlConfig;
use crate::events::{CrawlEvent, EventBus, LogContext, LogLevel};
use crate::extract::{LinkKind, extract_css_links, extract_links, rewrite_css, rewrite_html};
use crate::fetcher::{FetchError, FetchErrorKind, FetchResult, Fetcher};
use crate::frontier::{EntryKind, Frontier, FrontierEntry};
use crate::registry::PathRegistry;
use crate::robots::RobotsGuard;
use crate::storage::Storage;
use crate::utils::constants::ENTRY_RETRY_CEILING;

/// What a stored file contains, recorded at write time from the response
/// Content-Type so the rewrite pass never guesses from extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocKind {
    Html,
    Css,
}

type FetchTask = JoinHandle<(FrontierEntry, Result<FetchResult, FetchError>)>;

/// A single crawl job, constructed with `(job_id, seed_url, config)`.
pub struct CrawlEngine {
    job_id: String,
    config: Arc<CrawlConfig>,
    seed: Url,
    fetcher: Arc<Fetcher>,
    frontier: Arc<Mutex<Frontier>>,
    registry: Arc<Mutex<PathRegistry>>,
    storage: RwLock<Option<Arc<Storage>>>,
    doc_kinds: Mutex<HashMap<String, DocKind>>,
    events: EventBus,
    state_tx: watch::Sender<EngineState>,
    errors: Mutex<Vec<UrlError>>,
    current_url: Mutex<Option<String>>,
    pages_processed: AtomicUsize,
    assets_processed: AtomicUsize,
    bytes_downloaded: AtomicU64,
    started_at: Mutex<Option<DateTime<Utc>>>,
    started_instant: Mutex<Option<Instant>>,
}

impl CrawlEngine {
    /// Validate the seed and freeze the configuration.
    ///
    /// # Errors
    ///
    /// [`CrawlError::InvalidConfig`] when the seed URL does not parse, has
    /// no host, or uses a protocol outside the allow-list.
    pub fn new(
        job_id: impl Into<String>,
        seed_url: &str,
        mut config: CrawlConfig,
    ) -> Result<Self, CrawlError> {
        let seed = Url::parse(seed_url)
            .map_err(|e| CrawlError::InvalidConfig(format!("invalid seed URL '{seed_url}': {e}")))?;
        if seed.host_str().is_none() {
            return Err(CrawlError::InvalidConfig(format!(
                "seed URL '{seed_url}' has no host"
            )));
        }
        let scheme = seed.scheme().to_ascii_lowercase();
        if !config
            .allowed_protocols()
            .iter()
            .any(|p| p.eq_ignore_ascii_case(&scheme))
        {
            return Err(CrawlError::InvalidConfig(format!(
                "seed protocol '{scheme}' is not allowed"
            )));
        }
        config.seed_url = seed_url.to_string();
        let config = Arc::new(config);

        let fetcher = Fetcher::new(Arc::clone(&config))
            .map_err(|e| CrawlError::InvalidConfig(e.to_string()))?;
        let frontier = Frontier::new(Arc::clone(&config));
        let (state_tx, _) = watch::channel(EngineState::Pending);

        Ok(Self {
            job_id: job_id.into(),
            seed,
            fetcher: Arc::new(fetcher),
            frontier: Arc::new(Mutex::new(frontier)),
            registry: Arc::new(Mutex::new(PathRegistry::new())),
            storage: RwLock::new(None),
            doc_kinds: Mutex::new(HashMap::new()),
            events: EventBus::default(),
            state_tx,
            errors: Mutex::new(Vec::new()),
            current_url: Mutex::new(None),
            pages_processed: AtomicUsize::new(0),
            assets_processed: AtomicUsize::new(0),
            bytes_downloaded: AtomicU64::new(0),
            started_at: Mutex::new(None),
            started_instant: Mutex::new(None),
            config,
        })
    }

    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state_tx.borrow()
    }

    /// Subscribe to the progress/log/completion event stream.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<CrawlEvent> {
        self.events.subscribe()
    }

    /// Storage handle for post-run reads (archive packaging). `None` until
    /// `start()` has initialised the sandbox.
    #[must_use]
    pub fn storage(&self) -> Option<Arc<Storage>> {
        self.storage.read().clone()
    }

    /// Per-URL error history, oldest first.
    #[must_use]
    pub fn errors(&self) -> Vec<UrlError> {
        self.errors.lock().clone()
    }

    /// Run the crawl to a terminal state.
    ///
    /// # Errors
    ///
    /// Engine-fatal conditions only: invalid start state or a storage
    /// failure (size ceiling, traversal, I/O). Per-URL failures land in
    /// [`Self::errors`] and the run continues.
    pub async fn start(&self) -> Result<CrawlOutcome, CrawlError> {
        let current = self.state();
        if current != EngineState::Pending {
            return Err(CrawlError::InvalidTransition {
                action: "start",
                state: current,
            });
        }
        self.state_tx.send_replace(EngineState::Running);
        *self.started_at.lock() = Some(Utc::now());
        *self.started_instant.lock() = Some(Instant::now());
        self.events.publish(CrawlEvent::started(
            self.job_id.clone(),
            self.config.seed_url().to_string(),
        ));
        log::info!("[{}] crawl started at {}", self.job_id, self.config.seed_url());

        match self.run().await {
            Ok(()) => {
                if self.state() != EngineState::Cancelled {
                    self.state_tx.send_replace(EngineState::Complete);
                }
                let outcome = self.outcome();
                log::info!(
                    "[{}] crawl finished: {} pages, {} assets, {} bytes, {} errors",
                    self.job_id,
                    outcome.pages,
                    outcome.assets,
                    outcome.bytes,
                    outcome.errors.len()
                );
                self.events.publish(CrawlEvent::completed(outcome.clone()));
                Ok(outcome)
            }
            Err(e) => {
                self.state_tx.send_replace(EngineState::Failed);
                log::error!("[{}] crawl failed: {e}", self.job_id);
                self.events.publish(CrawlEvent::error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Stop admitting new fetches; in-flight requests finish normally.
    ///
    /// # Errors
    ///
    /// [`CrawlError::InvalidTransition`] unless the engine is Running.
    pub fn pause(&self) -> Result<(), CrawlError> {
        let state = self.state();
        if state != EngineState::Running {
            return Err(CrawlError::InvalidTransition {
                action: "pause",
                state,
            });
        }
        self.state_tx.send_replace(EngineState::Paused);
        self.fetcher.pause();
        log::info!("[{}] paused", self.job_id);
        Ok(())
    }

    /// Resume a paused crawl.
    ///
    /// # Errors
    ///
    /// [`CrawlError::InvalidTransition`] unless the engine is Paused.
    pub fn resume(&self) -> Result<(), CrawlError> {
        let state = self.state();
        if state != EngineState::Paused {
            return Err(CrawlError::InvalidTransition {
                action: "resume",
                state,
            });
        }
        self.state_tx.send_replace(EngineState::Running);
        self.fetcher.resume();
        log::info!("[{}] resumed", self.job_id);
        Ok(())
    }

    /// Cancel the crawl: the abort flag interrupts in-flight requests at
    /// their next I/O boundary and the rewrite pass is skipped.
    pub fn cancel(&self) {
        let state = self.state();
        if state.is_terminal() {
            return;
        }
        self.state_tx.send_replace(EngineState::Cancelled);
        self.fetcher.abort();
        log::info!("[{}] cancelled", self.job_id);
    }

    /// On-demand progress snapshot.
    #[must_use]
    pub fn progress(&self) -> ProgressSnapshot {
        let queue_stats = self.frontier.lock().stats();
        let storage_stats = self
            .storage
            .read()
            .as_ref()
            .map(|s| s.stats())
            .unwrap_or_default();
        let elapsed_ms = (*self.started_instant.lock())
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);

        ProgressSnapshot {
            status: self.state(),
            pages_processed: self.pages_processed.load(Ordering::Relaxed),
            total_pages: queue_stats.pages,
            assets_processed: self.assets_processed.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            current_url: self.current_url.lock().clone(),
            errors: self.errors.lock().len(),
            started_at: *self.started_at.lock(),
            elapsed_ms,
            queue_stats,
            storage_stats,
        }
    }

    async fn run(&self) -> Result<(), CrawlError> {
        let storage = Arc::new(
            Storage::init(
                self.config.output_root().join(&self.job_id),
                self.config.max_total_size(),
            )
            .await?,
        );
        *self.storage.write() = Some(Arc::clone(&storage));

        // The robots probe uses the bare client, so it gets its own guard
        // check; an unsafe seed will fail in the fetch loop with a proper
        // per-URL SSRF error instead of leaking a raw connection here.
        let seed_is_safe = crate::ssrf::validate(
            &self.seed,
            self.config.allowed_protocols(),
            self.config.allow_private_networks(),
        )
        .await
        .is_ok();

        let robots = if self.config.respect_robots_txt() && seed_is_safe {
            Some(
                RobotsGuard::fetch(
                    self.fetcher.client(),
                    &self.seed,
                    &self.fetcher.current_user_agent(),
                )
                .await,
            )
        } else {
            None
        };

        if !self.frontier.lock().add_page(&self.seed, None, 0) {
            return Err(CrawlError::InvalidConfig(format!(
                "seed URL {} is rejected by the configured scope or filters",
                self.seed
            )));
        }

        self.crawl_loop(&storage, robots.as_ref()).await?;

        if self.state() != EngineState::Cancelled {
            self.rewrite_pass(&storage).await?;
        }

        Ok(())
    }

    async fn crawl_loop(
        &self,
        storage: &Arc<Storage>,
        robots: Option<&RobotsGuard>,
    ) -> Result<(), CrawlError> {
        let mut in_flight: FuturesUnordered<FetchTask> = FuturesUnordered::new();
        let mut state_rx = self.state_tx.subscribe();

        loop {
            let current_state = *state_rx.borrow_and_update();
            match current_state {
                EngineState::Cancelled => break,
                EngineState::Paused => {
                    // Keep consuming completions while paused; admit
                    // nothing new.
                    tokio::select! {
                        changed = state_rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                        Some(done) = in_flight.next(), if !in_flight.is_empty() => {
                            self.on_task_done(storage, done).await?;
                        }
                    }
                    continue;
                }
                _ => {}
            }

            while in_flight.len() < self.config.concurrency() {
                let Some(entry) = self.frontier.lock().next() else {
                    break;
                };

                if entry.kind == EntryKind::Page
                    && let Some(robots) = robots
                {
                    let allowed = Url::parse(&entry.url)
                        .map(|u| robots.allows(&u))
                        .unwrap_or(true);
                    if !allowed {
                        self.frontier
                            .lock()
                            .skip(&entry.canonical, "disallowed by robots.txt");
                        self.log(
                            LogLevel::Info,
                            "skipped: disallowed by robots.txt",
                            Some(entry.url.clone()),
                        );
                        continue;
                    }
                }

                let Ok(url) = Url::parse(&entry.url) else {
                    self.frontier.lock().fail(&entry.canonical, "unparseable URL");
                    continue;
                };

                *self.current_url.lock() = Some(entry.url.clone());
                let fetcher = Arc::clone(&self.fetcher);
                let referer = entry.parent.clone();
                in_flight.push(tokio::spawn(async move {
                    let result = fetcher.fetch(&url, referer.as_deref()).await;
                    (entry, result)
                }));
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                Some(done) = in_flight.next() => {
                    self.on_task_done(storage, done).await?;
                    self.events.publish(CrawlEvent::progress(self.progress()));
                }
            }
        }

        Ok(())
    }

    async fn on_task_done(
        &self,
        storage: &Arc<Storage>,
        done: Result<(FrontierEntry, Result<FetchResult, FetchError>), tokio::task::JoinError>,
    ) -> Result<(), CrawlError> {
        match done {
            Err(join_err) => {
                log::error!("[{}] fetch task panicked: {join_err}", self.job_id);
                Ok(())
            }
            Ok((entry, Ok(result))) => self.handle_success(storage, entry, result).await,
            Ok((entry, Err(err))) => {
                self.handle_failure(&entry, &err);
                Ok(())
            }
        }
    }

    async fn handle_success(
        &self,
        storage: &Arc<Storage>,
        entry: FrontierEntry,
        result: FetchResult,
    ) -> Result<(), CrawlError> {
        let local_path = {
            let mut registry = self.registry.lock();
            match registry.register(&result.final_url) {
                Ok(path) => {
                    // Pre-redirect links must rewrite to the same file;
                    // intermediate hops intentionally stay unregistered.
                    if result.was_redirected() {
                        registry.alias(&result.url, &path);
                    }
                    path
                }
                Err(e) => {
                    drop(registry);
                    self.record_error(&entry.url, "UNKNOWN", &e.to_string());
                    self.frontier.lock().fail(&entry.canonical, e.to_string());
                    return Ok(());
                }
            }
        };

        // Storage refusals (ceiling, traversal, I/O) are engine-fatal.
        storage.write(&local_path, &result.body).await?;
        self.bytes_downloaded
            .fetch_add(result.body.len() as u64, Ordering::Relaxed);

        match result.content_type_token().as_deref() {
            Some("text/html" | "application/xhtml+xml") => {
                self.doc_kinds.lock().insert(local_path, DocKind::Html);
                let html = String::from_utf8_lossy(&result.body);
                let links = extract_links(&html, &result.final_url);
                let parent = result.final_url.to_string();

                let mut admitted = 0usize;
                {
                    let mut frontier = self.frontier.lock();
                    for link in &links {
                        let ok = match link.kind {
                            LinkKind::Page => {
                                frontier.add_page(&link.url, Some(&parent), entry.depth + 1)
                            }
                            LinkKind::Asset => {
                                frontier.add_asset(&link.url, Some(&parent), entry.depth)
                            }
                        };
                        if ok {
                            admitted += 1;
                        }
                    }
                }
                self.pages_processed.fetch_add(1, Ordering::Relaxed);
                self.log(
                    LogLevel::Debug,
                    format!("page yielded {} links, {admitted} admitted", links.len()),
                    Some(entry.url.clone()),
                );
            }
            Some("text/css") => {
                self.doc_kinds.lock().insert(local_path, DocKind::Css);
                let css = String::from_utf8_lossy(&result.body);
                let links = extract_css_links(&css, &result.final_url);
                let parent = result.final_url.to_string();
                {
                    let mut frontier = self.frontier.lock();
                    // Depth grows along @import chains until the asset
                    // cushion runs out.
                    for link in &links {
                        frontier.add_asset(&link.url, Some(&parent), entry.depth + 1);
                    }
                }
                self.assets_processed.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.assets_processed.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.frontier.lock().complete(&entry.canonical);
        Ok(())
    }

    fn handle_failure(&self, entry: &FrontierEntry, err: &FetchError) {
        self.record_error(&entry.url, code_str(err.kind), &err.message);
        self.log(
            LogLevel::Warn,
            format!("fetch failed: {}", err.message),
            Some(entry.url.clone()),
        );

        let mut frontier = self.frontier.lock();
        if err.retryable {
            let requeued =
                frontier.retry(&entry.canonical, err.message.clone(), ENTRY_RETRY_CEILING);
            if requeued {
                log::debug!("[{}] re-enqueued {}", self.job_id, entry.url);
            }
        } else {
            frontier.fail(&entry.canonical, err.message.clone());
        }
    }

    /// Post-crawl pass: substitute registered URLs in every stored HTML
    /// and CSS file with paths relative to that file.
    async fn rewrite_pass(&self, storage: &Arc<Storage>) -> Result<(), CrawlError> {
        let files = storage.list_files().await?;
        let doc_kinds = self.doc_kinds.lock().clone();
        let mut rewritten_files = 0usize;

        for rel in files {
            let Some(kind) = doc_kinds.get(&rel) else {
                continue;
            };
            let bytes = storage.read(&rel).await?;
            let text = String::from_utf8_lossy(&bytes).into_owned();

            let (rewritten, count) = {
                let registry = self.registry.lock();
                let Some(own_url) = registry
                    .url_for_path(&rel)
                    .and_then(|u| Url::parse(u).ok())
                else {
                    continue;
                };
                match kind {
                    DocKind::Html => match rewrite_html(&text, &own_url, &rel, &registry) {
                        Ok(pair) => pair,
                        Err(e) => {
                            log::warn!("[{}] rewrite failed for {rel}: {e}", self.job_id);
                            continue;
                        }
                    },
                    DocKind::Css => rewrite_css(&text, &own_url, &rel, &registry),
                }
            };

            if count > 0 {
                storage.write(&rel, rewritten.as_bytes()).await?;
                rewritten_files += 1;
                self.log(
                    LogLevel::Debug,
                    format!("rewrote {count} references"),
                    Some(rel.clone()),
                );
            }
        }

        log::info!("[{}] rewrite pass updated {rewritten_files} files", self.job_id);
        Ok(())
    }

    fn outcome(&self) -> CrawlOutcome {
        let errors = self.errors.lock().clone();
        let cancelled = self.state() == EngineState::Cancelled;
        let duration_ms = (*self.started_instant.lock())
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        CrawlOutcome {
            success: !cancelled && errors.is_empty(),
            pages: self.pages_processed.load(Ordering::Relaxed),
            assets: self.assets_processed.load(Ordering::Relaxed),
            bytes: self.bytes_downloaded.load(Ordering::Relaxed),
            errors,
            duration_ms,
        }
    }

    fn record_error(&self, url: &str, code: &str, message: &str) {
        self.errors.lock().push(UrlError {
            url: url.to_string(),
            code: code.to_string(),
            message: message.to_string(),
            at: Utc::now(),
        });
    }

    fn log(&self, level: LogLevel, message: impl Into<String>, url: Option<String>) {
        let message = message.into();
        match level {
            LogLevel::Debug => log::debug!("[{}] {message}", self.job_id),
            LogLevel::Info => log::info!("[{}] {message}", self.job_id),
            LogLevel::Warn => log::warn!("[{}] {message}", self.job_id),
            LogLevel::Error => log::error!("[{}] {message}", self.job_id),
        }
        self.events.publish(CrawlEvent::log(
            level,
            message,
            LogContext {
                job_id: self.job_id.clone(),
                url,
                fields: serde_json::Map::new(),
            },
        ));
    }
}

fn code_str(kind: FetchErrorKind) -> &'static str {
    match kind {
        FetchErrorKind::RateLimited => "RATE_LIMITED",
        FetchErrorKind::Timeout => "TIMEOUT",
        FetchErrorKind::Network => "NETWORK",
        FetchErrorKind::Unknown => "UNKNOWN",
        FetchErrorKind::Ssrf => "SSRF",
        FetchErrorKind::TooLarge => "TOO_LARGE",
    }
}
