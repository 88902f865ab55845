//! sitevault: breadth-first website archiver.
//!
//! Given a seed URL and a [`CrawlConfig`], the engine crawls every
//! reachable page in scope, downloads the assets each page needs to render
//! offline, rewrites cross-references to relative local paths, and leaves
//! a browsable per-host directory tree that [`archive::pack_to_file`] can
//! fold into a single ZIP.

pub mod archive;
pub mod config;
pub mod engine;
pub mod events;
pub mod extract;
pub mod fetcher;
pub mod frontier;
pub mod registry;
pub mod robots;
pub mod ssrf;
pub mod storage;
pub mod utils;

pub use config::{CrawlConfig, CrawlConfigBuilder, FileTypePolicy};
pub use engine::{CrawlEngine, CrawlError, CrawlOutcome, EngineState, ProgressSnapshot, UrlError};
pub use events::{CrawlEvent, EventBus, LogContext, LogLevel};
pub use fetcher::{FetchError, FetchErrorKind, FetchResult, Fetcher};
pub use frontier::{EntryKind, EntryStatus, Frontier, FrontierEntry, QueueStats};
pub use registry::PathRegistry;
pub use robots::RobotsGuard;
pub use storage::{Storage, StorageError, StorageStats};
pub use utils::url_utils::{CrawlScope, FileCategory};

/// Run a one-shot crawl under a fresh job id.
///
/// # Errors
///
/// Configuration and engine-fatal errors; per-URL failures are reported
/// inside the returned [`CrawlOutcome`].
pub async fn crawl(seed_url: &str, config: CrawlConfig) -> Result<CrawlOutcome, CrawlError> {
    let job_id = uuid::Uuid::new_v4().to_string();
    let engine = CrawlEngine::new(job_id, seed_url, config)?;
    engine.start().await
}
