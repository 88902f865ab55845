//! Core configuration types for crawl jobs
//!
//! This module contains the main `CrawlConfig` struct and its associated
//! types that define the parameters for an archiving run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::utils::constants::{
    DEFAULT_CONCURRENCY, DEFAULT_DELAY_MS, DEFAULT_MAX_DEPTH, DEFAULT_MAX_FILE_SIZE,
    DEFAULT_MAX_PAGES, DEFAULT_MAX_REDIRECTS, DEFAULT_MAX_TOTAL_SIZE, DEFAULT_TIMEOUT_MS,
};
use crate::utils::url_utils::{CrawlScope, FileCategory};

/// Per-category enable/disable switches for downloaded content.
///
/// Every category defaults to enabled; the frontier rejects URLs whose
/// category is explicitly switched off.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FileTypePolicy {
    pub html: bool,
    pub css: bool,
    pub js: bool,
    pub images: bool,
    pub fonts: bool,
    pub media: bool,
    pub documents: bool,
    pub other: bool,
}

impl Default for FileTypePolicy {
    fn default() -> Self {
        Self {
            html: true,
            css: true,
            js: true,
            images: true,
            fonts: true,
            media: true,
            documents: true,
            other: true,
        }
    }
}

impl FileTypePolicy {
    /// Whether the given category is enabled.
    #[must_use]
    pub fn allows(&self, category: FileCategory) -> bool {
        match category {
            FileCategory::Html => self.html,
            FileCategory::Css => self.css,
            FileCategory::Js => self.js,
            FileCategory::Images => self.images,
            FileCategory::Fonts => self.fonts,
            FileCategory::Media => self.media,
            FileCategory::Documents => self.documents,
            FileCategory::Other => self.other,
        }
    }
}

/// Main configuration struct for an archiving run.
///
/// Frozen at engine construction; build instances through
/// [`CrawlConfig::builder`](crate::config::CrawlConfigBuilder) which
/// validates the seed URL and pre-compiles the path glob patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Starting point of the crawl; its host anchors the default scope.
    pub(crate) seed_url: String,

    /// Base directory under which the per-job sandbox is created.
    ///
    /// **INVARIANT:** Always an absolute path (normalized in builder).
    /// This keeps path operations consistent across Storage, the path
    /// registry, and the archive packager.
    pub(crate) output_root: PathBuf,

    pub(crate) scope: CrawlScope,
    /// Host allow-list consulted when `scope` is [`CrawlScope::Custom`].
    pub(crate) custom_domains: Vec<String>,

    /// Glob whitelist over page URLs; empty means "admit everything".
    pub(crate) include_paths: Vec<String>,
    /// Glob blacklist over page URLs, applied after the whitelist.
    pub(crate) exclude_paths: Vec<String>,

    /// Compiled forms of `include_paths` / `exclude_paths`.
    /// Pre-compiled at config creation to avoid hot-path regex compilation.
    #[serde(skip)]
    pub(crate) include_paths_compiled: Vec<regex::Regex>,
    #[serde(skip)]
    pub(crate) exclude_paths_compiled: Vec<regex::Regex>,

    /// Disables the depth and page-count ceilings.
    pub(crate) unlimited_mode: bool,
    pub(crate) max_depth: u32,
    pub(crate) max_pages: usize,

    /// Per-response byte ceiling; larger responses are dropped.
    pub(crate) max_file_size: u64,
    /// Aggregate byte ceiling enforced by storage on every write.
    pub(crate) max_total_size: u64,

    pub(crate) file_types: FileTypePolicy,

    /// Maximum in-flight fetches.
    pub(crate) concurrency: usize,
    /// Baseline inter-request delay, jittered x0.5-1.5 per request.
    pub(crate) delay_ms: u64,
    /// Per-request deadline in milliseconds.
    pub(crate) timeout_ms: u64,

    /// Fixed User-Agent; when absent the fetcher rotates through its pool.
    pub(crate) user_agent: Option<String>,
    /// `name=value; name2=value2` cookies seeded into the jar for the seed
    /// host.
    pub(crate) cookies: Option<String>,

    pub(crate) respect_robots_txt: bool,
    pub(crate) follow_redirects: bool,
    pub(crate) max_redirects: u32,

    /// Protocol allow-list enforced by the SSRF guard.
    pub(crate) allowed_protocols: Vec<String>,

    /// Ops/test escape hatch: keeps protocol and hostname SSRF checks but
    /// turns off the private-address-range rejection. Never enable against
    /// untrusted seed URLs.
    pub(crate) allow_private_networks: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            seed_url: String::new(),
            output_root: PathBuf::from("./archive"),
            scope: CrawlScope::SameHost,
            custom_domains: Vec::new(),
            include_paths: Vec::new(),
            exclude_paths: Vec::new(),
            include_paths_compiled: Vec::new(),
            exclude_paths_compiled: Vec::new(),
            unlimited_mode: false,
            max_depth: DEFAULT_MAX_DEPTH,
            max_pages: DEFAULT_MAX_PAGES,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_total_size: DEFAULT_MAX_TOTAL_SIZE,
            file_types: FileTypePolicy::default(),
            concurrency: DEFAULT_CONCURRENCY,
            delay_ms: DEFAULT_DELAY_MS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            user_agent: None,
            cookies: None,
            respect_robots_txt: true,
            follow_redirects: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            allowed_protocols: vec!["http".to_string(), "https".to_string()],
            allow_private_networks: false,
        }
    }
}
