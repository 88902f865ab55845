//! Read-only accessors for `CrawlConfig`.

use std::path::Path;

use url::Url;

use super::builder::CrawlConfigBuilder;
use super::types::{CrawlConfig, FileTypePolicy};
use crate::utils::url_utils::CrawlScope;

impl CrawlConfig {
    /// Start building a configuration.
    #[must_use]
    pub fn builder() -> CrawlConfigBuilder<()> {
        CrawlConfigBuilder::new()
    }

    #[must_use]
    pub fn seed_url(&self) -> &str {
        &self.seed_url
    }

    /// Parse the (already validated) seed URL.
    ///
    /// # Panics
    ///
    /// Never panics for configs produced by the builder, which rejects
    /// unparseable seeds.
    #[must_use]
    pub fn seed(&self) -> Url {
        Url::parse(&self.seed_url).expect("builder validated the seed URL")
    }

    #[must_use]
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    #[must_use]
    pub fn scope(&self) -> CrawlScope {
        self.scope
    }

    #[must_use]
    pub fn custom_domains(&self) -> &[String] {
        &self.custom_domains
    }

    #[must_use]
    pub fn include_paths_compiled(&self) -> &[regex::Regex] {
        &self.include_paths_compiled
    }

    #[must_use]
    pub fn exclude_paths_compiled(&self) -> &[regex::Regex] {
        &self.exclude_paths_compiled
    }

    #[must_use]
    pub fn unlimited_mode(&self) -> bool {
        self.unlimited_mode
    }

    #[must_use]
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    #[must_use]
    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    #[must_use]
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    #[must_use]
    pub fn max_total_size(&self) -> u64 {
        self.max_total_size
    }

    #[must_use]
    pub fn file_types(&self) -> &FileTypePolicy {
        &self.file_types
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    #[must_use]
    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    #[must_use]
    pub fn cookies(&self) -> Option<&str> {
        self.cookies.as_deref()
    }

    #[must_use]
    pub fn respect_robots_txt(&self) -> bool {
        self.respect_robots_txt
    }

    #[must_use]
    pub fn follow_redirects(&self) -> bool {
        self.follow_redirects
    }

    #[must_use]
    pub fn max_redirects(&self) -> u32 {
        self.max_redirects
    }

    #[must_use]
    pub fn allowed_protocols(&self) -> &[String] {
        &self.allowed_protocols
    }

    #[must_use]
    pub fn allow_private_networks(&self) -> bool {
        self.allow_private_networks
    }
}
