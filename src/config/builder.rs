//! Type-safe builder for `CrawlConfig` using the typestate pattern
//!
//! This module provides a fluent builder interface with compile-time
//! enforcement that the seed URL is set before a `CrawlConfig` can be built.

use std::marker::PhantomData;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use url::Url;

use super::types::{CrawlConfig, FileTypePolicy};
use crate::utils::url_utils::{CrawlScope, glob_to_regex};

// Type states for the builder
pub struct WithSeedUrl;

pub struct CrawlConfigBuilder<State = ()> {
    config: CrawlConfig,
    _phantom: PhantomData<State>,
}

impl Default for CrawlConfigBuilder<()> {
    fn default() -> Self {
        Self {
            config: CrawlConfig::default(),
            _phantom: PhantomData,
        }
    }
}

impl CrawlConfigBuilder<()> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the seed URL (required).
    #[must_use]
    pub fn seed_url(self, url: impl Into<String>) -> CrawlConfigBuilder<WithSeedUrl> {
        let mut config = self.config;
        config.seed_url = url.into();
        CrawlConfigBuilder {
            config,
            _phantom: PhantomData,
        }
    }
}

impl<State> CrawlConfigBuilder<State> {
    #[must_use]
    pub fn output_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_root = dir.into();
        self
    }

    #[must_use]
    pub fn scope(mut self, scope: CrawlScope) -> Self {
        self.config.scope = scope;
        self
    }

    #[must_use]
    pub fn custom_domains(mut self, domains: Vec<String>) -> Self {
        self.config.custom_domains = domains;
        self
    }

    #[must_use]
    pub fn include_paths(mut self, globs: Vec<String>) -> Self {
        self.config.include_paths = globs;
        self
    }

    #[must_use]
    pub fn exclude_paths(mut self, globs: Vec<String>) -> Self {
        self.config.exclude_paths = globs;
        self
    }

    #[must_use]
    pub fn unlimited_mode(mut self, unlimited: bool) -> Self {
        self.config.unlimited_mode = unlimited;
        self
    }

    #[must_use]
    pub fn max_depth(mut self, depth: u32) -> Self {
        self.config.max_depth = depth;
        self
    }

    #[must_use]
    pub fn max_pages(mut self, pages: usize) -> Self {
        self.config.max_pages = pages;
        self
    }

    #[must_use]
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    #[must_use]
    pub fn max_total_size(mut self, bytes: u64) -> Self {
        self.config.max_total_size = bytes;
        self
    }

    #[must_use]
    pub fn file_types(mut self, policy: FileTypePolicy) -> Self {
        self.config.file_types = policy;
        self
    }

    #[must_use]
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    #[must_use]
    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.config.delay_ms = ms;
        self
    }

    #[must_use]
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeout_ms = ms;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = Some(ua.into());
        self
    }

    #[must_use]
    pub fn cookies(mut self, cookies: impl Into<String>) -> Self {
        self.config.cookies = Some(cookies.into());
        self
    }

    #[must_use]
    pub fn respect_robots_txt(mut self, respect: bool) -> Self {
        self.config.respect_robots_txt = respect;
        self
    }

    #[must_use]
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    #[must_use]
    pub fn max_redirects(mut self, n: u32) -> Self {
        self.config.max_redirects = n;
        self
    }

    #[must_use]
    pub fn allowed_protocols(mut self, protocols: Vec<String>) -> Self {
        self.config.allowed_protocols = protocols;
        self
    }

    #[must_use]
    pub fn allow_private_networks(mut self, allow: bool) -> Self {
        self.config.allow_private_networks = allow;
        self
    }
}

impl CrawlConfigBuilder<WithSeedUrl> {
    /// Validate and freeze the configuration.
    ///
    /// Checks the seed URL parses with an allowed protocol and a host,
    /// normalizes `output_root` to an absolute path, enforces sane numeric
    /// bounds, and compiles the include/exclude globs.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid option.
    pub fn build(mut self) -> Result<CrawlConfig> {
        let seed = Url::parse(&self.config.seed_url)
            .with_context(|| format!("invalid seed URL '{}'", self.config.seed_url))?;
        if seed.host_str().is_none() {
            return Err(anyhow!("seed URL '{}' has no host", self.config.seed_url));
        }
        let scheme = seed.scheme().to_ascii_lowercase();
        if !self
            .config
            .allowed_protocols
            .iter()
            .any(|p| p.eq_ignore_ascii_case(&scheme))
        {
            return Err(anyhow!(
                "seed URL protocol '{scheme}' is not in the allowed set {:?}",
                self.config.allowed_protocols
            ));
        }

        if self.config.scope == CrawlScope::Custom && self.config.custom_domains.is_empty() {
            return Err(anyhow!("custom scope requires at least one custom domain"));
        }
        if self.config.concurrency == 0 {
            return Err(anyhow!("concurrency must be at least 1"));
        }
        if self.config.timeout_ms == 0 {
            return Err(anyhow!("timeout_ms must be positive"));
        }

        if !self.config.output_root.is_absolute() {
            let cwd = std::env::current_dir().context("cannot resolve current directory")?;
            self.config.output_root = cwd.join(&self.config.output_root);
        }

        self.config.include_paths_compiled = self
            .config
            .include_paths
            .iter()
            .map(|g| glob_to_regex(g))
            .collect::<Result<Vec<_>>>()?;
        self.config.exclude_paths_compiled = self
            .config
            .exclude_paths
            .iter()
            .map(|g| glob_to_regex(g))
            .collect::<Result<Vec<_>>>()?;

        self.config
            .custom_domains
            .iter_mut()
            .for_each(|d| *d = d.to_ascii_lowercase());

        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_defaults() {
        let config = CrawlConfigBuilder::new()
            .seed_url("https://example.test/docs")
            .build()
            .unwrap();
        assert_eq!(config.seed_url(), "https://example.test/docs");
        assert!(config.output_root().is_absolute());
        assert!(config.respect_robots_txt());
    }

    #[test]
    fn rejects_bad_seed() {
        assert!(CrawlConfigBuilder::new().seed_url("not a url").build().is_err());
        assert!(CrawlConfigBuilder::new().seed_url("ftp://x.test/").build().is_err());
    }

    #[test]
    fn rejects_empty_custom_scope() {
        let result = CrawlConfigBuilder::new()
            .seed_url("https://a.test/")
            .scope(CrawlScope::Custom)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn compiles_globs_up_front() {
        let config = CrawlConfigBuilder::new()
            .seed_url("https://a.test/")
            .include_paths(vec!["*/docs/*".to_string()])
            .exclude_paths(vec!["*.pdf".to_string()])
            .build()
            .unwrap();
        assert_eq!(config.include_paths_compiled().len(), 1);
        assert!(config.include_paths_compiled()[0].is_match("https://a.test/docs/x"));
        assert!(config.exclude_paths_compiled()[0].is_match("https://a.test/file.PDF"));
    }

    #[test]
    fn rejects_invalid_glob() {
        // Globs themselves cannot produce invalid regexes (metacharacters are
        // escaped), so zero-concurrency is the canonical invalid input here.
        let result = CrawlConfigBuilder::new()
            .seed_url("https://a.test/")
            .concurrency(0)
            .build();
        assert!(result.is_err());
    }
}
