//! De-duplicated BFS frontier with scope and filter enforcement.
//!
//! Pages and assets share one entry table keyed by canonical URL but pass
//! different admission predicates: pages face scope, glob, and depth rules;
//! assets skip the scope check entirely (a page on `a.test` may depend on
//! `cdn.test`) and get a small depth cushion for `@import` chains.
//!
//! FIFO ordering over enqueue time makes the crawl breadth-first: depth
//! only grows when a page at the previous depth is processed.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::CrawlConfig;
use crate::utils::constants::ASSET_DEPTH_CUSHION;
use crate::utils::url_utils::{canonical_string, extension, in_scope, mime_category};

/// Lifecycle of a frontier entry.
///
/// Transitions: Pending -> InProgress -> {Complete, Failed, Skipped};
/// Failed re-enters Pending only through [`Frontier::retry`] while under
/// the retry ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    Pending,
    InProgress,
    Complete,
    Failed,
    Skipped,
}

/// Navigational role recorded at enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Page,
    Asset,
}

/// One unit of crawl work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierEntry {
    /// URL as discovered, original case and fragment intact for display.
    pub url: String,
    /// Canonical key; unique across the frontier.
    pub canonical: String,
    pub depth: u32,
    pub parent: Option<String>,
    pub kind: EntryKind,
    pub status: EntryStatus,
    pub retry_count: u32,
    pub enqueued_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    /// Terminal error or skip reason.
    pub error: Option<String>,
}

/// Read-only snapshot of frontier composition.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub in_progress: usize,
    pub complete: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pages: usize,
    pub assets: usize,
    pub total: usize,
}

/// The crawl work-queue.
pub struct Frontier {
    config: Arc<CrawlConfig>,
    seed: Url,
    entries: HashMap<String, FrontierEntry>,
    pending: VecDeque<String>,
    in_progress: usize,
}

impl Frontier {
    #[must_use]
    pub fn new(config: Arc<CrawlConfig>) -> Self {
        let seed = config.seed();
        Self {
            config,
            seed,
            entries: HashMap::new(),
            pending: VecDeque::new(),
            in_progress: 0,
        }
    }

    /// Enqueue a page URL. Returns whether it was admitted.
    ///
    /// Admission order: canonicalise, duplicate check, depth/page ceilings
    /// (unless unlimited), scope predicate, include globs (whitelist),
    /// exclude globs (blacklist), file-type filter.
    pub fn add_page(&mut self, url: &Url, parent: Option<&str>, depth: u32) -> bool {
        let Some(canonical) = canonical_string(url) else {
            return false;
        };
        if self.entries.contains_key(&canonical) {
            return false;
        }
        if !self.config.unlimited_mode()
            && (depth > self.config.max_depth() || self.entries.len() >= self.config.max_pages())
        {
            return false;
        }
        if !in_scope(url, &self.seed, self.config.scope(), self.config.custom_domains()) {
            return false;
        }

        let include = self.config.include_paths_compiled();
        if !include.is_empty() && !include.iter().any(|re| re.is_match(&canonical)) {
            return false;
        }
        let exclude = self.config.exclude_paths_compiled();
        if exclude.iter().any(|re| re.is_match(&canonical)) {
            return false;
        }

        if !self.category_allowed(url) {
            return false;
        }

        self.insert(url, canonical, parent, depth, EntryKind::Page);
        true
    }

    /// Enqueue an asset URL. Returns whether it was admitted.
    ///
    /// No scope check: assets are admitted regardless of host so pages
    /// hosted behind CDNs still render offline.
    pub fn add_asset(&mut self, url: &Url, parent: Option<&str>, depth: u32) -> bool {
        let Some(canonical) = canonical_string(url) else {
            return false;
        };
        if self.entries.contains_key(&canonical) {
            return false;
        }
        if !self.config.unlimited_mode()
            && (depth > self.config.max_depth() + ASSET_DEPTH_CUSHION
                || self.entries.len() >= self.config.max_pages())
        {
            return false;
        }
        if !self.category_allowed(url) {
            return false;
        }

        self.insert(url, canonical, parent, depth, EntryKind::Asset);
        true
    }

    /// Pop the oldest Pending entry and mark it InProgress.
    pub fn next(&mut self) -> Option<FrontierEntry> {
        while let Some(canonical) = self.pending.pop_front() {
            if let Some(entry) = self.entries.get_mut(&canonical)
                && entry.status == EntryStatus::Pending
            {
                entry.status = EntryStatus::InProgress;
                self.in_progress += 1;
                return Some(entry.clone());
            }
            // Stale key: entry moved on without passing through next().
        }
        None
    }

    /// Mark an InProgress entry Complete.
    pub fn complete(&mut self, canonical: &str) {
        self.finish(canonical, EntryStatus::Complete, None);
    }

    /// Mark an InProgress entry Failed with a terminal error.
    pub fn fail(&mut self, canonical: &str, reason: impl Into<String>) {
        self.finish(canonical, EntryStatus::Failed, Some(reason.into()));
    }

    /// Mark an InProgress entry Skipped (robots, filters).
    pub fn skip(&mut self, canonical: &str, reason: impl Into<String>) {
        self.finish(canonical, EntryStatus::Skipped, Some(reason.into()));
    }

    /// Re-enqueue a failing entry, or finalise it as Failed once the retry
    /// ceiling is reached. Returns whether it was re-enqueued.
    pub fn retry(&mut self, canonical: &str, reason: impl Into<String>, max_retries: u32) -> bool {
        let reason = reason.into();
        let Some(entry) = self.entries.get_mut(canonical) else {
            return false;
        };
        if entry.status == EntryStatus::InProgress {
            self.in_progress = self.in_progress.saturating_sub(1);
        }
        if entry.retry_count < max_retries {
            entry.retry_count += 1;
            entry.status = EntryStatus::Pending;
            entry.error = Some(reason);
            self.pending.push_back(canonical.to_string());
            true
        } else {
            entry.status = EntryStatus::Failed;
            entry.error = Some(reason);
            entry.processed_at = Some(Utc::now());
            false
        }
    }

    /// Whether work remains: a queued entry or one still in flight.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || self.in_progress > 0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, canonical: &str) -> Option<&FrontierEntry> {
        self.entries.get(canonical)
    }

    /// Entries that ended with an error or skip reason.
    #[must_use]
    pub fn errored_entries(&self) -> Vec<FrontierEntry> {
        let mut errored: Vec<FrontierEntry> = self
            .entries
            .values()
            .filter(|e| e.status == EntryStatus::Failed)
            .cloned()
            .collect();
        errored.sort_by_key(|e| e.enqueued_at);
        errored
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats {
            total: self.entries.len(),
            ..QueueStats::default()
        };
        for entry in self.entries.values() {
            match entry.status {
                EntryStatus::Pending => stats.pending += 1,
                EntryStatus::InProgress => stats.in_progress += 1,
                EntryStatus::Complete => stats.complete += 1,
                EntryStatus::Failed => stats.failed += 1,
                EntryStatus::Skipped => stats.skipped += 1,
            }
            match entry.kind {
                EntryKind::Page => stats.pages += 1,
                EntryKind::Asset => stats.assets += 1,
            }
        }
        stats
    }

    fn category_allowed(&self, url: &Url) -> bool {
        let category = mime_category(&extension(url));
        self.config.file_types().allows(category)
    }

    fn insert(
        &mut self,
        url: &Url,
        canonical: String,
        parent: Option<&str>,
        depth: u32,
        kind: EntryKind,
    ) {
        let entry = FrontierEntry {
            url: url.to_string(),
            canonical: canonical.clone(),
            depth,
            parent: parent.map(str::to_string),
            kind,
            status: EntryStatus::Pending,
            retry_count: 0,
            enqueued_at: Utc::now(),
            processed_at: None,
            error: None,
        };
        self.entries.insert(canonical.clone(), entry);
        self.pending.push_back(canonical);
    }

    fn finish(&mut self, canonical: &str, status: EntryStatus, error: Option<String>) {
        if let Some(entry) = self.entries.get_mut(canonical) {
            if entry.status == EntryStatus::InProgress {
                self.in_progress = self.in_progress.saturating_sub(1);
            }
            entry.status = status;
            entry.error = error;
            entry.processed_at = Some(Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrawlConfig;
    use crate::utils::url_utils::CrawlScope;

    fn frontier_with(config: CrawlConfig) -> Frontier {
        Frontier::new(Arc::new(config))
    }

    fn default_frontier() -> Frontier {
        frontier_with(
            CrawlConfig::builder()
                .seed_url("https://a.test/")
                .build()
                .unwrap(),
        )
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn seed_admission_and_duplicates() {
        let mut frontier = default_frontier();
        assert!(frontier.add_page(&url("https://a.test/"), None, 0));
        assert!(!frontier.add_page(&url("https://a.test/"), None, 0));
        assert!(!frontier.add_page(&url("https://A.test/#frag"), None, 0));
        assert_eq!(frontier.len(), 1);
    }

    #[test]
    fn pages_respect_scope_assets_do_not() {
        let mut frontier = default_frontier();
        assert!(!frontier.add_page(&url("https://b.test/"), Some("https://a.test/"), 1));
        assert!(frontier.add_asset(&url("https://b.test/logo.png"), Some("https://a.test/"), 1));
    }

    #[test]
    fn depth_ceilings_differ_for_pages_and_assets() {
        let mut frontier = frontier_with(
            CrawlConfig::builder()
                .seed_url("https://a.test/")
                .max_depth(0)
                .build()
                .unwrap(),
        );
        assert!(frontier.add_page(&url("https://a.test/"), None, 0));
        assert!(!frontier.add_page(&url("https://a.test/b"), None, 1));
        // Assets get the @import cushion.
        assert!(frontier.add_asset(&url("https://a.test/s.css"), None, 1));
        assert!(frontier.add_asset(&url("https://a.test/deep.css"), None, ASSET_DEPTH_CUSHION));
        assert!(!frontier.add_asset(
            &url("https://a.test/too-deep.css"),
            None,
            ASSET_DEPTH_CUSHION + 1
        ));
    }

    #[test]
    fn unlimited_mode_lifts_ceilings() {
        let mut frontier = frontier_with(
            CrawlConfig::builder()
                .seed_url("https://a.test/")
                .max_depth(0)
                .max_pages(1)
                .unlimited_mode(true)
                .build()
                .unwrap(),
        );
        assert!(frontier.add_page(&url("https://a.test/"), None, 0));
        assert!(frontier.add_page(&url("https://a.test/deep"), None, 50));
        assert!(frontier.add_page(&url("https://a.test/more"), None, 2));
    }

    #[test]
    fn max_pages_caps_frontier_growth() {
        let mut frontier = frontier_with(
            CrawlConfig::builder()
                .seed_url("https://a.test/")
                .max_pages(2)
                .build()
                .unwrap(),
        );
        assert!(frontier.add_page(&url("https://a.test/1"), None, 0));
        assert!(frontier.add_asset(&url("https://a.test/2.png"), None, 0));
        assert!(!frontier.add_page(&url("https://a.test/3"), None, 0));
        assert!(!frontier.add_asset(&url("https://a.test/4.png"), None, 0));
    }

    #[test]
    fn include_then_exclude_globs() {
        let mut frontier = frontier_with(
            CrawlConfig::builder()
                .seed_url("https://a.test/")
                .include_paths(vec!["*/docs/*".to_string()])
                .exclude_paths(vec!["*draft*".to_string()])
                .build()
                .unwrap(),
        );
        assert!(frontier.add_page(&url("https://a.test/docs/intro"), None, 0));
        assert!(!frontier.add_page(&url("https://a.test/blog/post"), None, 0));
        assert!(!frontier.add_page(&url("https://a.test/docs/draft-1"), None, 0));
    }

    #[test]
    fn disabled_file_types_are_rejected() {
        let mut policy = crate::config::FileTypePolicy::default();
        policy.images = false;
        let mut frontier = frontier_with(
            CrawlConfig::builder()
                .seed_url("https://a.test/")
                .file_types(policy)
                .build()
                .unwrap(),
        );
        assert!(!frontier.add_asset(&url("https://a.test/x.png"), None, 0));
        assert!(frontier.add_asset(&url("https://a.test/x.css"), None, 0));
    }

    #[test]
    fn fifo_order_and_status_transitions() {
        let mut frontier = default_frontier();
        frontier.add_page(&url("https://a.test/1"), None, 0);
        frontier.add_page(&url("https://a.test/2"), None, 0);

        let first = frontier.next().unwrap();
        assert_eq!(first.canonical, "https://a.test/1");
        assert_eq!(first.status, EntryStatus::InProgress);
        assert!(frontier.has_pending());

        frontier.complete(&first.canonical);
        assert_eq!(
            frontier.get(&first.canonical).unwrap().status,
            EntryStatus::Complete
        );

        let second = frontier.next().unwrap();
        frontier.fail(&second.canonical, "boom");
        assert!(!frontier.has_pending());
        assert_eq!(frontier.errored_entries().len(), 1);
    }

    #[test]
    fn retry_re_enqueues_until_ceiling() {
        let mut frontier = default_frontier();
        frontier.add_page(&url("https://a.test/flaky"), None, 0);

        for attempt in 0..2 {
            let entry = frontier.next().unwrap();
            assert!(frontier.retry(&entry.canonical, "timeout", 2), "attempt {attempt}");
        }
        let entry = frontier.next().unwrap();
        assert!(!frontier.retry(&entry.canonical, "timeout", 2));
        assert_eq!(
            frontier.get(&entry.canonical).unwrap().status,
            EntryStatus::Failed
        );
        assert!(!frontier.has_pending());
    }

    #[test]
    fn stats_snapshot() {
        let mut frontier = default_frontier();
        frontier.add_page(&url("https://a.test/"), None, 0);
        frontier.add_asset(&url("https://cdn.test/a.png"), None, 0);
        let entry = frontier.next().unwrap();
        frontier.complete(&entry.canonical);

        let stats = frontier.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.pages, 1);
        assert_eq!(stats.assets, 1);
        assert_eq!(stats.complete, 1);
        assert_eq!(stats.pending, 1);
    }

    #[test]
    fn skipped_entries_record_reason() {
        let mut frontier = default_frontier();
        frontier.add_page(&url("https://a.test/private"), None, 0);
        let entry = frontier.next().unwrap();
        frontier.skip(&entry.canonical, "robots.txt disallows");
        let entry = frontier.get(&entry.canonical).unwrap();
        assert_eq!(entry.status, EntryStatus::Skipped);
        assert_eq!(entry.error.as_deref(), Some("robots.txt disallows"));
    }
}
