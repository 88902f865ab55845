//! Shared configuration constants for sitevault
//!
//! This module contains default values and configuration constants used
//! throughout the codebase to ensure consistency and avoid magic numbers.

/// Default maximum crawl depth: 5 levels
///
/// Limits how deep the crawler will follow links from the seed URL.
/// Helps prevent unbounded crawling while capturing most relevant content.
pub const DEFAULT_MAX_DEPTH: u32 = 5;

/// Extra depth cushion granted to assets beyond `max_depth`.
///
/// Stylesheets can pull further stylesheets through `@import`; the cushion
/// lets those chains complete without opening the frontier to unbounded
/// page discovery.
pub const ASSET_DEPTH_CUSHION: u32 = 5;

/// Default ceiling on the number of frontier entries.
pub const DEFAULT_MAX_PAGES: usize = 500;

/// Default per-response byte ceiling: 50 MB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Default aggregate storage ceiling: 2 GB.
pub const DEFAULT_MAX_TOTAL_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Default number of concurrent in-flight fetches.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default baseline inter-request delay in milliseconds.
///
/// The fetcher jitters this by a uniform factor in [0.5, 1.5) so request
/// timing does not look mechanical to the origin.
pub const DEFAULT_DELAY_MS: u64 = 250;

/// Default per-request deadline: 30 seconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default redirect-chain ceiling.
pub const DEFAULT_MAX_REDIRECTS: u32 = 10;

/// Attempt budget shared by every in-request retry loop (429, 403, 503,
/// bot interstitials, transport errors).
pub const FETCH_ATTEMPTS: u32 = 5;

/// Base delay for exponential transport-error backoff (2^attempt x base).
pub const BACKOFF_BASE_MS: u64 = 1000;

/// Default `Retry-After` applied to a 503 that carries no header, seconds.
pub const SERVICE_UNAVAILABLE_RETRY_SECS: u64 = 5;

/// How many times a Failed frontier entry may re-enter Pending.
pub const ENTRY_RETRY_CEILING: u32 = 2;

/// Timeout for the one-shot robots.txt fetch at crawl start, milliseconds.
pub const ROBOTS_FETCH_TIMEOUT_MS: u64 = 8_000;

/// Longest permitted local-path segment before hash truncation kicks in.
pub const MAX_SEGMENT_LEN: usize = 200;

/// How many `_N` suffixes are tried before falling back to a hash suffix.
pub const COLLISION_SUFFIX_CEILING: u32 = 100;

/// Recursion ceiling for JSON-LD structured-data traversal.
pub const JSONLD_MAX_DEPTH: u32 = 32;

/// Phrases that mark an HTTP-200 HTML body as a bot-check interstitial.
///
/// Matching is best-effort and false-positive-prone (a legitimate page can
/// say "access denied" in prose), so the probe only runs on 200-status HTML
/// and shares the bounded `FETCH_ATTEMPTS` budget.
pub const BOT_INTERSTITIAL_PHRASES: &[&str] = &[
    "cf-browser-verification",
    "checking your browser",
    "ddos-guard",
    "please wait while we verify",
    "just a moment",
    "access denied",
];

/// Rotation pool of realistic desktop browser User-Agent strings.
///
/// Updated: 2025-06-10 (Chrome 136 / Firefox 139 / Safari 18 stable).
/// Chrome releases a new stable roughly every 4 weeks; refresh quarterly.
pub const USER_AGENT_POOL: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:139.0) Gecko/20100101 Firefox/139.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:139.0) Gecko/20100101 Firefox/139.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.4 Safari/605.1.15",
];

/// Default Accept-Language header sent with every request.
pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
