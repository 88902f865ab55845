//! Shared utilities: configuration constants and URL helpers.

pub mod constants;
pub mod url_utils;

pub use constants::*;
pub use url_utils::{
    CrawlScope, FileCategory, canonical_string, canonicalize, extension, glob_to_regex, in_scope,
    matches_pattern, mime_category, registrable_domain, should_skip,
};
