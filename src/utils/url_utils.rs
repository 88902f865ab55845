//! URL normalisation, scope comparison, and classification utilities.
//!
//! Every frontier and registry map in the crawler is keyed by the canonical
//! form produced here, so the rules in this module are load-bearing: if two
//! spellings of a URL canonicalise differently, the crawler fetches the same
//! resource twice and the rewriter misses one of them.

use std::net::IpAddr;

use anyhow::{Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Known second-level public suffixes: `example.co.uk` registers at three
/// labels, not two.
const SECOND_LEVEL_SUFFIXES: &[&str] = &["co", "com", "org", "net", "gov", "edu", "ac"];

/// Admission predicate for page URLs, expressed over hostnames relative to
/// the seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CrawlScope {
    /// Exact hostname match with the seed.
    #[default]
    SameHost,
    /// Same registrable domain (apex) as the seed.
    SameDomain,
    /// The seed's registrable domain plus any `*.`-suffixed host under it.
    Subdomains,
    /// Hosts listed in `custom_domains`, plus their subdomains.
    Custom,
}

/// Coarse content category derived from a URL extension.
///
/// Used by the frontier's file-type filter and by the fetcher to pick a
/// believable `Accept` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Html,
    Css,
    Js,
    Images,
    Fonts,
    Media,
    Documents,
    Other,
}

/// Canonicalise a URL, optionally resolving it against a base first.
///
/// Canonical form: lowercase scheme and host, default port dropped, trailing
/// `/` stripped from non-root paths, query pairs sorted bytewise, fragment
/// removed. Returns `None` on parse failure or when the URL has no host.
///
/// The operation is idempotent: feeding a canonical URL back in yields the
/// same string.
#[must_use]
pub fn canonicalize(url: &str, base: Option<&Url>) -> Option<String> {
    let trimmed = url.trim();
    let parsed = match base {
        Some(base) => base.join(trimmed).ok()?,
        None => Url::parse(trimmed).ok()?,
    };
    canonical_string(&parsed)
}

/// Canonicalise an already-parsed URL. See [`canonicalize`].
#[must_use]
pub fn canonical_string(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();

    let mut out = String::with_capacity(url.as_str().len());
    out.push_str(url.scheme());
    out.push_str("://");
    out.push_str(&host);
    // Url::port() is already None for a scheme's default port.
    if let Some(port) = url.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }

    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        out.push_str(&path[..path.len() - 1]);
    } else if path.is_empty() {
        out.push('/');
    } else {
        out.push_str(path);
    }

    if url.query().is_some() {
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        pairs.sort();
        if !pairs.is_empty() {
            let sorted = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish();
            out.push('?');
            out.push_str(&sorted);
        }
    }

    Some(out)
}

/// Extract the registrable domain (apex) of a hostname.
///
/// The apex is the last two labels, or the last three when the penultimate
/// label is a known second-level suffix (`example.co.uk`). IP literals are
/// returned unchanged.
#[must_use]
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host.parse::<IpAddr>().is_ok() {
        return host;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host;
    }

    let penultimate = labels[labels.len() - 2];
    let take = if SECOND_LEVEL_SUFFIXES.contains(&penultimate) && labels.len() >= 3 {
        3
    } else {
        2
    };
    labels[labels.len() - take..].join(".")
}

/// Decide whether a page URL is admissible under the configured scope.
#[must_use]
pub fn in_scope(url: &Url, seed: &Url, scope: CrawlScope, custom_domains: &[String]) -> bool {
    let (Some(host), Some(seed_host)) = (url.host_str(), seed.host_str()) else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    let seed_host = seed_host.to_ascii_lowercase();

    match scope {
        CrawlScope::SameHost => host == seed_host,
        CrawlScope::SameDomain => registrable_domain(&host) == registrable_domain(&seed_host),
        CrawlScope::Subdomains => {
            let apex = registrable_domain(&seed_host);
            host == apex || host.ends_with(&format!(".{apex}"))
        }
        CrawlScope::Custom => custom_domains.iter().any(|domain| {
            let domain = domain.to_ascii_lowercase();
            host == domain || host.ends_with(&format!(".{domain}"))
        }),
    }
}

/// Compile a glob pattern (`*` matches any run, `?` one character) into an
/// anchored case-insensitive regex.
///
/// Compilation happens once at config build time so the frontier's hot path
/// never touches the regex compiler.
///
/// # Errors
///
/// Returns an error if the resulting regex pattern is invalid.
pub fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut regex_pattern = String::with_capacity(pattern.len() + 8);
    regex_pattern.push_str("(?i)^");
    for ch in pattern.chars() {
        match ch {
            '*' => regex_pattern.push_str(".*"),
            '?' => regex_pattern.push('.'),
            other => regex_pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex_pattern.push('$');

    Regex::new(&regex_pattern).map_err(|e| anyhow!("Invalid glob pattern '{pattern}': {e}"))
}

/// One-shot glob match; prefer [`glob_to_regex`] plus reuse in hot paths.
#[must_use]
pub fn matches_pattern(url: &str, glob: &str) -> bool {
    glob_to_regex(glob).map_or(false, |re| re.is_match(url))
}

/// Lowercased extension of the URL path, empty when the path has none or
/// the last `.` belongs to a parent segment.
#[must_use]
pub fn extension(url: &Url) -> String {
    let path = url.path();
    match path.rfind('.') {
        Some(dot) if !path[dot..].contains('/') => path[dot + 1..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// Fixed extension-to-category table.
///
/// Extensionless URLs classify as HTML: a bare path is almost always a page,
/// and misclassifying the occasional extensionless asset only affects the
/// file-type filter, not correctness.
#[must_use]
pub fn mime_category(ext: &str) -> FileCategory {
    match ext {
        "" | "html" | "htm" | "xhtml" | "php" | "asp" | "aspx" | "jsp" => FileCategory::Html,
        "css" => FileCategory::Css,
        "js" | "mjs" | "cjs" => FileCategory::Js,
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "avif" | "svg" | "ico" | "bmp" | "tiff"
        | "apng" => FileCategory::Images,
        "woff" | "woff2" | "ttf" | "otf" | "eot" => FileCategory::Fonts,
        "mp4" | "webm" | "ogg" | "ogv" | "mp3" | "wav" | "m4a" | "m4v" | "mov" | "avi" | "mkv"
        | "flac" | "aac" => FileCategory::Media,
        "pdf" | "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" | "odt" | "ods" | "csv"
        | "txt" | "rtf" | "xml" | "json" => FileCategory::Documents,
        _ => FileCategory::Other,
    }
}

/// Whether a raw attribute value can never yield a fetchable URL.
///
/// Covers pseudo-schemes (data:, blob:, javascript:, mailto:, tel:, sms:),
/// pure fragments, and empty strings.
#[must_use]
pub fn should_skip(url: &str) -> bool {
    let url = url.trim();
    if url.is_empty() || url.starts_with('#') {
        return true;
    }
    const SKIP_SCHEMES: &[&str] = &["data:", "blob:", "javascript:", "mailto:", "tel:", "sms:"];
    let lower = url.to_ascii_lowercase();
    SKIP_SCHEMES.iter().any(|scheme| lower.starts_with(scheme))
}
