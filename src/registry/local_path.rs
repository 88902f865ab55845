//! Local-path derivation: turning a URL into a safe mirror-tree path.
//!
//! A local path is a forward-slash-joined sequence of sanitised segments.
//! The first segment is always the URL's host, so the sandbox root contains
//! one directory per fetched host and the archive stays browsable.

use url::Url;
use xxhash_rust::xxh3::xxh3_64;

use crate::utils::constants::MAX_SEGMENT_LEN;

/// Derive the candidate local path for a URL (before collision handling).
///
/// Rules, in order: host-first segment (non-default port folded in as
/// `host_port`); every raw path segment sanitised; directory-style URLs get
/// `index.html`; the query string folds into the filename as an 8-hex xxh3
/// digest before the extension; extension-less filenames get `.html`;
/// over-long segments are truncated around a digest of their original text.
#[must_use]
pub fn derive_candidate(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    let host_segment = match url.port() {
        Some(port) => format!("{host}_{port}"),
        None => host,
    };

    let mut segments = vec![sanitize_segment(&host_segment)];

    let path = url.path();
    let dir_style = path.ends_with('/') || path.is_empty();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        segments.push(sanitize_segment(segment));
    }

    let mut filename = if dir_style {
        "index.html".to_string()
    } else {
        // The loop above pushed at least one real segment when the path
        // does not end in '/'.
        segments.pop().unwrap_or_else(|| "index.html".to_string())
    };

    if let Some(query) = url.query()
        && !query.is_empty()
    {
        filename = fold_query(&filename, query);
    }

    if !filename.contains('.') {
        filename.push_str(".html");
    }

    segments.push(shorten_segment(&filename));
    let segments: Vec<String> = segments.into_iter().map(|s| shorten_segment(&s)).collect();
    Some(segments.join("/"))
}

/// Sanitise one path segment for the local filesystem.
///
/// Traversal fragments, separators, and characters illegal on common
/// filesystems are replaced; leading/trailing dots and whitespace trimmed;
/// an emptied segment becomes `_`.
#[must_use]
pub fn sanitize_segment(segment: &str) -> String {
    let replaced = segment.replace("..", "_");
    let cleaned = sanitize_filename::sanitize(replaced);
    let trimmed = cleaned.trim().trim_matches('.').trim();
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Fold a query string into a filename as `stem_<8-hex>.ext`.
fn fold_query(filename: &str, query: &str) -> String {
    let digest = short_hash(query);
    match filename.rfind('.') {
        Some(dot) if dot > 0 => {
            format!("{}_{digest}{}", &filename[..dot], &filename[dot..])
        }
        _ => format!("{filename}_{digest}"),
    }
}

/// Replace an over-long segment by a truncated base, an 8-hex digest of the
/// original, and the original extension.
#[must_use]
pub fn shorten_segment(segment: &str) -> String {
    if segment.len() <= MAX_SEGMENT_LEN {
        return segment.to_string();
    }

    let digest = short_hash(segment);
    let (stem, ext) = match segment.rfind('.') {
        Some(dot) if dot > 0 => (&segment[..dot], &segment[dot..]),
        _ => (segment, ""),
    };

    let keep = MAX_SEGMENT_LEN.saturating_sub(ext.len() + digest.len() + 1);
    let mut base: String = stem.chars().take(keep).collect();
    while base.len() > keep {
        base.pop();
    }
    format!("{base}_{digest}{ext}")
}

/// First 8 hex digits of the xxh3 of the input.
#[must_use]
pub fn short_hash(input: &str) -> String {
    let digest = xxh3_64(input.as_bytes());
    hex::encode(digest.to_be_bytes())[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn derive(url: &str) -> String {
        derive_candidate(&Url::parse(url).unwrap()).unwrap()
    }

    #[test]
    fn host_first_layout() {
        assert_eq!(derive("https://Example.test/css/site.css"), "example.test/css/site.css");
        assert_eq!(derive("https://example.test/"), "example.test/index.html");
    }

    #[test]
    fn non_default_port_folds_into_host() {
        assert_eq!(derive("http://a.test:8080/x.png"), "a.test_8080/x.png");
    }

    #[test]
    fn directory_style_gets_index_html() {
        assert_eq!(derive("https://a.test/docs/"), "a.test/docs/index.html");
    }

    #[test]
    fn extensionless_gets_html_suffix() {
        assert_eq!(derive("https://a.test/about"), "a.test/about.html");
    }

    #[test]
    fn query_folds_before_extension() {
        let path = derive("https://a.test/img.png?w=100");
        assert!(path.starts_with("a.test/img_"), "{path}");
        assert!(path.ends_with(".png"), "{path}");
        assert_ne!(path, "a.test/img.png");

        // Same query digests identically; different query differs.
        assert_eq!(path, derive("https://a.test/img.png?w=100"));
        assert_ne!(path, derive("https://a.test/img.png?w=200"));
    }

    #[test]
    fn traversal_fragments_are_neutralised() {
        let url = Url::parse("https://a.test/%2e%2e/etc/passwd").unwrap();
        let path = derive_candidate(&url).unwrap();
        assert!(!path.contains(".."), "{path}");

        assert!(!sanitize_segment("..").contains(".."));
        assert_eq!(sanitize_segment("...hidden..."), "hidden");
        assert_eq!(sanitize_segment("a/b\\c"), "abc");
    }

    #[test]
    fn long_segments_are_hashed_down() {
        let long = format!("{}.css", "x".repeat(400));
        let shortened = shorten_segment(&long);
        assert!(shortened.len() <= MAX_SEGMENT_LEN);
        assert!(shortened.ends_with(".css"));
        // Deterministic.
        assert_eq!(shortened, shorten_segment(&long));
        // Distinct originals stay distinct.
        let other = format!("{}.css", "y".repeat(400));
        assert_ne!(shortened, shorten_segment(&other));
    }

    #[test]
    fn empty_segments_become_placeholder() {
        assert_eq!(sanitize_segment(" . "), "_");
    }
}
