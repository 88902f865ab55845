//! srcset / imagesrcset list handling.
//!
//! A srcset value is a comma-separated candidate list; each candidate is a
//! URL followed by an optional width or density descriptor. Extraction and
//! rewriting must both preserve the descriptors, so parsing lives in one
//! place.

/// One candidate from a srcset list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrcsetEntry {
    pub url: String,
    pub descriptor: Option<String>,
}

/// Split a srcset value into candidates.
///
/// Each comma-separated segment contributes its leading non-whitespace run
/// as the URL; the remainder is kept verbatim as the descriptor.
#[must_use]
pub fn parse_srcset(value: &str) -> Vec<SrcsetEntry> {
    value
        .split(',')
        .filter_map(|segment| {
            let segment = segment.trim();
            if segment.is_empty() {
                return None;
            }
            let (url, descriptor) = match segment.find(char::is_whitespace) {
                Some(split) => (
                    &segment[..split],
                    Some(segment[split..].trim().to_string()),
                ),
                None => (segment, None),
            };
            Some(SrcsetEntry {
                url: url.to_string(),
                descriptor: descriptor.filter(|d| !d.is_empty()),
            })
        })
        .collect()
}

/// Rewrite each URL in a srcset value through `map`, preserving
/// descriptors and rejoining with `", "`. URLs that map to `None` pass
/// through unchanged.
#[must_use]
pub fn rewrite_srcset(value: &str, mut map: impl FnMut(&str) -> Option<String>) -> String {
    parse_srcset(value)
        .into_iter()
        .map(|entry| {
            let url = map(&entry.url).unwrap_or(entry.url);
            match entry.descriptor {
                Some(descriptor) => format!("{url} {descriptor}"),
                None => url,
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_urls_and_descriptors() {
        let entries = parse_srcset("a.png 1x, b.png 2x");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].url, "a.png");
        assert_eq!(entries[0].descriptor.as_deref(), Some("1x"));
        assert_eq!(entries[1].url, "b.png");
        assert_eq!(entries[1].descriptor.as_deref(), Some("2x"));
    }

    #[test]
    fn handles_width_descriptors_and_bare_urls() {
        let entries = parse_srcset("small.jpg 480w,\n large.jpg 1080w, fallback.jpg");
        assert_eq!(entries[0].descriptor.as_deref(), Some("480w"));
        assert_eq!(entries[2].url, "fallback.jpg");
        assert_eq!(entries[2].descriptor, None);
    }

    #[test]
    fn skips_empty_segments() {
        assert_eq!(parse_srcset(" , a.png 1x, ").len(), 1);
        assert!(parse_srcset("").is_empty());
    }

    #[test]
    fn rewrite_preserves_descriptors() {
        let out = rewrite_srcset("a.png 1x, b.png 2x", |url| {
            (url == "a.png").then(|| "local/a.png".to_string())
        });
        assert_eq!(out, "local/a.png 1x, b.png 2x");
    }

    #[test]
    fn rewrite_of_unmapped_is_lossless_modulo_spacing() {
        let out = rewrite_srcset("a.png   1x,b.png 2x", |_| None);
        assert_eq!(out, "a.png 1x, b.png 2x");
    }
}
