//! CSS link extraction and rewriting.
//!
//! A structural scanner walks the stylesheet byte-by-byte, aware of
//! comments, strings, and function nesting, and records the byte span of
//! every URL it finds: `url(...)` anywhere, `@import` in both its url and
//! bare-string forms, and the string arguments of `image-set(...)`,
//! `-webkit-image-set(...)`, and `cross-fade(...)`.
//!
//! When the scanner trips over a malformed sheet (unterminated string,
//! comment, or `url(`), extraction and rewriting fall back to regexes
//! scoped strictly to `url(...)` and `@import`, so one broken stylesheet
//! never breaks the rewrite pass.

use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

use crate::registry::{PathRegistry, relative};
use crate::utils::url_utils::{canonical_string, should_skip};

/// Whether a URL came from a `url()`-family token or an `@import`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CssLinkKind {
    Url,
    Import,
}

/// A URL found in a stylesheet, resolved against the sheet's own URL.
#[derive(Debug, Clone)]
pub struct CssLink {
    pub url: Url,
    pub canonical: String,
    pub kind: CssLinkKind,
}

/// Byte span of a URL inside the stylesheet text (quotes excluded).
#[derive(Debug, Clone, Copy)]
struct UrlToken {
    start: usize,
    end: usize,
    kind: CssLinkKind,
}

lazy_static! {
    static ref CSS_URL_RE: Regex =
        Regex::new(r#"(?i)url\(\s*['"]?([^'"()\s]+)['"]?\s*\)"#)
            .expect("BUG: hardcoded url() fallback regex is invalid");
    static ref CSS_IMPORT_RE: Regex =
        Regex::new(r#"(?i)@import\s+['"]([^'"]+)['"]"#)
            .expect("BUG: hardcoded @import fallback regex is invalid");
}

/// Extract every URL reference from a stylesheet.
///
/// `base` is the stylesheet's own URL so relative paths inside `@import`ed
/// sheets resolve correctly. Skippable URLs (data:, fragments, ...) are
/// dropped; duplicates are kept since callers dedup by canonical key.
#[must_use]
pub fn extract_css_links(css: &str, base: &Url) -> Vec<CssLink> {
    let tokens = match scan(css) {
        Ok(tokens) => tokens,
        Err(position) => {
            log::debug!("structural CSS scan failed at byte {position}, using regex fallback");
            fallback_tokens(css)
        }
    };

    tokens
        .into_iter()
        .filter_map(|token| {
            let raw = css[token.start..token.end].trim();
            if should_skip(raw) {
                return None;
            }
            let url = base.join(raw).ok()?;
            let canonical = canonical_string(&url)?;
            Some(CssLink {
                url,
                canonical,
                kind: token.kind,
            })
        })
        .collect()
}

/// Rewrite mapped URLs in a stylesheet to paths relative to
/// `local_path`. Unmapped URLs are left untouched. Returns the rewritten
/// text and the number of substitutions.
#[must_use]
pub fn rewrite_css(
    css: &str,
    base: &Url,
    local_path: &str,
    registry: &PathRegistry,
) -> (String, usize) {
    let tokens = match scan(css) {
        Ok(tokens) => tokens,
        Err(position) => {
            log::debug!("structural CSS scan failed at byte {position}, using regex fallback");
            fallback_tokens(css)
        }
    };

    let mut out = String::with_capacity(css.len());
    let mut cursor = 0;
    let mut count = 0;

    for token in tokens {
        let raw = css[token.start..token.end].trim();
        let Some(target) = lookup(raw, base, registry) else {
            continue;
        };
        out.push_str(&css[cursor..token.start]);
        out.push_str(&relative(local_path, &target));
        cursor = token.end;
        count += 1;
    }
    out.push_str(&css[cursor..]);

    (out, count)
}

fn lookup(raw: &str, base: &Url, registry: &PathRegistry) -> Option<String> {
    if should_skip(raw) {
        return None;
    }
    let resolved = base.join(raw).ok()?;
    registry.lookup(&resolved).map(str::to_string)
}

/// Structural single-pass scanner. Returns the byte position of the
/// offending construct on failure.
fn scan(css: &str) -> Result<Vec<UrlToken>, usize> {
    let bytes = css.as_bytes();
    let len = bytes.len();
    let mut tokens = Vec::new();

    // Innermost function contexts; `true` means bare strings inside are
    // URLs (image-set / cross-fade).
    let mut contexts: Vec<bool> = Vec::new();
    let mut pending_import = false;
    let mut i = 0;

    while i < len {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let close = find_subslice(bytes, i + 2, b"*/").ok_or(i)?;
                i = close + 2;
            }
            b'"' | b'\'' => {
                let quote = bytes[i];
                let end = find_string_end(bytes, i + 1, quote).ok_or(i)?;
                let takes_strings = pending_import || contexts.last().copied().unwrap_or(false);
                if takes_strings {
                    tokens.push(UrlToken {
                        start: i + 1,
                        end,
                        kind: if pending_import {
                            CssLinkKind::Import
                        } else {
                            CssLinkKind::Url
                        },
                    });
                    pending_import = false;
                }
                i = end + 1;
            }
            b')' => {
                contexts.pop();
                i += 1;
            }
            b';' => {
                pending_import = false;
                i += 1;
            }
            b'@' if has_keyword_at(css, i, "@import") => {
                pending_import = true;
                i += "@import".len();
            }
            c if c == b'u' || c == b'U' || c == b'i' || c == b'I' || c == b'-' || c == b'c'
                || c == b'C' =>
            {
                // Potential function head. Only treat it as one when the
                // previous character cannot extend an identifier.
                if i > 0 && is_ident_byte(bytes[i - 1]) {
                    i += 1;
                    continue;
                }
                if let Some(after) = match_function(css, i, "url(") {
                    let (token, next) = scan_url_body(css, after).ok_or(i)?;
                    if let Some(mut token) = token {
                        token.kind = if pending_import {
                            CssLinkKind::Import
                        } else {
                            CssLinkKind::Url
                        };
                        pending_import = false;
                        tokens.push(token);
                    }
                    i = next;
                } else if let Some(after) = match_function(css, i, "image-set(")
                    .or_else(|| match_function(css, i, "-webkit-image-set("))
                    .or_else(|| match_function(css, i, "cross-fade("))
                {
                    contexts.push(true);
                    i = after;
                } else {
                    i += 1;
                }
            }
            b'(' => {
                // Anonymous/other function scope: url() inside still
                // matches, bare strings do not.
                contexts.push(false);
                i += 1;
            }
            _ => i += 1,
        }
    }

    Ok(tokens)
}

/// Parse the body of `url(` starting right after the opening paren.
/// Returns the token (None for empty bodies) and the index past `)`.
fn scan_url_body(css: &str, mut i: usize) -> Option<(Option<UrlToken>, usize)> {
    let bytes = css.as_bytes();
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= bytes.len() {
        return None;
    }

    let (start, end, mut after) = if bytes[i] == b'"' || bytes[i] == b'\'' {
        let quote = bytes[i];
        let end = find_string_end(bytes, i + 1, quote)?;
        (i + 1, end, end + 1)
    } else {
        let close = memchr(bytes, i, b')')?;
        let mut end = close;
        while end > i && bytes[end - 1].is_ascii_whitespace() {
            end -= 1;
        }
        (i, end, close)
    };

    while after < bytes.len() && bytes[after].is_ascii_whitespace() {
        after += 1;
    }
    if after >= bytes.len() || bytes[after] != b')' {
        return None;
    }

    let token = (end > start).then_some(UrlToken {
        start,
        end,
        kind: CssLinkKind::Url,
    });
    Some((token, after + 1))
}

fn match_function(css: &str, i: usize, head: &str) -> Option<usize> {
    let slice = css.get(i..i + head.len())?;
    slice.eq_ignore_ascii_case(head).then_some(i + head.len())
}

fn has_keyword_at(css: &str, i: usize, keyword: &str) -> bool {
    css.get(i..i + keyword.len())
        .is_some_and(|s| s.eq_ignore_ascii_case(keyword))
        && css
            .as_bytes()
            .get(i + keyword.len())
            .is_none_or(|b| !is_ident_byte(*b))
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

fn find_string_end(bytes: &[u8], mut i: usize, quote: u8) -> Option<usize> {
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
        } else if bytes[i] == quote {
            return Some(i);
        } else {
            i += 1;
        }
    }
    None
}

fn find_subslice(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    (from..bytes.len().saturating_sub(needle.len() - 1))
        .find(|&i| &bytes[i..i + needle.len()] == needle)
}

fn memchr(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    (from..bytes.len()).find(|&i| bytes[i] == needle)
}

/// Regex fallback: `url(...)` plus bare-string `@import` only.
fn fallback_tokens(css: &str) -> Vec<UrlToken> {
    let mut tokens = Vec::new();
    for capture in CSS_URL_RE.captures_iter(css) {
        if let Some(group) = capture.get(1) {
            tokens.push(UrlToken {
                start: group.start(),
                end: group.end(),
                kind: CssLinkKind::Url,
            });
        }
    }
    for capture in CSS_IMPORT_RE.captures_iter(css) {
        if let Some(group) = capture.get(1) {
            tokens.push(UrlToken {
                start: group.start(),
                end: group.end(),
                kind: CssLinkKind::Import,
            });
        }
    }
    tokens.sort_by_key(|t| t.start);
    tokens.dedup_by_key(|t| t.start);
    tokens
}
