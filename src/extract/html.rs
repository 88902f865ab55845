//! HTML link extraction.
//!
//! A single DOM traversal driven by a constant selector/attribute/kind
//! table collects every URL-bearing construct: navigational links, asset
//! references (including the long tail of lazy-loading `data-*`
//! attributes), inline and block CSS, meta/OpenGraph/Twitter/Schema.org
//! tags, and JSON-LD structured data. The table is data, not control flow;
//! adding a construct means adding a row.

use std::collections::HashSet;

use lazy_static::lazy_static;
use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

use super::css::extract_css_links;
use super::srcset::parse_srcset;
use crate::utils::constants::JSONLD_MAX_DEPTH;
use crate::utils::url_utils::{canonical_string, should_skip};

/// Navigational role of an extracted URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Anchor targets and framed documents: subject to scope rules.
    Page,
    /// Everything needed to render: admitted regardless of host.
    Asset,
}

/// One URL found in a document.
#[derive(Debug, Clone)]
pub struct ExtractedLink {
    pub url: Url,
    pub canonical: String,
    pub kind: LinkKind,
    pub tag: String,
    pub attribute: String,
}

/// One row of the extraction table.
pub struct AttrRule {
    pub selector: &'static str,
    pub attr: &'static str,
    pub kind: LinkKind,
    /// Whether the attribute holds a srcset candidate list.
    pub srcset: bool,
}

const fn rule(selector: &'static str, attr: &'static str, kind: LinkKind) -> AttrRule {
    AttrRule {
        selector,
        attr,
        kind,
        srcset: false,
    }
}

const fn srcset_rule(selector: &'static str, attr: &'static str) -> AttrRule {
    AttrRule {
        selector,
        attr,
        kind: LinkKind::Asset,
        srcset: true,
    }
}

/// The fixed extraction table.
pub const ATTR_RULES: &[AttrRule] = &[
    // Hyperlinks and framed documents carry the navigational role.
    rule("a[href]", "href", LinkKind::Page),
    rule("iframe[src]", "src", LinkKind::Page),
    rule("frame[src]", "src", LinkKind::Page),
    // Stylesheets and preloads.
    rule(r#"link[rel="stylesheet"][href]"#, "href", LinkKind::Asset),
    rule(r#"link[rel="preload"][as="style"][href]"#, "href", LinkKind::Asset),
    rule(r#"link[rel="preload"][as="image"][href]"#, "href", LinkKind::Asset),
    srcset_rule(r#"link[rel="preload"][as="image"][imagesrcset]"#, "imagesrcset"),
    // Scripts.
    rule("script[src]", "src", LinkKind::Asset),
    // Images.
    rule("img[src]", "src", LinkKind::Asset),
    srcset_rule("img[srcset]", "srcset"),
    srcset_rule("picture source[srcset]", "srcset"),
    srcset_rule("source[srcset]", "srcset"),
    rule(r#"input[type="image"][src]"#, "src", LinkKind::Asset),
    // Icons and manifest.
    rule(r#"link[rel="icon"][href]"#, "href", LinkKind::Asset),
    rule(r#"link[rel="shortcut icon"][href]"#, "href", LinkKind::Asset),
    rule(r#"link[rel="apple-touch-icon"][href]"#, "href", LinkKind::Asset),
    rule(r#"link[rel="apple-touch-icon-precomposed"][href]"#, "href", LinkKind::Asset),
    rule(r#"link[rel="mask-icon"][href]"#, "href", LinkKind::Asset),
    rule(r#"link[rel="manifest"][href]"#, "href", LinkKind::Asset),
    // SVG references. The attribute filter lives in the loop because CSS
    // cannot select on the `xlink:href` attribute name.
    rule("image", "href", LinkKind::Asset),
    rule("image", "xlink:href", LinkKind::Asset),
    rule("use", "href", LinkKind::Asset),
    rule("use", "xlink:href", LinkKind::Asset),
    // Media.
    rule("video[src]", "src", LinkKind::Asset),
    rule("video[poster]", "poster", LinkKind::Asset),
    rule("audio[src]", "src", LinkKind::Asset),
    rule("video source[src]", "src", LinkKind::Asset),
    rule("audio source[src]", "src", LinkKind::Asset),
    // Objects and embeds.
    rule("object[data]", "data", LinkKind::Asset),
    rule("embed[src]", "src", LinkKind::Asset),
    // Social and structured-data meta tags.
    rule(r#"meta[property="og:image"]"#, "content", LinkKind::Asset),
    rule(r#"meta[property="og:image:url"]"#, "content", LinkKind::Asset),
    rule(r#"meta[property="og:video"]"#, "content", LinkKind::Asset),
    rule(r#"meta[property="og:audio"]"#, "content", LinkKind::Asset),
    rule(r#"meta[name="twitter:image"]"#, "content", LinkKind::Asset),
    rule(r#"meta[name="twitter:player"]"#, "content", LinkKind::Asset),
    rule(r#"meta[itemprop="image"]"#, "content", LinkKind::Asset),
    rule(r#"meta[itemprop="thumbnailUrl"]"#, "content", LinkKind::Asset),
    rule(r#"meta[itemprop="contentUrl"]"#, "content", LinkKind::Asset),
];

/// Lazy-loading attributes used by image frameworks, mined on any element.
/// The second field marks srcset-valued attributes.
pub const LAZY_DATA_ATTRS: &[(&str, bool)] = &[
    ("data-src", false),
    ("data-srcset", true),
    ("data-lazy-src", false),
    ("data-lazy-srcset", true),
    ("data-original", false),
    ("data-lazy", false),
    ("data-bg", false),
    ("data-image", false),
    ("data-full", false),
    ("data-large", false),
    ("data-hi-res", false),
    ("data-zoom-image", false),
    ("data-echo", false),
    ("data-unveiled", false),
    ("data-background", false),
    ("data-background-image", false),
    ("data-bg-src", false),
    ("data-image-src", false),
    ("data-thumb", false),
    ("data-poster", false),
    ("data-src-retina", false),
];

/// JSON-LD keys whose values (or nested `.url` fields) name assets.
const JSONLD_KEYS: &[&str] = &[
    "image",
    "logo",
    "thumbnail",
    "thumbnailUrl",
    "photo",
    "primaryImageOfPage",
    "contentUrl",
];

lazy_static! {
    static ref COMPILED_RULES: Vec<(Selector, &'static AttrRule)> = ATTR_RULES
        .iter()
        .map(|rule| {
            let selector = Selector::parse(rule.selector)
                .expect("BUG: hardcoded extraction selector is invalid");
            (selector, rule)
        })
        .collect();
    static ref LAZY_SELECTORS: Vec<(Selector, &'static str, bool)> = LAZY_DATA_ATTRS
        .iter()
        .map(|(attr, srcset)| {
            let selector = Selector::parse(&format!("[{attr}]"))
                .expect("BUG: hardcoded data-attribute selector is invalid");
            (selector, *attr, *srcset)
        })
        .collect();
    static ref BASE_SELECTOR: Selector =
        Selector::parse("base[href]").expect("BUG: hardcoded base selector is invalid");
    static ref STYLE_ATTR_SELECTOR: Selector =
        Selector::parse("[style]").expect("BUG: hardcoded [style] selector is invalid");
    static ref STYLE_BLOCK_SELECTOR: Selector =
        Selector::parse("style").expect("BUG: hardcoded style selector is invalid");
    static ref JSONLD_SELECTOR: Selector =
        Selector::parse(r#"script[type="application/ld+json"]"#)
            .expect("BUG: hardcoded JSON-LD selector is invalid");
}

struct Collector {
    base: Url,
    seen: HashSet<String>,
    links: Vec<ExtractedLink>,
}

impl Collector {
    fn push(&mut self, raw: &str, kind: LinkKind, tag: &str, attribute: &str) {
        let raw = raw.trim();
        if should_skip(raw) {
            return;
        }
        let Ok(url) = self.base.join(raw) else {
            return;
        };
        let Some(canonical) = canonical_string(&url) else {
            return;
        };
        if !self.seen.insert(canonical.clone()) {
            return;
        }
        self.links.push(ExtractedLink {
            url,
            canonical,
            kind,
            tag: tag.to_string(),
            attribute: attribute.to_string(),
        });
    }
}

/// Resolve the document's effective base URL: the first parseable
/// `<base href>`, otherwise the page's own (post-redirect) URL.
fn effective_base(document: &Html, page_url: &Url) -> Url {
    document
        .select(&BASE_SELECTOR)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| page_url.join(href.trim()).ok())
        .find(|url| url.host_str().is_some())
        .unwrap_or_else(|| page_url.clone())
}

/// Extract every URL from an HTML document.
///
/// `page_url` is the URL that produced the bytes (post-redirect), used as
/// the resolution base unless the document declares its own. The result is
/// ordered and deduplicated by canonical URL within the call.
#[must_use]
pub fn extract_links(html: &str, page_url: &Url) -> Vec<ExtractedLink> {
    let document = Html::parse_document(html);
    let base = effective_base(&document, page_url);
    let mut collector = Collector {
        base,
        seen: HashSet::new(),
        links: Vec::new(),
    };

    for (selector, rule) in COMPILED_RULES.iter() {
        for element in document.select(selector) {
            let Some(value) = element.value().attr(rule.attr) else {
                continue;
            };
            let tag = element.value().name();
            if rule.srcset {
                for entry in parse_srcset(value) {
                    collector.push(&entry.url, rule.kind, tag, rule.attr);
                }
            } else {
                collector.push(value, rule.kind, tag, rule.attr);
            }
        }
    }

    for (selector, attr, srcset) in LAZY_SELECTORS.iter() {
        for element in document.select(selector) {
            let Some(value) = element.value().attr(attr) else {
                continue;
            };
            let tag = element.value().name();
            if *srcset {
                for entry in parse_srcset(value) {
                    collector.push(&entry.url, LinkKind::Asset, tag, attr);
                }
            } else {
                collector.push(value, LinkKind::Asset, tag, attr);
            }
        }
    }

    // Inline CSS: style attributes on any element.
    for element in document.select(&STYLE_ATTR_SELECTOR) {
        if let Some(style) = element.value().attr("style") {
            let tag = element.value().name().to_string();
            for link in extract_css_links(style, &collector.base.clone()) {
                collector.push(link.url.as_str(), LinkKind::Asset, &tag, "style");
            }
        }
    }

    // Inline CSS: <style> blocks.
    for element in document.select(&STYLE_BLOCK_SELECTOR) {
        let text: String = element.text().collect();
        for link in extract_css_links(&text, &collector.base.clone()) {
            collector.push(link.url.as_str(), LinkKind::Asset, "style", "text");
        }
    }

    // JSON-LD structured data.
    for element in document.select(&JSONLD_SELECTOR) {
        let text: String = element.text().collect();
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => walk_jsonld(&value, 0, &mut collector),
            Err(e) => log::debug!("unparseable JSON-LD block on {page_url}: {e}"),
        }
    }

    collector.links
}

fn walk_jsonld(value: &Value, depth: u32, collector: &mut Collector) {
    if depth > JSONLD_MAX_DEPTH {
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                if JSONLD_KEYS.contains(&key.as_str()) {
                    collect_jsonld_candidate(nested, collector);
                }
                walk_jsonld(nested, depth + 1, collector);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk_jsonld(item, depth + 1, collector);
            }
        }
        _ => {}
    }
}

fn collect_jsonld_candidate(value: &Value, collector: &mut Collector) {
    match value {
        Value::String(s) => collector.push(s, LinkKind::Asset, "script", "ld+json"),
        Value::Array(items) => {
            for item in items {
                collect_jsonld_candidate(item, collector);
            }
        }
        Value::Object(map) => {
            if let Some(Value::String(s)) = map.get("url") {
                collector.push(s, LinkKind::Asset, "script", "ld+json");
            }
        }
        _ => {}
    }
}
