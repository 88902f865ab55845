//! Streaming HTML rewriting with lol_html.
//!
//! Replaces every mapped URL in a stored page with a path relative to the
//! page's own local path. The handler table mirrors the extraction table:
//! plain URL attributes, srcset lists (descriptors preserved), lazy
//! `data-*` attributes, inline `style` attributes, and `<style>` blocks.
//! Values with no registry mapping are left byte-for-byte untouched.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{Context, Result, anyhow};
use lol_html::html_content::{ContentType, Element};
use lol_html::{HtmlRewriter, Settings, element, text};
use url::Url;

use super::css::rewrite_css;
use super::html::LAZY_DATA_ATTRS;
use super::srcset::rewrite_srcset;
use crate::registry::{PathRegistry, relative};
use crate::utils::url_utils::{canonical_string, should_skip};

/// Attributes rewritten as single URLs, per element selector.
///
/// `link` and `meta` are gated further inside the handler (by `rel` and by
/// `property`/`name`/`itemprop`) so constructs outside the extraction
/// table, like `rel="canonical"`, keep their original URLs.
const URL_REWRITE_RULES: &[(&str, &str)] = &[
    ("a[href]", "href"),
    ("iframe[src]", "src"),
    ("frame[src]", "src"),
    ("link[href]", "href"),
    ("script[src]", "src"),
    ("img[src]", "src"),
    ("input[src]", "src"),
    ("source[src]", "src"),
    ("video[src]", "src"),
    ("video[poster]", "poster"),
    ("audio[src]", "src"),
    ("object[data]", "data"),
    ("embed[src]", "src"),
    ("image", "href"),
    ("image", "xlink:href"),
    ("use", "href"),
    ("use", "xlink:href"),
    ("meta[content]", "content"),
];

/// Attributes holding srcset candidate lists.
const SRCSET_REWRITE_RULES: &[(&str, &str)] = &[
    ("img[srcset]", "srcset"),
    ("source[srcset]", "srcset"),
    ("link[imagesrcset]", "imagesrcset"),
];

/// `rel` values whose `link[href]` is part of the mirror.
const REWRITABLE_LINK_RELS: &[&str] = &[
    "stylesheet",
    "preload",
    "icon",
    "shortcut icon",
    "apple-touch-icon",
    "apple-touch-icon-precomposed",
    "mask-icon",
    "manifest",
];

const REWRITABLE_ITEMPROPS: &[&str] = &["image", "thumbnailUrl", "contentUrl"];

/// Rewrite every mapped URL in an HTML document.
///
/// `page_url` is the canonical URL the page was fetched from (the
/// resolution base unless the document declares `<base href>`), and
/// `page_local_path` the sandbox-relative path it is stored under.
///
/// Returns the rewritten document and the substitution count.
///
/// # Errors
///
/// Returns an error when lol_html rejects the document mid-stream; callers
/// keep the original bytes in that case.
pub fn rewrite_html(
    html: &str,
    page_url: &Url,
    page_local_path: &str,
    registry: &PathRegistry,
) -> Result<(String, usize)> {
    let base = Rc::new(RefCell::new(page_url.clone()));
    let count = Rc::new(RefCell::new(0usize));
    let style_buffer = Rc::new(RefCell::new(String::new()));

    let map_url = {
        let base = Rc::clone(&base);
        move |raw: &str| -> Option<String> {
            let raw = decode_basic_entities(raw.trim());
            if should_skip(&raw) {
                return None;
            }
            let resolved = base.borrow().join(&raw).ok()?;
            let canonical = canonical_string(&resolved)?;
            let target = registry.lookup_canonical(&canonical)?;
            Some(relative(page_local_path, target))
        }
    };

    let mut handlers = Vec::new();

    // <base href> shifts resolution for everything after it in document
    // order, exactly as during extraction.
    {
        let base = Rc::clone(&base);
        let page_url = page_url.clone();
        handlers.push(element!("base[href]", move |el: &mut Element| {
            if let Some(href) = el.get_attribute("href")
                && let Ok(resolved) = page_url.join(href.trim())
                && resolved.host_str().is_some()
            {
                *base.borrow_mut() = resolved;
            }
            Ok(())
        }));
    }

    for (selector, attr) in URL_REWRITE_RULES {
        let map_url = map_url.clone();
        let count = Rc::clone(&count);
        handlers.push(element!(*selector, move |el: &mut Element| {
            if !element_is_rewritable(el) {
                return Ok(());
            }
            if let Some(value) = el.get_attribute(attr)
                && let Some(replacement) = map_url(&value)
            {
                el.set_attribute(attr, &replacement)?;
                *count.borrow_mut() += 1;
            }
            Ok(())
        }));
    }

    for (selector, attr) in SRCSET_REWRITE_RULES {
        let map_url = map_url.clone();
        let count = Rc::clone(&count);
        handlers.push(element!(*selector, move |el: &mut Element| {
            if let Some(value) = el.get_attribute(attr) {
                let mut rewritten = 0usize;
                let replacement = rewrite_srcset(&value, |url| {
                    let mapped = map_url(url);
                    if mapped.is_some() {
                        rewritten += 1;
                    }
                    mapped
                });
                if rewritten > 0 {
                    el.set_attribute(attr, &replacement)?;
                    *count.borrow_mut() += rewritten;
                }
            }
            Ok(())
        }));
    }

    for (attr, srcset) in LAZY_DATA_ATTRS {
        let map_url = map_url.clone();
        let count = Rc::clone(&count);
        let selector = format!("[{attr}]");
        let is_srcset = *srcset;
        handlers.push(element!(selector, move |el: &mut Element| {
            let Some(value) = el.get_attribute(attr) else {
                return Ok(());
            };
            if is_srcset {
                let mut rewritten = 0usize;
                let replacement = rewrite_srcset(&value, |url| {
                    let mapped = map_url(url);
                    if mapped.is_some() {
                        rewritten += 1;
                    }
                    mapped
                });
                if rewritten > 0 {
                    el.set_attribute(attr, &replacement)?;
                    *count.borrow_mut() += rewritten;
                }
            } else if let Some(replacement) = map_url(&value) {
                el.set_attribute(attr, &replacement)?;
                *count.borrow_mut() += 1;
            }
            Ok(())
        }));
    }

    // Inline style attributes use the CSS substitution rule with the
    // page's own path as the origin.
    {
        let base = Rc::clone(&base);
        let count = Rc::clone(&count);
        let page_local_path = page_local_path.to_string();
        handlers.push(element!("[style]", move |el: &mut Element| {
            if let Some(style) = el.get_attribute("style") {
                let (rewritten, n) =
                    rewrite_css(&style, &base.borrow(), &page_local_path, registry);
                if n > 0 {
                    el.set_attribute("style", &rewritten)?;
                    *count.borrow_mut() += n;
                }
            }
            Ok(())
        }));
    }

    // <style> blocks stream in chunks; buffer until the last one, then
    // emit the rewritten stylesheet in its place.
    {
        let base = Rc::clone(&base);
        let count = Rc::clone(&count);
        let buffer = Rc::clone(&style_buffer);
        let page_local_path = page_local_path.to_string();
        handlers.push(text!("style", move |chunk| {
            buffer.borrow_mut().push_str(chunk.as_str());
            if chunk.last_in_text_node() {
                let css = std::mem::take(&mut *buffer.borrow_mut());
                let (rewritten, n) = rewrite_css(&css, &base.borrow(), &page_local_path, registry);
                *count.borrow_mut() += n;
                chunk.replace(&rewritten, ContentType::Text);
            } else {
                chunk.remove();
            }
            Ok(())
        }));
    }

    let mut output = Vec::with_capacity(html.len());
    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: handlers,
            ..Settings::default()
        },
        |chunk: &[u8]| output.extend_from_slice(chunk),
    );

    rewriter
        .write(html.as_bytes())
        .map_err(|e| anyhow!("HTML rewrite error: {e}"))?;
    rewriter
        .end()
        .map_err(|e| anyhow!("HTML rewrite finalization error: {e}"))?;

    let result = String::from_utf8(output).context("Invalid UTF-8 in rewritten HTML")?;
    let total = *count.borrow();
    Ok((result, total))
}

/// Per-element gate for the broad `link`/`meta` selectors.
fn element_is_rewritable(el: &Element) -> bool {
    match el.tag_name().as_str() {
        "link" => el
            .get_attribute("rel")
            .is_some_and(|rel| REWRITABLE_LINK_RELS.contains(&rel.to_ascii_lowercase().trim())),
        "meta" => {
            if let Some(property) = el.get_attribute("property") {
                return property.starts_with("og:");
            }
            if let Some(name) = el.get_attribute("name") {
                return name.starts_with("twitter:");
            }
            if let Some(itemprop) = el.get_attribute("itemprop") {
                return REWRITABLE_ITEMPROPS.contains(&itemprop.as_str());
            }
            false
        }
        _ => true,
    }
}

/// The streaming rewriter hands attribute values back with character
/// references intact; decode the handful that appear in URLs so lookups
/// match the canonical keys produced at extraction time.
fn decode_basic_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&amp;", "&")
        .replace("&#38;", "&")
        .replace("&#x26;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}
