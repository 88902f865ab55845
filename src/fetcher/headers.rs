//! Browser-grade request header crafting.
//!
//! Origin servers increasingly fingerprint request headers; a bare
//! `User-Agent` with no `Sec-Fetch-*` family is an easy tell. Headers here
//! are chosen per resource category so a stylesheet request looks like a
//! stylesheet request.

use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CONNECTION, HeaderMap, HeaderName, HeaderValue, REFERER, USER_AGENT,
};
use url::Url;

use crate::utils::constants;
use crate::utils::url_utils::{FileCategory, extension, mime_category};

/// Accept header believable for the resource category.
#[must_use]
pub fn accept_for(category: FileCategory) -> &'static str {
    match category {
        FileCategory::Html => {
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"
        }
        FileCategory::Css => "text/css,*/*;q=0.1",
        FileCategory::Js => "*/*",
        FileCategory::Images => "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8",
        FileCategory::Fonts => "font/woff2;q=1.0,font/woff;q=0.9,*/*;q=0.8",
        FileCategory::Media | FileCategory::Documents | FileCategory::Other => "*/*",
    }
}

fn sec_fetch_dest(category: FileCategory) -> &'static str {
    match category {
        FileCategory::Html => "document",
        FileCategory::Css => "style",
        FileCategory::Js => "script",
        FileCategory::Images => "image",
        FileCategory::Fonts => "font",
        FileCategory::Media => "video",
        FileCategory::Documents | FileCategory::Other => "empty",
    }
}

/// Build the full header set for one request.
///
/// `referer` is the page that discovered the URL (the seed for the first
/// request); `Sec-Fetch-Site` is derived from it.
#[must_use]
pub fn build_headers(url: &Url, referer: &str, user_agent: &str) -> HeaderMap {
    let category = mime_category(&extension(url));
    let mut headers = HeaderMap::new();

    let insert = |headers: &mut HeaderMap, name: HeaderName, value: &str| {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(name, value);
        }
    };

    insert(&mut headers, USER_AGENT, user_agent);
    insert(&mut headers, ACCEPT, accept_for(category));
    insert(&mut headers, ACCEPT_LANGUAGE, constants::ACCEPT_LANGUAGE);
    insert(&mut headers, CONNECTION, "keep-alive");
    insert(&mut headers, REFERER, referer);

    let is_document = category == FileCategory::Html;
    if is_document {
        insert(
            &mut headers,
            HeaderName::from_static("upgrade-insecure-requests"),
            "1",
        );
        insert(&mut headers, HeaderName::from_static("sec-fetch-user"), "?1");
    }

    insert(
        &mut headers,
        HeaderName::from_static("sec-fetch-dest"),
        sec_fetch_dest(category),
    );
    insert(
        &mut headers,
        HeaderName::from_static("sec-fetch-mode"),
        if is_document { "navigate" } else { "no-cors" },
    );
    insert(
        &mut headers,
        HeaderName::from_static("sec-fetch-site"),
        sec_fetch_site(url, referer),
    );

    // Client hints consistent with the Chromium entries of the UA pool.
    insert(
        &mut headers,
        HeaderName::from_static("sec-ch-ua"),
        "\"Chromium\";v=\"136\", \"Google Chrome\";v=\"136\", \"Not.A/Brand\";v=\"99\"",
    );
    insert(&mut headers, HeaderName::from_static("sec-ch-ua-mobile"), "?0");
    insert(
        &mut headers,
        HeaderName::from_static("sec-ch-ua-platform"),
        "\"Linux\"",
    );
    insert(&mut headers, HeaderName::from_static("dnt"), "1");

    headers
}

fn sec_fetch_site(url: &Url, referer: &str) -> &'static str {
    let Ok(referer_url) = Url::parse(referer) else {
        return "none";
    };
    match (url.host_str(), referer_url.host_str()) {
        (Some(a), Some(b)) if a.eq_ignore_ascii_case(b) => "same-origin",
        (Some(_), Some(_)) => "cross-site",
        _ => "none",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_requests_navigate() {
        let url = Url::parse("https://a.test/page").unwrap();
        let headers = build_headers(&url, "https://a.test/", "TestUA/1.0");
        assert_eq!(headers.get("sec-fetch-mode").unwrap(), "navigate");
        assert_eq!(headers.get("sec-fetch-dest").unwrap(), "document");
        assert_eq!(headers.get("upgrade-insecure-requests").unwrap(), "1");
        assert_eq!(headers.get("sec-fetch-site").unwrap(), "same-origin");
        assert_eq!(headers.get(USER_AGENT).unwrap(), "TestUA/1.0");
    }

    #[test]
    fn asset_requests_no_cors() {
        let url = Url::parse("https://cdn.test/x.png").unwrap();
        let headers = build_headers(&url, "https://a.test/", "TestUA/1.0");
        assert_eq!(headers.get("sec-fetch-mode").unwrap(), "no-cors");
        assert_eq!(headers.get("sec-fetch-dest").unwrap(), "image");
        assert_eq!(headers.get("sec-fetch-site").unwrap(), "cross-site");
        assert!(headers.get("upgrade-insecure-requests").is_none());
        assert!(headers.get(ACCEPT).unwrap().to_str().unwrap().starts_with("image/"));
    }

    #[test]
    fn stylesheet_accept() {
        let url = Url::parse("https://a.test/site.css").unwrap();
        let headers = build_headers(&url, "https://a.test/", "UA");
        assert!(headers.get(ACCEPT).unwrap().to_str().unwrap().starts_with("text/css"));
        assert_eq!(headers.get("sec-fetch-dest").unwrap(), "style");
    }
}
