//! Fetch result and error types.

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Terminal error codes surfaced to the engine and into progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchErrorKind {
    RateLimited,
    Timeout,
    Network,
    Unknown,
    Ssrf,
    TooLarge,
}

/// A failed fetch after all in-request retry budgets are spent.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
    /// Whether the caller may reasonably re-enqueue the URL. Errors that
    /// already exhausted their in-request retry budget come back
    /// non-retryable.
    pub retryable: bool,
}

impl FetchError {
    #[must_use]
    pub fn new(kind: FetchErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }

    #[must_use]
    pub fn aborted() -> Self {
        Self::new(FetchErrorKind::Unknown, "fetch aborted", false)
    }
}

/// A successful fetch.
#[derive(Debug)]
pub struct FetchResult {
    /// The URL as requested.
    pub url: Url,
    /// The URL that produced the bytes, after redirects.
    pub final_url: Url,
    pub status: u16,
    pub headers: HeaderMap,
    /// Raw `Content-Type` header value, if any.
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// Hops taken to reach `final_url`, oldest first; empty without
    /// redirects.
    pub redirect_chain: Vec<String>,
}

impl FetchResult {
    /// Leading token of the Content-Type, lowercased: `text/html; charset=x`
    /// classifies as `text/html`.
    #[must_use]
    pub fn content_type_token(&self) -> Option<String> {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(|token| token.trim().to_ascii_lowercase())
    }

    #[must_use]
    pub fn was_redirected(&self) -> bool {
        !self.redirect_chain.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_token_strips_parameters() {
        let result = FetchResult {
            url: Url::parse("https://a.test/").unwrap(),
            final_url: Url::parse("https://a.test/").unwrap(),
            status: 200,
            headers: HeaderMap::new(),
            content_type: Some("Text/HTML; charset=utf-8".to_string()),
            body: Vec::new(),
            redirect_chain: Vec::new(),
        };
        assert_eq!(result.content_type_token().as_deref(), Some("text/html"));
    }
}
