//! Link extraction and rewriting for HTML and CSS.

pub mod css;
pub mod html;
pub mod html_rewrite;
pub mod srcset;

pub use css::{CssLink, CssLinkKind, extract_css_links, rewrite_css};
pub use html::{ExtractedLink, LinkKind, extract_links};
pub use html_rewrite::rewrite_html;
pub use srcset::{SrcsetEntry, parse_srcset, rewrite_srcset};
