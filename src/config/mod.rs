//! Crawl configuration: types, accessors, and the typestate builder.

mod builder;
mod getters;
mod types;

pub use builder::{CrawlConfigBuilder, WithSeedUrl};
pub use types::{CrawlConfig, FileTypePolicy};
