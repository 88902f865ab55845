//! Crawl progress event stream: types and the bounded broadcast bus.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::{CrawlEvent, LogContext, LogLevel};
