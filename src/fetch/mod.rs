//! Fetchers: a direct HTTP one and a headless-browser one

mod browser;
mod http;
pub mod quiescence;

pub use browser::{BrowserConfig, BrowserFetcher, find_engine, has_engine};
pub use http::HttpFetcher;
