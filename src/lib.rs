//! Structured extraction from paginated web documents.
//!
//! A [`Scraper`] walks a chain of pages starting from a URL. Each page is
//! fetched by a [`Fetcher`], divided into blocks, and every configured
//! [`Piece`] is extracted from every block. [`fetch::BrowserFetcher`] renders
//! script-heavy pages in a headless browser engine and waits for network
//! quiescence before reading them.

pub mod error;
pub mod extract;
pub mod fetch;
pub mod job;
pub mod models;
pub mod paginate;
pub mod scraper;
pub mod selection;
pub mod traits;

pub use crate::error::{Error, Result};
pub use crate::models::{BlockResults, ScrapeResults, Value};
pub use crate::scraper::{Piece, ScrapeConfig, Scraper};
pub use crate::selection::Selection;
pub use crate::traits::{DividePage, Fetcher, Page, Paginator, PieceExtractor};
