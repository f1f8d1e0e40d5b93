//! Capabilities a scrape is assembled from

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Value;
use crate::selection::Selection;

/// Something that can retrieve a document's raw contents
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Called once before the first fetch of a scrape, e.g. to log in or
    /// prime cookies. An error aborts the scrape.
    async fn prepare(&mut self) -> Result<()>;

    /// Retrieve the document at `url`.
    ///
    /// # Arguments
    /// * `method` - HTTP method name, e.g. `"GET"`
    /// * `url` - Location to fetch
    ///
    /// # Returns
    /// * `Result<Vec<u8>>` - The document body or a transport error
    async fn fetch(&self, method: &str, url: &str) -> Result<Vec<u8>>;

    /// Release whatever `prepare` allocated. Best effort.
    async fn close(&mut self);
}

/// Turns a selection into a value for one piece of a block
pub trait PieceExtractor: Send + Sync {
    /// Extract a value from `selection`.
    ///
    /// `Ok(None)` omits the piece from the block's results. An error aborts
    /// the whole scrape.
    fn extract(&self, selection: &Selection<'_>) -> Result<Option<Value>>;

    /// Check the extractor's own configuration. Runs once when the scraper is
    /// built, before any network activity.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Never collapse a single match into a bare value. Only extractors that
    /// collapse need to care.
    fn prefer_lists(&mut self) {}
}

/// The page a pagination rule is looking at
#[derive(Debug, Clone, Copy)]
pub struct Page<'a> {
    /// URL the page was fetched from
    pub url: &'a str,
    /// 1-based position of the page within the scrape
    pub number: usize,
    /// The whole parsed page
    pub document: &'a Selection<'a>,
}

/// Decides which page follows the current one
pub trait Paginator: Send + Sync {
    /// The next URL to visit, or `None` to stop.
    ///
    /// Must only depend on the given page so the scrape terminates.
    fn next_page(&self, page: &Page<'_>) -> Result<Option<String>>;
}

/// Splits a page into the blocks pieces are extracted from
pub trait DividePage: Send + Sync {
    fn divide<'a>(&self, document: &Selection<'a>) -> Vec<Selection<'a>>;
}

impl<P: Paginator + ?Sized> Paginator for Box<P> {
    fn next_page(&self, page: &Page<'_>) -> Result<Option<String>> {
        (**self).next_page(page)
    }
}
