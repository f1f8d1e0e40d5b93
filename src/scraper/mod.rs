//! The pagination/extraction engine
//!
//! A scrape fetches a page, divides it into blocks, runs every piece against
//! every block and then asks the pagination rule for the next page, until
//! there is none. Any error aborts the whole scrape; no partial results are
//! returned.

use std::collections::HashSet;
use std::time::Duration;

use scraper::{Html, Selector};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{BlockResults, ScrapeResults};
use crate::paginate::DivideBySelector;
use crate::selection::{Selection, parse_selector};
use crate::traits::{DividePage, Fetcher, Page, Paginator, PieceExtractor};

/// Selector meaning "the block itself"
pub const BLOCK_SELECTOR: &str = ".";

/// A named chunk of data extracted from every block
pub struct Piece {
    /// Key of the piece in each block's results
    pub name: String,
    /// Narrows the block before extraction; `"."` uses the block as is
    pub selector: String,
    pub extractor: Box<dyn PieceExtractor>,
}

impl Piece {
    pub fn new(
        name: impl Into<String>,
        selector: impl Into<String>,
        extractor: impl PieceExtractor + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            extractor: Box::new(extractor),
        }
    }
}

/// Everything a [`Scraper`] needs. Validated by [`Scraper::new`].
pub struct ScrapeConfig {
    fetcher: Box<dyn Fetcher>,
    next_page: Option<Box<dyn Paginator>>,
    divide_page: Option<Box<dyn DividePage>>,
    pieces: Vec<Piece>,
    page_delay: Option<Duration>,
    always_return_lists: bool,
}

impl ScrapeConfig {
    pub fn new(fetcher: impl Fetcher + 'static) -> Self {
        Self {
            fetcher: Box::new(fetcher),
            next_page: None,
            divide_page: None,
            pieces: Vec::new(),
            page_delay: None,
            always_return_lists: false,
        }
    }

    /// Without a pagination rule only the start page is scraped.
    pub fn next_page(mut self, paginator: impl Paginator + 'static) -> Self {
        self.next_page = Some(Box::new(paginator));
        self
    }

    /// Without a divider each page is a single block: its `<body>`.
    pub fn divide_page(mut self, divider: impl DividePage + 'static) -> Self {
        self.divide_page = Some(Box::new(divider));
        self
    }

    pub fn piece(mut self, piece: Piece) -> Self {
        self.pieces.push(piece);
        self
    }

    pub fn pieces(mut self, pieces: impl IntoIterator<Item = Piece>) -> Self {
        self.pieces.extend(pieces);
        self
    }

    /// Wait this long before fetching each page after the first.
    pub fn page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = Some(delay);
        self
    }

    /// Make every extractor return lists even for a single match.
    pub fn always_return_lists(mut self) -> Self {
        self.always_return_lists = true;
        self
    }
}

struct CompiledPiece {
    name: String,
    /// `None` for the block itself
    selector: Option<Selector>,
    extractor: Box<dyn PieceExtractor>,
}

/// Runs scrapes with one validated configuration.
///
/// Each scraper owns its fetcher. Running scrapes concurrently with fetchers
/// that share session state (cookies) is up to the caller to avoid.
pub struct Scraper {
    fetcher: Box<dyn Fetcher>,
    next_page: Option<Box<dyn Paginator>>,
    divide_page: Box<dyn DividePage>,
    pieces: Vec<CompiledPiece>,
    page_delay: Option<Duration>,
}

impl Scraper {
    /// Validate `config` and build a scraper from it.
    pub fn new(config: ScrapeConfig) -> Result<Self> {
        if config.pieces.is_empty() {
            return Err(Error::NoPieces);
        }

        let mut seen = HashSet::new();
        let mut pieces = Vec::with_capacity(config.pieces.len());

        for (index, mut piece) in config.pieces.into_iter().enumerate() {
            if piece.name.is_empty() {
                return Err(Error::MissingPieceName { index });
            }
            if !seen.insert(piece.name.clone()) {
                return Err(Error::DuplicatePieceName { name: piece.name });
            }
            if piece.selector.is_empty() {
                return Err(Error::MissingSelector { index });
            }

            let selector = if piece.selector == BLOCK_SELECTOR {
                None
            } else {
                Some(parse_selector(&piece.selector)?)
            };

            if config.always_return_lists {
                piece.extractor.prefer_lists();
            }
            piece.extractor.validate()?;

            pieces.push(CompiledPiece {
                name: piece.name,
                selector,
                extractor: piece.extractor,
            });
        }

        let divide_page = match config.divide_page {
            Some(divide_page) => divide_page,
            None => Box::new(DivideBySelector::body()?),
        };

        Ok(Self {
            fetcher: config.fetcher,
            next_page: config.next_page,
            divide_page,
            pieces,
            page_delay: config.page_delay,
        })
    }

    /// Scrape from `url` until the pagination rule runs out of pages.
    ///
    /// The fetcher is prepared before the first fetch and closed afterwards,
    /// whether or not the scrape succeeded.
    pub async fn scrape(&mut self, url: &str) -> Result<ScrapeResults> {
        if url.is_empty() {
            return Err(Error::NoUrl);
        }

        let result = match self.fetcher.prepare().await {
            Ok(()) => self.run(url).await,
            Err(e) => Err(e),
        };
        self.fetcher.close().await;

        result
    }

    async fn run(&self, start: &str) -> Result<ScrapeResults> {
        let mut results = ScrapeResults::default();
        let mut current = Some(start.to_string());

        while let Some(url) = current.take() {
            if !results.urls.is_empty()
                && let Some(delay) = self.page_delay
            {
                tokio::time::sleep(delay).await;
            }

            let number = results.urls.len() + 1;
            info!("Fetching page {}: {}", number, url);
            let body = self.fetcher.fetch("GET", &url).await?;

            // Parsed documents stay inside this synchronous step
            let (blocks, next) = self.process_page(&url, number, &body)?;

            info!("Extracted {} blocks from page {}", blocks.len(), number);
            results.urls.push(url);
            results.results.push(blocks);

            current = next.filter(|next| !next.is_empty());
        }

        info!("Scrape finished after {} pages", results.pages());
        Ok(results)
    }

    fn process_page(
        &self,
        url: &str,
        number: usize,
        body: &[u8],
    ) -> Result<(Vec<BlockResults>, Option<String>)> {
        let text = std::str::from_utf8(body).map_err(|e| Error::Parse {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let html = Html::parse_document(text);
        let document = Selection::document(&html);

        let blocks = self.divide_page.divide(&document);
        let mut page = Vec::with_capacity(blocks.len());
        for (index, block) in blocks.iter().enumerate() {
            page.push(self.extract_block(url, index, block)?);
        }

        let next = match &self.next_page {
            Some(paginator) => paginator.next_page(&Page {
                url,
                number,
                document: &document,
            })?,
            None => None,
        };

        Ok((page, next))
    }

    fn extract_block(
        &self,
        url: &str,
        index: usize,
        block: &Selection<'_>,
    ) -> Result<BlockResults> {
        let mut results = BlockResults::new();

        for piece in &self.pieces {
            let narrowed;
            let selection = match &piece.selector {
                Some(selector) => {
                    narrowed = block.find(selector);
                    &narrowed
                }
                None => block,
            };

            let value = piece
                .extractor
                .extract(selection)
                .map_err(|source| Error::Extract {
                    url: url.to_string(),
                    block: index,
                    piece: piece.name.clone(),
                    source: Box::new(source),
                })?;

            match value {
                Some(value) => {
                    results.insert(piece.name.clone(), value);
                }
                None => debug!("Omitting {} from block {}", piece.name, index),
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::extract::{Attr, Const, Count, OuterHtml, Regex, Text};
    use crate::models::Value;
    use crate::paginate::BySelector;

    /// Serves canned pages and records what happened to it
    #[derive(Default, Clone)]
    struct StaticFetcher {
        pages: HashMap<String, Vec<u8>>,
        fetched: Arc<Mutex<Vec<String>>>,
        prepared: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
        fail_prepare: bool,
    }

    impl StaticFetcher {
        fn page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), body.as_bytes().to_vec());
            self
        }

        fn fetched(&self) -> Vec<String> {
            self.fetched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn prepare(&mut self) -> Result<()> {
            self.prepared.fetch_add(1, Ordering::SeqCst);
            if self.fail_prepare {
                return Err(Error::NotPrepared);
            }
            Ok(())
        }

        async fn fetch(&self, method: &str, url: &str) -> Result<Vec<u8>> {
            assert_eq!(method, "GET");
            self.fetched.lock().unwrap().push(url.to_string());
            self.pages.get(url).cloned().ok_or_else(|| Error::HttpStatus {
                url: url.to_string(),
                status: reqwest::StatusCode::NOT_FOUND,
            })
        }

        async fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Fails on any block whose text contains "boom"
    struct Explosive;

    impl PieceExtractor for Explosive {
        fn extract(&self, selection: &Selection<'_>) -> Result<Option<Value>> {
            if selection.text().contains("boom") {
                return Err(Error::NoAttribute);
            }
            Ok(Some(Value::from("ok")))
        }
    }

    fn listing(items: &[&str], next: Option<&str>) -> String {
        let items: String = items
            .iter()
            .map(|item| format!(r#"<li class="item" data-id="{item}">{item}</li>"#))
            .collect();
        let next = next
            .map(|href| format!(r#"<a class="next" href="{href}">next</a>"#))
            .unwrap_or_default();
        format!("<html><body><ul>{items}</ul>{next}</body></html>")
    }

    fn items_config(fetcher: StaticFetcher) -> ScrapeConfig {
        ScrapeConfig::new(fetcher)
            .divide_page(DivideBySelector::new("li.item").unwrap())
            .next_page(BySelector::new("a.next", "href").unwrap())
            .piece(Piece::new("name", ".", Text))
            .piece(Piece::new("id", ".", Attr::new("data-id")))
    }

    #[tokio::test]
    async fn follows_pagination_in_order() {
        let fetcher = StaticFetcher::default()
            .page("http://site/1", &listing(&["a", "b"], Some("/2")))
            .page("http://site/2", &listing(&["c"], Some("http://site/3")))
            .page("http://site/3", &listing(&["d", "e"], None));
        let probe = fetcher.clone();

        let mut scraper = Scraper::new(items_config(fetcher)).unwrap();
        let results = scraper.scrape("http://site/1").await.unwrap();

        assert_eq!(
            results.urls,
            vec!["http://site/1", "http://site/2", "http://site/3"]
        );
        assert_eq!(results.results.len(), 3);

        let names: Vec<Vec<Value>> = results
            .results
            .iter()
            .map(|page| page.iter().map(|block| block["name"].clone()).collect())
            .collect();
        assert_eq!(
            names,
            vec![
                vec![Value::from("a"), Value::from("b")],
                vec![Value::from("c")],
                vec![Value::from("d"), Value::from("e")],
            ]
        );
        assert_eq!(results.first().unwrap()["id"], Value::from("a"));
        assert_eq!(probe.fetched(), results.urls);
        assert_eq!(probe.prepared.load(Ordering::SeqCst), 1);
        assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn defaults_to_single_page_and_body_block() {
        let fetcher = StaticFetcher::default().page(
            "http://site/",
            &listing(&["a", "b"], Some("http://site/2")),
        );

        let config = ScrapeConfig::new(fetcher).piece(Piece::new("items", "li", Count::default()));
        let mut scraper = Scraper::new(config).unwrap();
        let results = scraper.scrape("http://site/").await.unwrap();

        assert_eq!(results.urls, vec!["http://site/"]);
        assert_eq!(results.results, vec![vec![BlockResults::from([(
            "items".to_string(),
            Value::Count(2)
        )])]]);
    }

    #[tokio::test]
    async fn block_selector_uses_block_unmodified() {
        let fetcher = StaticFetcher::default().page(
            "http://site/",
            r#"<ul><li id="x">a <b>b</b></li></ul>"#,
        );

        let config = ScrapeConfig::new(fetcher)
            .divide_page(DivideBySelector::new("li").unwrap())
            .piece(Piece::new("html", ".", OuterHtml))
            .piece(Piece::new("count", ".", Count::default()));
        let mut scraper = Scraper::new(config).unwrap();
        let results = scraper.scrape("http://site/").await.unwrap();

        let block = results.first().unwrap();
        assert_eq!(block["html"], Value::from(r#"<li id="x">a <b>b</b></li>"#));
        assert_eq!(block["count"], Value::Count(1));
    }

    #[tokio::test]
    async fn omitted_pieces_are_absent_and_later_pieces_still_run() {
        let fetcher = StaticFetcher::default().page("http://site/", &listing(&["a"], None));

        let config = ScrapeConfig::new(fetcher)
            .divide_page(DivideBySelector::new("li").unwrap())
            .piece(Piece::new("link", ".", Attr::new("href").omit_if_empty()))
            .piece(Piece::new("digits", ".", Regex::new(r"(\d+)").unwrap().omit_if_empty()))
            .piece(Piece::new("kind", ".", Const::new("item")));
        let mut scraper = Scraper::new(config).unwrap();
        let results = scraper.scrape("http://site/").await.unwrap();

        let block = results.first().unwrap();
        assert!(!block.contains_key("link"));
        assert!(!block.contains_key("digits"));
        assert_eq!(block["kind"], Value::from("item"));
    }

    #[tokio::test]
    async fn extraction_error_discards_everything() {
        let fetcher = StaticFetcher::default().page(
            "http://site/",
            &listing(&["fine", "boom", "never"], Some("http://site/2")),
        );
        let probe = fetcher.clone();

        let config = ScrapeConfig::new(fetcher)
            .divide_page(DivideBySelector::new("li").unwrap())
            .next_page(BySelector::new("a.next", "href").unwrap())
            .piece(Piece::new("check", ".", Explosive));
        let mut scraper = Scraper::new(config).unwrap();
        let err = scraper.scrape("http://site/").await.unwrap_err();

        match err {
            Error::Extract {
                url, block, piece, ..
            } => {
                assert_eq!(url, "http://site/");
                assert_eq!(block, 1);
                assert_eq!(piece, "check");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(probe.fetched(), vec!["http://site/"]);
        assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_errors_are_returned_verbatim() {
        let fetcher = StaticFetcher::default()
            .page("http://site/1", &listing(&["a"], Some("http://site/missing")));
        let probe = fetcher.clone();

        let mut scraper = Scraper::new(items_config(fetcher)).unwrap();
        let err = scraper.scrape("http://site/1").await.unwrap_err();

        assert!(matches!(err, Error::HttpStatus { ref url, .. } if url == "http://site/missing"));
        assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn prepare_failure_aborts_before_fetching() {
        let fetcher = StaticFetcher {
            fail_prepare: true,
            ..StaticFetcher::default()
        };
        let probe = fetcher.clone();

        let mut scraper = Scraper::new(items_config(fetcher)).unwrap();
        assert!(matches!(
            scraper.scrape("http://site/1").await,
            Err(Error::NotPrepared)
        ));
        assert!(probe.fetched().is_empty());
        assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_utf8_is_a_parse_error() {
        let mut fetcher = StaticFetcher::default();
        fetcher
            .pages
            .insert("http://site/".to_string(), vec![0xff, 0xfe, 0x00]);

        let mut scraper = Scraper::new(items_config(fetcher)).unwrap();
        assert!(matches!(
            scraper.scrape("http://site/").await,
            Err(Error::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn empty_start_url_is_rejected() {
        let mut scraper = Scraper::new(items_config(StaticFetcher::default())).unwrap();
        assert!(matches!(scraper.scrape("").await, Err(Error::NoUrl)));
    }

    #[tokio::test]
    async fn always_return_lists_applies_to_every_piece() {
        let fetcher = StaticFetcher::default().page("http://site/", &listing(&["a"], None));

        let config = ScrapeConfig::new(fetcher)
            .divide_page(DivideBySelector::new("li").unwrap())
            .piece(Piece::new("id", ".", Attr::new("data-id")))
            .always_return_lists();
        let mut scraper = Scraper::new(config).unwrap();
        let results = scraper.scrape("http://site/").await.unwrap();

        assert_eq!(
            results.first().unwrap()["id"],
            Value::List(vec!["a".to_string()])
        );
    }

    #[test]
    fn rejects_invalid_configs() {
        let fetcher = StaticFetcher::default;

        assert!(matches!(
            Scraper::new(ScrapeConfig::new(fetcher())),
            Err(Error::NoPieces)
        ));
        assert!(matches!(
            Scraper::new(ScrapeConfig::new(fetcher()).piece(Piece::new("", "p", Text))),
            Err(Error::MissingPieceName { index: 0 })
        ));
        assert!(matches!(
            Scraper::new(
                ScrapeConfig::new(fetcher())
                    .piece(Piece::new("a", "p", Text))
                    .piece(Piece::new("a", "span", Count::default()))
            ),
            Err(Error::DuplicatePieceName { ref name }) if name == "a"
        ));
        assert!(matches!(
            Scraper::new(ScrapeConfig::new(fetcher()).piece(Piece::new("a", "", Text))),
            Err(Error::MissingSelector { index: 0 })
        ));
        assert!(matches!(
            Scraper::new(ScrapeConfig::new(fetcher()).piece(Piece::new("a", "p[", Text))),
            Err(Error::InvalidSelector { .. })
        ));
        assert!(matches!(
            Scraper::new(
                ScrapeConfig::new(fetcher()).piece(Piece::new("a", "p", Regex::default()))
            ),
            Err(Error::NoRegex)
        ));
        assert!(matches!(
            Scraper::new(ScrapeConfig::new(fetcher()).piece(Piece::new("a", "p", Attr::default()))),
            Err(Error::NoAttribute)
        ));
    }
}
