//! Pagination and page division rules

use scraper::Selector;
use url::Url;

use crate::error::Result;
use crate::selection::{Selection, parse_selector};
use crate::traits::{DividePage, Page, Paginator};

/// Follows the attribute of the first element matching a selector, e.g. the
/// `href` of a "next" link. Relative links are resolved against the current
/// page's URL.
#[derive(Debug, Clone)]
pub struct BySelector {
    selector: Selector,
    attr: String,
}

impl BySelector {
    pub fn new(selector: &str, attr: impl Into<String>) -> Result<Self> {
        Ok(Self {
            selector: parse_selector(selector)?,
            attr: attr.into(),
        })
    }
}

impl Paginator for BySelector {
    fn next_page(&self, page: &Page<'_>) -> Result<Option<String>> {
        let Some(href) = page.document.find(&self.selector).attr(&self.attr) else {
            return Ok(None);
        };
        let href = href.trim();
        if href.is_empty() {
            return Ok(None);
        }

        // Keep the raw value if the current URL can't serve as a base
        let next = Url::parse(page.url)
            .and_then(|base| base.join(href))
            .map_or_else(|_| href.to_string(), |url| url.to_string());

        Ok(Some(next))
    }
}

/// Increments an integer query parameter of the current URL, e.g.
/// `?page=1` to `?page=2`. Stops when the parameter is missing or not a number.
#[derive(Debug, Clone)]
pub struct ByQueryParam {
    param: String,
}

impl ByQueryParam {
    pub fn new(param: impl Into<String>) -> Self {
        Self {
            param: param.into(),
        }
    }
}

impl Paginator for ByQueryParam {
    fn next_page(&self, page: &Page<'_>) -> Result<Option<String>> {
        let Ok(mut url) = Url::parse(page.url) else {
            return Ok(None);
        };

        let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let Some((_, value)) = pairs.iter_mut().find(|(key, _)| *key == self.param) else {
            return Ok(None);
        };
        let Ok(current) = value.parse::<i64>() else {
            return Ok(None);
        };
        *value = (current + 1).to_string();

        url.query_pairs_mut().clear().extend_pairs(&pairs);
        Ok(Some(url.to_string()))
    }
}

/// Follows at most `max_pages` next links from the start page, otherwise
/// defers to the wrapped rule. A limit of 0 scrapes only the start page.
pub struct LimitPages {
    max_pages: usize,
    inner: Box<dyn Paginator>,
}

impl LimitPages {
    pub fn new(max_pages: usize, inner: impl Paginator + 'static) -> Self {
        Self {
            max_pages,
            inner: Box::new(inner),
        }
    }
}

impl Paginator for LimitPages {
    fn next_page(&self, page: &Page<'_>) -> Result<Option<String>> {
        if page.number > self.max_pages {
            return Ok(None);
        }
        self.inner.next_page(page)
    }
}

/// Every element matching a selector becomes a block
#[derive(Debug, Clone)]
pub struct DivideBySelector {
    selector: Selector,
}

impl DivideBySelector {
    pub fn new(selector: &str) -> Result<Self> {
        Ok(Self {
            selector: parse_selector(selector)?,
        })
    }

    /// The whole `<body>` as a single block.
    pub fn body() -> Result<Self> {
        Self::new("body")
    }
}

impl DividePage for DivideBySelector {
    fn divide<'a>(&self, document: &Selection<'a>) -> Vec<Selection<'a>> {
        document.find(&self.selector).each().collect()
    }
}
