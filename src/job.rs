//! Declarative scrape jobs
//!
//! A job is a JSON description of a scrape: where to start, how to divide and
//! paginate pages, and which pieces to extract. It is turned into a
//! [`ScrapeConfig`] for a given fetcher.
//!
//! ```json
//! {
//!   "start_url": "https://news.ycombinator.com",
//!   "blocks": "tr.athing",
//!   "next_page": { "by": "selector", "selector": "a.morelink", "max_pages": 3 },
//!   "pieces": [
//!     { "name": "title", "selector": "span.titleline > a", "extract": { "kind": "text" } },
//!     { "name": "link", "selector": "span.titleline > a", "extract": { "kind": "attr", "attr": "href" } },
//!     { "name": "rank", "selector": "span.rank", "extract": { "kind": "regex", "pattern": "(\\d+)" } }
//!   ]
//! }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::extract::{Attr, Const, Count, InnerHtml, MultipleText, OuterHtml, Regex, Text};
use crate::models::Value;
use crate::paginate::{ByQueryParam, BySelector, DivideBySelector, LimitPages};
use crate::scraper::{BLOCK_SELECTOR, Piece, ScrapeConfig};
use crate::traits::{Fetcher, Paginator, PieceExtractor};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub start_url: String,
    /// Selector for blocks; the page body when absent
    #[serde(default)]
    pub blocks: Option<String>,
    #[serde(default)]
    pub next_page: Option<NextPageSpec>,
    pub pieces: Vec<PieceSpec>,
    #[serde(default)]
    pub page_delay_ms: Option<u64>,
    #[serde(default)]
    pub always_return_lists: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextPageSpec {
    #[serde(flatten)]
    pub rule: PaginationRule,
    /// Follow at most this many next links after the start page
    #[serde(default)]
    pub max_pages: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum PaginationRule {
    Selector {
        selector: String,
        #[serde(default = "default_link_attr")]
        attr: String,
    },
    QueryParam {
        param: String,
    },
}

fn default_link_attr() -> String {
    "href".to_string()
}

fn default_piece_selector() -> String {
    BLOCK_SELECTOR.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PieceSpec {
    pub name: String,
    #[serde(default = "default_piece_selector")]
    pub selector: String,
    pub extract: ExtractorSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractorSpec {
    Const {
        value: serde_json::Value,
    },
    Text,
    MultipleText {
        #[serde(default)]
        omit_if_empty: bool,
    },
    InnerHtml,
    OuterHtml,
    Regex {
        pattern: String,
        #[serde(default)]
        group: Option<usize>,
        #[serde(default)]
        only_text: bool,
        #[serde(default)]
        always_return_list: bool,
        #[serde(default)]
        omit_if_empty: bool,
    },
    Attr {
        attr: String,
        #[serde(default)]
        always_return_list: bool,
        #[serde(default)]
        omit_if_empty: bool,
    },
    Count {
        #[serde(default)]
        omit_if_empty: bool,
    },
}

impl ExtractorSpec {
    pub fn build(self) -> Result<Box<dyn PieceExtractor>> {
        let extractor: Box<dyn PieceExtractor> = match self {
            Self::Const { value } => Box::new(Const::new(Value::Json(value))),
            Self::Text => Box::new(Text),
            Self::MultipleText { omit_if_empty } => Box::new(MultipleText { omit_if_empty }),
            Self::InnerHtml => Box::new(InnerHtml),
            Self::OuterHtml => Box::new(OuterHtml),
            Self::Regex {
                pattern,
                group,
                only_text,
                always_return_list,
                omit_if_empty,
            } => Box::new(Regex {
                regex: Some(regex::Regex::new(&pattern)?),
                group,
                only_text,
                always_return_list,
                omit_if_empty,
            }),
            Self::Attr {
                attr,
                always_return_list,
                omit_if_empty,
            } => Box::new(Attr {
                attr,
                always_return_list,
                omit_if_empty,
            }),
            Self::Count { omit_if_empty } => Box::new(Count { omit_if_empty }),
        };
        Ok(extractor)
    }
}

impl NextPageSpec {
    pub fn build(self) -> Result<Box<dyn Paginator>> {
        let rule: Box<dyn Paginator> = match self.rule {
            PaginationRule::Selector { selector, attr } => {
                Box::new(BySelector::new(&selector, attr)?)
            }
            PaginationRule::QueryParam { param } => Box::new(ByQueryParam::new(param)),
        };

        Ok(match self.max_pages {
            Some(max_pages) => Box::new(LimitPages::new(max_pages, rule)),
            None => rule,
        })
    }
}

impl Job {
    /// Build a scrape configuration that fetches with `fetcher`.
    pub fn into_config(self, fetcher: impl Fetcher + 'static) -> Result<ScrapeConfig> {
        let mut config = ScrapeConfig::new(fetcher);

        if let Some(blocks) = &self.blocks {
            config = config.divide_page(DivideBySelector::new(blocks)?);
        }
        if let Some(next_page) = self.next_page {
            config = config.next_page(next_page.build()?);
        }
        if let Some(ms) = self.page_delay_ms {
            config = config.page_delay(Duration::from_millis(ms));
        }
        if self.always_return_lists {
            config = config.always_return_lists();
        }

        for piece in self.pieces {
            config = config.piece(Piece {
                name: piece.name,
                selector: piece.selector,
                extractor: piece.extract.build()?,
            });
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::fetch::HttpFetcher;
    use crate::scraper::Scraper;

    const HN: &str = r#"{
        "start_url": "https://news.ycombinator.com",
        "blocks": "tr.athing",
        "next_page": { "by": "selector", "selector": "a.morelink", "max_pages": 3 },
        "page_delay_ms": 500,
        "pieces": [
            { "name": "title", "selector": "span.titleline > a", "extract": { "kind": "text" } },
            { "name": "link", "selector": "span.titleline > a", "extract": { "kind": "attr", "attr": "href" } },
            { "name": "rank", "selector": "span.rank", "extract": { "kind": "regex", "pattern": "(\\d+)" } },
            { "name": "source", "extract": { "kind": "const", "value": "hn" } }
        ]
    }"#;

    #[test]
    fn parses_job_with_defaults() {
        let job: Job = serde_json::from_str(HN).unwrap();

        assert_eq!(job.blocks.as_deref(), Some("tr.athing"));
        assert_eq!(job.pieces.len(), 4);
        assert_eq!(job.pieces[3].selector, ".");
        assert!(!job.always_return_lists);

        let next_page = job.next_page.unwrap();
        assert_eq!(next_page.max_pages, Some(3));
        match next_page.rule {
            PaginationRule::Selector { selector, attr } => {
                assert_eq!(selector, "a.morelink");
                assert_eq!(attr, "href");
            }
            other => panic!("unexpected rule: {other:?}"),
        }
    }

    #[test]
    fn builds_a_valid_scraper() {
        let job: Job = serde_json::from_str(HN).unwrap();
        let config = job.into_config(HttpFetcher::new().unwrap()).unwrap();
        assert!(Scraper::new(config).is_ok());
    }

    #[test]
    fn bad_regex_is_a_config_error() {
        let spec: ExtractorSpec =
            serde_json::from_str(r#"{ "kind": "regex", "pattern": "(" }"#).unwrap();
        assert!(matches!(spec.build(), Err(Error::InvalidRegex(_))));
    }

    #[test]
    fn query_param_pagination() {
        let spec: NextPageSpec =
            serde_json::from_str(r#"{ "by": "query_param", "param": "page" }"#).unwrap();
        assert!(spec.max_pages.is_none());
        assert!(spec.build().is_ok());
    }
}
