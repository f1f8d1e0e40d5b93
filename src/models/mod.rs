//! Data models for extracted values and scrape results

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A value produced by a piece extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    List(Vec<String>),
    Count(usize),
    /// Arbitrary constant supplied by the caller
    Json(serde_json::Value),
}

impl Value {
    /// Collapse a list of matches into a single string when there is exactly
    /// one of them and lists were not requested.
    pub(crate) fn from_matches(mut matches: Vec<String>, always_list: bool) -> Self {
        if matches.len() == 1 && !always_list {
            Self::Text(matches.remove(0))
        } else {
            Self::List(matches)
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<String>> for Value {
    fn from(list: Vec<String>) -> Self {
        Self::List(list)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Count(n)
    }
}

/// Results of every piece for one block, keyed by piece name.
///
/// Omitted pieces have no entry.
pub type BlockResults = BTreeMap<String, Value>;

/// Everything collected during one scrape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrapeResults {
    /// Every URL visited, in order
    pub urls: Vec<String>,
    /// One entry per visited page, each holding one entry per block
    pub results: Vec<Vec<BlockResults>>,
}

impl ScrapeResults {
    /// The results of the first block on the first page, if there was one.
    pub fn first(&self) -> Option<&BlockResults> {
        self.results.first()?.first()
    }

    /// Number of pages visited.
    pub fn pages(&self) -> usize {
        self.urls.len()
    }
}
