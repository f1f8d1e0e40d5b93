//! A selection of elements within a parsed document
//!
//! Thin layer over `scraper` giving extractors and page rules a single
//! handle type: narrow by selector, read text or markup, look up attributes,
//! count and iterate elements.

use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};

use crate::error::{Error, Result};

/// Parse a CSS selector, turning the parser's error into a configuration error.
pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| Error::InvalidSelector {
        selector: selector.to_string(),
        reason: format!("{e:?}"),
    })
}

/// An ordered set of elements from one document
#[derive(Debug, Clone, Default)]
pub struct Selection<'a> {
    elements: Vec<ElementRef<'a>>,
    // Page-level searches may match the root element itself
    document: bool,
}

impl<'a> Selection<'a> {
    /// The whole document, rooted at its `<html>` element.
    pub fn document(html: &'a Html) -> Self {
        Self {
            elements: vec![html.root_element()],
            document: true,
        }
    }

    /// Descendants of every element in this selection matching `selector`,
    /// each element appearing once. On a whole document the root element is
    /// matched as well.
    pub fn find(&self, selector: &Selector) -> Self {
        let mut seen = HashSet::new();
        let roots = self
            .elements
            .iter()
            .copied()
            .filter(|el| self.document && selector.matches(el));
        let elements = roots
            .chain(self.elements.iter().flat_map(|el| el.select(selector)))
            .filter(|el| seen.insert(el.id()))
            .collect();

        Self {
            elements,
            document: false,
        }
    }

    /// Combined text of every element.
    pub fn text(&self) -> String {
        self.elements
            .iter()
            .flat_map(|el| el.text())
            .collect()
    }

    /// Serialized contents of every element, concatenated.
    pub fn inner_html(&self) -> String {
        self.elements.iter().map(|el| el.inner_html()).collect()
    }

    /// Serialized markup of every element including its own tag, concatenated.
    pub fn outer_html(&self) -> String {
        self.elements.iter().map(|el| el.html()).collect()
    }

    /// Attribute of the first element.
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.elements.first()?.value().attr(name)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Every element as its own single-element selection.
    pub fn each(&self) -> impl Iterator<Item = Selection<'a>> + '_ {
        self.elements.iter().map(|el| Selection {
            elements: vec![*el],
            document: false,
        })
    }

    pub fn elements(&self) -> &[ElementRef<'a>] {
        &self.elements
    }
}
