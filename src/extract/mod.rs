//! Piece extractors
//!
//! Each extractor is a small value type holding only its own configuration.
//! None of them mutate the selection they are given.

use crate::error::{Error, Result};
use crate::models::Value;
use crate::selection::Selection;
use crate::traits::PieceExtractor;

/// Returns a fixed value whatever the selection holds
#[derive(Debug, Clone)]
pub struct Const {
    pub value: Value,
}

impl Const {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl PieceExtractor for Const {
    fn extract(&self, _selection: &Selection<'_>) -> Result<Option<Value>> {
        Ok(Some(self.value.clone()))
    }
}

/// Combined text of every element in the selection
#[derive(Debug, Clone, Copy, Default)]
pub struct Text;

impl PieceExtractor for Text {
    fn extract(&self, selection: &Selection<'_>) -> Result<Option<Value>> {
        Ok(Some(Value::Text(selection.text())))
    }
}

/// Text of each element, as a list
#[derive(Debug, Clone, Copy, Default)]
pub struct MultipleText {
    /// Omit the piece instead of returning an empty list
    pub omit_if_empty: bool,
}

impl PieceExtractor for MultipleText {
    fn extract(&self, selection: &Selection<'_>) -> Result<Option<Value>> {
        let texts: Vec<String> = selection.each().map(|el| el.text()).collect();

        if texts.is_empty() && self.omit_if_empty {
            return Ok(None);
        }

        Ok(Some(Value::List(texts)))
    }
}

/// Inner HTML of each element, joined together.
///
/// A selection of `<p><b>ONE</b></p>` and `<p><i>TWO</i></p>` gives
/// `<b>ONE</b><i>TWO</i>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InnerHtml;

impl PieceExtractor for InnerHtml {
    fn extract(&self, selection: &Selection<'_>) -> Result<Option<Value>> {
        Ok(Some(Value::Text(selection.inner_html())))
    }
}

/// Markup of each element including its own tag, joined together.
#[derive(Debug, Clone, Copy, Default)]
pub struct OuterHtml;

impl PieceExtractor for OuterHtml {
    fn extract(&self, selection: &Selection<'_>) -> Result<Option<Value>> {
        Ok(Some(Value::Text(selection.outer_html())))
    }
}

/// Runs a regex over each element and collects one capturing group from
/// every match.
///
/// A single match is returned as a bare string unless `always_return_list`
/// is set.
#[derive(Debug, Clone, Default)]
pub struct Regex {
    pub regex: Option<regex::Regex>,
    /// Group to extract. Required when the regex has more than one group.
    pub group: Option<usize>,
    /// Match against each element's text instead of its inner HTML
    pub only_text: bool,
    pub always_return_list: bool,
    pub omit_if_empty: bool,
}

impl Regex {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            regex: Some(regex::Regex::new(pattern)?),
            ..Self::default()
        })
    }

    pub fn group(mut self, group: usize) -> Self {
        self.group = Some(group);
        self
    }

    pub fn only_text(mut self) -> Self {
        self.only_text = true;
        self
    }

    pub fn always_return_list(mut self) -> Self {
        self.always_return_list = true;
        self
    }

    pub fn omit_if_empty(mut self) -> Self {
        self.omit_if_empty = true;
        self
    }

    fn resolve(&self) -> Result<(&regex::Regex, usize)> {
        let regex = self.regex.as_ref().ok_or(Error::NoRegex)?;
        // captures_len counts the implicit whole-match group
        let groups = regex.captures_len() - 1;

        if groups == 0 {
            return Err(Error::RegexWithoutGroups);
        }

        let group = match self.group {
            Some(group) if group == 0 || group > groups => {
                return Err(Error::RegexGroupOutOfRange { group, groups });
            }
            Some(group) => group,
            None if groups == 1 => 1,
            None => return Err(Error::AmbiguousRegexGroup { groups }),
        };

        Ok((regex, group))
    }
}

impl PieceExtractor for Regex {
    fn extract(&self, selection: &Selection<'_>) -> Result<Option<Value>> {
        let (regex, group) = self.resolve()?;

        let mut results = Vec::new();
        for el in selection.each() {
            let contents = if self.only_text {
                el.text()
            } else {
                el.inner_html()
            };

            for caps in regex.captures_iter(&contents) {
                results.push(caps.get(group).map_or("", |m| m.as_str()).to_string());
            }
        }

        if results.is_empty() && self.omit_if_empty {
            return Ok(None);
        }

        Ok(Some(Value::from_matches(results, self.always_return_list)))
    }

    fn validate(&self) -> Result<()> {
        self.resolve().map(|_| ())
    }

    fn prefer_lists(&mut self) {
        self.always_return_list = true;
    }
}

/// Value of an attribute on each element that has it.
///
/// Same collapsing and omission rules as [`Regex`].
#[derive(Debug, Clone, Default)]
pub struct Attr {
    pub attr: String,
    pub always_return_list: bool,
    pub omit_if_empty: bool,
}

impl Attr {
    pub fn new(attr: impl Into<String>) -> Self {
        Self {
            attr: attr.into(),
            ..Self::default()
        }
    }

    pub fn always_return_list(mut self) -> Self {
        self.always_return_list = true;
        self
    }

    pub fn omit_if_empty(mut self) -> Self {
        self.omit_if_empty = true;
        self
    }
}

impl PieceExtractor for Attr {
    fn extract(&self, selection: &Selection<'_>) -> Result<Option<Value>> {
        self.validate()?;

        let results: Vec<String> = selection
            .elements()
            .iter()
            .filter_map(|el| el.value().attr(&self.attr))
            .map(str::to_string)
            .collect();

        if results.is_empty() && self.omit_if_empty {
            return Ok(None);
        }

        Ok(Some(Value::from_matches(results, self.always_return_list)))
    }

    fn validate(&self) -> Result<()> {
        if self.attr.is_empty() {
            return Err(Error::NoAttribute);
        }
        Ok(())
    }

    fn prefer_lists(&mut self) {
        self.always_return_list = true;
    }
}

/// Number of elements in the selection
#[derive(Debug, Clone, Copy, Default)]
pub struct Count {
    pub omit_if_empty: bool,
}

impl PieceExtractor for Count {
    fn extract(&self, selection: &Selection<'_>) -> Result<Option<Value>> {
        let count = selection.len();
        if count == 0 && self.omit_if_empty {
            return Ok(None);
        }

        Ok(Some(Value::Count(count)))
    }
}
