//! Field extraction from rendered listing markup.
//!
//! A field is described by a [`FieldSpec`]: an ordered list of [`Strategy`]
//! values tried in turn until one yields non-empty text. Reordering or adding
//! fallbacks is a change to the `FieldSpec` tables in `sources`, not to this code.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::model::RawRecord;

#[derive(Debug, Clone, Copy)]
pub enum Strategy {
    /// Text of the row element itself.
    OwnText,
    /// Text of the first descendant matching a CSS selector.
    Text(&'static str),
    /// Text of the `index`-th (0-based) descendant matching a CSS selector.
    Nth {
        selector: &'static str,
        index: usize,
    },
    /// `href` of the first matching descendant, resolved against the page URL.
    Link(&'static str),
    /// Shortest descendant text that contains one of the keywords.
    Keywords {
        selector: &'static str,
        vocabulary: &'static [&'static str],
    },
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub strategies: &'static [Strategy],
}

impl Strategy {
    fn apply(&self, row: ElementRef<'_>, base: &Url) -> Option<String> {
        let value = match *self {
            Self::OwnText => element_text(row),
            Self::Text(selector) => row.select(&parse(selector)?).next().map(element_text)?,
            Self::Nth { selector, index } => {
                row.select(&parse(selector)?).nth(index).map(element_text)?
            }
            Self::Link(selector) => row
                .select(&parse(selector)?)
                .find_map(|el| resolve_href(el, base))?,
            Self::Keywords {
                selector,
                vocabulary,
            } => row
                .select(&parse(selector)?)
                .map(element_text)
                .filter(|text| vocabulary.iter().any(|word| text.contains(word)))
                .min_by_key(|text| text.len())?,
        };
        (!value.is_empty()).then_some(value)
    }
}

impl FieldSpec {
    /// First non-empty strategy result, or the empty string.
    pub fn extract(&self, row: ElementRef<'_>, base: &Url) -> String {
        for strategy in self.strategies {
            if let Some(value) = strategy.apply(row, base) {
                return value;
            }
            tracing::trace!(field = self.name, ?strategy, "strategy yielded nothing");
        }
        String::new()
    }
}

/// Applies every spec to `row`, storing each result (possibly empty).
pub fn extract_fields(
    row: ElementRef<'_>,
    specs: &[FieldSpec],
    base: &Url,
    out: &mut RawRecord,
) {
    for spec in specs {
        out.set(spec.name, spec.extract(row, base));
    }
}

/// Elements matched by the first selector in `cascade` that matches anything.
pub fn select_rows<'a>(document: &'a Html, cascade: &[&str]) -> Vec<ElementRef<'a>> {
    for selector in cascade {
        let Some(parsed) = parse(selector) else {
            continue;
        };
        let rows = document.select(&parsed).collect::<Vec<_>>();
        if !rows.is_empty() {
            tracing::debug!(selector, rows = rows.len(), "row selector matched");
            return rows;
        }
    }
    Vec::new()
}

/// Whitespace-collapsed text content.
pub fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn resolve_href(el: ElementRef<'_>, base: &Url) -> Option<String> {
    let href = el.value().attr("href")?.trim();
    if href.is_empty() || href.starts_with("javascript:") {
        return None;
    }
    base.join(href).ok().map(String::from)
}

fn parse(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            tracing::debug!(selector, %err, "invalid selector");
            None
        }
    }
}
