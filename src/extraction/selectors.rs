//! Ordered CSS selector fallback chains
//!
//! Marketplace front-ends serve different markup per experiment cohort. A chain
//! lists selectors newest layout first, legacy last, and evaluation stops at
//! the first selector producing a usable result. Results are never merged.

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use super::ExtractionError;

/// Compiled selectors evaluated lazily in priority order
#[derive(Debug, Clone)]
pub struct SelectorChain {
    name: &'static str,
    entries: Vec<(&'static str, Selector)>,
}

impl SelectorChain {
    /// Compile a chain, skipping selectors that fail to parse.
    /// Fails only when nothing in the chain compiles.
    pub fn compile(name: &'static str, selectors: &[&'static str]) -> Result<Self, ExtractionError> {
        let mut entries = Vec::with_capacity(selectors.len());
        let mut errors = Vec::new();

        for raw in selectors {
            match Selector::parse(raw) {
                Ok(selector) => entries.push((*raw, selector)),
                Err(e) => {
                    warn!("Failed to compile selector '{}' in chain '{}': {}", raw, name, e);
                    errors.push(format!("'{raw}': {e}"));
                }
            }
        }

        if entries.is_empty() {
            return Err(ExtractionError::NoValidSelectors {
                chain: name.to_string(),
                errors: errors.join(", "),
            });
        }

        Ok(Self { name, entries })
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Document-level query: the element set of the first selector matching anything
    pub fn select_first_non_empty<'a>(&self, document: &'a Html) -> Option<Vec<ElementRef<'a>>> {
        self.entries.iter().find_map(|(raw, selector)| {
            let found: Vec<ElementRef<'a>> = document.select(selector).collect();
            if found.is_empty() {
                None
            } else {
                debug!("Chain '{}' matched {} elements with '{}'", self.name, found.len(), raw);
                Some(found)
            }
        })
    }

    /// Whether any selector in the chain matches the document
    pub fn matches_document(&self, document: &Html) -> bool {
        self.entries
            .iter()
            .any(|(_, selector)| document.select(selector).next().is_some())
    }

    /// First descendant matched by the highest-priority selector that matches at all
    pub fn first_within<'a>(&self, element: ElementRef<'a>) -> Option<ElementRef<'a>> {
        self.entries
            .iter()
            .find_map(|(_, selector)| element.select(selector).next())
    }

    /// Normalized text of the first match with non-empty text
    pub fn text_within(&self, element: ElementRef<'_>) -> Option<String> {
        self.entries.iter().find_map(|(_, selector)| {
            element
                .select(selector)
                .map(element_text)
                .find(|text| !text.is_empty())
        })
    }

    /// Trimmed text nodes of the first match that has any
    pub fn text_nodes_within(&self, element: ElementRef<'_>) -> Option<Vec<String>> {
        self.entries.iter().find_map(|(_, selector)| {
            element.select(selector).map(text_nodes).find(|nodes| !nodes.is_empty())
        })
    }

    /// First non-empty value of any of `attrs` on a match
    pub fn attr_within(&self, element: ElementRef<'_>, attrs: &[&str]) -> Option<String> {
        self.entries.iter().find_map(|(_, selector)| {
            element.select(selector).find_map(|found| {
                attrs.iter().find_map(|attr| {
                    found
                        .value()
                        .attr(attr)
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .map(str::to_string)
                })
            })
        })
    }
}

/// Element text with whitespace runs collapsed to single spaces
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Non-empty trimmed text nodes, in document order
pub fn text_nodes(element: ElementRef<'_>) -> Vec<String> {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Attribute on the element itself, trimmed and non-empty
pub fn own_attr(element: ElementRef<'_>, attr: &str) -> Option<String> {
    element
        .value()
        .attr(attr)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
