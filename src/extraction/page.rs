//! A loaded marketplace page

use scraper::Html;
use url::Url;

use crate::domain::Marketplace;

/// Raw HTML of a page together with the URL it was loaded from.
///
/// The parsed DOM is not stored: `scraper::Html` is not `Send`, so callers
/// parse on demand inside synchronous extraction steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub url: Url,
    pub html: String,
}

impl Page {
    pub const fn new(url: Url, html: String) -> Self {
        Self { url, html }
    }

    pub fn parse(url: &str, html: impl Into<String>) -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(url)?, html.into()))
    }

    pub fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }

    pub fn marketplace(&self) -> Option<Marketplace> {
        Marketplace::from_url(&self.url)
    }

    /// Resolve a possibly relative link against this page's URL
    pub fn resolve(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with("javascript:") || href == "#" {
            return None;
        }
        self.url.join(href).ok().map(String::from)
    }

    /// Value of a query parameter on the page URL
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}
