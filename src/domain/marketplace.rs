//! Marketplace identifiers and their search endpoints

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Marketplaces the resolution engine knows how to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Marketplace {
    Amazon,
    Walmart,
    Target,
    HomeDepot,
}

impl Marketplace {
    pub const ALL: [Self; 4] = [Self::Amazon, Self::Walmart, Self::Target, Self::HomeDepot];

    /// Wire identifier, also used as cache key prefix
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Amazon => "amazon",
            Self::Walmart => "walmart",
            Self::Target => "target",
            Self::HomeDepot => "homedepot",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Amazon => "Amazon",
            Self::Walmart => "Walmart",
            Self::Target => "Target",
            Self::HomeDepot => "Home Depot",
        }
    }

    /// Host names (without `www.`) serving this marketplace
    pub const fn hosts(self) -> &'static [&'static str] {
        match self {
            Self::Amazon => &["amazon.com", "smile.amazon.com"],
            Self::Walmart => &["walmart.com"],
            Self::Target => &["target.com"],
            Self::HomeDepot => &["homedepot.com"],
        }
    }

    /// Whether a URL host belongs to this marketplace
    pub fn owns_host(self, host: &str) -> bool {
        let host = host.trim_start_matches("www.");
        self.hosts()
            .iter()
            .any(|known| host == *known || host.ends_with(&format!(".{known}")))
    }

    /// Resolve the marketplace serving a URL
    pub fn from_url(url: &Url) -> Option<Self> {
        let host = url.host_str()?;
        Self::ALL.into_iter().find(|m| m.owns_host(host))
    }

    /// Search results URL for a free-text query
    pub fn search_url(self, query: &str) -> Result<Url, url::ParseError> {
        let query = query.trim();
        match self {
            Self::Amazon => Url::parse_with_params("https://www.amazon.com/s", &[("k", query)]),
            Self::Walmart => Url::parse_with_params("https://www.walmart.com/search", &[("q", query)]),
            Self::Target => Url::parse_with_params("https://www.target.com/s", &[("searchTerm", query)]),
            Self::HomeDepot => {
                let mut url = Url::parse("https://www.homedepot.com/s/")?;
                url.path_segments_mut()
                    .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
                    .pop_if_empty()
                    .push(query);
                Ok(url)
            }
        }
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Marketplace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "amazon" => Ok(Self::Amazon),
            "walmart" => Ok(Self::Walmart),
            "target" => Ok(Self::Target),
            "homedepot" => Ok(Self::HomeDepot),
            other => Err(format!("unknown marketplace '{other}'")),
        }
    }
}
