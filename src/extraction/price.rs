//! Price text parsing
//!
//! Three on-page encodings are accepted:
//! - one text node with currency symbol and decimals (`"$23.94"`, `"$1,299.00"`)
//! - the price split over sibling nodes (`"$"`, `"23"`, `"94"`)
//! - a bare digit blob (`"2394"`), which needs a guessed decimal point
//!
//! The blob case is a heuristic. `2394` becomes `23.94`, but so does a genuine
//! `$999` rendered as `999` become `9.99`. Parses from that path carry
//! [`PriceConfidence::Heuristic`] so callers can tell them apart.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

pub use crate::domain::PriceConfidence;

static PRICE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:[$£€]|USD)\s*(\d{1,3}(?:,\d{3})+|\d+)(?:\.(\d{1,2}))?|(\d{1,3}(?:,\d{3})+|\d+)\.(\d{2})\b")
        .unwrap_or_else(|e| panic!("invalid price regex: {e}"))
});

static SHIPPING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\$\s*(\d+(?:\.\d{1,2})?)\s*(?:shipping|delivery)")
        .unwrap_or_else(|e| panic!("invalid shipping regex: {e}"))
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceParse {
    pub value: Decimal,
    pub confidence: PriceConfidence,
}

impl PriceParse {
    const fn exact(value: Decimal) -> Self {
        Self {
            value,
            confidence: PriceConfidence::Exact,
        }
    }
}

/// Parse the first price found in a text node
pub fn parse_price_text(text: &str) -> Option<PriceParse> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text.chars().all(|c| c.is_ascii_digit()) {
        return parse_price_blob(text);
    }

    let caps = PRICE_RE.captures(text)?;
    let (whole, fraction) = match (caps.get(1), caps.get(3)) {
        (Some(whole), _) => (whole.as_str(), caps.get(2).map(|m| m.as_str())),
        (None, Some(whole)) => (whole.as_str(), caps.get(4).map(|m| m.as_str())),
        (None, None) => return None,
    };
    compose(whole, fraction).map(PriceParse::exact)
}

/// Parse a price whose parts sit in separate sibling nodes
pub fn parse_split_price<S: AsRef<str>>(parts: &[S]) -> Option<PriceParse> {
    let groups: Vec<String> = parts
        .iter()
        .map(|p| p.as_ref().chars().filter(|c| c.is_ascii_digit() || *c == ',').collect::<String>())
        .filter(|g| g.chars().any(|c| c.is_ascii_digit()))
        .collect();

    match groups.as_slice() {
        [] => None,
        [single] => {
            let joined: String = parts.iter().map(|p| p.as_ref()).collect::<Vec<&str>>().concat();
            if joined.contains('.') || joined.contains('$') {
                parse_price_text(&joined)
            } else {
                parse_price_blob(single)
            }
        }
        [whole, fraction, ..] if fraction.len() <= 2 && !fraction.contains(',') => {
            compose(whole, Some(fraction)).map(PriceParse::exact)
        }
        [whole, ..] => compose(whole, None).map(PriceParse::exact),
    }
}

/// Guess the decimal point in a bare digit blob: three or more digits are read
/// as cents, shorter blobs as whole units
pub fn parse_price_blob(blob: &str) -> Option<PriceParse> {
    let digits: String = blob.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    let value = if digits.len() >= 3 {
        let (whole, cents) = digits.split_at(digits.len() - 2);
        compose(whole, Some(cents))?
    } else {
        compose(&digits, None)?
    };
    Some(PriceParse {
        value,
        confidence: PriceConfidence::Heuristic,
    })
}

/// Parse the price carried by a set of text nodes from one price element
pub fn parse_price_nodes<S: AsRef<str>>(nodes: &[S]) -> Option<PriceParse> {
    match nodes {
        [] => None,
        [single] => parse_price_text(single.as_ref()),
        _ => {
            let joined = nodes.iter().map(|n| n.as_ref()).collect::<Vec<&str>>().concat();
            if joined.contains('.') {
                parse_price_text(&joined).or_else(|| parse_split_price(nodes))
            } else {
                parse_split_price(nodes)
            }
        }
    }
}

/// Shipping cost mentioned in a fulfillment line; "free" reads as zero
pub fn parse_shipping_text(text: &str) -> Option<Decimal> {
    if let Some(caps) = SHIPPING_RE.captures(text) {
        return caps.get(1).and_then(|m| Decimal::from_str(m.as_str()).ok());
    }
    let lower = text.to_lowercase();
    if lower.contains("free shipping") || lower.contains("free delivery") {
        return Some(Decimal::ZERO);
    }
    None
}

fn compose(whole: &str, fraction: Option<&str>) -> Option<Decimal> {
    let whole = whole.replace(',', "");
    if whole.is_empty() {
        return None;
    }
    let literal = match fraction {
        Some(f) if !f.is_empty() => format!("{whole}.{f:0<2}"),
        _ => whole,
    };
    Decimal::from_str(&literal).ok()
}
