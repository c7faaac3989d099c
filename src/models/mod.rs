use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical item URL; the listing id is the only variable part
const LISTING_URL_PREFIX: &str = "https://www.facebook.com/marketplace/item/";

pub const UNTITLED: &str = "Untitled";
pub const UNKNOWN_PRICE: &str = "Unknown";

/// A search-result node as it appears in the marketplace feed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawNode {
    #[serde(default)]
    pub listing: Option<RawListing>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawListing {
    /// The feed carries ids as strings, but numbers have been observed too
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub marketplace_listing_title: Option<String>,
    #[serde(default)]
    pub listing_price: Option<RawPrice>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPrice {
    #[serde(default)]
    pub formatted_amount: Option<String>,
}

/// Data pulled from a listing's own page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingDetail {
    pub description: String,
    pub image: String,
}

/// Core listing data model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub id: String,
    pub title: String,
    pub price_text: String,
    pub numeric_price: f64,
    pub link: String,
    pub description: String,
    pub image: String,
    pub estimate: Option<String>,
}

impl ListingRecord {
    /// Build a record from its displayed fields, deriving price and link
    pub fn new(id: impl Into<String>, title: impl Into<String>, price_text: impl Into<String>) -> Self {
        let id = id.into();
        let price_text = price_text.into();
        Self {
            link: listing_link(&id),
            numeric_price: parse_price(&price_text),
            id,
            title: title.into(),
            price_text,
            description: String::new(),
            image: String::new(),
            estimate: None,
        }
    }

    pub fn is_free(&self) -> bool {
        self.numeric_price == 0.0
    }

    pub fn apply_detail(&mut self, detail: ListingDetail) {
        self.description = detail.description;
        self.image = detail.image;
    }
}

pub fn listing_link(id: &str) -> String {
    format!("{}{}/", LISTING_URL_PREFIX, id)
}

/// Numeric value of a displayed price.
///
/// Everything but digits and dots is dropped, then the leading number is
/// read (up to a second dot). No leading number counts as 0.
pub fn parse_price(text: &str) -> f64 {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    let end = cleaned
        .match_indices('.')
        .nth(1)
        .map(|(i, _)| i)
        .unwrap_or(cleaned.len());

    match cleaned[..end].parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

/// Turn a feed node into a listing, or `None` when it has no usable id
pub fn normalize(node: &RawNode) -> Option<ListingRecord> {
    let listing = node.listing.as_ref()?;

    let id = match listing.id.as_ref()? {
        Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    let title = listing
        .marketplace_listing_title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(UNTITLED);

    let price = listing
        .listing_price
        .as_ref()
        .and_then(|p| p.formatted_amount.as_deref())
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(UNKNOWN_PRICE);

    Some(ListingRecord::new(id, title, price))
}
