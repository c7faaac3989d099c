use crate::config::AppConfig;
use crate::models::ListingRecord;
use std::fmt;

/// Why a listing was held back
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    ExcludedKeyword(String),
    MissingIncludeKeyword,
    FreeItemsDisabled,
    BelowMinimum(f64),
    AboveMaximum(f64),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::ExcludedKeyword(k) => write!(f, "free item matches excluded keyword '{}'", k),
            Rejection::MissingIncludeKeyword => write!(f, "free item matches no include keyword"),
            Rejection::FreeItemsDisabled => write!(f, "free items are disabled"),
            Rejection::BelowMinimum(min) => write!(f, "price below minimum {}", min),
            Rejection::AboveMaximum(max) => write!(f, "price above maximum {}", max),
        }
    }
}

/// Price and free-item policy applied to new listings.
///
/// Keyword rules only look at zero-priced listings; they exist to keep
/// free-item floods in check and never touch priced items.
#[derive(Debug, Clone, Default)]
pub struct PriceFilter {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub include_free_items: bool,
    include_keywords: Vec<String>,
    exclude_keywords: Vec<String>,
}

impl PriceFilter {
    pub fn new(
        min_price: Option<f64>,
        max_price: Option<f64>,
        include_free_items: bool,
        include_keywords: &[String],
        exclude_keywords: &[String],
    ) -> Self {
        Self {
            min_price,
            max_price,
            include_free_items,
            include_keywords: lowercase_all(include_keywords),
            exclude_keywords: lowercase_all(exclude_keywords),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.min_price,
            config.max_price,
            config.include_free_items,
            &config.quality_include_keywords,
            &config.quality_exclude_keywords,
        )
    }

    /// First rule the listing breaks, in evaluation order
    pub fn rejection(&self, listing: &ListingRecord) -> Option<Rejection> {
        let price = listing.numeric_price;

        if listing.is_free() {
            let title = listing.title.to_lowercase();

            if let Some(keyword) = self.exclude_keywords.iter().find(|k| title.contains(k.as_str())) {
                return Some(Rejection::ExcludedKeyword(keyword.clone()));
            }
            if !self.include_keywords.is_empty()
                && !self.include_keywords.iter().any(|k| title.contains(k.as_str()))
            {
                return Some(Rejection::MissingIncludeKeyword);
            }
            if !self.include_free_items {
                return Some(Rejection::FreeItemsDisabled);
            }
        }

        match (self.min_price, self.max_price) {
            (Some(min), _) if price < min => Some(Rejection::BelowMinimum(min)),
            (_, Some(max)) if price > max => Some(Rejection::AboveMaximum(max)),
            _ => None,
        }
    }

    pub fn accepts(&self, listing: &ListingRecord) -> bool {
        self.rejection(listing).is_none()
    }
}

fn lowercase_all(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}
