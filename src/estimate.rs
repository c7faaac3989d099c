use crate::models::parse_price;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, warn};

pub const NOT_AVAILABLE: &str = "n/a";
const CURRENCY: &str = "$";
/// Expected resale as a share of the asking (or category average) price
const RESALE_RATIO: f64 = 0.5;

/// Resale value estimator backed by per-category average prices
#[derive(Debug, Clone, Default)]
pub struct Estimator {
    /// Category name and its average price, in file order
    categories: Vec<(String, Option<f64>)>,
}

impl Estimator {
    pub fn new(categories: Vec<(String, Option<f64>)>) -> Self {
        Self { categories }
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        Self::new(pairs.into_iter().map(|(k, v)| (k.to_string(), Some(v))).collect())
    }

    /// Read the category average mapping; anything unreadable means no fallback data
    pub async fn load(path: &Path) -> Self {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No category averages at {}", path.display());
                return Self::default();
            }
            Err(e) => {
                warn!("Could not read category averages {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_str::<Map<String, Value>>(&content) {
            Ok(map) => {
                let categories: Vec<_> = map.into_iter().map(|(k, v)| (k, v.as_f64())).collect();
                debug!("Loaded {} category averages", categories.len());
                Self::new(categories)
            }
            Err(e) => {
                warn!("Could not parse category averages {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Estimated resale value as display text, or `"n/a"`.
    ///
    /// Priced listings use their own price. Free or unpriced listings fall back
    /// to the first category with a name token found in the title. The
    /// description takes no part in matching.
    pub fn estimate(&self, price_text: &str, title: &str, _description: &str) -> String {
        let price = parse_price(price_text);
        if price > 0.0 {
            return format_value(price * RESALE_RATIO);
        }

        match self.category_average(title) {
            Some(avg) if avg.is_finite() && avg > 0.0 => format_value(avg * RESALE_RATIO),
            _ => NOT_AVAILABLE.to_string(),
        }
    }

    /// Average of the first matching category. A match with no usable number
    /// still ends the search.
    fn category_average(&self, title: &str) -> Option<f64> {
        let title = title.to_lowercase();

        self.categories
            .iter()
            .find(|(name, _)| {
                name.split(['/', '>'])
                    .map(|token| token.trim().to_lowercase())
                    .any(|token| !token.is_empty() && title.contains(&token))
            })
            .and_then(|(_, avg)| *avg)
    }
}

fn format_value(value: f64) -> String {
    format!("{}{:.2}", CURRENCY, value)
}
