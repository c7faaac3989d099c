use crate::config::{AppConfig, SortBy};
use anyhow::{Context, Result};
use reqwest::Url;

const SEARCH_BASE: &str = "https://www.facebook.com/marketplace/";

/// Search parameters for one term
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub term: String,
    /// City slug or numeric place id
    pub location_ref: String,
    pub days_since_listed: u32,
    pub sort_by: SortBy,
    pub exact: bool,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

impl SearchQuery {
    pub fn from_config(config: &AppConfig, term: &str) -> Self {
        Self {
            term: term.to_string(),
            location_ref: config.location_ref.clone(),
            days_since_listed: config.days_since_listed,
            sort_by: config.sort_by,
            exact: config.exact,
            min_price: config.min_price,
            max_price: config.max_price,
        }
    }

    pub fn url(&self) -> Result<Url> {
        let base = format!("{}{}/search", SEARCH_BASE, self.location_ref.trim_matches('/'));
        let mut url = Url::parse(&base).with_context(|| format!("Invalid search URL {}", base))?;

        {
            let mut params = url.query_pairs_mut();
            params
                .append_pair("query", &self.term)
                .append_pair("daysSinceListed", &self.days_since_listed.to_string())
                .append_pair("sortBy", self.sort_by.as_param())
                .append_pair("exact", if self.exact { "true" } else { "false" });
            if let Some(min) = self.min_price {
                params.append_pair("minPrice", &whole_units(min.floor()));
            }
            if let Some(max) = self.max_price {
                params.append_pair("maxPrice", &whole_units(max.ceil()));
            }
        }
        Ok(url)
    }
}

/// The search page only takes whole currency units; bounds are widened so
/// the local price filter stays the one that decides
fn whole_units(value: f64) -> String {
    format!("{}", value as u64)
}
