//! Runtime configuration.
//!
//! Loaded once from a JSON file and handed to the pipeline as a value.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Feed ordering understood by the marketplace search page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    BestMatch,
    PriceAscend,
    PriceDescend,
    CreationTimeDescend,
    DistanceAscend,
}

impl SortBy {
    pub fn as_param(&self) -> &'static str {
        match self {
            SortBy::BestMatch => "best_match",
            SortBy::PriceAscend => "price_ascend",
            SortBy::PriceDescend => "price_descend",
            SortBy::CreationTimeDescend => "creation_time_descend",
            SortBy::DistanceAscend => "distance_ascend",
        }
    }
}

/// Hour range during which notifications go out immediately
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveHours {
    pub start: u32,
    pub end: u32,
}

impl ActiveHours {
    /// Inclusive on both ends; a start after the end wraps past midnight
    pub fn contains(&self, hour: u32) -> bool {
        if self.start <= self.end {
            self.start <= hour && hour <= self.end
        } else {
            hour >= self.start || hour <= self.end
        }
    }
}

impl Default for ActiveHours {
    fn default() -> Self {
        Self { start: 8, end: 22 }
    }
}

/// Outgoing mail settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailConfig {
    pub from: String,
    /// HTTP mail API; messages are only logged when unset
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_mail_timeout")]
    pub timeout_secs: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: "market-watch@localhost".to_string(),
            endpoint: None,
            api_key: None,
            timeout_secs: default_mail_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePaths {
    #[serde(default = "default_seen_path")]
    pub seen_ids: PathBuf,
    #[serde(default = "default_buffer_path")]
    pub notification_buffer: PathBuf,
    #[serde(default = "default_categories_path")]
    pub category_averages: PathBuf,
}

impl Default for StatePaths {
    fn default() -> Self {
        Self {
            seen_ids: default_seen_path(),
            notification_buffer: default_buffer_path(),
            category_averages: default_categories_path(),
        }
    }
}

impl StatePaths {
    /// Resolve relative paths against `base`
    pub fn rooted_at(&self, base: &Path) -> Self {
        let join = |p: &PathBuf| if p.is_absolute() { p.clone() } else { base.join(p) };
        Self {
            seen_ids: join(&self.seen_ids),
            notification_buffer: join(&self.notification_buffer),
            category_averages: join(&self.category_averages),
        }
    }
}

/// Which page source implementation to drive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceKind {
    Http,
    Browser {
        #[serde(default = "default_settle_secs", rename = "settleSecs")]
        settle_secs: u64,
    },
}

impl Default for SourceKind {
    fn default() -> Self {
        SourceKind::Http
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Location segment of the search URL (city slug or numeric place id)
    pub location_ref: String,
    pub search_terms: Vec<String>,
    #[serde(default = "default_days_since_listed")]
    pub days_since_listed: u32,
    #[serde(default = "default_sort_by")]
    pub sort_by: SortBy,
    #[serde(default)]
    pub exact: bool,
    #[serde(default)]
    pub min_price: Option<f64>,
    #[serde(default)]
    pub max_price: Option<f64>,
    #[serde(default = "default_true")]
    pub include_free_items: bool,
    #[serde(default)]
    pub fetch_listing_details: bool,
    #[serde(default = "default_true")]
    pub price_estimation_enabled: bool,
    #[serde(default)]
    pub quality_include_keywords: Vec<String>,
    #[serde(default)]
    pub quality_exclude_keywords: Vec<String>,
    #[serde(default)]
    pub active_hours: ActiveHours,
    #[serde(default = "default_schedule")]
    pub schedule: String,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub paths: StatePaths,
    #[serde(default)]
    pub source: SourceKind,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_true() -> bool {
    true
}
fn default_days_since_listed() -> u32 {
    1
}
fn default_sort_by() -> SortBy {
    SortBy::CreationTimeDescend
}
fn default_schedule() -> String {
    "0 */10 * * * *".to_string()
}
fn default_mail_timeout() -> u64 {
    30
}
fn default_settle_secs() -> u64 {
    5
}
fn default_seen_path() -> PathBuf {
    PathBuf::from("seen_ids.json")
}
fn default_buffer_path() -> PathBuf {
    PathBuf::from("notification_buffer.txt")
}
fn default_categories_path() -> PathBuf {
    PathBuf::from("category_averages.json")
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

impl AppConfig {
    /// Minimal configuration for one location and a set of terms
    pub fn new(location_ref: impl Into<String>, search_terms: Vec<String>) -> Self {
        Self {
            location_ref: location_ref.into(),
            search_terms,
            days_since_listed: default_days_since_listed(),
            sort_by: default_sort_by(),
            exact: false,
            min_price: None,
            max_price: None,
            include_free_items: true,
            fetch_listing_details: false,
            price_estimation_enabled: true,
            quality_include_keywords: Vec::new(),
            quality_exclude_keywords: Vec::new(),
            active_hours: ActiveHours::default(),
            schedule: default_schedule(),
            recipients: Vec::new(),
            mail: MailConfig::default(),
            paths: StatePaths::default(),
            source: SourceKind::default(),
            user_agent: default_user_agent(),
        }
    }

    /// Load configuration from a file; relative state paths resolve next to it
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_json(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        if let Some(dir) = path.parent() {
            config.paths = config.paths.rooted_at(dir);
        }
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let mut config: AppConfig = serde_json::from_str(content)?;
        config.tidy();
        config.validate()?;
        Ok(config)
    }

    /// Trim terms and keywords, dropping blank entries
    fn tidy(&mut self) {
        let clean = |items: &mut Vec<String>| {
            *items = items
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        };
        clean(&mut self.search_terms);
        clean(&mut self.quality_include_keywords);
        clean(&mut self.quality_exclude_keywords);
        clean(&mut self.recipients);
    }

    pub fn validate(&self) -> Result<()> {
        if self.location_ref.trim().is_empty() {
            bail!("locationRef must not be empty");
        }
        if self.search_terms.is_empty() {
            bail!("searchTerms must contain at least one term");
        }
        if self.days_since_listed > 30 {
            bail!("daysSinceListed must be between 0 and 30, got {}", self.days_since_listed);
        }
        for (name, hour) in [("start", self.active_hours.start), ("end", self.active_hours.end)] {
            if hour > 23 {
                bail!("activeHours.{} must be between 0 and 23, got {}", name, hour);
            }
        }
        for (name, bound) in [("minPrice", self.min_price), ("maxPrice", self.max_price)] {
            if let Some(value) = bound {
                if !value.is_finite() || value < 0.0 {
                    bail!("{} must be a non-negative number, got {}", name, value);
                }
            }
        }
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                bail!("minPrice ({}) is greater than maxPrice ({})", min, max);
            }
        }
        Ok(())
    }
}
