use crate::models::{ListingDetail, RawNode};
use crate::scrapers::extract::{extract_nodes, parse_detail};
use crate::scrapers::traits::{PageSource, SourceProvider};
use crate::scrapers::types::SearchQuery;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Plain HTTP marketplace scraper
pub struct MarketplaceScraper {
    client: Client,
}

impl MarketplaceScraper {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        debug!("Fetching URL: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("Marketplace returned status {} for {}", response.status(), url);
        }

        let body = response.text().await.context("Failed to read response body")?;
        debug!("Downloaded {} bytes", body.len());
        Ok(body)
    }
}

#[async_trait]
impl PageSource for MarketplaceScraper {
    async fn search(&self, query: &SearchQuery) -> Result<Option<Vec<RawNode>>> {
        let url = query.url()?;
        info!("Searching marketplace for '{}'", query.term);

        let body = self.fetch(url.as_str()).await?;
        extract_nodes(&body)
    }

    async fn fetch_detail(&self, link: &str) -> ListingDetail {
        let detail = match self.fetch(link).await {
            Ok(html) => parse_detail(&html),
            Err(e) => Err(e),
        };

        detail.unwrap_or_else(|e| {
            warn!("Detail fetch failed for {}: {:#}", link, e);
            ListingDetail::default()
        })
    }

    fn source_name(&self) -> &'static str {
        "marketplace-http"
    }
}

/// Hands out one HTTP client per run
pub struct HttpSourceProvider {
    user_agent: String,
}

impl HttpSourceProvider {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self { user_agent: user_agent.into() }
    }
}

#[async_trait]
impl SourceProvider for HttpSourceProvider {
    async fn open(&self) -> Result<Box<dyn PageSource>> {
        Ok(Box::new(MarketplaceScraper::new(&self.user_agent)?))
    }
}
