use crate::models::{ListingDetail, RawNode};
use crate::scrapers::extract::{extract_nodes, parse_detail};
use crate::scrapers::traits::{PageSource, SourceProvider};
use crate::scrapers::types::SearchQuery;
use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Browser-based marketplace scraper using headless Chrome.
///
/// Chrome is shut down when the scraper is dropped.
pub struct BrowserScraper {
    browser: Browser,
    user_agent: String,
    settle: Duration,
}

impl BrowserScraper {
    /// Launch a new headless browser
    pub fn launch(user_agent: &str, settle: Duration) -> Result<Self> {
        info!("Launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(true)
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;

        Ok(Self {
            browser,
            user_agent: user_agent.to_string(),
            settle,
        })
    }

    /// Load a page in a fresh tab and return its rendered HTML.
    ///
    /// The tab is closed on every path, including failed navigation.
    fn render(browser: &Browser, user_agent: &str, url: &str, settle: Duration) -> Result<String> {
        let tab = browser.new_tab().context("Failed to open tab")?;
        let _close = OnDrop(|| {
            if let Err(e) = tab.close(true) {
                debug!("Tab close failed: {}", e);
            }
        });

        tab.set_user_agent(user_agent, None, None)?;
        tab.navigate_to(url)?;
        tab.wait_until_navigated()?;

        // Client-side rendering keeps filling the page after navigation
        thread::sleep(settle);

        // Dismiss the cookie dialog if present
        let _ = tab.evaluate(
            r#"
            const button = document.querySelector('[aria-label*="Allow"][role="button"], button[data-cookiebanner="accept_button"]');
            if (button) button.click();
            "#,
            false,
        );

        let html = tab.get_content().context("Failed to read page HTML")?;
        debug!("Rendered {} bytes from {}", html.len(), url);
        Ok(html)
    }

    async fn render_blocking(&self, url: String) -> Result<String> {
        let browser = self.browser.clone();
        let user_agent = self.user_agent.clone();
        let settle = self.settle;

        tokio::task::spawn_blocking(move || Self::render(&browser, &user_agent, &url, settle))
            .await
            .context("Browser task panicked")?
    }
}

#[async_trait]
impl PageSource for BrowserScraper {
    async fn search(&self, query: &SearchQuery) -> Result<Option<Vec<RawNode>>> {
        let url = query.url()?;
        info!("Opening search page for '{}'...", query.term);

        let html = self.render_blocking(url.to_string()).await?;
        extract_nodes(&html)
    }

    async fn fetch_detail(&self, link: &str) -> ListingDetail {
        let detail = match self.render_blocking(link.to_string()).await {
            Ok(html) => parse_detail(&html),
            Err(e) => Err(e),
        };

        detail.unwrap_or_else(|e| {
            warn!("Detail page failed for {}: {:#}", link, e);
            ListingDetail::default()
        })
    }

    fn source_name(&self) -> &'static str {
        "marketplace-browser"
    }
}

/// Runs the closure when dropped
struct OnDrop<F: FnMut()>(F);

impl<F: FnMut()> Drop for OnDrop<F> {
    fn drop(&mut self) {
        (self.0)()
    }
}

/// Launches one browser per run
pub struct BrowserSourceProvider {
    user_agent: String,
    settle: Duration,
}

impl BrowserSourceProvider {
    pub fn new(user_agent: impl Into<String>, settle: Duration) -> Self {
        Self {
            user_agent: user_agent.into(),
            settle,
        }
    }
}

#[async_trait]
impl SourceProvider for BrowserSourceProvider {
    async fn open(&self) -> Result<Box<dyn PageSource>> {
        let user_agent = self.user_agent.clone();
        let settle = self.settle;

        let scraper = tokio::task::spawn_blocking(move || BrowserScraper::launch(&user_agent, settle))
            .await
            .context("Browser launch task panicked")??;
        Ok(Box::new(scraper))
    }
}
