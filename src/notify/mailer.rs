use crate::config::MailConfig;
use crate::notify::traits::{Email, Notifier};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// Writes messages to the log instead of sending them
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, email: &Email) -> Result<()> {
        info!("✉️  [dry run] to={} subject={}", email.to, email.subject);
        debug!("{}", email.text);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Delivers messages through an HTTP mail API that accepts the email as JSON
pub struct HttpMailNotifier {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpMailNotifier {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create mail HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    /// `None` when no endpoint is configured
    pub fn from_config(config: &MailConfig) -> Result<Option<Self>> {
        config
            .endpoint
            .as_ref()
            .map(|endpoint| {
                Self::new(
                    endpoint.clone(),
                    config.api_key.clone(),
                    Duration::from_secs(config.timeout_secs),
                )
            })
            .transpose()
    }
}

#[async_trait]
impl Notifier for HttpMailNotifier {
    async fn send(&self, email: &Email) -> Result<()> {
        let mut request = self.client.post(&self.endpoint).json(email);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach mail API for {}", email.to))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Mail API returned {} for {}: {}", status, email.to, body.trim());
        }

        debug!("Mail API accepted message for {}", email.to);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
