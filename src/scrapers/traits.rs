use crate::models::{ListingDetail, RawNode};
use crate::scrapers::types::SearchQuery;
use anyhow::Result;
use async_trait::async_trait;

/// A live session against the marketplace.
///
/// One is opened per run and released when dropped.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Raw feed nodes for a term, or `None` when the page carries no feed
    async fn search(&self, query: &SearchQuery) -> Result<Option<Vec<RawNode>>>;

    /// Best-effort detail page lookup; failures come back as empty fields
    async fn fetch_detail(&self, link: &str) -> ListingDetail;

    /// Get the name of the source
    fn source_name(&self) -> &'static str;
}

/// Opens page source sessions
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn open(&self) -> Result<Box<dyn PageSource>>;
}
