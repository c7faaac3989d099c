pub mod browser;
pub mod extract;
pub mod marketplace;
pub mod traits;
pub mod types;

pub use browser::{BrowserScraper, BrowserSourceProvider};
pub use marketplace::{HttpSourceProvider, MarketplaceScraper};
pub use traits::{PageSource, SourceProvider};
pub use types::SearchQuery;
