pub mod config;
pub mod estimate;
pub mod filter;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod schedule;
pub mod scrapers;
pub mod store;

pub use config::AppConfig;
pub use pipeline::{Pipeline, RunSummary};
