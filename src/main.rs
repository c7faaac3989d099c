use anyhow::Result;
use clap::Parser;
use market_watch::config::{AppConfig, SourceKind};
use market_watch::notify::{HttpMailNotifier, LogNotifier, Notifier, SystemClock};
use market_watch::scrapers::{BrowserSourceProvider, HttpSourceProvider, SourceProvider};
use market_watch::{schedule, Pipeline};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Watches marketplace searches and mails new listings")]
struct Args {
    /// Path to the JSON config file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Run a single pass and exit
    #[arg(long)]
    once: bool,

    /// Log messages instead of sending them
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    info!("🛒 Market Watch");
    let config = Arc::new(AppConfig::load_from_file(&args.config)?);
    info!(
        "Watching {} term(s) in '{}', active {}:00-{}:59",
        config.search_terms.len(),
        config.location_ref,
        config.active_hours.start,
        config.active_hours.end
    );

    let provider: Arc<dyn SourceProvider> = match &config.source {
        SourceKind::Http => Arc::new(HttpSourceProvider::new(config.user_agent.clone())),
        SourceKind::Browser { settle_secs } => Arc::new(BrowserSourceProvider::new(
            config.user_agent.clone(),
            Duration::from_secs(*settle_secs),
        )),
    };

    let notifier: Arc<dyn Notifier> = match HttpMailNotifier::from_config(&config.mail)? {
        Some(mailer) if !args.dry_run => Arc::new(mailer),
        Some(_) => Arc::new(LogNotifier),
        None => {
            if !args.dry_run {
                warn!("No mail endpoint configured, messages will only be logged");
            }
            Arc::new(LogNotifier)
        }
    };

    let pipeline = Arc::new(Pipeline::new(config.clone(), provider, notifier, Arc::new(SystemClock)));

    if args.once {
        let summary = pipeline.run().await;
        info!("{:?}", summary);
        return Ok(());
    }

    schedule::run_forever(pipeline, &config.schedule).await
}
