//! Per-run orchestration: search each term, drop what was seen before,
//! filter, estimate, enrich, then hand the survivors to the notification gate.

use crate::config::AppConfig;
use crate::estimate::Estimator;
use crate::filter::PriceFilter;
use crate::models::{normalize, ListingRecord};
use crate::notify::{Clock, GateOutcome, NotificationBuffer, NotificationGate, Notifier};
use crate::scrapers::{PageSource, SearchQuery, SourceProvider};
use crate::store::{SeenIdSet, SeenStore};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Counts for one term
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermReport {
    pub fetched: usize,
    pub already_seen: usize,
    pub rejected: usize,
    pub kept: usize,
    pub outcome: Option<GateOutcome>,
}

/// Totals for one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub terms_ok: usize,
    pub terms_failed: usize,
    pub new_listings: usize,
    pub deliveries: usize,
    pub buffered: usize,
}

impl RunSummary {
    fn record(&mut self, report: &TermReport) {
        self.terms_ok += 1;
        self.new_listings += report.kept;
        match &report.outcome {
            Some(GateOutcome::Delivered(delivery)) => self.deliveries += delivery.delivered.len(),
            Some(GateOutcome::Buffered) => self.buffered += 1,
            _ => {}
        }
    }
}

pub struct Pipeline {
    config: Arc<AppConfig>,
    provider: Arc<dyn SourceProvider>,
    store: SeenStore,
    gate: NotificationGate,
    filter: PriceFilter,
    /// Held for the whole run so overlapping triggers queue up
    run_lock: Mutex<()>,
    /// Scheduled triggers currently running or waiting
    scheduled: AtomicUsize,
}

/// Scheduled triggers allowed at once: the running one plus one waiting
const MAX_SCHEDULED: usize = 2;

impl Pipeline {
    pub fn new(
        config: Arc<AppConfig>,
        provider: Arc<dyn SourceProvider>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = SeenStore::new(&config.paths.seen_ids);
        let buffer = NotificationBuffer::new(&config.paths.notification_buffer);
        let gate = NotificationGate::new(notifier, clock, buffer, &config);
        let filter = PriceFilter::from_config(&config);

        Self {
            config,
            provider,
            store,
            gate,
            filter,
            run_lock: Mutex::new(()),
            scheduled: AtomicUsize::new(0),
        }
    }

    /// Entry point for timer ticks.
    ///
    /// Waits behind a run in progress, but when another tick is already
    /// waiting this one is dropped and `None` is returned.
    pub async fn run_scheduled(&self) -> Option<RunSummary> {
        if self.scheduled.fetch_add(1, Ordering::SeqCst) >= MAX_SCHEDULED {
            self.scheduled.fetch_sub(1, Ordering::SeqCst);
            info!("⏭️  Skipping tick, a run is already queued");
            return None;
        }

        let summary = self.run().await;
        self.scheduled.fetch_sub(1, Ordering::SeqCst);
        Some(summary)
    }

    /// Process every configured term once, then persist the seen ids.
    ///
    /// A failing term is logged and skipped; it never stops the others or the save.
    pub async fn run(&self) -> RunSummary {
        let _running = self.run_lock.lock().await;
        let started = Instant::now();
        let terms = &self.config.search_terms;
        info!("🔎 Starting run over {} term(s)", terms.len());

        let mut seen = self.store.load().await;
        let estimator = if self.config.price_estimation_enabled {
            Estimator::load(&self.config.paths.category_averages).await
        } else {
            Estimator::default()
        };

        let mut summary = RunSummary::default();

        match self.provider.open().await {
            Ok(source) => {
                debug!("Opened page source {}", source.source_name());
                for term in terms {
                    match self.process_term(source.as_ref(), &mut seen, &estimator, term).await {
                        Ok(report) => {
                            info!(
                                "'{}': {} fetched, {} seen, {} rejected, {} new",
                                term, report.fetched, report.already_seen, report.rejected, report.kept
                            );
                            summary.record(&report);
                        }
                        Err(e) => {
                            error!("Term '{}' failed: {:#}", term, e);
                            summary.terms_failed += 1;
                        }
                    }
                }
            }
            Err(e) => {
                error!("Could not open page source: {:#}", e);
                summary.terms_failed = terms.len();
            }
        }

        self.store.save(&seen).await;

        info!(
            "✅ Run finished in {:.1}s: {} ok, {} failed, {} new listing(s)",
            started.elapsed().as_secs_f64(),
            summary.terms_ok,
            summary.terms_failed,
            summary.new_listings
        );
        summary
    }

    async fn process_term(
        &self,
        source: &dyn PageSource,
        seen: &mut SeenIdSet,
        estimator: &Estimator,
        term: &str,
    ) -> Result<TermReport> {
        let query = SearchQuery::from_config(&self.config, term);
        let nodes = source
            .search(&query)
            .await
            .with_context(|| format!("Search for '{}' failed", term))?;

        let Some(nodes) = nodes else {
            info!("No data found for '{}'", term);
            return Ok(TermReport::default());
        };

        let mut report = TermReport {
            fetched: nodes.len(),
            ..TermReport::default()
        };
        let listings: Vec<ListingRecord> = nodes.iter().filter_map(normalize).collect();
        let mut kept = self.select_new(listings, seen, &mut report);

        if self.config.fetch_listing_details {
            for listing in kept.iter_mut() {
                let detail = source.fetch_detail(&listing.link).await;
                listing.apply_detail(detail);
            }
        }
        if self.config.price_estimation_enabled {
            for listing in kept.iter_mut() {
                listing.estimate =
                    Some(estimator.estimate(&listing.price_text, &listing.title, &listing.description));
            }
        }

        report.kept = kept.len();
        report.outcome = Some(self.gate.notify(term, &kept).await);
        Ok(report)
    }

    /// Drop seen ids, then apply the price filter; survivors are marked seen.
    ///
    /// The seen check comes first so known listings never reach the filter.
    fn select_new(
        &self,
        listings: Vec<ListingRecord>,
        seen: &mut SeenIdSet,
        report: &mut TermReport,
    ) -> Vec<ListingRecord> {
        let mut kept = Vec::new();

        for listing in listings {
            if seen.contains(&listing.id) {
                report.already_seen += 1;
                continue;
            }
            if let Some(reason) = self.filter.rejection(&listing) {
                debug!("Skipping {} '{}': {}", listing.id, listing.title, reason);
                report.rejected += 1;
                continue;
            }
            seen.add(listing.id.clone());
            kept.push(listing);
        }
        kept
    }
}
