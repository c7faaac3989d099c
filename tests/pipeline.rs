use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use market_watch::config::{ActiveHours, AppConfig, StatePaths};
use market_watch::models::{ListingDetail, RawNode};
use market_watch::notify::{Clock, Email, Notifier};
use market_watch::scrapers::{PageSource, SearchQuery, SourceProvider};
use market_watch::Pipeline;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

struct FixedClock(NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

fn clock_at(hour: u32) -> Arc<FixedClock> {
    let time = NaiveDate::from_ymd_opt(2026, 5, 2)
        .unwrap()
        .and_hms_opt(hour, 30, 0)
        .unwrap();
    Arc::new(FixedClock(time))
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Email>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<Email> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, email: &Email) -> Result<()> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

enum Feed {
    Nodes(Vec<serde_json::Value>),
    NoData,
    Fail,
}

/// Canned search results keyed by term
#[derive(Default)]
struct FakeState {
    feeds: HashMap<String, Feed>,
    details: HashMap<String, ListingDetail>,
    delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
    opened: AtomicUsize,
    detail_calls: AtomicUsize,
}

struct FakeSource(Arc<FakeState>);

#[async_trait]
impl PageSource for FakeSource {
    async fn search(&self, query: &SearchQuery) -> Result<Option<Vec<RawNode>>> {
        let state = &self.0;
        let now = state.active.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(state.delay).await;
        state.active.fetch_sub(1, Ordering::SeqCst);

        match state.feeds.get(&query.term) {
            Some(Feed::Nodes(nodes)) => Ok(Some(
                nodes.iter().map(|n| serde_json::from_value(n.clone()).unwrap()).collect(),
            )),
            Some(Feed::NoData) | None => Ok(None),
            Some(Feed::Fail) => bail!("connection reset"),
        }
    }

    async fn fetch_detail(&self, link: &str) -> ListingDetail {
        self.0.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.0.details.get(link).cloned().unwrap_or_default()
    }

    fn source_name(&self) -> &'static str {
        "fake"
    }
}

struct FakeProvider {
    state: Arc<FakeState>,
    broken: bool,
}

#[async_trait]
impl SourceProvider for FakeProvider {
    async fn open(&self) -> Result<Box<dyn PageSource>> {
        if self.broken {
            bail!("browser failed to launch");
        }
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSource(self.state.clone())))
    }
}

fn listing(id: &str, title: &str, price: &str) -> serde_json::Value {
    json!({
        "listing": {
            "id": id,
            "marketplace_listing_title": title,
            "listing_price": { "formatted_amount": price }
        }
    })
}

fn config_in(dir: &TempDir, terms: &[&str]) -> AppConfig {
    let mut config = AppConfig::new("seattle", terms.iter().map(|t| t.to_string()).collect());
    config.recipients = vec!["me@example.com".to_string()];
    config.active_hours = ActiveHours { start: 8, end: 22 };
    config.paths = StatePaths::default().rooted_at(dir.path());
    config
}

fn pipeline(
    config: &AppConfig,
    state: &Arc<FakeState>,
    notifier: &Arc<RecordingNotifier>,
    hour: u32,
) -> Pipeline {
    Pipeline::new(
        Arc::new(config.clone()),
        Arc::new(FakeProvider { state: state.clone(), broken: false }),
        notifier.clone(),
        clock_at(hour),
    )
}

fn seen_ids(config: &AppConfig) -> Vec<String> {
    let raw = std::fs::read_to_string(&config.paths.seen_ids).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    serde_json::from_value(value["ids"].clone()).unwrap()
}

#[tokio::test]
async fn listing_is_notified_once_across_runs() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, &["bike"]);
    let mut state = FakeState::default();
    state
        .feeds
        .insert("bike".to_string(), Feed::Nodes(vec![listing("42", "Road bike", "$100")]));
    let state = Arc::new(state);
    let notifier = Arc::new(RecordingNotifier::default());

    let first = pipeline(&config, &state, &notifier, 12).run().await;
    assert_eq!(first.new_listings, 1);
    assert_eq!(first.deliveries, 1);
    assert_eq!(seen_ids(&config), vec!["42"]);

    let sent = notifier.sent();
    assert_eq!(sent[0].subject, "1 new result for \"bike\"");
    assert!(sent[0].text.contains("Road bike"));
    assert!(sent[0].text.contains("est. resale $50.00"));

    // Fresh pipeline so the seen ids come from disk
    let second = pipeline(&config, &state, &notifier, 12).run().await;
    assert_eq!(second.terms_ok, 1);
    assert_eq!(second.new_listings, 0);
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn duplicate_ids_within_one_feed_are_kept_once() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, &["lamp", "light"]);
    let mut state = FakeState::default();
    state.feeds.insert(
        "lamp".to_string(),
        Feed::Nodes(vec![listing("7", "Lamp", "$10"), listing("7", "Lamp", "$10")]),
    );
    state
        .feeds
        .insert("light".to_string(), Feed::Nodes(vec![listing("7", "Lamp", "$10")]));
    let state = Arc::new(state);
    let notifier = Arc::new(RecordingNotifier::default());

    let summary = pipeline(&config, &state, &notifier, 9).run().await;

    assert_eq!(summary.new_listings, 1);
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn failing_term_does_not_stop_the_run() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, &["broken", "empty", "chair"]);
    let mut state = FakeState::default();
    state.feeds.insert("broken".to_string(), Feed::Fail);
    state.feeds.insert("empty".to_string(), Feed::NoData);
    state
        .feeds
        .insert("chair".to_string(), Feed::Nodes(vec![listing("5", "Chair", "$15")]));
    let state = Arc::new(state);
    let notifier = Arc::new(RecordingNotifier::default());

    let summary = pipeline(&config, &state, &notifier, 12).run().await;

    assert_eq!(summary.terms_failed, 1);
    assert_eq!(summary.terms_ok, 2);
    assert_eq!(summary.new_listings, 1);
    assert_eq!(seen_ids(&config), vec!["5"]);
    assert_eq!(state.opened.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejected_listings_are_not_marked_seen() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, &["phone"]);
    config.quality_exclude_keywords = vec!["broken".to_string()];
    config.max_price = Some(300.0);
    let mut state = FakeState::default();
    state.feeds.insert(
        "phone".to_string(),
        Feed::Nodes(vec![
            listing("1", "Broken Phone", "Free"),
            listing("2", "Broken Phone", "$5"),
            listing("3", "New phone", "$900"),
            json!({ "listing": { "marketplace_listing_title": "no id" } }),
        ]),
    );
    let state = Arc::new(state);
    let notifier = Arc::new(RecordingNotifier::default());

    let summary = pipeline(&config, &state, &notifier, 12).run().await;

    assert_eq!(summary.new_listings, 1);
    assert_eq!(seen_ids(&config), vec!["2"]);
}

#[tokio::test]
async fn night_results_are_buffered_and_flushed_in_the_morning() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, &["desk"]);
    let mut state = FakeState::default();
    state
        .feeds
        .insert("desk".to_string(), Feed::Nodes(vec![listing("1", "Oak desk", "$60")]));
    let state = Arc::new(state);
    let notifier = Arc::new(RecordingNotifier::default());

    let night = pipeline(&config, &state, &notifier, 2).run().await;
    assert_eq!(night.buffered, 1);
    assert!(notifier.sent().is_empty());
    assert_eq!(seen_ids(&config), vec!["1"]);
    let buffered = std::fs::read_to_string(&config.paths.notification_buffer).unwrap();
    assert!(buffered.contains("Oak desk"));

    let mut state = FakeState::default();
    state
        .feeds
        .insert("desk".to_string(), Feed::Nodes(vec![listing("2", "Pine desk", "$30")]));
    let state = Arc::new(state);

    let morning = pipeline(&config, &state, &notifier, 8).run().await;
    assert_eq!(morning.deliveries, 1);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains("Oak desk"));
    assert!(sent[0].text.contains("Pine desk"));
    assert_eq!(std::fs::read_to_string(&config.paths.notification_buffer).unwrap(), "");
}

#[tokio::test]
async fn enrichment_feeds_description_and_category_estimate() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, &["tv"]);
    config.fetch_listing_details = true;
    std::fs::write(&config.paths.category_averages, r#"{"Electronics > TVs": 300}"#).unwrap();

    let mut state = FakeState::default();
    state
        .feeds
        .insert("tv".to_string(), Feed::Nodes(vec![listing("77", "Free TVs", "Free")]));
    state.details.insert(
        "https://www.facebook.com/marketplace/item/77/".to_string(),
        ListingDetail {
            description: "Works fine, remote missing".to_string(),
            image: "https://img.example/77.jpg".to_string(),
        },
    );
    let state = Arc::new(state);
    let notifier = Arc::new(RecordingNotifier::default());

    pipeline(&config, &state, &notifier, 12).run().await;

    assert_eq!(state.detail_calls.load(Ordering::SeqCst), 1);
    let sent = notifier.sent();
    assert!(sent[0].text.contains("Works fine, remote missing"));
    assert!(sent[0].text.contains("est. resale $150.00"));
    let html = sent[0].html.as_deref().unwrap();
    assert!(html.contains("https://img.example/77.jpg"));
}

#[tokio::test]
async fn failed_detail_lookup_still_delivers_listing() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, &["sofa"]);
    config.fetch_listing_details = true;
    let mut state = FakeState::default();
    state
        .feeds
        .insert("sofa".to_string(), Feed::Nodes(vec![listing("31", "Grey sofa", "$90")]));
    let state = Arc::new(state);
    let notifier = Arc::new(RecordingNotifier::default());

    let summary = pipeline(&config, &state, &notifier, 12).run().await;

    assert_eq!(summary.new_listings, 1);
    assert_eq!(summary.deliveries, 1);
    assert_eq!(state.detail_calls.load(Ordering::SeqCst), 1);

    let sent = notifier.sent();
    assert!(sent[0]
        .text
        .ends_with("- Grey sofa | $90 | https://www.facebook.com/marketplace/item/31/ | est. resale $45.00\n"));
    let html = sent[0].html.as_deref().unwrap();
    assert!(!html.contains("<img"));
    assert!(!html.contains("<p>"));
}

#[tokio::test]
async fn estimation_can_be_disabled() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, &["tv"]);
    config.price_estimation_enabled = false;
    let mut state = FakeState::default();
    state
        .feeds
        .insert("tv".to_string(), Feed::Nodes(vec![listing("8", "TV", "$80")]));
    let state = Arc::new(state);
    let notifier = Arc::new(RecordingNotifier::default());

    pipeline(&config, &state, &notifier, 12).run().await;

    assert!(!notifier.sent()[0].text.contains("est. resale"));
    assert_eq!(state.detail_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unavailable_source_still_saves_state() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, &["a", "b"]);
    let notifier = Arc::new(RecordingNotifier::default());
    let pipeline = Pipeline::new(
        Arc::new(config.clone()),
        Arc::new(FakeProvider { state: Arc::new(FakeState::default()), broken: true }),
        notifier.clone(),
        clock_at(12),
    );

    let summary = pipeline.run().await;

    assert_eq!(summary.terms_failed, 2);
    assert!(seen_ids(&config).is_empty());
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn overlapping_runs_are_serialized() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, &["a", "b"]);
    let state = Arc::new(FakeState {
        delay: Duration::from_millis(30),
        ..FakeState::default()
    });
    let notifier = Arc::new(RecordingNotifier::default());
    let pipeline = pipeline(&config, &state, &notifier, 12);

    let (first, second) = tokio::join!(pipeline.run(), pipeline.run());

    assert_eq!(first.terms_ok + second.terms_ok, 4);
    assert_eq!(state.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(state.opened.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn surplus_scheduled_ticks_are_skipped() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, &["a"]);
    let state = Arc::new(FakeState {
        delay: Duration::from_millis(30),
        ..FakeState::default()
    });
    let notifier = Arc::new(RecordingNotifier::default());
    let pipeline = pipeline(&config, &state, &notifier, 12);

    let (first, second, third) = tokio::join!(
        pipeline.run_scheduled(),
        pipeline.run_scheduled(),
        pipeline.run_scheduled()
    );

    assert!(first.is_some());
    assert!(second.is_some());
    assert!(third.is_none());
    assert_eq!(state.opened.load(Ordering::SeqCst), 2);

    // Once idle, ticks run again
    assert!(pipeline.run_scheduled().await.is_some());
}
