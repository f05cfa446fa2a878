mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use common::*;
use linkwise_lib::collaborators::IngestionDispatcher;
use linkwise_lib::ingest::IngestionPipeline;
use linkwise_lib::refresh::RefreshScheduler;
use linkwise_lib::store::{BrandDirectory, LinkIndexStore, LinkStore};
use linkwise_lib::types::{ImportJobStatus, LinkPreferences, LinkType};
use linkwise_lib::EngineConfig;

fn fixed_now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-03-15T12:00:00Z")
        .expect("timestamp")
        .with_timezone(&Utc)
}

fn ingested(store: &LinkStore, brand_id: &str, days_ago: i64) {
    let at = fixed_now() - chrono::Duration::days(days_ago);
    store
        .mark_ingested(brand_id, &at.to_rfc3339())
        .expect("mark ingested");
}

fn scheduler(
    store: &Arc<LinkStore>,
    dispatcher: Arc<dyn IngestionDispatcher>,
    config: EngineConfig,
) -> RefreshScheduler {
    RefreshScheduler::new(store.clone(), dispatcher, config)
}

fn sorted(mut ids: Vec<String>) -> Vec<String> {
    ids.sort();
    ids
}

// =============================================================================
// Refresh passes
// =============================================================================

#[tokio::test]
async fn refresh_pass_dispatches_only_stale_brands_with_domains() {
    let store = temp_store();
    seed_brand(&store, "fresh", Some("fresh.com"), LinkPreferences::default());
    seed_brand(&store, "stale", Some("stale.com"), LinkPreferences::default());
    seed_brand(&store, "never", Some("never.com"), LinkPreferences::default());
    seed_brand(&store, "boundary", Some("boundary.com"), LinkPreferences::default());
    seed_brand(&store, "nodomain", None, LinkPreferences::default());
    seed_brand(&store, "busy", Some("busy.com"), LinkPreferences::default());
    ingested(&store, "fresh", 1);
    ingested(&store, "stale", 10);
    ingested(&store, "boundary", 7);
    store.create_import_job("busy").expect("in-flight job");

    let dispatcher = RecordingDispatcher::new();
    let report = scheduler(&store, dispatcher.clone(), test_config())
        .run_refresh_pass(fixed_now())
        .await
        .expect("pass");

    assert_eq!(sorted(report.dispatched.clone()), vec!["never", "stale"]);
    assert_eq!(report.skipped_no_domain, vec!["nodomain"]);
    assert_eq!(report.skipped_in_flight, vec!["busy"]);
    assert!(report.failed.is_empty());

    assert_eq!(sorted(dispatcher.brand_ids()), vec!["never", "stale"]);
    let domains: Vec<String> = dispatcher
        .dispatched
        .lock()
        .iter()
        .map(|(_, _, domain)| domain.clone())
        .collect();
    assert!(domains.contains(&"stale.com".to_string()));

    let job = store
        .active_import_job("stale")
        .expect("lookup")
        .expect("job created");
    assert_eq!(job.status, ImportJobStatus::Pending);
    assert!(store.active_import_job("fresh").expect("lookup").is_none());
}

#[tokio::test]
async fn second_pass_does_not_enqueue_duplicate_jobs() {
    let store = temp_store();
    seed_brand(&store, "stale", Some("stale.com"), LinkPreferences::default());

    let dispatcher = RecordingDispatcher::new();
    let scheduler = scheduler(&store, dispatcher.clone(), test_config());
    let first = scheduler.run_refresh_pass(fixed_now()).await.expect("pass");
    let second = scheduler.run_refresh_pass(fixed_now()).await.expect("pass");

    assert_eq!(first.dispatched, vec!["stale"]);
    assert!(second.dispatched.is_empty());
    assert_eq!(second.skipped_in_flight, vec!["stale"]);
    assert_eq!(dispatcher.brand_ids().len(), 1);
}

#[tokio::test]
async fn stranded_job_is_failed_and_brand_redispatched() {
    let store = temp_store();
    seed_brand(&store, "b1", Some("brand.com"), LinkPreferences::default());
    let stranded = store.create_import_job("b1").expect("job");
    store
        .update_import_job(&stranded.id, ImportJobStatus::Parsing, None)
        .expect("parsing");

    let dispatcher = RecordingDispatcher::new();
    let scheduler = scheduler(&store, dispatcher.clone(), test_config());

    // Within the timeout the job still counts as in flight.
    let early = scheduler
        .run_refresh_pass(Utc::now() + chrono::Duration::minutes(5))
        .await
        .expect("pass");
    assert_eq!(early.skipped_in_flight, vec!["b1"]);
    assert!(dispatcher.brand_ids().is_empty());

    let later = Utc::now() + chrono::Duration::days(365);
    let report = scheduler.run_refresh_pass(later).await.expect("pass");
    assert_eq!(report.dispatched, vec!["b1"]);
    assert!(report.skipped_in_flight.is_empty());
    assert_eq!(dispatcher.brand_ids(), vec!["b1"]);

    let old = store
        .get_import_job(&stranded.id)
        .expect("lookup")
        .expect("job exists");
    assert_eq!(old.status, ImportJobStatus::Failed);
    assert!(old
        .error_message
        .as_deref()
        .is_some_and(|m| m.starts_with("abandoned")));

    let fresh = store
        .active_import_job("b1")
        .expect("lookup")
        .expect("new job");
    assert_ne!(fresh.id, stranded.id);
    assert_eq!(fresh.status, ImportJobStatus::Pending);
}

#[tokio::test]
async fn dispatch_failure_marks_job_failed_and_continues() {
    let store = temp_store();
    seed_brand(&store, "broken", Some("broken.com"), LinkPreferences::default());
    seed_brand(&store, "ok", Some("ok.com"), LinkPreferences::default());

    let dispatcher = RecordingDispatcher::failing_for(&["broken"]);
    let scheduler = scheduler(&store, dispatcher.clone(), test_config());
    let report = scheduler.run_refresh_pass(fixed_now()).await.expect("pass");

    assert_eq!(report.dispatched, vec!["ok"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "broken");
    assert!(report.failed[0].1.contains("crawler offline"));

    // The failed job is terminal, so the next pass retries the brand.
    assert!(store.active_import_job("broken").expect("lookup").is_none());
    let retry = scheduler.run_refresh_pass(fixed_now()).await.expect("pass");
    assert_eq!(retry.failed.len(), 1);
    assert_eq!(retry.skipped_in_flight, vec!["ok"]);
}

#[tokio::test]
async fn dispatches_are_staggered() {
    let store = temp_store();
    for id in ["a", "b", "c"] {
        seed_brand(&store, id, Some(&format!("{}.com", id)), LinkPreferences::default());
    }
    let config = EngineConfig {
        dispatch_stagger_ms: 60,
        ..test_config()
    };

    let started = Instant::now();
    let report = scheduler(&store, RecordingDispatcher::new(), config)
        .run_refresh_pass(fixed_now())
        .await
        .expect("pass");

    assert_eq!(report.dispatched.len(), 3);
    assert!(started.elapsed() >= Duration::from_millis(120));
}

#[tokio::test]
async fn trigger_stale_refresh_returns_dispatched_brands() {
    let store = temp_store();
    seed_brand(&store, "stale", Some("stale.com"), LinkPreferences::default());
    seed_brand(&store, "fresh", Some("fresh.com"), LinkPreferences::default());
    store
        .mark_ingested("fresh", &Utc::now().to_rfc3339())
        .expect("mark ingested");

    let engine = engine(
        &store,
        ScriptedReasoner::answering("none"),
        FixedEmbedder::new(vec![1.0]),
        StatusProbe::all(200),
        test_config(),
    );

    let dispatched = engine.trigger_stale_refresh().await.expect("refresh");
    assert_eq!(dispatched, vec!["stale"]);
}

// =============================================================================
// Ingestion
// =============================================================================

fn pipeline(store: &Arc<LinkStore>, discovery: Arc<StaticDiscovery>) -> IngestionPipeline {
    IngestionPipeline::new(
        store.clone(),
        store.clone(),
        discovery,
        FixedEmbedder::new(vec![0.5, 0.5]),
        test_config(),
    )
}

#[tokio::test]
async fn ingestion_builds_canonical_catalog_and_completes_job() {
    let store = temp_store();
    seed_brand(&store, "b1", Some("brand.com"), LinkPreferences::default());
    let discovery = StaticDiscovery::new(&[
        (
            "https://brand.com/products/cruz-snow-jacket?utm_source=email#reviews",
            None,
        ),
        (
            "https://brand.com/products/cruz-snow-jacket",
            Some("Cruz Snow Jacket — Red"),
        ),
        ("https://www.brand.com/pages/about/", None),
        ("https://instagram.com/brand", Some("Instagram")),
        ("https://other-shop.io/products/knockoff", Some("Knockoff")),
        ("mailto:help@brand.com", None),
    ]);

    let job = store.create_import_job("b1").expect("job");
    let summary = pipeline(&store, discovery)
        .run_job(&job, "brand.com")
        .await
        .expect("ingest");

    assert_eq!(summary.urls_found, 6);
    assert_eq!(summary.urls_processed, 3);
    assert_eq!(summary.urls_failed, 0);
    assert_eq!(summary.pruned, 0);

    let entries = store.get_all("b1").expect("entries");
    let mut urls: Vec<&str> = entries.iter().map(|e| e.url.as_str()).collect();
    urls.sort();
    assert_eq!(
        urls,
        vec![
            "https://brand.com/products/cruz-snow-jacket",
            "https://instagram.com/brand",
            "https://www.brand.com/pages/about",
        ]
    );

    let jacket = entries
        .iter()
        .find(|e| e.url.ends_with("cruz-snow-jacket"))
        .expect("jacket");
    assert_eq!(jacket.title.as_deref(), Some("Cruz Snow Jacket — Red"));
    assert_eq!(jacket.link_type, LinkType::Product);
    assert_eq!(jacket.embedding.as_deref(), Some(&[0.5, 0.5][..]));
    let about = entries.iter().find(|e| e.url.ends_with("about")).expect("about");
    assert_eq!(about.title.as_deref(), Some("About"));
    assert_eq!(about.link_type, LinkType::Page);
    let social = entries.iter().find(|e| e.url.contains("instagram")).expect("social");
    assert_eq!(social.link_type, LinkType::Social);

    let job = store.get_import_job(&job.id).expect("lookup").expect("job");
    assert_eq!(job.status, ImportJobStatus::Complete);
    assert_eq!(job.urls_found, 6);
    assert_eq!(job.urls_processed, 3);
    assert!(store
        .get_brand("b1")
        .expect("brand")
        .expect("exists")
        .last_ingested_at
        .is_some());
}

#[tokio::test]
async fn reingestion_prunes_vanished_urls_and_keeps_usage() {
    let store = temp_store();
    seed_brand(&store, "b1", Some("brand.com"), LinkPreferences::default());
    let first = StaticDiscovery::new(&[
        ("https://brand.com/products/alpine-parka", Some("Alpine Parka")),
        ("https://brand.com/products/retired-boot", Some("Retired Boot")),
    ]);
    let job = store.create_import_job("b1").expect("job");
    pipeline(&store, first).run_job(&job, "brand.com").await.expect("ingest");

    let parka = entry_id(&store, "b1", "https://brand.com/products/alpine-parka");
    store.record_usage(&parka).expect("usage");
    store.record_usage(&parka).expect("usage");

    let second = StaticDiscovery::new(&[(
        "https://brand.com/products/alpine-parka",
        Some("Alpine Parka (New)"),
    )]);
    let job = store.create_import_job("b1").expect("job");
    let summary = pipeline(&store, second)
        .run_job(&job, "brand.com")
        .await
        .expect("ingest");

    assert_eq!(summary.pruned, 1);
    let entries = store.get_all("b1").expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, parka);
    assert_eq!(entries[0].use_count, 2);
    assert_eq!(entries[0].title.as_deref(), Some("Alpine Parka (New)"));
}

#[tokio::test]
async fn empty_discovery_fails_job_and_keeps_catalog() {
    let store = temp_store();
    seed_brand(&store, "b1", Some("brand.com"), LinkPreferences::default());
    store
        .upsert_batch(
            "b1",
            &[entry(
                "https://brand.com/products/alpine-parka",
                "Alpine Parka",
                LinkType::Product,
                None,
            )],
        )
        .expect("seed");

    let job = store.create_import_job("b1").expect("job");
    let err = pipeline(&store, StaticDiscovery::new(&[("https://elsewhere.io/", None)]))
        .run_job(&job, "brand.com")
        .await
        .expect_err("nothing usable");
    assert!(err.contains("No usable URLs"));

    let job = store.get_import_job(&job.id).expect("lookup").expect("job");
    assert_eq!(job.status, ImportJobStatus::Failed);
    assert!(job.error_message.is_some());
    assert_eq!(store.get_all("b1").expect("entries").len(), 1);
    assert!(store
        .get_brand("b1")
        .expect("brand")
        .expect("exists")
        .last_ingested_at
        .is_none());
}

#[tokio::test]
async fn refresh_through_pipeline_ingests_in_background() {
    let store = temp_store();
    seed_brand(&store, "b1", Some("brand.com"), LinkPreferences::default());
    let discovery = StaticDiscovery::new(&[
        ("https://brand.com/collections/sale", Some("Sale")),
        ("https://brand.com/pages/shipping", Some("Shipping")),
    ]);
    let dispatcher: Arc<dyn IngestionDispatcher> = Arc::new(pipeline(&store, discovery));

    let report = scheduler(&store, dispatcher, test_config())
        .run_refresh_pass(Utc::now())
        .await
        .expect("pass");
    assert_eq!(report.dispatched, vec!["b1"]);

    let mut done = false;
    for _ in 0..100 {
        if store.active_import_job("b1").expect("lookup").is_none() {
            done = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(done, "background ingestion finished");
    assert_eq!(store.get("b1").expect("entries").len(), 2);

    let brand = store.get_brand("b1").expect("brand").expect("exists");
    let stamped = brand.last_ingested_at.expect("stamped");
    assert!(!linkwise_lib::refresh::is_stale(Some(&stamped), Utc::now(), 7));
}
