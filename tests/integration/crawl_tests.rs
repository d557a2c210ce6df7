//! Integration tests for the crawler
//!
//! These tests drive full crawls against a scripted catalog site and check
//! the persisted queue, quota and dataset afterwards.

mod support;

use catalog_crawler::config::{parse_config, Config};
use catalog_crawler::crawler::Crawler;
use catalog_crawler::state::{RequestLabel, RequestState};
use catalog_crawler::storage::{RecordKind, RunStatus, SqliteStorage, Storage};
use catalog_crawler::StopReason;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use support::{item_url, item_urls, listing_url, MockSite};

/// Builds a configuration with fast pagination timings
fn create_test_config(db_path: &Path, start_urls: &[String], input: &str, crawler: &str) -> Config {
    let starts = start_urls
        .iter()
        .map(|url| format!("{{ url = \"{}\" }}", url))
        .collect::<Vec<_>>()
        .join(", ");

    parse_config(&format!(
        r#"
[input]
start-urls = [{starts}]
{input}

[crawler]
navigation-settle-ms = 0
load-timeout-ms = 200
wait-poll-ms = 10
{crawler}

[output]
database-path = "{db}"
"#,
        starts = starts,
        input = input,
        crawler = crawler,
        db = db_path.display()
    ))
    .expect("test config should be valid")
}

async fn run_crawl(config: Config, db_path: &Path, site: Arc<MockSite>) -> catalog_crawler::CrawlReport {
    let storage = SqliteStorage::new(db_path).expect("Failed to open storage");
    Crawler::new(config, "test-hash", storage, site, false)
        .expect("Failed to create crawler")
        .run()
        .await
        .expect("Crawl failed")
}

fn records(db_path: &Path, kind: RecordKind) -> Vec<Value> {
    let storage = SqliteStorage::new(db_path).expect("Failed to reopen storage");
    storage
        .load_records(kind)
        .unwrap()
        .iter()
        .map(|body| serde_json::from_str(body).unwrap())
        .collect()
}

fn item_ids(db_path: &Path) -> Vec<String> {
    let mut ids: Vec<String> = records(db_path, RecordKind::Item)
        .iter()
        .map(|record| record["itemId"].as_str().unwrap().to_string())
        .collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_full_crawl_walks_every_listing_page() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("crawl.db");

    // Page two repeats an item from page one
    let site = Arc::new(MockSite::new().with_listing(
        "women",
        vec![
            item_urls(1..4),
            vec![item_url(3), item_url(4), item_url(5)],
            item_urls(6..8),
        ],
    ));
    let config = create_test_config(&db, &[listing_url("women")], "", "");

    let report = run_crawl(config, &db, site.clone()).await;

    assert_eq!(report.stop_reason, StopReason::Drained);
    assert_eq!(report.handled, 8, "one listing and seven items");
    assert_eq!(report.failed, 0);
    assert_eq!(report.items_scheduled, 7);
    assert_eq!(site.clicks(), 2);

    let ids = item_ids(&db);
    assert_eq!(ids.len(), 7, "each item is extracted once");

    let items = records(&db, RecordKind::Item);
    let first = &items[0];
    assert_eq!(first["brand"], "F21");
    assert_eq!(first["price"], "$14.99");
    assert_eq!(first["sizes"], serde_json::json!(["S", "M"]));
    assert_eq!(first["#debug"]["label"], "item");
    assert_eq!(first["#debug"]["retryCount"], 0);

    let storage = SqliteStorage::new(&db).unwrap();
    assert_eq!(storage.count_requests_by_state(RequestState::Handled).unwrap(), 8);
    assert_eq!(storage.count_requests_by_state(RequestState::Pending).unwrap(), 0);
    assert_eq!(
        storage.get_latest_run().unwrap().unwrap().status,
        RunStatus::Completed
    );
}

#[tokio::test]
async fn test_quota_bounds_items_across_concurrent_listings() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("crawl.db");

    let site = Arc::new(
        MockSite::new()
            .with_listing("women", vec![item_urls(0..10)])
            .with_listing("men", vec![item_urls(5..15)])
            .with_listing("kids", vec![item_urls(10..20)]),
    );
    let config = create_test_config(
        &db,
        &[listing_url("women"), listing_url("men"), listing_url("kids")],
        "max-items = 3",
        "max-concurrency = 5",
    );

    let report = run_crawl(config, &db, site).await;

    assert_eq!(report.stop_reason, StopReason::Drained);
    assert_eq!(report.items_scheduled, 3);
    assert_eq!(item_ids(&db).len(), 3);

    let storage = SqliteStorage::new(&db).unwrap();
    assert_eq!(storage.count_requests_by_label(RequestLabel::Item).unwrap(), 3);
    assert_eq!(storage.load_quota().unwrap(), Some(3));
}

#[tokio::test]
async fn test_retries_then_failure_record() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("crawl.db");

    let flaky = item_url(1);
    let broken = item_url(2);
    let site = Arc::new(
        MockSite::new()
            .with_listing("women", vec![item_urls(1..4)])
            .failing(&flaky, 1)
            .failing(&broken, 10),
    );
    let config = create_test_config(&db, &[listing_url("women")], "", "max-request-retries = 2");

    let report = run_crawl(config, &db, site.clone()).await;

    assert_eq!(report.stop_reason, StopReason::Drained);
    assert_eq!(report.handled, 3, "listing, flaky item and healthy item");
    assert_eq!(report.failed, 1);
    assert_eq!(report.retries, 3);

    // The broken page was opened once plus once per retry
    let attempts = site.opened().iter().filter(|url| **url == broken).count();
    assert_eq!(attempts, 3);

    let ids = item_ids(&db);
    assert_eq!(ids, vec!["1".to_string(), "3".to_string()]);

    let flaky_record = records(&db, RecordKind::Item)
        .into_iter()
        .find(|record| record["itemId"] == "1")
        .unwrap();
    assert_eq!(flaky_record["#debug"]["retryCount"], 1);

    let failures = records(&db, RecordKind::Failure);
    assert_eq!(failures.len(), 1);
    let debug = &failures[0]["#debug"];
    assert_eq!(debug["url"], broken.as_str());
    assert_eq!(debug["retryCount"], 2);
    assert_eq!(debug["errorMessages"].as_array().unwrap().len(), 3);

    let storage = SqliteStorage::new(&db).unwrap();
    assert_eq!(storage.count_requests_by_state(RequestState::Failed).unwrap(), 1);
}

#[tokio::test]
async fn test_inactive_next_on_first_page_scans_once() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("crawl.db");

    let site = Arc::new(MockSite::new().with_listing("sale", vec![item_urls(1..3)]));
    let config = create_test_config(&db, &[listing_url("sale")], "", "");

    let report = run_crawl(config, &db, site.clone()).await;

    assert_eq!(report.stop_reason, StopReason::Drained);
    assert_eq!(site.clicks(), 0);
    assert_eq!(item_ids(&db), vec!["1".to_string(), "2".to_string()]);
}

#[tokio::test]
async fn test_out_of_domain_seed_yields_empty_crawl() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("crawl.db");

    let site = Arc::new(MockSite::new());
    let config = create_test_config(&db, &["https://example.com/x".to_string()], "", "");

    let report = run_crawl(config, &db, site.clone()).await;

    assert_eq!(report.stop_reason, StopReason::Drained);
    assert_eq!(report.handled, 0);
    assert_eq!(report.records_emitted, 0);
    assert!(site.opened().is_empty());

    let storage = SqliteStorage::new(&db).unwrap();
    assert_eq!(storage.count_records(RecordKind::Item).unwrap(), 0);
    assert!(storage.load_seen().unwrap().is_empty());
}

#[tokio::test]
async fn test_item_seeds_count_against_quota() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("crawl.db");

    let site = Arc::new(MockSite::new().with_listing("women", vec![item_urls(10..20)]));
    let config = create_test_config(
        &db,
        &[item_url(1), item_url(2), listing_url("women")],
        "max-items = 4",
        "",
    );

    run_crawl(config, &db, site).await;

    assert_eq!(
        item_ids(&db),
        vec!["1".to_string(), "10".to_string(), "11".to_string(), "2".to_string()]
    );
}

#[tokio::test]
async fn test_resumed_crawl_matches_uninterrupted_crawl() {
    let dir = tempfile::tempdir().unwrap();
    let site = || {
        Arc::new(MockSite::new().with_listing("women", vec![item_urls(1..5), item_urls(5..9)]))
    };
    let starts = [listing_url("women")];

    let straight_db = dir.path().join("straight.db");
    let config = create_test_config(&straight_db, &starts, "max-items = 6", "");
    run_crawl(config, &straight_db, site()).await;

    // Stop after three finished requests, then resume with a higher cap
    let resumed_db = dir.path().join("resumed.db");
    let config = create_test_config(
        &resumed_db,
        &starts,
        "max-items = 6",
        "max-requests-per-crawl = 3\nmax-concurrency = 2",
    );
    let first = run_crawl(config, &resumed_db, site()).await;
    assert_eq!(first.stop_reason, StopReason::RequestCap);
    assert_eq!(first.handled, 3);
    assert!(item_ids(&resumed_db).len() < 6);

    {
        let storage = SqliteStorage::new(&resumed_db).unwrap();
        assert_eq!(
            storage.get_latest_run().unwrap().unwrap().status,
            RunStatus::Interrupted
        );
        assert_eq!(storage.count_requests_by_state(RequestState::InFlight).unwrap(), 0);
    }

    let config = create_test_config(&resumed_db, &starts, "max-items = 6", "");
    let second = run_crawl(config, &resumed_db, site()).await;
    assert_eq!(second.stop_reason, StopReason::Drained);
    assert_eq!(second.items_scheduled, 6);

    assert_eq!(item_ids(&resumed_db), item_ids(&straight_db));
    assert_eq!(item_ids(&resumed_db).len(), 6);
}

#[tokio::test]
async fn test_output_extension_and_jsonl_copy() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("crawl.db");
    let jsonl = dir.path().join("out").join("dataset.jsonl");

    let site = Arc::new(MockSite::new().with_listing("women", vec![item_urls(1..3)]));
    let mut config = create_test_config(
        &db,
        &[listing_url("women")],
        r#"
[input.extend-output]
omit = ["description"]
rename = { color = "colour" }
constants = { source = "catalog" }
"#,
        "",
    );
    config.output.dataset_path = Some(jsonl.display().to_string());

    run_crawl(config, &db, site).await;

    let items = records(&db, RecordKind::Item);
    assert_eq!(items.len(), 2);
    for item in &items {
        assert!(item.get("description").is_none());
        assert_eq!(item["colour"], "Black");
        assert_eq!(item["source"], "catalog");
        assert!(item["#debug"]["url"].is_string());
    }

    let lines = std::fs::read_to_string(&jsonl).unwrap();
    assert_eq!(lines.lines().count(), 2);
}
