// SPDX-License-Identifier: Apache-2.0

use cmr_ingest::{
    crawl_cmu_registry, crawl_components, CrawlOptions, DatastorePage, DatastoreQuery, IngestError,
    IngestErrorCode, Resource, Sleeper, UpstreamApi, MAX_BACKOFF,
};
use cmr_model::UpstreamRecord;
use cmr_store::ComponentStore;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

struct FakeUpstream {
    records: Mutex<Vec<UpstreamRecord>>,
    failures: Mutex<VecDeque<IngestError>>,
    queries: Mutex<Vec<DatastoreQuery>>,
}

impl FakeUpstream {
    fn new(records: Vec<UpstreamRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            failures: Mutex::new(VecDeque::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    fn fail_next(&self, code: IngestErrorCode, times: usize) {
        let mut failures = self.failures.lock().expect("lock");
        for _ in 0..times {
            failures.push_back(IngestError::new(code, "boom"));
        }
    }

    fn append(&self, record: UpstreamRecord) {
        self.records.lock().expect("lock").push(record);
    }

    fn offsets(&self) -> Vec<u64> {
        self.queries.lock().expect("lock").iter().map(|q| q.offset).collect()
    }
}

impl UpstreamApi for FakeUpstream {
    fn datastore_search(&self, query: &DatastoreQuery) -> Result<DatastorePage, IngestError> {
        self.queries.lock().expect("lock").push(query.clone());
        if let Some(err) = self.failures.lock().expect("lock").pop_front() {
            return Err(err);
        }
        let records = self.records.lock().expect("lock");
        let start = (query.offset as usize).min(records.len());
        let end = (start + query.limit as usize).min(records.len());
        Ok(DatastorePage {
            total: Some(records.len() as u64),
            records: records[start..end].to_vec(),
        })
    }
}

#[derive(Default)]
struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.lock().expect("lock").push(duration);
    }
}

fn record(id: &str, cmu: &str, location: &str) -> UpstreamRecord {
    let value = json!({
        "Component ID": id,
        "CMU ID": cmu,
        "Location and Post Code": location,
        "Company Name": "Acme Power",
        "Generating Technology Class": "Battery",
        "Auction Name": "T-4 2024-25",
        "Delivery Year": "2027",
        "De-Rated Capacity": 1.25
    });
    value.as_object().cloned().expect("object")
}

fn opts(limit: u64) -> CrawlOptions {
    CrawlOptions {
        limit,
        sleep: Duration::from_millis(10),
        ..CrawlOptions::for_resource(Resource::Components)
    }
}

#[test]
fn full_crawl_completes_on_short_page() {
    let api = FakeUpstream::new((0..7).map(|i| record(&format!("C{i}"), "CMU1", "Site A")).collect());
    let sleeper = RecordingSleeper::default();
    let mut store = ComponentStore::open_in_memory().expect("store");

    let report = crawl_components(&api, &mut store, &sleeper, &opts(3)).expect("crawl");
    assert!(report.completed);
    assert_eq!(report.pages, 3);
    assert_eq!(report.records_seen, 7);
    assert_eq!(report.created, 7);
    assert_eq!(report.next_offset, 6);
    assert_eq!(report.upstream_total, Some(7));
    assert_eq!(api.offsets(), vec![0, 3, 6]);
    // one pause between each pair of pages
    assert_eq!(sleeper.slept.lock().expect("lock").len(), 2);
    assert_eq!(store.count_components().expect("count"), 7);

    let state = store.crawl_state(&opts(3).state_key()).expect("state").expect("saved");
    assert!(state.completed);
    assert_eq!(state.max_offset, 6);
}

#[test]
fn interrupted_crawl_resumes_from_persisted_offset() {
    let api = FakeUpstream::new((0..10).map(|i| record(&format!("C{i}"), "CMU1", "Site A")).collect());
    let sleeper = RecordingSleeper::default();
    let mut store = ComponentStore::open_in_memory().expect("store");

    let first = crawl_components(
        &api,
        &mut store,
        &sleeper,
        &CrawlOptions {
            max_pages: Some(2),
            ..opts(4)
        },
    )
    .expect("first");
    assert!(!first.completed);
    assert_eq!(first.next_offset, 8);

    let second = crawl_components(&api, &mut store, &sleeper, &opts(4)).expect("second");
    assert_eq!(second.start_offset, 8);
    assert_eq!(second.records_seen, 2);
    assert!(second.completed);
    assert_eq!(store.count_components().expect("count"), 10);
}

#[test]
fn completed_crawl_picks_up_appended_rows() {
    let api = FakeUpstream::new((0..5).map(|i| record(&format!("C{i}"), "CMU1", "Site A")).collect());
    let sleeper = RecordingSleeper::default();
    let mut store = ComponentStore::open_in_memory().expect("store");
    crawl_components(&api, &mut store, &sleeper, &opts(4)).expect("first");

    api.append(record("C5", "CMU2", "Site B"));
    let again = crawl_components(&api, &mut store, &sleeper, &opts(4)).expect("again");
    assert_eq!(again.start_offset, 4);
    assert_eq!(again.created, 1);
    assert_eq!(again.updated, 1);
    assert_eq!(store.count_components().expect("count"), 6);

    let restarted = crawl_components(
        &api,
        &mut store,
        &sleeper,
        &CrawlOptions {
            restart: true,
            ..opts(4)
        },
    )
    .expect("restart");
    assert_eq!(restarted.start_offset, 0);
    assert_eq!(restarted.updated, 6);
}

#[test]
fn duplicates_and_malformed_records_are_counted() {
    let mut records = vec![
        record("C1", "CMU1", "Site A"),
        record("C2", "CMU1", "Site A"),
        record("C1", "CMU1", "Site A"),
    ];
    let mut broken = record("", "CMU9", "Nowhere");
    broken.remove("Component ID");
    records.push(broken);
    records.push(record("C2", "CMU1", "Site A"));
    let api = FakeUpstream::new(records);
    let sleeper = RecordingSleeper::default();
    let mut store = ComponentStore::open_in_memory().expect("store");

    let report = crawl_components(&api, &mut store, &sleeper, &opts(2)).expect("crawl");
    assert_eq!(report.duplicates, 2);
    assert_eq!(report.malformed, 1);
    assert_eq!(report.malformed_samples[0].offset, 2);
    assert!(report.malformed_samples[0].message.contains("Component ID"));
    assert_eq!(report.created, 2);
    assert_eq!(store.count_components().expect("count"), 2);
}

#[test]
fn transient_failures_back_off_then_succeed() {
    let api = FakeUpstream::new(vec![record("C1", "CMU1", "Site A")]);
    api.fail_next(IngestErrorCode::Network, 3);
    let sleeper = RecordingSleeper::default();
    let mut store = ComponentStore::open_in_memory().expect("store");

    let report = crawl_components(&api, &mut store, &sleeper, &opts(10)).expect("crawl");
    assert!(report.completed);
    assert_eq!(report.retries, 3);
    assert_eq!(
        *sleeper.slept.lock().expect("lock"),
        vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
    );
    assert!(sleeper.slept.lock().expect("lock").iter().all(|d| *d <= MAX_BACKOFF));
}

#[test]
fn exhausted_retries_abort_but_keep_progress() {
    let api = FakeUpstream::new((0..6).map(|i| record(&format!("C{i}"), "CMU1", "Site A")).collect());
    let sleeper = RecordingSleeper::default();
    let mut store = ComponentStore::open_in_memory().expect("store");
    crawl_components(
        &api,
        &mut store,
        &sleeper,
        &CrawlOptions {
            max_pages: Some(1),
            ..opts(3)
        },
    )
    .expect("first page");

    api.fail_next(IngestErrorCode::Network, 10);
    let report = crawl_components(
        &api,
        &mut store,
        &sleeper,
        &CrawlOptions {
            max_retries: 2,
            ..opts(3)
        },
    )
    .expect("report");
    assert!(report.aborted.is_some());
    assert!(!report.completed);
    assert_eq!(report.retries, 2);
    let state = store.crawl_state(&opts(3).state_key()).expect("state").expect("saved");
    assert_eq!(state.max_offset, 3);
}

#[test]
fn rejected_requests_are_not_retried() {
    let api = FakeUpstream::new(vec![record("C1", "CMU1", "Site A")]);
    api.fail_next(IngestErrorCode::Upstream, 1);
    let sleeper = RecordingSleeper::default();
    let mut store = ComponentStore::open_in_memory().expect("store");
    let report = crawl_components(&api, &mut store, &sleeper, &opts(10)).expect("report");
    assert_eq!(report.retries, 0);
    assert!(report.aborted.as_deref().is_some_and(|m| m.starts_with("upstream_rejected")));
}

#[test]
fn cmu_registry_crawl_stores_raw_rows() {
    let api = FakeUpstream::new(vec![
        record("ignored", "CMU1", "Site A"),
        record("ignored", "CMU2", "Site B"),
        record("ignored", "CMU1", "Site A"),
    ]);
    let sleeper = RecordingSleeper::default();
    let mut store = ComponentStore::open_in_memory().expect("store");
    let report = crawl_cmu_registry(
        &api,
        &mut store,
        &sleeper,
        &CrawlOptions {
            limit: 10,
            ..CrawlOptions::for_resource(Resource::Cmu)
        },
    )
    .expect("crawl");
    assert_eq!(report.written, 2);
    assert_eq!(report.duplicates, 1);
    assert_eq!(store.count_cmu_registry().expect("count"), 2);
    let entry = store.cmu_registry_entry("CMU2").expect("read").expect("entry");
    assert_eq!(entry.raw["Location and Post Code"], json!("Site B"));
    assert!(!entry.last_updated.is_empty());
}

#[test]
fn filtered_crawls_keep_separate_offsets() {
    let filtered = CrawlOptions {
        q: Some("tesco".to_string()),
        ..opts(3)
    };
    assert_ne!(filtered.state_key(), opts(3).state_key());
    assert_eq!(Resource::parse("CMU"), Some(Resource::Cmu));
    assert_eq!(Resource::parse("nope"), None);
}
