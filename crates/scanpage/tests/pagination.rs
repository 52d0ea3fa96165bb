//! End-to-end pagination against a scripted explorer.

use async_trait::async_trait;
use scanpage::chain::{HttpResponse, Transport, TransportError};
use scanpage::{
    run_batch, BatchTarget, Cache, ChainTable, CollectError, Collector, FetchConfig, Fetcher,
    Query, RecordKind, TimeWindow,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

const ADDR: &str = "0x7d2768dE32b0b80b7a3454c06BdAc94A69DDc7A9";

struct Call {
    at: Instant,
    params: Vec<(String, String)>,
}

/// Plays back responses in order and records every request.
struct ScriptedExplorer {
    responses: Mutex<Vec<HttpResponse>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedExplorer {
    fn new(mut responses: Vec<HttpResponse>) -> Arc<Self> {
        responses.reverse();
        Arc::new(Self {
            responses: Mutex::new(responses),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn pages_requested(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| {
                c.params
                    .iter()
                    .find(|(k, _)| k == "page")
                    .map(|(_, v)| v.clone())
            })
            .collect()
    }

    fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|c| c.at).collect()
    }
}

#[async_trait]
impl Transport for ScriptedExplorer {
    async fn get(
        &self,
        _base_url: &str,
        params: &[(String, String)],
    ) -> Result<HttpResponse, TransportError> {
        self.calls.lock().unwrap().push(Call {
            at: Instant::now(),
            params: params.to_vec(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| TransportError::Other("no scripted response left".into()))
    }
}

fn page(first_id: usize, len: usize) -> HttpResponse {
    let result: Vec<Value> = (first_id..first_id + len)
        .map(|i| {
            json!({
                "hash": format!("0x{i}"),
                "timeStamp": (1_700_000_000 + i).to_string(),
                "value": "1000000000000000000",
            })
        })
        .collect();
    HttpResponse {
        status: 200,
        body: json!({"status": "1", "message": "OK", "result": result}).to_string(),
    }
}

fn no_records() -> HttpResponse {
    HttpResponse {
        status: 200,
        body: json!({"status": "0", "message": "No transactions found", "result": []}).to_string(),
    }
}

fn http(status: u16) -> HttpResponse {
    HttpResponse {
        status,
        body: "Service Unavailable".into(),
    }
}

fn head(block: u64) -> HttpResponse {
    HttpResponse {
        status: 200,
        body: json!({"jsonrpc": "2.0", "id": 83, "result": format!("{block:#x}")}).to_string(),
    }
}

fn param(call: &Call, key: &str) -> Option<String> {
    call.params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
}

fn collector(script: &Arc<ScriptedExplorer>) -> Collector {
    let fetcher = Fetcher::new(FetchConfig::default(), script.clone(), None);
    Collector::new(ChainTable::with_api_key("test"), fetcher)
}

fn hashes(records: &[scanpage::Record]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.hash().map(String::from))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn pages_until_first_short_page() {
    let script = ScriptedExplorer::new(vec![page(0, 3), page(3, 3), page(6, 2)]);
    let query = Query::new(ADDR, "ethereum", RecordKind::Transaction).with_page_size(3);
    let c = collector(&script).collect(&query).await;

    assert!(c.is_complete());
    assert_eq!(script.call_count(), 3);
    assert_eq!(script.pages_requested(), ["1", "2", "3"]);
    assert_eq!(c.pages, 3);
    assert_eq!(c.requests, 3);
    let expected: Vec<String> = (0..8).map(|i| format!("0x{i}")).collect();
    assert_eq!(hashes(&c.records), expected);
}

#[tokio::test(start_paused = true)]
async fn full_last_page_needs_one_more_request() {
    let script = ScriptedExplorer::new(vec![page(0, 3), page(3, 3), page(6, 0)]);
    let query = Query::new(ADDR, "ethereum", RecordKind::Transaction).with_page_size(3);
    let c = collector(&script).collect(&query).await;
    assert!(c.is_complete());
    assert_eq!(script.call_count(), 3);
    assert_eq!(c.len(), 6);
}

#[tokio::test(start_paused = true)]
async fn no_transactions_on_first_page() {
    let script = ScriptedExplorer::new(vec![no_records()]);
    let query = Query::new(ADDR, "ethereum", RecordKind::Transaction);
    let c = collector(&script).collect(&query).await;
    assert!(c.is_complete());
    assert!(c.is_empty());
    assert_eq!(script.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn persistent_503_returns_partial_records() {
    let mut responses = vec![page(0, 3)];
    responses.extend((0..4).map(|_| http(503)));
    let script = ScriptedExplorer::new(responses);
    let query = Query::new(ADDR, "ethereum", RecordKind::Transaction).with_page_size(3);
    let c = collector(&script).collect(&query).await;

    assert_eq!(c.len(), 3);
    let err = c.error.expect("collection error");
    assert_eq!(err.retrieved, 3);
    assert_eq!(err.page, 2);
    assert!(err.source.is_transient());
    // page 1, then page 2 once plus three retries
    assert_eq!(script.call_count(), 1 + 1 + FetchConfig::default().max_retries as usize);
    assert_eq!(c.requests, 5);
}

#[tokio::test(start_paused = true)]
async fn retry_recovers_mid_collection() {
    let script = ScriptedExplorer::new(vec![page(0, 3), http(503), page(3, 1)]);
    let query = Query::new(ADDR, "ethereum", RecordKind::Transaction).with_page_size(3);
    let c = collector(&script).collect(&query).await;
    assert!(c.is_complete());
    assert_eq!(c.len(), 4);
    assert_eq!(script.pages_requested(), ["1", "2", "2"]);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_is_a_lower_bound_between_requests() {
    let script = ScriptedExplorer::new(vec![
        page(0, 2),
        http(500),
        http(502),
        page(2, 2),
        page(4, 1),
    ]);
    let config = FetchConfig {
        rate_limit_ms: 200,
        page_delay_ms: 0,
        retry_backoff_ms: 10,
        ..Default::default()
    };
    let fetcher = Fetcher::new(config, script.clone(), None);
    let collector = Collector::new(ChainTable::with_api_key("k"), fetcher);
    let query = Query::new(ADDR, "ethereum", RecordKind::Transaction).with_page_size(2);
    let c = collector.collect(&query).await;
    assert!(c.is_complete());
    let times = script.call_times();
    assert_eq!(times.len(), 5);
    for w in times.windows(2) {
        assert!(w[1] - w[0] >= Duration::from_millis(200));
    }
}

#[tokio::test(start_paused = true)]
async fn unsupported_chain_is_reported_not_raised() {
    let script = ScriptedExplorer::new(vec![]);
    let query = Query::new(ADDR, "notachain", RecordKind::Transaction);
    let c = collector(&script).collect(&query).await;
    assert!(c.is_empty());
    assert_eq!(
        c.error.map(|e| e.source),
        Some(CollectError::UnsupportedChain("notachain".into()))
    );
    assert_eq!(script.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn invalid_address_makes_no_requests() {
    let script = ScriptedExplorer::new(vec![]);
    let query = Query::new("not-an-address", "ethereum", RecordKind::Transaction);
    let c = collector(&script).collect(&query).await;
    assert!(matches!(
        c.error.map(|e| e.source),
        Some(CollectError::InvalidAddress { .. })
    ));
    assert_eq!(script.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn provider_error_is_terminal_for_the_query() {
    let script = ScriptedExplorer::new(vec![
        page(0, 2),
        HttpResponse {
            status: 200,
            body: json!({"status": "0", "message": "NOTOK", "result": "Error! Invalid address format"})
                .to_string(),
        },
    ]);
    let query = Query::new(ADDR, "ethereum", RecordKind::Transaction).with_page_size(2);
    let c = collector(&script).collect(&query).await;
    assert_eq!(c.len(), 2);
    assert_eq!(script.call_count(), 2);
    assert_eq!(
        c.error.map(|e| e.source),
        Some(CollectError::Provider {
            message: "NOTOK".into(),
            detail: "Error! Invalid address format".into()
        })
    );
}

#[tokio::test(start_paused = true)]
async fn rate_limit_message_is_retried() {
    let throttled = HttpResponse {
        status: 200,
        body: json!({"status": "0", "message": "NOTOK", "result": "Max rate limit reached"})
            .to_string(),
    };
    let script = ScriptedExplorer::new(vec![throttled, page(0, 1)]);
    let query = Query::new(ADDR, "ethereum", RecordKind::Transaction).with_page_size(5);
    let c = collector(&script).collect(&query).await;
    assert!(c.is_complete());
    assert_eq!(c.len(), 1);
    assert_eq!(script.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn window_filters_client_side_but_pagination_uses_raw_counts() {
    // ids 0..=2 have timestamps 1_700_000_000..=1_700_000_002
    let script = ScriptedExplorer::new(vec![page(0, 3), page(3, 3), page(6, 1)]);
    let window = TimeWindow::new(1_700_000_002, 1_700_000_004);
    let query = Query::new(ADDR, "ethereum", RecordKind::Transaction)
        .with_page_size(3)
        .with_time_window(window);
    let c = collector(&script).collect(&query).await;
    assert_eq!(script.call_count(), 3);
    assert_eq!(hashes(&c.records), ["0x2", "0x3", "0x4"]);
}

#[tokio::test(start_paused = true)]
async fn page_ceiling_stops_endless_pagination() {
    let script = ScriptedExplorer::new((0..10).map(|i| page(i * 2, 2)).collect());
    let config = FetchConfig {
        max_pages: 3,
        ..Default::default()
    };
    let fetcher = Fetcher::new(config, script.clone(), None);
    let collector = Collector::new(ChainTable::with_api_key("k"), fetcher);
    let query = Query::new(ADDR, "ethereum", RecordKind::Transaction).with_page_size(2);
    let c = collector.collect(&query).await;
    assert_eq!(script.call_count(), 3);
    assert_eq!(c.len(), 6);
    assert_eq!(c.error.map(|e| e.source), Some(CollectError::PageLimit(3)));
}

#[tokio::test(start_paused = true)]
async fn event_queries_use_log_endpoint_and_clamp_page_size() {
    let script = ScriptedExplorer::new(vec![no_records()]);
    let query = Query::new(ADDR, "arbitrum", RecordKind::Event)
        .with_page_size(10_000)
        .with_topic0("0xddf252ad");
    collector(&script).collect(&query).await;
    let calls = script.calls.lock().unwrap();
    let params = &calls[0].params;
    let get = |k: &str| params.iter().find(|(p, _)| p == k).map(|(_, v)| v.as_str());
    assert_eq!(get("module"), Some("logs"));
    assert_eq!(get("offset"), Some("1000"));
    assert_eq!(get("topic0"), Some("0xddf252ad"));
}

#[tokio::test(start_paused = true)]
async fn batch_continues_past_failures() {
    let script = ScriptedExplorer::new(vec![page(0, 1), http(400)]);
    let targets = vec![
        BatchTarget {
            label: "good".into(),
            address: ADDR.into(),
            chains: vec!["ethereum".into()],
            kinds: vec![RecordKind::Transaction],
            days: 0,
            topic0: None,
            page_size: Some(10),
        },
        BatchTarget {
            label: "unknown".into(),
            address: ADDR.into(),
            chains: vec!["sui".into()],
            kinds: vec![RecordKind::Transaction],
            days: 0,
            topic0: None,
            page_size: None,
        },
        BatchTarget {
            label: "rejected".into(),
            address: ADDR.into(),
            chains: vec!["polygon".into()],
            kinds: vec![RecordKind::InternalTransaction],
            days: 0,
            topic0: None,
            page_size: None,
        },
    ];
    let collector = collector(&script);
    let now = time::OffsetDateTime::from_unix_timestamp(1_800_000_000).unwrap();
    let mut seen = 0;
    let report = run_batch(&collector, &targets, now, |_, _| seen += 1).await;
    assert_eq!(seen, 3);
    assert_eq!(report.outcomes.len(), 3);
    assert!(report.outcomes[0].succeeded());
    assert_eq!(report.outcomes[0].retrieved, 1);
    assert!(!report.outcomes[1].succeeded());
    assert!(!report.outcomes[2].succeeded());
    assert!(!report.all_failed());
}

#[tokio::test(start_paused = true)]
async fn courtesy_delay_between_pages_but_not_after_last() {
    let script = ScriptedExplorer::new(vec![page(0, 3), page(3, 3), page(6, 2)]);
    let config = FetchConfig {
        rate_limit_ms: 200,
        page_delay_ms: 500,
        ..Default::default()
    };
    let fetcher = Fetcher::new(config, script.clone(), None);
    let collector = Collector::new(ChainTable::with_api_key("k"), fetcher);
    let query = Query::new(ADDR, "ethereum", RecordKind::Transaction).with_page_size(3);

    let start = Instant::now();
    let c = collector.collect(&query).await;
    let elapsed = start.elapsed();

    assert!(c.is_complete());
    let times = script.call_times();
    assert_eq!(times.len(), 3);
    for w in times.windows(2) {
        assert!(w[1] - w[0] >= Duration::from_millis(500));
    }
    // two delays between three pages, nothing after the short one
    assert_eq!(elapsed, Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn online_rerun_sees_fresh_data_despite_cache() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let query = Query::new(ADDR, "ethereum", RecordKind::Transaction).with_page_size(5);

    let first_script = ScriptedExplorer::new(vec![page(0, 1)]);
    let first = Collector::new(
        ChainTable::with_api_key("k"),
        Fetcher::new(
            FetchConfig::default(),
            first_script.clone(),
            Some(Cache::open(tmp.path()).unwrap()),
        ),
    );
    assert_eq!(first.collect(&query).await.len(), 1);

    let second_script = ScriptedExplorer::new(vec![page(0, 2)]);
    let second = Collector::new(
        ChainTable::with_api_key("k"),
        Fetcher::new(
            FetchConfig::default(),
            second_script.clone(),
            Some(Cache::open(tmp.path()).unwrap()),
        ),
    );
    let c = second.collect(&query).await;
    assert_eq!(c.len(), 2);
    assert_eq!(c.requests, 1);
    assert_eq!(second_script.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn batch_narrows_windowed_event_queries() {
    let script = ScriptedExplorer::new(vec![head(20_000_000), no_records()]);
    let targets = vec![BatchTarget {
        label: "events".into(),
        address: ADDR.into(),
        chains: vec!["ethereum".into()],
        kinds: vec![RecordKind::Event],
        days: 1,
        topic0: None,
        page_size: None,
    }];
    let collector = collector(&script);
    let now = time::OffsetDateTime::from_unix_timestamp(1_800_000_000).unwrap();
    let report = run_batch(&collector, &targets, now, |_, _| {}).await;
    assert!(report.outcomes[0].succeeded());

    let calls = script.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(param(&calls[0], "action").as_deref(), Some("eth_blockNumber"));
    assert_eq!(param(&calls[1], "module").as_deref(), Some("logs"));
    // one day on ethereum is ~7,200 blocks
    assert_eq!(param(&calls[1], "fromBlock").as_deref(), Some("19992800"));
    assert_eq!(param(&calls[1], "toBlock").as_deref(), Some("20000000"));
}

#[tokio::test(start_paused = true)]
async fn narrowing_falls_back_to_full_range() {
    let now = time::OffsetDateTime::from_unix_timestamp(1_800_000_000).unwrap();
    let window = TimeWindow::new(1_800_000_000 - 86_400, 1_800_000_000);

    let script = ScriptedExplorer::new(vec![http(404)]);
    let events = Query::new(ADDR, "ethereum", RecordKind::Event).with_time_window(window);
    let narrowed = collector(&script).narrow_block_range(events.clone(), now).await;
    assert_eq!(narrowed, events);
    assert_eq!(script.call_count(), 1);

    let untouched = ScriptedExplorer::new(vec![]);
    let txs = Query::new(ADDR, "ethereum", RecordKind::Transaction).with_time_window(window);
    assert_eq!(collector(&untouched).narrow_block_range(txs.clone(), now).await, txs);
    assert_eq!(untouched.call_count(), 0);
}
