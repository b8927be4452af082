mod common;

use chrono::NaiveDate;
use insider_spider::filter::FilterSet;
use insider_spider::insider::{openinsider, TradeRecord};
use insider_spider::Pipeline;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// three months: january through march 2024
fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 20).unwrap()
}

async fn serve_page(server: &MockServer, expected_requests: Option<u64>) {
    let mock = Mock::given(method("GET"))
        .and(path("/screener"))
        .respond_with(ResponseTemplate::new(200).set_body_string(common::OPENINSIDER_PAGE));
    match expected_requests {
        Some(n) => mock.expect(n).mount(server).await,
        None => mock.mount(server).await,
    }
}

// in-memory log sink shared with the subscriber
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

fn read_output(path: &std::path::Path) -> Vec<TradeRecord> {
    csv::Reader::from_path(path)
        .unwrap()
        .deserialize()
        .collect::<Result<Vec<TradeRecord>, _>>()
        .unwrap()
}

#[tokio::test]
async fn output_holds_exactly_the_records_passing_every_filter() {
    let server = MockServer::start().await;
    serve_page(&server, None).await;
    let dir = TempDir::new().unwrap();
    let config = common::config(dir.path(), &server.uri(), 4, false);

    // -- SCRAPE --
    let pipeline = Pipeline::from_config(&config).unwrap();
    let summary = openinsider::scrape(&config, &pipeline, today()).await.unwrap();

    // -- CHECK --
    let records = read_output(&summary.output);
    let filters = FilterSet::from(&config.filters);
    assert!(records.iter().all(|record| filters.keep(record)));

    let tickers: Vec<&str> = records.iter().map(|r| r.ticker.as_str()).collect();
    assert_eq!(tickers, vec!["ACME", "BIGC"]);

    // same page for all three months, de-duplicated on write
    assert_eq!(summary.written, 2);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 0);
    // one malformed row per page
    assert_eq!(summary.skipped, 3);
    // SMAL (value) and OPTX (type) per page
    assert_eq!(summary.filtered, 6);
}

#[tokio::test]
async fn warm_cache_rerun_is_byte_identical() {
    let server = MockServer::start().await;
    // the second run must be served from the cache
    serve_page(&server, Some(3)).await;
    let dir = TempDir::new().unwrap();
    let config = common::config(dir.path(), &server.uri(), 2, true);
    let pipeline = Pipeline::from_config(&config).unwrap();

    let first = openinsider::scrape(&config, &pipeline, today()).await.unwrap();
    let first_bytes = std::fs::read(&first.output).unwrap();
    assert_eq!(first.cache_hits, 0);

    let second = openinsider::scrape(&config, &pipeline, today()).await.unwrap();
    assert_eq!(second.cache_hits, 3);
    assert_eq!(first_bytes, std::fs::read(&second.output).unwrap());
}

#[tokio::test]
async fn worker_count_does_not_change_the_output() {
    let server = MockServer::start().await;
    serve_page(&server, None).await;

    let mut outputs = Vec::new();
    for workers in [1, 10] {
        let dir = TempDir::new().unwrap();
        let config = common::config(dir.path(), &server.uri(), workers, false);
        let pipeline = Pipeline::from_config(&config).unwrap();
        assert_eq!(pipeline.max_workers(), workers);

        let summary = openinsider::scrape(&config, &pipeline, today()).await.unwrap();
        outputs.push(std::fs::read(&summary.output).unwrap());
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[tokio::test]
async fn failed_month_does_not_stop_the_others() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/screener"))
        .and(query_param("fdr", "02/01/2024 - 02/29/2024"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>down for maintenance</body></html>"))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/screener"))
        .and(query_param("fdr", "03/01/2024 - 03/31/2024"))
        .respond_with(ResponseTemplate::new(404))
        .with_priority(1)
        .mount(&server)
        .await;
    serve_page(&server, None).await;

    let dir = TempDir::new().unwrap();
    let config = common::config(dir.path(), &server.uri(), 3, false);
    let pipeline = Pipeline::from_config(&config).unwrap();
    let summary = openinsider::scrape(&config, &pipeline, today()).await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 2);
    assert_eq!(read_output(&summary.output).len(), 2);

    // 404 is not retried; one request per month
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn malformed_row_is_logged_and_the_rest_kept() {
    let server = MockServer::start().await;
    serve_page(&server, Some(1)).await;
    let dir = TempDir::new().unwrap();
    let config = common::config(dir.path(), &server.uri(), 1, false);
    let pipeline = Pipeline::from_config(&config).unwrap();

    let logs = LogBuffer::default();
    let sink = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || sink.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    // january only: one page, one malformed row (BROK)
    let january = NaiveDate::from_ymd_opt(2024, 1, 20).unwrap();
    let summary = openinsider::scrape(&config, &pipeline, january).await.unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.written, 2);

    let text = logs.text();
    let warnings: Vec<&str> = text
        .lines()
        .filter(|line| line.contains("skipping malformed row"))
        .collect();
    assert_eq!(warnings.len(), 1, "{text}");
    assert!(warnings[0].contains("WARN"));
    assert!(warnings[0].contains("[trades_2024_01]"));
}
