//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the geocoding service and exercise
//! the full lookup cycle end-to-end, plus instrumented geocoders for the
//! concurrency properties.

use async_trait::async_trait;
use geo_ripple::config::{
    Config, CrawlerConfig, GeocoderConfig, IdentityConfig, OutputConfig, ProxyConfig, RetryConfig,
};
use geo_ripple::crawler::{
    run_crawl, Coordinator, FetchError, FetchOutcome, GeocodeCandidate, Geocoder, PhaseTimings,
    RetryPolicy,
};
use geo_ripple::session::{ProxyEndpoint, ProxyRegistry};
use geo_ripple::{AddressRecord, ResultSlot};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HANOI_BODY: &str = r#"[{"place_id": 1, "lat": "21.0283334", "lon": "105.854041", "display_name": "Hà Nội, Việt Nam"},
                             {"place_id": 2, "lat": "20.0", "lon": "105.0"}]"#;

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str, dir: &std::path::Path) -> Config {
    Config {
        crawler: CrawlerConfig {
            max_concurrent_requests: 3,
            request_timeout_secs: 5,
            connect_timeout_secs: 2,
        },
        geocoder: GeocoderConfig {
            base_url: format!("{}/search.php", base_url),
            referer: "https://nominatim.openstreetmap.org/ui/search.html".to_string(),
            format: "jsonv2".to_string(),
            limit: None,
            polygon_geojson: true,
        },
        retry: RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            multiplier: 2.0,
            jitter: 0.2,
            service_unavailable_delay_ms: 5,
        },
        identity: IdentityConfig {
            user_agents_path: None,
        },
        proxy: ProxyConfig {
            endpoints: vec![],
            rotate_on_rate_limit: false,
        },
        output: OutputConfig {
            input_path: dir.join("input.csv").display().to_string(),
            output_path: dir.join("output.csv").display().to_string(),
            log_path: dir.join("requests.log").display().to_string(),
        },
    }
}

/// In-memory log sink shared between the subscriber and the test
#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Routes log output on this test's thread into a buffer
///
/// `#[tokio::test]` runs on a current-thread runtime, so spawned lookup tasks
/// log through the same thread-local subscriber.
fn capture_logs() -> (LogCapture, tracing::subscriber::DefaultGuard) {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}

async fn mount_json(server: &MockServer, address: &str, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path("/search.php"))
        .and(query_param("q", address))
        .respond_with(ResponseTemplate::new(status).set_body_string(body.to_string()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_end_to_end_mixed_outcomes() {
    let (logs, _guard) = capture_logs();
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_json(&mock_server, "Hanoi", 200, HANOI_BODY).await;
    mount_json(&mock_server, "  ", 200, "<html>Bad request</html>").await;
    mount_json(&mock_server, "Unknown Place 12345", 200, "[]").await;

    let config = create_test_config(&mock_server.uri(), dir.path());
    let coordinator = Coordinator::new(&config).expect("Failed to create coordinator");
    let records = AddressRecord::from_texts(["Hanoi", "  ", "Unknown Place 12345"]);
    let report = coordinator.run(records).await.expect("Crawl failed");

    assert_eq!(report.rows.len(), 3);
    assert_eq!(report.rows[0].record.text, "Hanoi");
    assert_eq!(report.rows[0].slot, ResultSlot::resolved(21.0283334, 105.854041));
    assert!(!report.rows[1].slot.is_set());
    assert!(!report.rows[2].slot.is_set());

    let stats = &report.statistics;
    assert_eq!(stats.resolved, 1);
    assert_eq!(stats.no_match, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.errors_by_kind.get("malformed_response"), Some(&1));

    // Malformed bodies are not retried
    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);

    let logs = logs.contents();
    let malformed: Vec<&str> = logs
        .lines()
        .filter(|line| line.contains("ERROR") && line.contains("Error processing address"))
        .collect();
    assert_eq!(malformed.len(), 1, "logs:\n{}", logs);
    assert!(malformed[0].contains("Malformed response"));
    assert!(malformed[0].contains("after 1 attempt(s)"));
    assert!(logs.contains("Processed Hanoi: Latitude = 21.0283334, Longitude = 105.854041"));
    assert!(logs.contains("No match for Unknown Place 12345"));
}

#[tokio::test]
async fn test_request_carries_identity_referer_and_query() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let agents_path = dir.path().join("user_agents.txt");
    let mut agents = std::fs::File::create(&agents_path).unwrap();
    writeln!(agents, "\nGeoRippleTest/1.0\n").unwrap();

    Mock::given(method("GET"))
        .and(path("/search.php"))
        .and(query_param("q", "Ho Chi Minh City, Vietnam"))
        .and(query_param("format", "jsonv2"))
        .and(query_param("polygon_geojson", "1"))
        .and(header("user-agent", "GeoRippleTest/1.0"))
        .and(header(
            "referer",
            "https://nominatim.openstreetmap.org/ui/search.html",
        ))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"[{"lat": "10.7763897", "lon": "106.7011391"}]"#),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(&mock_server.uri(), dir.path());
    config.identity.user_agents_path = Some(agents_path.display().to_string());

    let coordinator = Coordinator::new(&config).unwrap();
    assert_eq!(coordinator.identity(), Some("GeoRippleTest/1.0"));

    let report = coordinator
        .run(AddressRecord::from_texts(["Ho Chi Minh City, Vietnam"]))
        .await
        .unwrap();

    assert_eq!(report.rows[0].slot, ResultSlot::resolved(10.7763897, 106.7011391));
}

#[tokio::test]
async fn test_persistent_rate_limit_gives_up_after_budget() {
    let (logs, _guard) = capture_logs();
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_json(&mock_server, "Hanoi", 429, "Too Many Requests").await;

    let config = create_test_config(&mock_server.uri(), dir.path());
    let report = Coordinator::new(&config)
        .unwrap()
        .run(AddressRecord::from_texts(["Hanoi"]))
        .await
        .unwrap();

    assert!(!report.rows[0].slot.is_set());
    assert_eq!(report.statistics.failed, 1);
    assert_eq!(report.statistics.errors_by_kind.get("rate_limited"), Some(&1));
    assert_eq!(report.statistics.total_attempts, 3);

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);

    let logs = logs.contents();
    assert!(
        logs.lines().any(|line| line.contains("ERROR")
            && line.contains("Error processing address Hanoi after 3 attempt(s)")
            && line.contains("Rate limited (HTTP 429)")),
        "logs:\n{}",
        logs
    );
    // Every rejected attempt leaves its timing map in the log
    assert_eq!(logs.matches("Timing details for Hanoi (HTTP 429)").count(), 3);
}

#[tokio::test]
async fn test_service_unavailable_then_success() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/search.php"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;
    mount_json(&mock_server, "Hanoi", 200, HANOI_BODY).await;

    let config = create_test_config(&mock_server.uri(), dir.path());
    let report = Coordinator::new(&config)
        .unwrap()
        .run(AddressRecord::from_texts(["Hanoi"]))
        .await
        .unwrap();

    assert_eq!(report.rows[0].slot, ResultSlot::resolved(21.0283334, 105.854041));
    assert_eq!(report.statistics.total_attempts, 2);
}

#[tokio::test]
async fn test_timeouts_then_success() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let k = 2;

    Mock::given(method("GET"))
        .and(path("/search.php"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("[]")
                .set_delay(Duration::from_secs(3)),
        )
        .up_to_n_times(k)
        .with_priority(1)
        .mount(&mock_server)
        .await;
    mount_json(&mock_server, "Hanoi", 200, HANOI_BODY).await;

    let mut config = create_test_config(&mock_server.uri(), dir.path());
    config.crawler.request_timeout_secs = 1;
    config.crawler.connect_timeout_secs = 1;
    config.retry.max_attempts = 5;

    let report = Coordinator::new(&config)
        .unwrap()
        .run(AddressRecord::from_texts(["Hanoi"]))
        .await
        .unwrap();

    assert_eq!(report.rows[0].slot, ResultSlot::resolved(21.0283334, 105.854041));
    assert_eq!(report.statistics.total_attempts, k + 1);
}

#[tokio::test]
async fn test_non_retryable_status_fails_once() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_json(&mock_server, "Hanoi", 403, "Forbidden").await;

    let config = create_test_config(&mock_server.uri(), dir.path());
    let report = Coordinator::new(&config)
        .unwrap()
        .run(AddressRecord::from_texts(["Hanoi"]))
        .await
        .unwrap();

    assert!(!report.rows[0].slot.is_set());
    assert_eq!(report.statistics.errors_by_kind.get("http_status"), Some(&1));
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_run_crawl_reads_and_writes_csv() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_json(&mock_server, "Hanoi", 200, HANOI_BODY).await;
    mount_json(&mock_server, "Atlantis", 200, "[]").await;

    let config = create_test_config(&mock_server.uri(), dir.path());
    std::fs::write(
        &config.output.input_path,
        "id,address,note\n1,Hanoi,capital\n2,Atlantis,myth\n",
    )
    .unwrap();

    let report = run_crawl(&config).await.expect("Crawl failed");
    assert_eq!(report.statistics.total_addresses, 2);

    let written = std::fs::read_to_string(&config.output.output_path).unwrap();
    assert_eq!(
        written,
        "id,address,note,lat_address,lon_address\n\
         1,Hanoi,capital,21.0283334,105.854041\n\
         2,Atlantis,myth,,\n"
    );
}

#[tokio::test]
async fn test_run_crawl_missing_input_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config("http://127.0.0.1:9", dir.path());

    assert!(run_crawl(&config).await.is_err());
}

/// Geocoder that tracks how many fetches run at once
struct CountingGeocoder {
    running: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl CountingGeocoder {
    fn new() -> Self {
        Self {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

/// Shared handle so the test can inspect counters after the run
#[derive(Clone)]
struct SharedCounting(Arc<CountingGeocoder>);

#[async_trait]
impl Geocoder for SharedCounting {
    async fn fetch(
        &self,
        address: &str,
        _proxy: Option<&ProxyEndpoint>,
    ) -> Result<FetchOutcome, FetchError> {
        let counters = &self.0;
        let now = counters.running.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak.fetch_max(now, Ordering::SeqCst);
        counters.calls.fetch_add(1, Ordering::SeqCst);

        // Addresses are "<index>"; later indexes finish sooner
        let index: u64 = address.parse().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(2 + (40 - index % 40) / 4)).await;

        counters.running.fetch_sub(1, Ordering::SeqCst);
        Ok(FetchOutcome {
            candidate: Some(GeocodeCandidate {
                latitude: index as f64,
                longitude: -(index as f64) / 2.0,
            }),
            timings: PhaseTimings::new(),
        })
    }
}

#[tokio::test]
async fn test_concurrency_limit_is_respected() {
    let geocoder = Arc::new(CountingGeocoder::new());
    let limit = 3;
    let coordinator = Coordinator::with_geocoder(
        SharedCounting(geocoder.clone()),
        Arc::new(ProxyRegistry::direct()),
        RetryPolicy::default(),
        limit,
    );

    let m = 40;
    let records = AddressRecord::from_texts((0..m).map(|i| i.to_string()));
    let report = coordinator.run(records).await.unwrap();

    assert_eq!(geocoder.calls.load(Ordering::SeqCst), m);
    // Bounded, and the bound is actually reached with 40 overlapping sleeps
    assert_eq!(geocoder.peak.load(Ordering::SeqCst), limit);
    assert_eq!(geocoder.running.load(Ordering::SeqCst), 0);

    // Staggered completions still land in their own rows
    assert_eq!(report.rows.len(), m);
    for (i, row) in report.rows.iter().enumerate() {
        assert_eq!(row.record.index, i);
        assert_eq!(row.slot, ResultSlot::resolved(i as f64, -(i as f64) / 2.0));
    }
}
