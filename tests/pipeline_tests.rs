mod common;

use common::{HangingPage, StaticPage, TARGET_URL, TimedOutPage, json_ld_page, test_config};
use esim_crawler::{DeviceSource, OutputFormat, Pipeline, RunError};
use serde_json::{Value, json};
use std::sync::Arc;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_structured_page_is_delivered() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_json(json!({
            "status": "devices",
            "category": "eSIM Compatible Devices",
            "devices": ["iPhone 12", "Pixel 7"],
            "source": "json_ld_schema",
            "total_devices": 2,
            "url": TARGET_URL,
            "title": "eSIM compatible devices"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = test_config(dir.path(), &format!("{}/hook", mock_server.uri()));
    let source = Arc::new(StaticPage::new(json_ld_page(&["iPhone 12", "Pixel 7", "XY"])));
    let pipeline = Pipeline::new(config, source).unwrap();

    let summary = pipeline.run_once().await.unwrap();
    assert_eq!(summary.outcome, "devices");
    assert_eq!(summary.device_count, 2);
    assert_eq!(summary.source, Some(DeviceSource::Structured));
    assert_eq!(summary.delivery_attempts, 1);
}

#[tokio::test]
async fn test_blocked_page_is_delivered_as_data() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = test_config(dir.path(), &mock_server.uri());
    let output = config.files.output.clone();
    let html = "<html><title>Just a moment...</title><body>Cloudflare Ray ID</body></html>";
    let pipeline = Pipeline::new(config, Arc::new(StaticPage::new(html))).unwrap();

    let summary = pipeline.run_once().await.unwrap();
    assert_eq!(summary.outcome, "blocked");
    assert_eq!(summary.device_count, 0);

    let written: Value = serde_json::from_str(&std::fs::read_to_string(output).unwrap()).unwrap();
    assert_eq!(written["status"], "blocked");
    assert_eq!(written["content_preview"], html);
}

#[tokio::test]
async fn test_stale_artifacts_are_replaced() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let mut config = test_config(dir.path(), &mock_server.uri());
    config.files.output_format = OutputFormat::Jsonl;
    std::fs::write(&config.files.output, "{\"stale\":true}\n{\"stale\":true}\n").unwrap();
    let output = config.files.output.clone();

    let html = "<ul><li>Galaxy S24 Ultra</li></ul>";
    let pipeline = Pipeline::new(config, Arc::new(StaticPage::new(html))).unwrap();
    let summary = pipeline.run_once().await.unwrap();
    assert_eq!(summary.source, Some(DeviceSource::Fallback));

    let contents = std::fs::read_to_string(output).unwrap();
    assert_eq!(contents.lines().count(), 1);
    assert!(!contents.contains("stale"));
}

#[tokio::test]
async fn test_exhausted_delivery_fails_the_run() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&mock_server)
        .await;

    let config = test_config(dir.path(), &mock_server.uri());
    let pipeline = Pipeline::new(config, Arc::new(StaticPage::new(json_ld_page(&["Pixel 7"])))).unwrap();

    let err = pipeline.run_once().await.unwrap_err();
    assert!(matches!(err, RunError::DeliveryExhausted { attempts: 3 }));
}

#[tokio::test]
async fn test_fetch_timeout_aborts_before_delivery() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = test_config(dir.path(), &mock_server.uri());
    let output = config.files.output.clone();
    let pipeline = Pipeline::new(config, Arc::new(TimedOutPage)).unwrap();

    let err = pipeline.run_once().await.unwrap_err();
    assert!(matches!(err, RunError::Fetch(_)));
    assert!(!output.exists());
}

#[tokio::test(start_paused = true)]
async fn test_run_timeout_bounds_the_crawl() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path(), "http://127.0.0.1:9/hook");
    config.crawl.run_timeout_secs = 5;

    let pipeline = Pipeline::new(config, Arc::new(HangingPage)).unwrap();
    let err = pipeline.run_once().await.unwrap_err();
    assert!(matches!(err, RunError::CrawlTimeout(5)));
}
