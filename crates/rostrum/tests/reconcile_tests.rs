//! Reconciliation client behavior against a mocked main controller.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use rostrum::failover::Reconciler;
use rostrum::state::{DeviceRole, PresentationState};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PULL_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_pull_returns_snapshot_on_success() {
    let server = MockServer::start().await;
    let mut snapshot = PresentationState::initial(DeviceRole::Main, 30);
    snapshot.current_presenter = "Grace".to_string();
    snapshot.current_slide = 9;

    Mock::given(method("GET"))
        .and(path("/state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&snapshot))
        .mount(&server)
        .await;

    let reconciler = Reconciler::new(&server.uri(), PULL_TIMEOUT).unwrap();
    let pulled = reconciler.pull().await.unwrap();

    assert_eq!(pulled.current_presenter, "Grace");
    assert_eq!(pulled.current_slide, 9);
}

#[tokio::test]
async fn test_pull_tolerates_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/state"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let reconciler = Reconciler::new(&server.uri(), PULL_TIMEOUT).unwrap();
    assert!(reconciler.pull().await.is_none());
}

#[tokio::test]
async fn test_pull_tolerates_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/state"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not a snapshot"))
        .mount(&server)
        .await;

    let reconciler = Reconciler::new(&server.uri(), PULL_TIMEOUT).unwrap();
    assert!(reconciler.pull().await.is_none());
}

#[tokio::test]
async fn test_pull_tolerates_unreachable_main() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let reconciler = Reconciler::new(&uri, PULL_TIMEOUT).unwrap();
    assert!(reconciler.pull().await.is_none());
}

#[tokio::test]
async fn test_pull_times_out_on_slow_main() {
    let server = MockServer::start().await;
    let snapshot = PresentationState::initial(DeviceRole::Main, 30);

    Mock::given(method("GET"))
        .and(path("/state"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(&snapshot)
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let reconciler = Reconciler::new(&server.uri(), Duration::from_millis(200)).unwrap();
    assert!(reconciler.pull().await.is_none());
}

#[tokio::test]
async fn test_base_url_trailing_slash_is_normalized() {
    let server = MockServer::start().await;
    let snapshot = PresentationState::initial(DeviceRole::Main, 30);

    Mock::given(method("GET"))
        .and(path("/state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&snapshot))
        .mount(&server)
        .await;

    let base = format!("{}/", server.uri());
    let reconciler = Reconciler::new(&base, PULL_TIMEOUT).unwrap();
    assert!(reconciler.pull().await.is_some());
}
