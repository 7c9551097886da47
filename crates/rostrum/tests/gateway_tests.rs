//! Gateway route behavior via in-process requests.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use rostrum::bus::BusPublisher;
use rostrum::failover::{ActivationState, FailoverHandle};
use rostrum::gateway::{self, AppState};
use rostrum::state::{DeviceRole, StatePatch, StateStoreHandle};
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;

fn app_for(role: DeviceRole) -> (Router, StateStoreHandle) {
    let store = StateStoreHandle::spawn(role, 30, CancellationToken::new());
    let (publisher, _bus_rx) = BusPublisher::channel();
    let activation = Arc::new(ActivationState::new(role));
    let failover = FailoverHandle::new(
        role,
        format!("{}-test", role.key()),
        activation,
        publisher.clone(),
    );
    let state = AppState::new(store.clone(), publisher, failover, Duration::from_secs(5));
    (gateway::router(state), store)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_get_state_returns_snapshot() {
    let (app, store) = app_for(DeviceRole::Main);
    store
        .apply(StatePatch::Presenter {
            name: Some("Ada".to_string()),
            topic: Some("Analytical Engines".to_string()),
        })
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/state")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["current_presenter"], "Ada");
    assert_eq!(json["current_topic"], "Analytical Engines");
    assert_eq!(json["current_slide"], 1);
    assert_eq!(json["total_slides"], 30);
    assert_eq!(json["device_status"]["main"], "ONLINE");
}

#[tokio::test]
async fn test_activate_route_promotes_backup() {
    let (app, _store) = app_for(DeviceRole::Backup);

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/failover/activate")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ACTIVE");
}

#[tokio::test]
async fn test_standby_route_demotes_backup() {
    let (app, _store) = app_for(DeviceRole::Backup);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/failover/activate")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/failover/standby")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "STANDBY");
}

#[tokio::test]
async fn test_failover_routes_rejected_on_main() {
    let (app, _store) = app_for(DeviceRole::Main);

    for uri in ["/failover/activate", "/failover/standby"] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT, "{uri}");
        let json = body_json(response).await;
        assert!(json["error"].is_string());
    }
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let (app, _store) = app_for(DeviceRole::Main);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/nonsense")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
