//! Viewer WebSocket session lifecycle against a live gateway server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rostrum::bus::messages::{BusEvent, SlideCommand};
use rostrum::bus::BusPublisher;
use rostrum::failover::{ActivationState, FailoverHandle};
use rostrum::gateway::{self, AppState};
use rostrum::state::{DeviceRole, StatePatch, StateStoreHandle};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bind the gateway on an ephemeral port and return the ws URL.
async fn serve_gateway() -> (String, StateStoreHandle, mpsc::Receiver<BusEvent>) {
    let store = StateStoreHandle::spawn(DeviceRole::Main, 30, CancellationToken::new());
    let (publisher, bus_rx) = BusPublisher::channel();
    let activation = Arc::new(ActivationState::new(DeviceRole::Main));
    let failover = FailoverHandle::new(
        DeviceRole::Main,
        "main-test".to_string(),
        activation,
        publisher.clone(),
    );
    let state = AppState::new(store.clone(), publisher, failover, Duration::from_secs(5));
    let app = gateway::router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("ws://{addr}/ws"), store, bus_rx)
}

async fn connect(url: &str) -> Client {
    let (client, _response) = connect_async(url).await.unwrap();
    client
}

async fn read_snapshot(client: &mut Client) -> serde_json::Value {
    loop {
        match client.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
            Some(Ok(_)) => {}
            other => panic!("socket ended while waiting for a snapshot: {other:?}"),
        }
    }
}

/// Read snapshots until one matches. Watch updates coalesce, so a client
/// is never guaranteed to see every intermediate state.
async fn snapshot_where<F>(client: &mut Client, predicate: F) -> serde_json::Value
where
    F: Fn(&serde_json::Value) -> bool,
{
    timeout(RECV_TIMEOUT, async {
        loop {
            let snapshot = read_snapshot(client).await;
            if predicate(&snapshot) {
                return snapshot;
            }
        }
    })
    .await
    .expect("timed out waiting for a matching snapshot")
}

#[tokio::test]
async fn test_connect_greets_with_full_snapshot() {
    let (url, store, _bus_rx) = serve_gateway().await;
    store
        .apply(StatePatch::Presenter {
            name: Some("Ada".to_string()),
            topic: Some("Analytical Engines".to_string()),
        })
        .await
        .unwrap();

    let mut client = connect(&url).await;
    let greeting = snapshot_where(&mut client, |s| s["connected_clients"] == 1).await;

    assert_eq!(greeting["current_presenter"], "Ada");
    assert_eq!(greeting["current_topic"], "Analytical Engines");
    assert_eq!(greeting["timer_seconds"], 600);
    assert_eq!(greeting["current_slide"], 1);
    assert_eq!(greeting["device_status"]["main"], "ONLINE");
}

#[tokio::test]
async fn test_disconnect_decrements_count_and_survivor_keeps_receiving() {
    let (url, store, _bus_rx) = serve_gateway().await;

    let mut survivor = connect(&url).await;
    snapshot_where(&mut survivor, |s| s["connected_clients"] == 1).await;

    let mut second = connect(&url).await;
    snapshot_where(&mut second, |s| s["connected_clients"] == 2).await;
    snapshot_where(&mut survivor, |s| s["connected_clients"] == 2).await;

    second.close(None).await.unwrap();
    drop(second);

    // Exactly one decrement reaches the snapshot.
    snapshot_where(&mut survivor, |s| s["connected_clients"] == 1).await;

    store
        .apply(StatePatch::Presenter {
            name: Some("Grace".to_string()),
            topic: None,
        })
        .await
        .unwrap();
    let snapshot = snapshot_where(&mut survivor, |s| s["current_presenter"] == "Grace").await;
    assert_eq!(snapshot["connected_clients"], 1);
}

#[tokio::test]
async fn test_inbound_command_is_published_on_the_bus() {
    let (url, _store, mut bus_rx) = serve_gateway().await;

    let mut client = connect(&url).await;
    snapshot_where(&mut client, |s| s["connected_clients"] == 1).await;

    client
        .send(Message::Text(
            r#"{"type": "slide_control", "data": {"command": "next_slide"}}"#.to_string(),
        ))
        .await
        .unwrap();

    let event = timeout(RECV_TIMEOUT, bus_rx.recv()).await.unwrap().unwrap();
    match event {
        BusEvent::Control(payload) => assert_eq!(payload.command, SlideCommand::NextSlide),
        other => panic!("expected control event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_frame_keeps_session_open() {
    let (url, store, _bus_rx) = serve_gateway().await;

    let mut client = connect(&url).await;
    snapshot_where(&mut client, |s| s["connected_clients"] == 1).await;

    client
        .send(Message::Text("not json".to_string()))
        .await
        .unwrap();

    // The session survives and keeps broadcasting.
    store
        .apply(StatePatch::Announcement {
            message: Some("Doors open".to_string()),
        })
        .await
        .unwrap();
    let snapshot = snapshot_where(&mut client, |s| s["announcement"] == "Doors open").await;
    assert_eq!(snapshot["announcement_visible"], true);
}
