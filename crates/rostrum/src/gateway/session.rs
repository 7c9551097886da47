//! Viewer WebSocket sessions.
//!
//! Every accepted mutation publishes a fresh snapshot on the store's watch
//! channel; each session forwards whole snapshots to its socket. Sessions
//! that cannot keep up within the write timeout are pruned rather than
//! allowed to backpressure the rest. Inbound frames carry moderator
//! commands, which are published on the bus so both controllers converge.

use crate::bus::messages::{
    AnnouncementPayload, BusEvent, ControlPayload, PresenterPayload, TimerPayload,
};
use crate::gateway::AppState;
use crate::observability::metrics;
use crate::state::StatePatch;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use serde::Deserialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Inbound viewer frame: `{"type": "...", "data": {...}}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data")]
enum ViewerCommand {
    #[serde(rename = "timer_control")]
    Timer(TimerPayload),
    #[serde(rename = "presenter_update")]
    Presenter(PresenterPayload),
    #[serde(rename = "announcement")]
    Announcement(AnnouncementPayload),
    #[serde(rename = "slide_control")]
    Slide(ControlPayload),
}

impl ViewerCommand {
    fn into_event(self) -> BusEvent {
        match self {
            ViewerCommand::Timer(payload) => BusEvent::Timer(payload),
            ViewerCommand::Presenter(payload) => BusEvent::Presenter(payload),
            ViewerCommand::Announcement(payload) => BusEvent::Announcement(payload),
            ViewerCommand::Slide(payload) => BusEvent::Control(payload),
        }
    }
}

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, state))
}

async fn run_session(mut socket: WebSocket, state: AppState) {
    info!(target: "rostrum.gateway.session", "Viewer connected");
    // The store owns the count; sessions only report edges, so concurrent
    // connects and disconnects serialize through its mailbox.
    if let Err(e) = state.store.apply(StatePatch::ViewerConnected).await {
        warn!(target: "rostrum.gateway.session", error = %e, "Failed to record viewer connect");
    }

    let mut snapshots = state.store.subscribe();
    // The watch channel always holds the latest snapshot; send it as the
    // session greeting, then only deltas-as-snapshots from here on.
    snapshots.mark_changed();

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    // Store actor is gone; the process is shutting down.
                    break;
                }
                let frame = {
                    let snapshot = snapshots.borrow_and_update();
                    serde_json::to_string(&*snapshot)
                };
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(target: "rostrum.gateway.session", error = %e, "Snapshot encode failed");
                        continue;
                    }
                };
                match timeout(state.viewer_write_timeout, socket.send(Message::Text(frame))).await {
                    Ok(Ok(())) => metrics::record_broadcast(),
                    Ok(Err(e)) => {
                        debug!(target: "rostrum.gateway.session", error = %e, "Viewer send failed, closing");
                        break;
                    }
                    Err(_) => {
                        warn!(
                            target: "rostrum.gateway.session",
                            timeout_seconds = state.viewer_write_timeout.as_secs(),
                            "Viewer too slow, pruning session"
                        );
                        break;
                    }
                }
            }
            frame = socket.recv() => {
                match frame {
                    Some(Ok(Message::Text(text))) => handle_command(&state, &text),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ping/pong/binary: nothing to do
                    Some(Err(e)) => {
                        debug!(target: "rostrum.gateway.session", error = %e, "Viewer socket error");
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = state.store.apply(StatePatch::ViewerDisconnected).await {
        warn!(target: "rostrum.gateway.session", error = %e, "Failed to record viewer disconnect");
    }
    info!(target: "rostrum.gateway.session", "Viewer disconnected");
}

/// Publish an inbound command on the bus. Malformed frames are dropped
/// with a warning; the session stays open.
fn handle_command(state: &AppState, text: &str) {
    match serde_json::from_str::<ViewerCommand>(text) {
        Ok(command) => state.publisher.publish(command.into_event()),
        Err(e) => {
            warn!(
                target: "rostrum.gateway.session",
                error = %e,
                "Malformed viewer command, dropping"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::bus::messages::SlideCommand;

    #[test]
    fn test_viewer_command_wire_format() {
        let cmd: ViewerCommand = serde_json::from_str(
            r#"{"type": "slide_control", "data": {"command": "goto_slide", "slide": 4}}"#,
        )
        .unwrap();
        match cmd.into_event() {
            BusEvent::Control(payload) => {
                assert_eq!(payload.command, SlideCommand::GotoSlide);
                assert_eq!(payload.slide, Some(4));
            }
            other => panic!("expected control event, got {other:?}"),
        }

        let cmd: ViewerCommand =
            serde_json::from_str(r#"{"type": "timer_control", "data": {"running": true}}"#).unwrap();
        assert!(matches!(
            cmd.into_event(),
            BusEvent::Timer(TimerPayload {
                seconds: None,
                running: Some(true),
            })
        ));
    }

    #[test]
    fn test_malformed_command_is_an_error() {
        assert!(serde_json::from_str::<ViewerCommand>(r#"{"type": "reboot"}"#).is_err());
        assert!(serde_json::from_str::<ViewerCommand>("not json").is_err());
    }
}
