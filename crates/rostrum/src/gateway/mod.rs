//! Viewer gateway: the HTTP surface of a controller.
//!
//! Routes:
//! - `GET /state` - current snapshot (also the peer's reconciliation feed)
//! - `GET /ws` - viewer WebSocket, full-snapshot fan-out
//! - `POST /failover/activate` - force this controller active
//! - `POST /failover/standby` - return this controller to standby

pub mod session;

use crate::bus::BusPublisher;
use crate::errors::RostrumError;
use crate::failover::FailoverHandle;
use crate::state::{PeerStatus, PresentationState, StateStoreHandle};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::time::Duration;
use tower_http::trace::TraceLayer;

/// Shared state for gateway handlers and viewer sessions.
#[derive(Clone)]
pub struct AppState {
    pub store: StateStoreHandle,
    pub publisher: BusPublisher,
    pub failover: FailoverHandle,
    /// Per-session write deadline; slow viewers past it are pruned.
    pub viewer_write_timeout: Duration,
}

impl AppState {
    #[must_use]
    pub fn new(
        store: StateStoreHandle,
        publisher: BusPublisher,
        failover: FailoverHandle,
        viewer_write_timeout: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            failover,
            viewer_write_timeout,
        }
    }
}

/// Build the gateway router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/state", get(get_state))
        .route("/ws", get(session::ws_handler))
        .route("/failover/activate", post(post_activate))
        .route("/failover/standby", post(post_standby))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct FailoverResponse {
    status: PeerStatus,
}

/// GET /state
async fn get_state(
    State(state): State<AppState>,
) -> Result<Json<PresentationState>, RostrumError> {
    let snapshot = state.store.snapshot().await?;
    Ok(Json(snapshot))
}

/// POST /failover/activate
async fn post_activate(
    State(state): State<AppState>,
) -> Result<Json<FailoverResponse>, RostrumError> {
    state.failover.activate()?;
    Ok(Json(FailoverResponse {
        status: state.failover.status(),
    }))
}

/// POST /failover/standby
async fn post_standby(
    State(state): State<AppState>,
) -> Result<Json<FailoverResponse>, RostrumError> {
    state.failover.deactivate()?;
    Ok(Json(FailoverResponse {
        status: state.failover.status(),
    }))
}
