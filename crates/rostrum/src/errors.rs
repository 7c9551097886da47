//! Rostrum error types.
//!
//! One error enum for the whole service. Transport problems (bus, HTTP
//! reconciliation) are non-fatal by design and usually logged at the call
//! site rather than propagated; the variants here cover the paths where a
//! caller needs the failure, notably validation at the gateway boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Rostrum error type.
#[derive(Debug, Error)]
pub enum RostrumError {
    /// Replication bus operation failed.
    #[error("Bus error: {0}")]
    Bus(String),

    /// Configuration error surfaced after startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Slide number outside `[1, total_slides]`.
    #[error("Invalid slide number {requested} (deck has {total} slides)")]
    InvalidSlide { requested: u32, total: u32 },

    /// Operation only valid for the backup role (e.g. manual failover).
    #[error("Operation not available: {0}")]
    WrongRole(String),

    /// Reconciliation pull failed in a way worth reporting.
    #[error("Reconciliation error: {0}")]
    Reconcile(String),

    /// Internal error (actor mailbox closed, response channel dropped).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RostrumError {
    /// HTTP status for this error when it crosses the gateway boundary.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            RostrumError::InvalidSlide { .. } => StatusCode::BAD_REQUEST,
            RostrumError::WrongRole(_) => StatusCode::CONFLICT,
            RostrumError::Bus(_)
            | RostrumError::Config(_)
            | RostrumError::Reconcile(_)
            | RostrumError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-safe message (no internal details for 5xx classes).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            RostrumError::InvalidSlide { .. } | RostrumError::WrongRole(_) => self.to_string(),
            RostrumError::Bus(_)
            | RostrumError::Config(_)
            | RostrumError::Reconcile(_)
            | RostrumError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}

impl IntoResponse for RostrumError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "error": self.client_message() }));
        (status, body).into_response()
    }
}
