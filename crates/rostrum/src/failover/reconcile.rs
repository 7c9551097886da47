//! Reconciliation pulls from the main controller.
//!
//! The standby backup periodically fetches the main's full snapshot over
//! HTTP to repair whatever the bus dropped while either side was
//! disconnected. Pull failures are expected (the main may be mid-restart)
//! and never bubble up past a debug log.

use crate::errors::RostrumError;
use crate::state::PresentationState;
use std::time::Duration;
use tracing::debug;

/// HTTP client for the main controller's `/state` endpoint.
#[derive(Clone)]
pub struct Reconciler {
    client: reqwest::Client,
    state_url: String,
}

impl Reconciler {
    /// # Errors
    ///
    /// Returns `Reconcile` if the HTTP client cannot be constructed.
    pub fn new(main_base_url: &str, timeout: Duration) -> Result<Self, RostrumError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RostrumError::Reconcile(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            state_url: format!("{}/state", main_base_url.trim_end_matches('/')),
        })
    }

    /// Fetch the main's snapshot. Any failure (refused, timeout, non-2xx,
    /// bad body) returns `None`.
    pub async fn pull(&self) -> Option<PresentationState> {
        let response = match self.client.get(&self.state_url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(
                    target: "rostrum.failover.reconcile",
                    url = %self.state_url,
                    error = %e,
                    "Reconciliation pull failed"
                );
                return None;
            }
        };

        let response = match response.error_for_status() {
            Ok(response) => response,
            Err(e) => {
                debug!(
                    target: "rostrum.failover.reconcile",
                    url = %self.state_url,
                    error = %e,
                    "Reconciliation pull returned error status"
                );
                return None;
            }
        };

        match response.json::<PresentationState>().await {
            Ok(state) => Some(state),
            Err(e) => {
                debug!(
                    target: "rostrum.failover.reconcile",
                    url = %self.state_url,
                    error = %e,
                    "Reconciliation pull body was not a valid snapshot"
                );
                None
            }
        }
    }
}
