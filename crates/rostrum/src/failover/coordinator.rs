//! The failover coordination loop.
//!
//! One task per controller. Every tick it emits a heartbeat; on the backup
//! it also watches the main's heartbeat age, takes over when it crosses the
//! timeout, and runs reconciliation pulls while still on standby.

use crate::failover::{FailoverHandle, Reconciler};
use crate::state::{DeviceRole, StatePatch, StateStoreHandle};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct FailoverCoordinator {
    handle: FailoverHandle,
    store: StateStoreHandle,
    /// Present on the backup only.
    reconciler: Option<Reconciler>,
    heartbeat_interval: Duration,
    failover_timeout: Duration,
}

impl FailoverCoordinator {
    #[must_use]
    pub fn new(
        handle: FailoverHandle,
        store: StateStoreHandle,
        reconciler: Option<Reconciler>,
        heartbeat_interval: Duration,
        failover_timeout: Duration,
    ) -> Self {
        Self {
            handle,
            store,
            reconciler,
            heartbeat_interval,
            failover_timeout,
        }
    }

    /// Tick until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            target: "rostrum.failover",
            role = %self.handle.role(),
            interval_seconds = self.heartbeat_interval.as_secs(),
            timeout_seconds = self.failover_timeout.as_secs(),
            "Failover coordinator started"
        );

        let mut ticker = tokio::time::interval(self.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!(target: "rostrum.failover", "Failover coordinator shutting down");
                    return;
                }
                _ = ticker.tick() => self.tick().await,
            }
        }
    }

    /// One coordination round: heartbeat out, then (backup only) the
    /// takeover check or a reconciliation pull.
    pub async fn tick(&self) {
        self.handle.emit_heartbeat();

        if self.handle.role() != DeviceRole::Backup {
            return;
        }

        let age = match self.store.main_heartbeat_age().await {
            Ok(age) => age,
            Err(e) => {
                warn!(target: "rostrum.failover", error = %e, "Heartbeat age query failed");
                return;
            }
        };

        if age > self.failover_timeout {
            if let Err(e) = self.store.apply(StatePatch::PeerOffline(DeviceRole::Main)).await {
                warn!(target: "rostrum.failover", error = %e, "Failed to mark main offline");
            }
            if !self.handle.is_active() {
                warn!(
                    target: "rostrum.failover",
                    silent_seconds = age.as_secs(),
                    "Main controller heartbeats went silent, taking over"
                );
                if let Err(e) = self.handle.activate() {
                    warn!(target: "rostrum.failover", error = %e, "Takeover failed");
                }
            }
            return;
        }

        // Main is fresh. While still passive, repair bus gaps with a pull.
        // A reappeared main after takeover is observed (the store marks it
        // ONLINE) but control is never handed back automatically.
        if !self.handle.is_active() {
            if let Some(reconciler) = &self.reconciler {
                if let Some(snapshot) = reconciler.pull().await {
                    if let Err(e) = self.store.apply(StatePatch::Reconcile(snapshot)).await {
                        warn!(
                            target: "rostrum.failover",
                            error = %e,
                            "Reconciliation merge failed"
                        );
                    }
                }
            }
        }
    }
}
