//! Failover: activation state, heartbeat emission and takeover control.
//!
//! The main controller is born active and never demotes itself. The backup
//! starts passive and flips to active when the main's heartbeats go silent
//! past the timeout, or when an operator forces it. A reappearing main is
//! only marked ONLINE again; handing control back is always a manual step.

pub mod coordinator;
pub mod reconcile;

pub use coordinator::FailoverCoordinator;
pub use reconcile::Reconciler;

use crate::bus::messages::{unix_timestamp, BusEvent, FailoverAction, FailoverPayload, HeartbeatPayload};
use crate::bus::BusPublisher;
use crate::errors::RostrumError;
use crate::observability::metrics;
use crate::state::{DeviceRole, PeerStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Whether this controller currently acts on commands and drives viewers.
///
/// Shared between the bus listener (command gating), the gateway (operator
/// routes) and the coordinator (automatic takeover).
#[derive(Debug)]
pub struct ActivationState {
    active: AtomicBool,
}

impl ActivationState {
    /// Main starts active; everything else starts passive.
    #[must_use]
    pub fn new(role: DeviceRole) -> Self {
        Self {
            active: AtomicBool::new(role == DeviceRole::Main),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Set the flag, returning the previous value.
    fn set_active(&self, active: bool) -> bool {
        self.active.swap(active, Ordering::SeqCst)
    }
}

/// Handle for failover operations: heartbeat emission and manual
/// activate/standby. Cheap to clone.
#[derive(Clone)]
pub struct FailoverHandle {
    role: DeviceRole,
    device_id: String,
    activation: std::sync::Arc<ActivationState>,
    publisher: BusPublisher,
}

impl FailoverHandle {
    #[must_use]
    pub fn new(
        role: DeviceRole,
        device_id: String,
        activation: std::sync::Arc<ActivationState>,
        publisher: BusPublisher,
    ) -> Self {
        Self {
            role,
            device_id,
            activation,
            publisher,
        }
    }

    #[must_use]
    pub fn role(&self) -> DeviceRole {
        self.role
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.activation.is_active()
    }

    /// Status carried in this controller's heartbeats.
    #[must_use]
    pub fn status(&self) -> PeerStatus {
        if self.is_active() {
            PeerStatus::Active
        } else {
            PeerStatus::Standby
        }
    }

    /// Publish one heartbeat beacon.
    pub fn emit_heartbeat(&self) {
        self.publisher.publish(BusEvent::Heartbeat {
            device_id: self.device_id.clone(),
            payload: HeartbeatPayload {
                timestamp: unix_timestamp(),
                role: self.role,
                status: self.status(),
            },
        });
    }

    /// Promote this controller to active and announce the takeover.
    ///
    /// Idempotent: promoting an already-active controller does nothing.
    ///
    /// # Errors
    ///
    /// Returns `WrongRole` on the main controller, which is always active.
    pub fn activate(&self) -> Result<(), RostrumError> {
        if self.role != DeviceRole::Backup {
            return Err(RostrumError::WrongRole(
                "activation control applies to the backup controller".to_string(),
            ));
        }
        if self.activation.set_active(true) {
            return Ok(());
        }

        metrics::record_failover("takeover");
        warn!(
            target: "rostrum.failover",
            device_id = %self.device_id,
            "Taking over as active controller"
        );
        self.publisher.publish(BusEvent::Failover(FailoverPayload {
            device_id: self.device_id.clone(),
            timestamp: unix_timestamp(),
            action: FailoverAction::Takeover,
        }));
        Ok(())
    }

    /// Demote this controller back to standby and announce it.
    ///
    /// Idempotent. Only ever manual; heartbeat reappearance never calls
    /// this.
    ///
    /// # Errors
    ///
    /// Returns `WrongRole` on the main controller.
    pub fn deactivate(&self) -> Result<(), RostrumError> {
        if self.role != DeviceRole::Backup {
            return Err(RostrumError::WrongRole(
                "activation control applies to the backup controller".to_string(),
            ));
        }
        if !self.activation.set_active(false) {
            return Ok(());
        }

        metrics::record_failover("standby");
        info!(
            target: "rostrum.failover",
            device_id = %self.device_id,
            "Returning to standby"
        );
        self.publisher.publish(BusEvent::Failover(FailoverPayload {
            device_id: self.device_id.clone(),
            timestamp: unix_timestamp(),
            action: FailoverAction::Standby,
        }));
        Ok(())
    }
}
