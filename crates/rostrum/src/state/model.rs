//! Presentation state model.
//!
//! `PresentationState` is the full snapshot viewers and the peer's
//! reconciliation pull see; its serde field names are the wire format, so
//! they stay stable. All mutation goes through [`StatePatch`], a tagged
//! union of the partial updates each bus topic (or local source) can carry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Role a controller (or moderator console) announces in its heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceRole {
    Main,
    Backup,
    Moderator,
}

impl DeviceRole {
    /// Key used in the `device_status` map.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            DeviceRole::Main => "main",
            DeviceRole::Backup => "backup",
            DeviceRole::Moderator => "moderator",
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceRole::Main => write!(f, "MAIN"),
            DeviceRole::Backup => write!(f, "BACKUP"),
            DeviceRole::Moderator => write!(f, "MODERATOR"),
        }
    }
}

/// Controller activity status carried in heartbeats.
///
/// The main controller is always ACTIVE; the backup flips between STANDBY
/// and ACTIVE via the failover state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PeerStatus {
    Active,
    Standby,
}

/// Liveness of a known peer as shown to viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceStatus {
    Online,
    Offline,
    Unknown,
}

/// Local resource usage block, sampled by the health monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemHealth {
    /// CPU usage percentage (0-100).
    pub cpu: u32,
    /// Memory usage percentage (0-100).
    pub memory: u32,
    /// Disk usage percentage (0-100).
    pub disk: u32,
    /// Network status indicator.
    pub network: String,
}

impl Default for SystemHealth {
    fn default() -> Self {
        Self {
            cpu: 0,
            memory: 0,
            disk: 0,
            network: "OK".to_string(),
        }
    }
}

/// Last heartbeat observed from a peer. One record per role, overwritten on
/// each receipt; staleness is computed on read, never expired.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatRecord {
    /// Device id, taken from the heartbeat channel suffix.
    pub device_id: String,
    pub role: DeviceRole,
    pub status: PeerStatus,
    /// Sender's wall-clock timestamp (unix seconds).
    pub timestamp: f64,
}

/// Full presentation snapshot.
///
/// Field names match the JSON the original viewers consume; `timer_seconds`
/// always carries the *remaining* time at snapshot instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentationState {
    pub current_presenter: String,
    pub current_topic: String,
    pub timer_seconds: u64,
    pub timer_running: bool,
    pub announcement: String,
    pub announcement_visible: bool,
    pub current_slide: u32,
    pub total_slides: u32,
    pub device_status: BTreeMap<String, DeviceStatus>,
    pub system_health: SystemHealth,
    pub connected_clients: usize,
}

impl PresentationState {
    /// Snapshot defaults for a freshly started controller.
    ///
    /// The local role reports ONLINE immediately; peers stay UNKNOWN until
    /// their first heartbeat arrives.
    #[must_use]
    pub fn initial(local_role: DeviceRole, total_slides: u32) -> Self {
        let mut device_status = BTreeMap::new();
        device_status.insert(DeviceRole::Main.key().to_string(), DeviceStatus::Unknown);
        device_status.insert(DeviceRole::Backup.key().to_string(), DeviceStatus::Unknown);
        device_status.insert(
            DeviceRole::Moderator.key().to_string(),
            DeviceStatus::Unknown,
        );
        device_status.insert(local_role.key().to_string(), DeviceStatus::Online);

        Self {
            current_presenter: "No presenter".to_string(),
            current_topic: "Welcome to the Conference".to_string(),
            timer_seconds: crate::state::timer::DEFAULT_TIMER_SECONDS,
            timer_running: false,
            announcement: String::new(),
            announcement_visible: false,
            current_slide: 1,
            total_slides,
            device_status,
            system_health: SystemHealth::default(),
            connected_clients: 0,
        }
    }
}

/// Partial update merged into the store.
///
/// Each variant names the exact field set it touches; fields it does not
/// name are left untouched, and the whole variant is merged atomically.
#[derive(Debug, Clone, PartialEq)]
pub enum StatePatch {
    /// Timer topic payload: optional duration, optional run transition.
    Timer {
        seconds: Option<u64>,
        running: Option<bool>,
    },
    /// Presenter topic payload.
    Presenter {
        name: Option<String>,
        topic: Option<String>,
    },
    /// Announcement topic payload; receipt always makes it visible.
    Announcement { message: Option<String> },
    /// Advance one slide, clamped at the deck end.
    SlideNext,
    /// Go back one slide, clamped at slide 1.
    SlidePrevious,
    /// Jump to a slide; rejected outside `[1, total_slides]`.
    SlideGoto(u32),
    /// A peer heartbeat was observed on the bus.
    HeartbeatObserved(HeartbeatRecord),
    /// A peer went silent past the staleness threshold.
    PeerOffline(DeviceRole),
    /// Fresh local resource sample.
    HealthSample(SystemHealth),
    /// A viewer session opened.
    ViewerConnected,
    /// A viewer session closed.
    ViewerDisconnected,
    /// Full-snapshot reconciliation pull from the main controller.
    /// Merges content fields only; never device status or viewer count.
    Reconcile(PresentationState),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serde_uses_wire_names() {
        assert_eq!(
            serde_json::to_string(&DeviceRole::Main).unwrap(),
            "\"MAIN\""
        );
        assert_eq!(
            serde_json::from_str::<DeviceRole>("\"MODERATOR\"").unwrap(),
            DeviceRole::Moderator
        );
        assert_eq!(
            serde_json::to_string(&PeerStatus::Standby).unwrap(),
            "\"STANDBY\""
        );
    }

    #[test]
    fn test_initial_state_defaults() {
        let state = PresentationState::initial(DeviceRole::Main, 30);

        assert_eq!(state.current_presenter, "No presenter");
        assert_eq!(state.timer_seconds, 600);
        assert!(!state.timer_running);
        assert_eq!(state.current_slide, 1);
        assert_eq!(state.total_slides, 30);
        assert_eq!(state.connected_clients, 0);
        assert_eq!(
            state.device_status.get("main"),
            Some(&DeviceStatus::Online)
        );
        assert_eq!(
            state.device_status.get("backup"),
            Some(&DeviceStatus::Unknown)
        );
    }

    #[test]
    fn test_initial_state_backup_role_marks_itself_online() {
        let state = PresentationState::initial(DeviceRole::Backup, 30);
        assert_eq!(
            state.device_status.get("backup"),
            Some(&DeviceStatus::Online)
        );
        assert_eq!(
            state.device_status.get("main"),
            Some(&DeviceStatus::Unknown)
        );
    }

    #[test]
    fn test_snapshot_wire_field_names() {
        let state = PresentationState::initial(DeviceRole::Main, 30);
        let json = serde_json::to_value(&state).unwrap();

        for key in [
            "current_presenter",
            "current_topic",
            "timer_seconds",
            "timer_running",
            "announcement",
            "announcement_visible",
            "current_slide",
            "total_slides",
            "device_status",
            "system_health",
            "connected_clients",
        ] {
            assert!(json.get(key).is_some(), "missing wire field {key}");
        }
    }

    #[test]
    fn test_snapshot_round_trips() {
        let state = PresentationState::initial(DeviceRole::Backup, 42);
        let json = serde_json::to_string(&state).unwrap();
        let back: PresentationState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
    }
}
