//! Bus topics and payload codec.
//!
//! Channel names are `{prefix}{topic}/{suffix}`: the suffix is a device id
//! for heartbeats and failover announcements, and a fixed word for the
//! rest. Payloads are JSON; field names are the wire format.

use crate::state::{DeviceRole, PeerStatus};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Bus topic families. Each maps to a channel pattern under the configured
/// prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    /// `timer/control`: duration and run-state changes.
    Timer,
    /// `presenter/update`: presenter name and topic.
    Presenter,
    /// `announcement/new`: announcement text.
    Announcement,
    /// `heartbeat/{device_id}`: liveness beacons.
    Heartbeat,
    /// `control/slide`: slide navigation commands.
    Control,
    /// `failover/{device_id}`: takeover and standby announcements.
    Failover,
}

impl Topic {
    pub const ALL: [Topic; 6] = [
        Topic::Timer,
        Topic::Presenter,
        Topic::Announcement,
        Topic::Heartbeat,
        Topic::Control,
        Topic::Failover,
    ];

    /// First channel segment under the prefix.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Topic::Timer => "timer",
            Topic::Presenter => "presenter",
            Topic::Announcement => "announcement",
            Topic::Heartbeat => "heartbeat",
            Topic::Control => "control",
            Topic::Failover => "failover",
        }
    }

    /// Pattern for `PSUBSCRIBE` covering every channel of this topic.
    #[must_use]
    pub fn subscribe_pattern(self, prefix: &str) -> String {
        format!("{prefix}{}/*", self.name())
    }

    /// Parse a channel name back into `(topic, suffix)`. Returns `None` for
    /// channels outside the prefix or with an unknown topic segment.
    #[must_use]
    pub fn from_channel<'a>(prefix: &str, channel: &'a str) -> Option<(Topic, &'a str)> {
        let rest = channel.strip_prefix(prefix)?;
        let (name, suffix) = rest.split_once('/')?;
        let topic = Topic::ALL.iter().find(|t| t.name() == name).copied()?;
        Some((topic, suffix))
    }
}

/// `timer/control` payload. Absent fields leave that aspect unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
}

/// `presenter/update` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenterPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

/// `announcement/new` payload. Receipt always makes the announcement
/// visible, even when no new text is carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `heartbeat/{device_id}` payload. The device id lives in the channel
/// name, not the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    /// Sender wall-clock time, unix seconds.
    pub timestamp: f64,
    pub role: DeviceRole,
    pub status: PeerStatus,
}

/// Slide navigation verbs on `control/slide`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlideCommand {
    NextSlide,
    PreviousSlide,
    GotoSlide,
}

/// `control/slide` payload. `slide` is required for `goto_slide` and
/// ignored otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPayload {
    pub command: SlideCommand,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slide: Option<u32>,
}

/// Failover announcement verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FailoverAction {
    Takeover,
    Standby,
}

/// `failover/{device_id}` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailoverPayload {
    pub device_id: String,
    pub timestamp: f64,
    pub action: FailoverAction,
}

/// A decoded bus message, pairing the topic with its typed payload.
///
/// Heartbeat and failover events carry the device id parsed from the
/// channel suffix.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    Timer(TimerPayload),
    Presenter(PresenterPayload),
    Announcement(AnnouncementPayload),
    Heartbeat {
        device_id: String,
        payload: HeartbeatPayload,
    },
    Control(ControlPayload),
    Failover(FailoverPayload),
}

impl BusEvent {
    #[must_use]
    pub fn topic(&self) -> Topic {
        match self {
            BusEvent::Timer(_) => Topic::Timer,
            BusEvent::Presenter(_) => Topic::Presenter,
            BusEvent::Announcement(_) => Topic::Announcement,
            BusEvent::Heartbeat { .. } => Topic::Heartbeat,
            BusEvent::Control(_) => Topic::Control,
            BusEvent::Failover(_) => Topic::Failover,
        }
    }

    /// Full channel name this event publishes on.
    #[must_use]
    pub fn publish_channel(&self, prefix: &str) -> String {
        let suffix = match self {
            BusEvent::Timer(_) => "control",
            BusEvent::Presenter(_) => "update",
            BusEvent::Announcement(_) => "new",
            BusEvent::Heartbeat { device_id, .. } => device_id.as_str(),
            BusEvent::Control(_) => "slide",
            BusEvent::Failover(payload) => payload.device_id.as_str(),
        };
        format!("{prefix}{}/{suffix}", self.topic().name())
    }

    /// Serialize the payload to the wire JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails, which none of the payload
    /// types can in practice.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        match self {
            BusEvent::Timer(p) => serde_json::to_string(p),
            BusEvent::Presenter(p) => serde_json::to_string(p),
            BusEvent::Announcement(p) => serde_json::to_string(p),
            BusEvent::Heartbeat { payload, .. } => serde_json::to_string(payload),
            BusEvent::Control(p) => serde_json::to_string(p),
            BusEvent::Failover(p) => serde_json::to_string(p),
        }
    }

    /// Decode a raw bus message from its channel name and JSON payload.
    ///
    /// Returns `None` for channels outside the prefix; malformed payloads
    /// on a known channel surface as `Some(Err(..))` so the listener can
    /// log them.
    pub fn decode(
        prefix: &str,
        channel: &str,
        payload: &str,
    ) -> Option<Result<Self, serde_json::Error>> {
        let (topic, suffix) = Topic::from_channel(prefix, channel)?;
        let event = match topic {
            Topic::Timer => serde_json::from_str(payload).map(BusEvent::Timer),
            Topic::Presenter => serde_json::from_str(payload).map(BusEvent::Presenter),
            Topic::Announcement => serde_json::from_str(payload).map(BusEvent::Announcement),
            Topic::Heartbeat => serde_json::from_str(payload).map(|p| BusEvent::Heartbeat {
                device_id: suffix.to_string(),
                payload: p,
            }),
            Topic::Control => serde_json::from_str(payload).map(BusEvent::Control),
            Topic::Failover => serde_json::from_str(payload).map(BusEvent::Failover),
        };
        Some(event)
    }
}

/// Current wall-clock time as unix seconds, for heartbeat and failover
/// timestamps.
#[must_use]
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
