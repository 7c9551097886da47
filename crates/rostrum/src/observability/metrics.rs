//! Metric definitions.
//!
//! Prometheus naming: `rostrum_` prefix, `_total` for counters. Label
//! cardinality is bounded: `topic` has six values, `action` two.

use crate::bus::messages::Topic;
use metrics::{counter, gauge};

/// A bus message was received and decoded.
pub fn record_bus_received(topic: Topic) {
    counter!("rostrum_bus_received_total",
        "topic" => topic.name()
    )
    .increment(1);
}

/// An outbound event was published to the broker.
pub fn record_bus_published(topic: Topic) {
    counter!("rostrum_bus_published_total",
        "topic" => topic.name()
    )
    .increment(1);
}

/// An outbound event was dropped (queue full or broker down).
pub fn record_bus_dropped(topic: Topic) {
    counter!("rostrum_bus_dropped_total",
        "topic" => topic.name()
    )
    .increment(1);
}

/// A snapshot frame was delivered to a viewer.
pub fn record_broadcast() {
    counter!("rostrum_broadcast_frames_total").increment(1);
}

/// An activation transition happened (`takeover` or `standby`).
pub fn record_failover(action: &'static str) {
    counter!("rostrum_failover_transitions_total",
        "action" => action
    )
    .increment(1);
}

/// Current viewer session count.
pub fn set_connected_viewers(count: usize) {
    gauge!("rostrum_connected_viewers").set(count as f64);
}

/// Latest local resource sample.
pub fn set_system_health(health: &crate::state::SystemHealth) {
    gauge!("rostrum_system_cpu_percent").set(f64::from(health.cpu));
    gauge!("rostrum_system_memory_percent").set(f64::from(health.memory));
    gauge!("rostrum_system_disk_percent").set(f64::from(health.disk));
}
