//! Local resource sampling for the snapshot's health block.

use crate::state::{StatePatch, StateStoreHandle, SystemHealth};
use std::time::Duration;
use sysinfo::{Disks, System};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Gather current system resource usage.
///
/// A fresh `System` each call keeps this stateless; at the sampling
/// period the overhead is acceptable. CPU may read 0 on the first call
/// because sysinfo needs a delta.
#[must_use]
pub fn gather_system_health() -> SystemHealth {
    let mut sys = System::new_all();
    sys.refresh_all();

    let cpu = sys.global_cpu_info().cpu_usage() as u32;

    let total_memory = sys.total_memory();
    let used_memory = sys.used_memory();
    let memory = if total_memory > 0 {
        ((used_memory as f64 / total_memory as f64) * 100.0) as u32
    } else {
        0
    };

    let disks = Disks::new_with_refreshed_list();
    let (total_space, available_space) = disks
        .iter()
        .fold((0u64, 0u64), |(total, available), disk| {
            (total + disk.total_space(), available + disk.available_space())
        });
    let disk = if total_space > 0 {
        (((total_space - available_space) as f64 / total_space as f64) * 100.0) as u32
    } else {
        0
    };

    SystemHealth {
        cpu: cpu.min(100),
        memory: memory.min(100),
        disk: disk.min(100),
        network: "OK".to_string(),
    }
}

/// Periodically fold a fresh sample into the store until cancelled.
pub async fn run_health_monitor(
    store: StateStoreHandle,
    interval: Duration,
    cancel: CancellationToken,
) {
    info!(
        target: "rostrum.monitor",
        interval_seconds = interval.as_secs(),
        "Health monitor started"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!(target: "rostrum.monitor", "Health monitor shutting down");
                return;
            }
            _ = ticker.tick() => {
                let sample = gather_system_health();
                crate::observability::metrics::set_system_health(&sample);
                if let Err(e) = store.apply(StatePatch::HealthSample(sample)).await {
                    warn!(target: "rostrum.monitor", error = %e, "Failed to record health sample");
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_returns_valid_ranges() {
        let health = gather_system_health();

        assert!(health.cpu <= 100);
        assert!(health.memory <= 100);
        assert!(health.disk <= 100);
        assert_eq!(health.network, "OK");
    }

    #[test]
    fn test_gather_multiple_times() {
        for _ in 0..3 {
            let health = gather_system_health();
            assert!(health.cpu <= 100);
        }
    }
}
