//! Replication bus over Redis pub/sub.
//!
//! Both controllers and the moderator console publish partial updates on
//! prefixed channels; every controller subscribes to all of them and folds
//! what it hears into its own store. Publishing goes through a bounded
//! queue so a slow or absent broker never stalls the heartbeat loop.

pub mod listener;
pub mod messages;
pub mod publisher;

pub use listener::run_listener;
pub use messages::{BusEvent, Topic};
pub use publisher::{run_publisher, BusPublisher};

use std::time::Duration;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Doubling reconnect backoff, shared by the listener and publisher loops.
#[derive(Debug)]
pub(crate) struct Backoff {
    delay: Duration,
}

impl Backoff {
    pub(crate) fn new() -> Self {
        Self {
            delay: INITIAL_BACKOFF,
        }
    }

    /// Delay to sleep before the next attempt; doubles up to the cap.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let current = self.delay;
        self.delay = (self.delay * 2).min(MAX_BACKOFF);
        current
    }

    /// Call after a successful connection.
    pub(crate) fn reset(&mut self) {
        self.delay = INITIAL_BACKOFF;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new();

        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(), Duration::from_secs(8));
        assert_eq!(backoff.next_delay(), Duration::from_secs(16));
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}
