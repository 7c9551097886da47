//! Outbound bus publishing.
//!
//! Callers hand events to [`BusPublisher`], which is a bounded queue in
//! front of a single publisher task. `try_send` means a down broker drops
//! events instead of backpressuring the heartbeat and gateway paths; the
//! task reconnects with backoff and resumes draining.

use crate::bus::messages::BusEvent;
use crate::bus::Backoff;
use crate::observability::metrics;
use redis::aio::ConnectionManager;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Queue depth between callers and the publisher task.
pub const PUBLISH_CHANNEL_BUFFER: usize = 256;

/// Cloneable handle for publishing bus events.
#[derive(Clone)]
pub struct BusPublisher {
    sender: mpsc::Sender<BusEvent>,
}

impl BusPublisher {
    /// Create a publisher and the receiving end for [`run_publisher`].
    #[must_use]
    pub fn channel() -> (Self, mpsc::Receiver<BusEvent>) {
        let (sender, receiver) = mpsc::channel(PUBLISH_CHANNEL_BUFFER);
        (Self { sender }, receiver)
    }

    /// Enqueue an event. Never blocks; drops (with a warning) when the
    /// queue is full or the publisher task is gone.
    pub fn publish(&self, event: BusEvent) {
        let topic = event.topic();
        if let Err(e) = self.sender.try_send(event) {
            metrics::record_bus_dropped(topic);
            warn!(
                target: "rostrum.bus.publisher",
                topic = topic.name(),
                error = %e,
                "Dropping outbound bus event, publish queue unavailable"
            );
        }
    }
}

/// Drain the publish queue onto the broker.
///
/// The connection is acquired lazily so the process starts (and keeps
/// serving viewers) while the broker is down. Runs until cancelled.
pub async fn run_publisher(
    client: redis::Client,
    topic_prefix: String,
    mut receiver: mpsc::Receiver<BusEvent>,
    cancel: CancellationToken,
) {
    let mut connection: Option<ConnectionManager> = None;
    let mut backoff = Backoff::new();

    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => {
                info!(target: "rostrum.bus.publisher", "Publisher shutting down");
                return;
            }
            event = receiver.recv() => match event {
                Some(event) => event,
                None => {
                    info!(target: "rostrum.bus.publisher", "Publish queue closed, exiting");
                    return;
                }
            },
        };

        if connection.is_none() {
            match ConnectionManager::new(client.clone()).await {
                Ok(conn) => {
                    info!(target: "rostrum.bus.publisher", "Connected to broker");
                    backoff.reset();
                    connection = Some(conn);
                }
                Err(e) => {
                    metrics::record_bus_dropped(event.topic());
                    let delay = backoff.next_delay();
                    warn!(
                        target: "rostrum.bus.publisher",
                        error = %e,
                        retry_in_seconds = delay.as_secs(),
                        "Broker unavailable, dropping event"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => return,
                        () = sleep(delay) => continue,
                    }
                }
            }
        }
        let Some(conn) = connection.as_mut() else {
            continue;
        };

        let channel = event.publish_channel(&topic_prefix);
        let payload = match event.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    target: "rostrum.bus.publisher",
                    channel = %channel,
                    error = %e,
                    "Failed to encode bus event"
                );
                continue;
            }
        };

        let result: Result<(), redis::RedisError> =
            redis::cmd("PUBLISH").arg(&channel).arg(&payload).query_async(conn).await;

        match result {
            Ok(()) => {
                metrics::record_bus_published(event.topic());
                debug!(
                    target: "rostrum.bus.publisher",
                    channel = %channel,
                    "Published bus event"
                );
            }
            Err(e) => {
                // ConnectionManager reconnects internally; drop the event
                // and keep the manager for the next one.
                metrics::record_bus_dropped(event.topic());
                warn!(
                    target: "rostrum.bus.publisher",
                    channel = %channel,
                    error = %e,
                    "Failed to publish bus event"
                );
            }
        }
    }
}
