//! Inbound bus subscription loop.
//!
//! One task per process psubscribes to every topic pattern under the
//! configured prefix and folds decoded events into the store through
//! [`BusRouter`]. Connection loss is handled by reconnecting with backoff;
//! messages published while disconnected are lost, which reconciliation
//! papers over on the backup.

use crate::bus::messages::{BusEvent, SlideCommand, Topic};
use crate::bus::Backoff;
use crate::failover::ActivationState;
use crate::observability::metrics;
use crate::state::{DeviceRole, HeartbeatRecord, StatePatch, StateStoreHandle};
use futures::StreamExt;
use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Routes decoded bus events into store patches.
#[derive(Clone)]
pub struct BusRouter {
    store: StateStoreHandle,
    /// This controller's own role; heartbeats announcing it are echoes.
    role: DeviceRole,
    activation: Arc<ActivationState>,
}

impl BusRouter {
    #[must_use]
    pub fn new(store: StateStoreHandle, role: DeviceRole, activation: Arc<ActivationState>) -> Self {
        Self {
            store,
            role,
            activation,
        }
    }

    /// Fold one event into the store. Events that do not apply (echoes,
    /// commands while passive, out-of-range slides) are logged and dropped.
    pub async fn dispatch(&self, event: BusEvent) {
        metrics::record_bus_received(event.topic());

        let patch = match event {
            BusEvent::Timer(payload) => StatePatch::Timer {
                seconds: payload.seconds,
                running: payload.running,
            },
            BusEvent::Presenter(payload) => StatePatch::Presenter {
                name: payload.name,
                topic: payload.topic,
            },
            BusEvent::Announcement(payload) => StatePatch::Announcement {
                message: payload.message,
            },
            BusEvent::Heartbeat { device_id, payload } => {
                if payload.role == self.role {
                    debug!(
                        target: "rostrum.bus.listener",
                        device_id = %device_id,
                        "Ignoring own-role heartbeat echo"
                    );
                    return;
                }
                StatePatch::HeartbeatObserved(HeartbeatRecord {
                    device_id,
                    role: payload.role,
                    status: payload.status,
                    timestamp: payload.timestamp,
                })
            }
            BusEvent::Control(payload) => {
                if !self.activation.is_active() {
                    debug!(
                        target: "rostrum.bus.listener",
                        command = ?payload.command,
                        "Ignoring slide command while passive"
                    );
                    return;
                }
                match payload.command {
                    SlideCommand::NextSlide => StatePatch::SlideNext,
                    SlideCommand::PreviousSlide => StatePatch::SlidePrevious,
                    SlideCommand::GotoSlide => match payload.slide {
                        Some(slide) => StatePatch::SlideGoto(slide),
                        None => {
                            warn!(
                                target: "rostrum.bus.listener",
                                "goto_slide command without a slide number"
                            );
                            return;
                        }
                    },
                }
            }
            BusEvent::Failover(payload) => {
                // Activation is decided locally from heartbeat silence; peer
                // announcements are informational.
                info!(
                    target: "rostrum.bus.listener",
                    device_id = %payload.device_id,
                    action = ?payload.action,
                    "Peer failover announcement"
                );
                return;
            }
        };

        if let Err(e) = self.store.apply(patch).await {
            warn!(
                target: "rostrum.bus.listener",
                error = %e,
                "Bus event rejected by store"
            );
        }
    }
}

/// Subscribe to all topic patterns and dispatch messages until cancelled.
///
/// Reconnects with backoff on any connection or subscription failure.
pub async fn run_listener(
    client: redis::Client,
    topic_prefix: String,
    router: BusRouter,
    cancel: CancellationToken,
) {
    let mut backoff = Backoff::new();

    loop {
        match subscribe_and_dispatch(&client, &topic_prefix, &router, &cancel, &mut backoff).await {
            Ok(()) => {
                info!(target: "rostrum.bus.listener", "Listener shutting down");
                return;
            }
            Err(e) => {
                let delay = backoff.next_delay();
                warn!(
                    target: "rostrum.bus.listener",
                    error = %e,
                    retry_in_seconds = delay.as_secs(),
                    "Bus subscription lost, reconnecting"
                );
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = sleep(delay) => {}
                }
            }
        }
    }
}

/// One subscription session. Returns `Ok(())` only on cancellation.
async fn subscribe_and_dispatch(
    client: &redis::Client,
    topic_prefix: &str,
    router: &BusRouter,
    cancel: &CancellationToken,
    backoff: &mut Backoff,
) -> Result<(), redis::RedisError> {
    let mut pubsub = client.get_async_pubsub().await?;
    for topic in Topic::ALL {
        pubsub.psubscribe(topic.subscribe_pattern(topic_prefix)).await?;
    }
    backoff.reset();
    info!(
        target: "rostrum.bus.listener",
        prefix = topic_prefix,
        "Subscribed to bus topics"
    );

    let mut stream = pubsub.on_message();
    loop {
        let msg = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            msg = stream.next() => match msg {
                Some(msg) => msg,
                None => {
                    return Err(redis::RedisError::from((
                        redis::ErrorKind::IoError,
                        "pubsub stream closed",
                    )));
                }
            },
        };

        let channel = msg.get_channel_name().to_string();
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    target: "rostrum.bus.listener",
                    channel = %channel,
                    error = %e,
                    "Non-text bus payload, dropping"
                );
                continue;
            }
        };

        match BusEvent::decode(topic_prefix, &channel, &payload) {
            Some(Ok(event)) => router.dispatch(event).await,
            Some(Err(e)) => {
                warn!(
                    target: "rostrum.bus.listener",
                    channel = %channel,
                    error = %e,
                    "Malformed bus payload, dropping"
                );
            }
            None => {
                debug!(
                    target: "rostrum.bus.listener",
                    channel = %channel,
                    "Message outside topic namespace, dropping"
                );
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::bus::messages::{
        AnnouncementPayload, ControlPayload, FailoverAction, FailoverPayload, HeartbeatPayload,
        TimerPayload,
    };
    use crate::state::{DeviceStatus, PeerStatus};

    fn router_for(role: DeviceRole) -> (BusRouter, StateStoreHandle, Arc<ActivationState>) {
        let cancel = CancellationToken::new();
        let store = StateStoreHandle::spawn(role, 30, cancel);
        let activation = Arc::new(ActivationState::new(role));
        let router = BusRouter::new(store.clone(), role, Arc::clone(&activation));
        (router, store, activation)
    }

    #[tokio::test]
    async fn test_timer_event_applies_to_store() {
        let (router, store, _) = router_for(DeviceRole::Main);

        router
            .dispatch(BusEvent::Timer(TimerPayload {
                seconds: Some(120),
                running: None,
            }))
            .await;

        let state = store.snapshot().await.unwrap();
        assert_eq!(state.timer_seconds, 120);
    }

    #[tokio::test]
    async fn test_own_role_heartbeat_is_ignored() {
        let (router, store, _) = router_for(DeviceRole::Main);

        router
            .dispatch(BusEvent::Heartbeat {
                device_id: "main-elsewhere".to_string(),
                payload: HeartbeatPayload {
                    timestamp: 1.0,
                    role: DeviceRole::Main,
                    status: PeerStatus::Active,
                },
            })
            .await;

        let state = store.snapshot().await.unwrap();
        assert_eq!(
            state.device_status.get("main"),
            Some(&DeviceStatus::Online)
        );
        // No record was stored, so this is the initial self-marking only.
        router
            .dispatch(BusEvent::Heartbeat {
                device_id: "backup-1".to_string(),
                payload: HeartbeatPayload {
                    timestamp: 2.0,
                    role: DeviceRole::Backup,
                    status: PeerStatus::Standby,
                },
            })
            .await;
        let state = store.snapshot().await.unwrap();
        assert_eq!(
            state.device_status.get("backup"),
            Some(&DeviceStatus::Online)
        );
    }

    #[tokio::test]
    async fn test_slide_command_ignored_while_passive() {
        let (router, store, activation) = router_for(DeviceRole::Backup);
        assert!(!activation.is_active());

        router
            .dispatch(BusEvent::Control(ControlPayload {
                command: SlideCommand::NextSlide,
                slide: None,
            }))
            .await;

        let state = store.snapshot().await.unwrap();
        assert_eq!(state.current_slide, 1);
    }

    #[tokio::test]
    async fn test_slide_command_applies_while_active() {
        let (router, store, _) = router_for(DeviceRole::Main);

        router
            .dispatch(BusEvent::Control(ControlPayload {
                command: SlideCommand::GotoSlide,
                slide: Some(12),
            }))
            .await;

        let state = store.snapshot().await.unwrap();
        assert_eq!(state.current_slide, 12);
    }

    #[tokio::test]
    async fn test_out_of_range_goto_leaves_state_unchanged() {
        let (router, store, _) = router_for(DeviceRole::Main);

        router
            .dispatch(BusEvent::Control(ControlPayload {
                command: SlideCommand::GotoSlide,
                slide: Some(99),
            }))
            .await;

        let state = store.snapshot().await.unwrap();
        assert_eq!(state.current_slide, 1);
    }

    #[tokio::test]
    async fn test_failover_announcement_is_informational() {
        let (router, store, activation) = router_for(DeviceRole::Main);

        router
            .dispatch(BusEvent::Failover(FailoverPayload {
                device_id: "backup-1".to_string(),
                timestamp: 1.0,
                action: FailoverAction::Takeover,
            }))
            .await;

        // Local activation is untouched by peer announcements.
        assert!(activation.is_active());
        let state = store.snapshot().await.unwrap();
        assert_eq!(state.current_slide, 1);
    }

    #[tokio::test]
    async fn test_announcement_becomes_visible() {
        let (router, store, _) = router_for(DeviceRole::Backup);

        router
            .dispatch(BusEvent::Announcement(AnnouncementPayload {
                message: Some("Session resumes at 14:00".to_string()),
            }))
            .await;

        let state = store.snapshot().await.unwrap();
        assert_eq!(state.announcement, "Session resumes at 14:00");
        assert!(state.announcement_visible);
    }
}
