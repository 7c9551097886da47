//! The StateStore actor: single owner of the presentation snapshot.
//!
//! All mutation — bus-origin patches, reconciliation pulls, heartbeat
//! observations, viewer-count changes — flows through this actor's mailbox,
//! so concurrent writers never race and every patch merges atomically.
//! After each accepted mutation the actor publishes the fresh snapshot on a
//! `watch` channel; gateway sessions follow that channel to re-broadcast
//! the entire snapshot to viewers.

use crate::errors::RostrumError;
use crate::state::model::{
    DeviceRole, DeviceStatus, HeartbeatRecord, PresentationState, StatePatch,
};
use crate::state::timer::TimerEngine;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Mailbox depth. Writers are a handful of loops plus viewer sessions;
/// anything beyond this indicates a stuck actor.
const STORE_CHANNEL_BUFFER: usize = 256;

/// Messages handled by the store actor.
#[derive(Debug)]
enum StoreMessage {
    Apply {
        patch: StatePatch,
        respond_to: oneshot::Sender<Result<(), RostrumError>>,
    },
    Snapshot {
        respond_to: oneshot::Sender<PresentationState>,
    },
    MainHeartbeatAge {
        respond_to: oneshot::Sender<Duration>,
    },
}

/// Handle to the store actor. Cheap to clone; all methods go through the
/// mailbox and never touch state directly.
#[derive(Clone)]
pub struct StateStoreHandle {
    sender: mpsc::Sender<StoreMessage>,
    snapshots: watch::Receiver<PresentationState>,
}

impl StateStoreHandle {
    /// Spawn the store actor and return a handle to it.
    #[must_use]
    pub fn spawn(local_role: DeviceRole, total_slides: u32, cancel: CancellationToken) -> Self {
        let (sender, receiver) = mpsc::channel(STORE_CHANNEL_BUFFER);
        let initial = PresentationState::initial(local_role, total_slides);
        let (watch_tx, watch_rx) = watch::channel(initial.clone());

        let actor = StateStore::new(initial, receiver, watch_tx, cancel);
        tokio::spawn(actor.run());

        Self {
            sender,
            snapshots: watch_rx,
        }
    }

    /// Merge a patch into the state. Named fields are applied atomically as
    /// a set; re-applying the same patch produces the same result.
    pub async fn apply(&self, patch: StatePatch) -> Result<(), RostrumError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(StoreMessage::Apply {
                patch,
                respond_to: tx,
            })
            .await
            .map_err(|e| RostrumError::Internal(format!("store send failed: {e}")))?;

        rx.await
            .map_err(|e| RostrumError::Internal(format!("store response dropped: {e}")))?
    }

    /// Immutable copy of the current state, with the timer's remaining
    /// seconds computed at this instant.
    pub async fn snapshot(&self) -> Result<PresentationState, RostrumError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(StoreMessage::Snapshot { respond_to: tx })
            .await
            .map_err(|e| RostrumError::Internal(format!("store send failed: {e}")))?;

        rx.await
            .map_err(|e| RostrumError::Internal(format!("store response dropped: {e}")))
    }

    /// Time since the last MAIN heartbeat was observed (process start
    /// counts as an observation so a freshly booted backup waits a full
    /// timeout before taking over).
    pub async fn main_heartbeat_age(&self) -> Result<Duration, RostrumError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(StoreMessage::MainHeartbeatAge { respond_to: tx })
            .await
            .map_err(|e| RostrumError::Internal(format!("store send failed: {e}")))?;

        rx.await
            .map_err(|e| RostrumError::Internal(format!("store response dropped: {e}")))
    }

    /// Subscribe to snapshot updates. The receiver always holds the latest
    /// accepted snapshot; intermediate updates may be coalesced, which is
    /// fine for full-snapshot broadcasting.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PresentationState> {
        self.snapshots.clone()
    }
}

/// The store actor implementation.
struct StateStore {
    receiver: mpsc::Receiver<StoreMessage>,
    watch_tx: watch::Sender<PresentationState>,
    cancel: CancellationToken,

    // Authoritative fields. `timer` replaces the snapshot's
    // timer_seconds/timer_running pair with deadline accounting.
    presenter: String,
    topic: String,
    timer: TimerEngine,
    announcement: String,
    announcement_visible: bool,
    current_slide: u32,
    total_slides: u32,
    device_status: std::collections::BTreeMap<String, DeviceStatus>,
    heartbeats: HashMap<DeviceRole, HeartbeatRecord>,
    system_health: crate::state::model::SystemHealth,
    connected_clients: usize,
    main_last_heartbeat: Instant,
}

impl StateStore {
    fn new(
        initial: PresentationState,
        receiver: mpsc::Receiver<StoreMessage>,
        watch_tx: watch::Sender<PresentationState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            watch_tx,
            cancel,
            presenter: initial.current_presenter,
            topic: initial.current_topic,
            timer: TimerEngine::new(),
            announcement: initial.announcement,
            announcement_visible: initial.announcement_visible,
            current_slide: initial.current_slide,
            total_slides: initial.total_slides,
            device_status: initial.device_status,
            heartbeats: HashMap::new(),
            system_health: initial.system_health,
            connected_clients: initial.connected_clients,
            main_last_heartbeat: Instant::now(),
        }
    }

    async fn run(mut self) {
        info!(target: "rostrum.state.store", "StateStore actor started");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!(target: "rostrum.state.store", "StateStore actor cancelled, exiting");
                    break;
                }
                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message),
                        None => {
                            info!(target: "rostrum.state.store", "StateStore mailbox closed, exiting");
                            break;
                        }
                    }
                }
            }
        }
    }

    fn handle_message(&mut self, message: StoreMessage) {
        let now = Instant::now();
        match message {
            StoreMessage::Apply { patch, respond_to } => {
                let result = self.apply(patch, now);
                if result.is_ok() {
                    // Accepted mutation: publish the full snapshot for
                    // gateway fan-out. Send only fails with no receivers.
                    let _ = self.watch_tx.send(self.snapshot(now));
                }
                let _ = respond_to.send(result);
            }
            StoreMessage::Snapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot(now));
            }
            StoreMessage::MainHeartbeatAge { respond_to } => {
                let _ = respond_to.send(now.saturating_duration_since(self.main_last_heartbeat));
            }
        }
    }

    fn apply(&mut self, patch: StatePatch, now: Instant) -> Result<(), RostrumError> {
        match patch {
            StatePatch::Timer { seconds, running } => {
                self.apply_timer(seconds, running, now);
            }
            StatePatch::Presenter { name, topic } => {
                if let Some(name) = name {
                    self.presenter = name;
                }
                if let Some(topic) = topic {
                    self.topic = topic;
                }
            }
            StatePatch::Announcement { message } => {
                if let Some(message) = message {
                    self.announcement = message;
                }
                self.announcement_visible = true;
            }
            StatePatch::SlideNext => {
                self.current_slide = (self.current_slide + 1).min(self.total_slides);
                debug!(target: "rostrum.state.store", slide = self.current_slide, "Advanced slide");
            }
            StatePatch::SlidePrevious => {
                self.current_slide = self.current_slide.saturating_sub(1).max(1);
                debug!(target: "rostrum.state.store", slide = self.current_slide, "Went back a slide");
            }
            StatePatch::SlideGoto(n) => {
                if n < 1 || n > self.total_slides {
                    warn!(
                        target: "rostrum.state.store",
                        requested = n,
                        total = self.total_slides,
                        "Rejected out-of-range slide jump"
                    );
                    return Err(RostrumError::InvalidSlide {
                        requested: n,
                        total: self.total_slides,
                    });
                }
                self.current_slide = n;
            }
            StatePatch::HeartbeatObserved(record) => {
                self.device_status
                    .insert(record.role.key().to_string(), DeviceStatus::Online);
                if record.role == DeviceRole::Main {
                    self.main_last_heartbeat = now;
                }
                self.heartbeats.insert(record.role, record);
            }
            StatePatch::PeerOffline(role) => {
                self.device_status
                    .insert(role.key().to_string(), DeviceStatus::Offline);
            }
            StatePatch::HealthSample(health) => {
                self.system_health = health;
            }
            StatePatch::ViewerConnected => {
                self.connected_clients += 1;
                crate::observability::metrics::set_connected_viewers(self.connected_clients);
            }
            StatePatch::ViewerDisconnected => {
                self.connected_clients = self.connected_clients.saturating_sub(1);
                crate::observability::metrics::set_connected_viewers(self.connected_clients);
            }
            StatePatch::Reconcile(snapshot) => {
                self.apply_reconcile(snapshot, now);
            }
        }
        Ok(())
    }

    /// Timer field merge. Run transitions see the duration carried in the
    /// same patch: start anchors the deadline from it, stop folds remaining
    /// first and then lets an explicit `seconds` win over the fold.
    fn apply_timer(&mut self, seconds: Option<u64>, running: Option<bool>, now: Instant) {
        match (seconds, running) {
            (Some(secs), Some(true)) => {
                self.timer.set_duration(secs, now);
                self.timer.start(now);
            }
            (Some(secs), Some(false)) => {
                self.timer.stop(now);
                self.timer.set_duration(secs, now);
            }
            (Some(secs), None) => self.timer.set_duration(secs, now),
            (None, Some(true)) => self.timer.start(now),
            (None, Some(false)) => self.timer.stop(now),
            (None, None) => {}
        }
    }

    /// Merge a reconciliation snapshot: content fields only. Device status,
    /// heartbeat bookkeeping and the viewer count stay local so pulls can
    /// never perturb the failover decision.
    fn apply_reconcile(&mut self, snapshot: PresentationState, now: Instant) {
        self.presenter = snapshot.current_presenter;
        self.topic = snapshot.current_topic;
        self.announcement = snapshot.announcement;
        self.announcement_visible = snapshot.announcement_visible;
        self.total_slides = snapshot.total_slides.max(1);
        if (1..=self.total_slides).contains(&snapshot.current_slide) {
            self.current_slide = snapshot.current_slide;
        }
        self.apply_timer(Some(snapshot.timer_seconds), Some(snapshot.timer_running), now);
    }

    fn snapshot(&self, now: Instant) -> PresentationState {
        PresentationState {
            current_presenter: self.presenter.clone(),
            current_topic: self.topic.clone(),
            timer_seconds: self.timer.remaining(now),
            timer_running: self.timer.is_running(),
            announcement: self.announcement.clone(),
            announcement_visible: self.announcement_visible,
            current_slide: self.current_slide,
            total_slides: self.total_slides,
            device_status: self.device_status.clone(),
            system_health: self.system_health.clone(),
            connected_clients: self.connected_clients,
        }
    }
}
