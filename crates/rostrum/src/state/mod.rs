//! Presentation state: the snapshot model, the deadline-based timer and
//! the single-owner store actor.

pub mod model;
pub mod store;
pub mod timer;

pub use model::{
    DeviceRole, DeviceStatus, HeartbeatRecord, PeerStatus, PresentationState, StatePatch,
    SystemHealth,
};
pub use store::StateStoreHandle;
pub use timer::{TimerEngine, DEFAULT_TIMER_SECONDS};
