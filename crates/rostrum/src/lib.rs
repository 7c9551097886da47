//! Rostrum: presentation-state coordination for conference venues.
//!
//! A controller owns the live presentation snapshot (presenter, topic,
//! countdown timer, announcements, slide position, device liveness) and
//! fans it out to viewer WebSockets. Two controllers run per venue: the
//! main and a hot standby that replicates every change over a Redis
//! pub/sub bus, watches the main's heartbeats and takes over when they go
//! silent.
//!
//! # Modules
//!
//! - [`state`] - snapshot model, deadline timer and the store actor
//! - [`bus`] - Redis pub/sub replication (topics, listener, publisher)
//! - [`failover`] - activation state machine, heartbeats, reconciliation
//! - [`gateway`] - HTTP/WebSocket surface for viewers and operators
//! - [`monitor`] - local resource sampling
//! - [`observability`] - probes and Prometheus metrics

pub mod bus;
pub mod config;
pub mod errors;
pub mod failover;
pub mod gateway;
pub mod monitor;
pub mod observability;
pub mod state;
