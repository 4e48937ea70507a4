//! # MQTT Connection Lifecycle
//!
//! Owns the single outbound broker connection for the relay: connect and
//! disconnect handling, last-will registration, the retained liveness topic,
//! and liveness-gated publication. This module never subscribes and never
//! queues; telemetry is a live feed and stale data is worse than missing data,
//! so anything published while offline is silently dropped.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs  - Broker options and TLS material
//! ├── link.rs    - Connection state machine and rumqttc event loop
//! └── status.rs  - User-visible status indicator
//! ```
//!
//! ## Connection State Machine
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected ──► Disconnecting ──► Disconnected
//!                      │
//!                      └──► Error (bad TLS material; terminal until
//!                                  reconfigure-and-restart)
//! ```
//!
//! Transient network failures are handled by rumqttc's own reconnect loop; the
//! engine only observes the resulting transitions through the link's
//! connection generation and resets its caches accordingly.

pub mod config;
pub mod link;
pub mod status;

pub use link::{ConnectionState, MqttLink};
pub use status::LinkStatus;

use thiserror::Error;

/// Errors surfaced by the connection lifecycle.
///
/// Only configuration problems are fatal to a connection attempt; everything
/// network-shaped is retried by the client library and merely logged here.
#[derive(Debug, Error)]
pub enum LinkError {
    /// TLS material could not be loaded from the configured paths.
    #[error("invalid TLS material: {0}")]
    TlsMaterial(String),

    /// The broker settings themselves are unusable.
    #[error("invalid broker settings: {0}")]
    Options(String),
}
