//! Translation of host telemetry into MQTT publish intents.
//!
//! This module contains the stateful half of the relay: it takes dashboard
//! snapshots and journal-style event records from the host, diffs them against
//! the last published state and produces an ordered list of publish intents.
//! The broker connection itself lives in [`crate::mqtt`].
//!
//! # Architecture
//!
//! ```text
//! Snapshot / Event ──► SnapshotDiffer ──► Vec<PublishIntent>
//!                        │    │    │
//!                 ChangeTracker │  TopicMap
//!                          CodecTable
//! ```
//!
//! The differencer consults the change-tracking caches to suppress repeats,
//! the codec table to pick the per-field encoding, and the topic map to place
//! each payload in the configured topic hierarchy.

pub mod cache;
pub mod codec;
pub mod differ;
pub mod topics;

pub use cache::ChangeTracker;
pub use codec::{CodecTable, FieldCodec, GroupMode};
pub use differ::{EventContext, SnapshotDiffer};
pub use topics::TopicMap;

use serde_json::Value;

/// A single pending publication produced by the differencer.
///
/// Intents are ephemeral: they are produced in snapshot field order, handed to
/// the connection link immediately and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishIntent {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

impl PublishIntent {
    pub fn new(topic: String, payload: String) -> Self {
        Self {
            topic,
            payload,
            retain: false,
        }
    }

    pub fn retained(topic: String, payload: String) -> Self {
        Self {
            topic,
            payload,
            retain: true,
        }
    }
}

/// Best-effort string rendering for scalar payloads.
///
/// Booleans keep the host's capitalized convention (`True` / `False`), numbers
/// and strings render verbatim, composites fall back to compact JSON. Never
/// fails; unknown shapes degrade to their JSON form.
pub fn scalar_payload(value: &Value) -> String {
    match value {
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
