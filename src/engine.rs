//! The relay engine: single owned context wiring differencer and link.
//!
//! All process state lives here and is passed explicitly; there are no ambient
//! globals. The host feeds snapshots and events through the hook methods, one
//! at a time; the broker's event loop runs in the background and only meets
//! this object through the link's shared state.

use crate::config::Settings;
use crate::mqtt::{ConnectionState, LinkError, LinkStatus, MqttLink};
use crate::telemetry::{CodecTable, EventContext, SnapshotDiffer, TopicMap};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, info};

pub struct RelayEngine {
    settings: Settings,
    topics: TopicMap,
    codecs: CodecTable,
    differ: SnapshotDiffer,
    link: MqttLink,
    /// Last connection generation this engine has acted on.
    seen_generation: u64,
}

impl RelayEngine {
    pub fn new(settings: Settings) -> (Self, watch::Receiver<LinkStatus>) {
        let (link, status_rx) = MqttLink::new();
        let topics = TopicMap::from_settings(&settings.topics);
        let codecs = CodecTable::from_settings(&settings.dashboard);
        let engine = Self {
            settings,
            topics,
            codecs,
            differ: SnapshotDiffer::default(),
            link,
            seen_generation: 0,
        };
        (engine, status_rx)
    }

    /// Host-triggered connection request (startup, settings change).
    pub fn connect(&mut self) -> Result<(), LinkError> {
        self.link.start(&self.settings.broker, &self.topics)
    }

    /// Host-triggered disconnection request. Bounded; never blocks forever.
    pub async fn disconnect(&mut self) {
        self.link.stop().await;
    }

    /// Dashboard status tick. Returns the number of publications handed to
    /// the broker client.
    pub fn on_status_snapshot(&mut self, snapshot: &Map<String, Value>) -> usize {
        self.observe_link();
        if self.link.state() != ConnectionState::Connected {
            return 0;
        }
        let intents =
            self.differ
                .diff_and_encode(snapshot, &self.settings, &self.codecs, &self.topics);
        self.dispatch(intents)
    }

    /// One-shot journal event plus ambient host context.
    pub fn on_event(&mut self, entry: &Map<String, Value>, ctx: &EventContext) -> usize {
        self.observe_link();
        if self.link.state() != ConnectionState::Connected {
            return 0;
        }
        let intents = self
            .differ
            .encode_event(entry, ctx, &self.settings, &self.topics);
        self.dispatch(intents)
    }

    /// Applies a new settings snapshot. Encoding and topic changes take
    /// effect immediately; broker-key changes restart the connection.
    pub async fn apply_settings(&mut self, new: Settings) -> Result<(), LinkError> {
        let reset_connection = self.settings.connection_reset_required(&new);
        let format_changed = self.settings.dashboard.format != new.dashboard.format
            || self.settings.journal.format != new.journal.format;

        self.settings = new;
        self.topics = TopicMap::from_settings(&self.settings.topics);
        self.codecs = CodecTable::from_settings(&self.settings.dashboard);

        if format_changed {
            // Treat the next snapshot as all-changed under the new encoding.
            self.differ.clear_tracker();
        }
        if reset_connection {
            info!("Broker settings modified, connection will now restart");
            self.disconnect().await;
            self.connect()?;
        }
        Ok(())
    }

    /// Picks up connection transitions recorded by the event-loop task. A new
    /// generation means a (re)connection happened, so every cache is cleared
    /// before the next diff runs.
    fn observe_link(&mut self) {
        let generation = self.link.generation();
        if generation != self.seen_generation {
            self.seen_generation = generation;
            self.differ.reset();
            debug!("Connection generation {generation}; telemetry caches cleared");
        }
    }

    fn dispatch(&self, intents: Vec<crate::telemetry::PublishIntent>) -> usize {
        let mut sent = 0;
        for intent in &intents {
            if self.link.publish(intent) {
                sent += 1;
            }
        }
        sent
    }

    #[cfg(test)]
    fn differ(&self) -> &SnapshotDiffer {
        &self.differ
    }
}
