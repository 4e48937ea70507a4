//! Snapshot differencing and event encoding.
//!
//! Turns dashboard snapshots and journal event records into ordered publish
//! intents, consulting the change-tracking caches so unchanged data is never
//! republished. Encoding never fails; malformed fields degrade through the
//! codec fallbacks.

use crate::config::{PayloadFormat, Settings};
use crate::telemetry::cache::{ChangeTracker, LocationCache, StateCache};
use crate::telemetry::{CodecTable, PublishIntent, TopicMap};
use serde_json::{Map, Value};

/// Structural snapshot fields that are never payload data.
const IGNORED_FIELDS: [&str; 2] = ["timestamp", "event"];

/// Ambient host context delivered alongside each journal event.
#[derive(Debug, Clone, Default)]
pub struct EventContext {
    pub system: Option<String>,
    pub station: Option<String>,
    pub state: Value,
}

/// Stateful differencer over host telemetry.
///
/// Owns the change-tracking caches; mutated only immediately after encoding,
/// reset as a whole on reconnect and (tracker only) on format changes.
#[derive(Debug, Default)]
pub struct SnapshotDiffer {
    tracker: ChangeTracker,
    location: LocationCache,
    state: StateCache,
}

impl SnapshotDiffer {
    /// Clears every cache. Called when a (re)connection is observed so the
    /// next snapshot republishes everything.
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.location.reset();
        self.state.reset();
    }

    /// Clears only the per-field tracker, for output-format flips.
    pub fn clear_tracker(&mut self) {
        self.tracker.reset();
    }

    #[cfg(test)]
    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Diffs a dashboard snapshot against the last published state and encodes
    /// every changed field, in snapshot field order.
    pub fn diff_and_encode(
        &mut self,
        snapshot: &Map<String, Value>,
        settings: &Settings,
        codecs: &CodecTable,
        topics: &TopicMap,
    ) -> Vec<PublishIntent> {
        if !settings.dashboard.enabled {
            return Vec::new();
        }

        let category = topics.resolve("dashboard");

        // Raw mode serializes the whole snapshot each tick, bypassing
        // per-field diffing entirely.
        if settings.dashboard.format == PayloadFormat::Raw {
            return vec![PublishIntent::new(
                topics.join(&[&category]),
                Value::Object(snapshot.clone()).to_string(),
            )];
        }

        let mut intents = Vec::new();
        for (field, value) in snapshot {
            if IGNORED_FIELDS
                .iter()
                .any(|ignored| field.eq_ignore_ascii_case(ignored))
            {
                continue;
            }
            if settings
                .dashboard
                .disabled_fields
                .iter()
                .any(|disabled| field.eq_ignore_ascii_case(disabled))
            {
                continue;
            }
            if !self.tracker.has_changed(field, value) {
                continue;
            }

            let codec = codecs.codec_for(field);
            intents.extend(codec.encode(field, self.tracker.get(field), value, &category, topics));

            // Recorded even when the codec emitted nothing, so a filtered
            // value does not re-trigger on the next snapshot.
            self.tracker.record(field.clone(), value.clone());
        }
        intents
    }

    /// Encodes a one-shot journal event plus its ambient context.
    ///
    /// Location and aggregated state go through their own de-dup caches; the
    /// event record itself bypasses caching entirely, there is no previous
    /// value for a one-shot occurrence.
    pub fn encode_event(
        &mut self,
        entry: &Map<String, Value>,
        ctx: &EventContext,
        settings: &Settings,
        topics: &TopicMap,
    ) -> Vec<PublishIntent> {
        let mut intents = Vec::new();

        if settings.location.enabled {
            let location = topics.resolve("location");
            let system = ctx.system.as_deref().unwrap_or("");
            if self.location.system_changed(system) {
                intents.push(PublishIntent::new(
                    topics.join(&[&location, &topics.resolve("system")]),
                    system.to_string(),
                ));
                self.location.record_system(system);
            }
            let station = ctx.station.as_deref().unwrap_or("");
            if self.location.station_changed(station) {
                intents.push(PublishIntent::new(
                    topics.join(&[&location, &topics.resolve("station")]),
                    station.to_string(),
                ));
                self.location.record_station(station);
            }
        }

        // Null means the host supplied no aggregated state at all; only real
        // state objects are published and cached.
        if settings.state.enabled && !ctx.state.is_null() && self.state.has_changed(&ctx.state) {
            intents.push(PublishIntent::new(
                topics.join(&[&topics.resolve("state")]),
                ctx.state.to_string(),
            ));
            self.state.record(ctx.state.clone());
        }

        if settings.journal.enabled {
            let journal = topics.resolve("journal");
            match settings.journal.format {
                PayloadFormat::Raw => intents.push(PublishIntent::new(
                    topics.join(&[&journal]),
                    Value::Object(entry.clone()).to_string(),
                )),
                PayloadFormat::Processed => {
                    let name = entry
                        .get("event")
                        .and_then(Value::as_str)
                        .unwrap_or("Unknown");
                    let mut data = entry.clone();
                    data.remove("event");
                    data.remove("timestamp");
                    intents.push(PublishIntent::new(
                        topics.join(&[&journal, &topics.resolve(name)]),
                        Value::Object(data).to_string(),
                    ));
                }
            }
        }

        intents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use serde_json::json;

    fn fixtures(settings: &Settings) -> (CodecTable, TopicMap) {
        (
            CodecTable::from_settings(&settings.dashboard),
            TopicMap::from_settings(&settings.topics),
        )
    }

    fn snapshot() -> Map<String, Value> {
        json!({
            "timestamp": "2026-08-25T12:00:00Z",
            "event": "Status",
            "Flags": 16842765u32,
            "Pips": [4, 8, 0],
            "FireGroup": 1,
            "Fuel": {"FuelMain": 12.3, "FuelReservoir": 0.5},
        })
        .as_object()
        .expect("snapshot fixture is an object")
        .clone()
    }

    #[test]
    fn identical_snapshot_yields_no_intents() {
        let settings = Settings::default();
        let (codecs, topics) = fixtures(&settings);
        let mut differ = SnapshotDiffer::default();

        let first = differ.diff_and_encode(&snapshot(), &settings, &codecs, &topics);
        assert!(!first.is_empty());
        let second = differ.diff_and_encode(&snapshot(), &settings, &codecs, &topics);
        assert!(second.is_empty());
    }

    #[test]
    fn reset_republishes_everything() {
        let settings = Settings::default();
        let (codecs, topics) = fixtures(&settings);
        let mut differ = SnapshotDiffer::default();

        let first = differ.diff_and_encode(&snapshot(), &settings, &codecs, &topics);
        differ.reset();
        let again = differ.diff_and_encode(&snapshot(), &settings, &codecs, &topics);
        assert_eq!(first.len(), again.len());
    }

    #[test]
    fn structural_fields_are_ignored() {
        let settings = Settings::default();
        let (codecs, topics) = fixtures(&settings);
        let mut differ = SnapshotDiffer::default();

        let intents = differ.diff_and_encode(&snapshot(), &settings, &codecs, &topics);
        assert!(intents
            .iter()
            .all(|intent| !intent.topic.contains("timestamp") && !intent.topic.contains("event")));
        assert!(differ.tracker().get("timestamp").is_none());
    }

    #[test]
    fn disabled_fields_are_skipped() {
        let mut settings = Settings::default();
        settings.dashboard.disabled_fields = vec!["FireGroup".to_string()];
        let (codecs, topics) = fixtures(&settings);
        let mut differ = SnapshotDiffer::default();

        let intents = differ.diff_and_encode(&snapshot(), &settings, &codecs, &topics);
        assert!(intents
            .iter()
            .all(|intent| !intent.topic.contains("FireGroup")));
    }

    #[test]
    fn filtered_field_is_recorded_despite_zero_intents() {
        let mut settings = Settings::default();
        settings.dashboard.flags_filter = 0;
        let (codecs, topics) = fixtures(&settings);
        let mut differ = SnapshotDiffer::default();

        let only_flags = json!({"Flags": 5u32})
            .as_object()
            .expect("fixture is an object")
            .clone();
        let intents = differ.diff_and_encode(&only_flags, &settings, &codecs, &topics);
        assert!(intents.is_empty());
        assert!(!differ.tracker().has_changed("Flags", &json!(5u32)));
    }

    #[test]
    fn raw_mode_republishes_every_tick() {
        let mut settings = Settings::default();
        settings.dashboard.format = PayloadFormat::Raw;
        let (codecs, topics) = fixtures(&settings);
        let mut differ = SnapshotDiffer::default();

        let first = differ.diff_and_encode(&snapshot(), &settings, &codecs, &topics);
        let second = differ.diff_and_encode(&snapshot(), &settings, &codecs, &topics);
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].topic, "Telemetry/Dashboard");
        assert!(first[0].payload.contains("\"Flags\""));
    }

    #[test]
    fn intents_follow_snapshot_field_order() {
        let settings = Settings::default();
        let (codecs, topics) = fixtures(&settings);
        let mut differ = SnapshotDiffer::default();

        let snapshot = json!({
            "Pips": [4, 8, 0],
            "Cargo": 16,
            "Altitude": 1200,
        })
        .as_object()
        .expect("fixture is an object")
        .clone();

        let intents = differ.diff_and_encode(&snapshot, &settings, &codecs, &topics);
        let order: Vec<&str> = intents.iter().map(|intent| intent.topic.as_str()).collect();
        assert_eq!(
            order,
            [
                "Telemetry/Dashboard/Pips/Sys",
                "Telemetry/Dashboard/Pips/Eng",
                "Telemetry/Dashboard/Pips/Wep",
                "Telemetry/Dashboard/Cargo",
                "Telemetry/Dashboard/Altitude",
            ]
        );
    }

    #[test]
    fn location_is_deduplicated() {
        let settings = Settings::default();
        let (_, topics) = fixtures(&settings);
        let mut differ = SnapshotDiffer::default();

        let entry = json!({"event": "Docked"})
            .as_object()
            .expect("fixture is an object")
            .clone();
        let ctx = EventContext {
            system: Some("Shinrarta Dezhra".to_string()),
            station: Some("Jameson Memorial".to_string()),
            state: Value::Null,
        };

        let first = differ.encode_event(&entry, &ctx, &settings, &topics);
        let location: Vec<_> = first
            .iter()
            .filter(|intent| intent.topic.starts_with("Telemetry/Location"))
            .collect();
        assert_eq!(location.len(), 2);
        assert_eq!(location[0].topic, "Telemetry/Location/System");
        assert_eq!(location[0].payload, "Shinrarta Dezhra");
        assert_eq!(location[1].topic, "Telemetry/Location/Station");
        assert_eq!(location[1].payload, "Jameson Memorial");

        let second = differ.encode_event(&entry, &ctx, &settings, &topics);
        assert!(second
            .iter()
            .all(|intent| !intent.topic.starts_with("Telemetry/Location")));

        let moved = EventContext {
            station: Some("Dav's Hope".to_string()),
            ..ctx
        };
        let third = differ.encode_event(&entry, &moved, &settings, &topics);
        let station: Vec<_> = third
            .iter()
            .filter(|intent| intent.topic == "Telemetry/Location/Station")
            .collect();
        assert_eq!(station.len(), 1);
        assert_eq!(station[0].payload, "Dav's Hope");
    }

    #[test]
    fn aggregated_state_publishes_once_per_change() {
        let mut settings = Settings::default();
        settings.state.enabled = true;
        let (_, topics) = fixtures(&settings);
        let mut differ = SnapshotDiffer::default();

        let entry = json!({"event": "Cargo"})
            .as_object()
            .expect("fixture is an object")
            .clone();
        let ctx = EventContext {
            state: json!({"Credits": 100}),
            ..EventContext::default()
        };

        let first = differ.encode_event(&entry, &ctx, &settings, &topics);
        assert!(first
            .iter()
            .any(|intent| intent.topic == "Telemetry/State"));
        let second = differ.encode_event(&entry, &ctx, &settings, &topics);
        assert!(second
            .iter()
            .all(|intent| intent.topic != "Telemetry/State"));
    }

    #[test]
    fn absent_aggregated_state_is_not_published() {
        let mut settings = Settings::default();
        settings.state.enabled = true;
        let (_, topics) = fixtures(&settings);
        let mut differ = SnapshotDiffer::default();

        let entry = json!({"event": "Cargo"})
            .as_object()
            .expect("fixture is an object")
            .clone();
        let intents = differ.encode_event(&entry, &EventContext::default(), &settings, &topics);
        assert!(intents
            .iter()
            .all(|intent| intent.topic != "Telemetry/State"));
    }

    #[test]
    fn journal_processed_strips_structural_fields() {
        let settings = Settings::default();
        let (_, topics) = fixtures(&settings);
        let mut differ = SnapshotDiffer::default();

        let entry = json!({
            "timestamp": "2026-08-25T12:00:00Z",
            "event": "FSDJump",
            "StarSystem": "Sol",
        })
        .as_object()
        .expect("fixture is an object")
        .clone();
        let ctx = EventContext::default();

        let intents = differ.encode_event(&entry, &ctx, &settings, &topics);
        let journal: Vec<_> = intents
            .iter()
            .filter(|intent| intent.topic.starts_with("Telemetry/Journal"))
            .collect();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].topic, "Telemetry/Journal/FSDJump");
        assert_eq!(journal[0].payload, r#"{"StarSystem":"Sol"}"#);
    }

    #[test]
    fn journal_raw_keeps_the_full_record() {
        let mut settings = Settings::default();
        settings.journal.format = PayloadFormat::Raw;
        settings.location.enabled = false;
        let (_, topics) = fixtures(&settings);
        let mut differ = SnapshotDiffer::default();

        let entry = json!({"timestamp": "t", "event": "FSDJump"})
            .as_object()
            .expect("fixture is an object")
            .clone();
        let intents = differ.encode_event(&entry, &EventContext::default(), &settings, &topics);
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].topic, "Telemetry/Journal");
        assert!(intents[0].payload.contains("\"event\""));
    }
}
