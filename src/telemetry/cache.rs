//! Last-published-state caches used to suppress redundant publications.

use serde_json::Value;
use std::collections::HashMap;

/// Cache of the last published raw value per dashboard field.
///
/// Composite fields are compared and stored as whole units; sub-field
/// granularity is the codec's business, not the tracker's. Cleared entirely on
/// reconnect and on output-format changes so the next snapshot is treated as
/// all-changed.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    values: HashMap<String, Value>,
}

impl ChangeTracker {
    /// True if the field has never been recorded or its stored value differs
    /// structurally from `new`.
    pub fn has_changed(&self, field: &str, new: &Value) -> bool {
        match self.values.get(field) {
            Some(old) => old != new,
            None => true,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Unconditionally overwrites the stored value for `field`.
    pub fn record(&mut self, field: String, value: Value) {
        self.values.insert(field, value);
    }

    pub fn reset(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// De-dup cache for the current system/station location.
///
/// `None` means nothing has been published yet, so the first observation is
/// always treated as changed, including an empty one.
#[derive(Debug, Default)]
pub struct LocationCache {
    system: Option<String>,
    station: Option<String>,
}

impl LocationCache {
    pub fn system_changed(&self, system: &str) -> bool {
        self.system.as_deref() != Some(system)
    }

    pub fn station_changed(&self, station: &str) -> bool {
        self.station.as_deref() != Some(station)
    }

    pub fn record_system(&mut self, system: &str) {
        self.system = Some(system.to_string());
    }

    pub fn record_station(&mut self, station: &str) {
        self.station = Some(station.to_string());
    }

    pub fn reset(&mut self) {
        self.system = None;
        self.station = None;
    }
}

/// De-dup cache for the host's aggregated state object.
#[derive(Debug, Default)]
pub struct StateCache(Option<Value>);

impl StateCache {
    pub fn has_changed(&self, state: &Value) -> bool {
        self.0.as_ref() != Some(state)
    }

    pub fn record(&mut self, state: Value) {
        self.0 = Some(state);
    }

    pub fn reset(&mut self) {
        self.0 = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_field_counts_as_changed() {
        let tracker = ChangeTracker::default();
        assert!(tracker.has_changed("Fuel", &json!(32.0)));
    }

    #[test]
    fn recorded_value_suppresses_repeat() {
        let mut tracker = ChangeTracker::default();
        tracker.record("Fuel".to_string(), json!(32.0));
        assert!(!tracker.has_changed("Fuel", &json!(32.0)));
        assert!(tracker.has_changed("Fuel", &json!(31.5)));
    }

    #[test]
    fn composites_compare_structurally() {
        let mut tracker = ChangeTracker::default();
        tracker.record("Pips".to_string(), json!([4, 4, 4]));
        assert!(!tracker.has_changed("Pips", &json!([4, 4, 4])));
        assert!(tracker.has_changed("Pips", &json!([2, 4, 6])));
    }

    #[test]
    fn reset_forgets_everything() {
        let mut tracker = ChangeTracker::default();
        tracker.record("Fuel".to_string(), json!(32.0));
        tracker.reset();
        assert!(tracker.has_changed("Fuel", &json!(32.0)));
        assert!(tracker.is_empty());
    }

    #[test]
    fn location_first_observation_is_a_change() {
        let mut location = LocationCache::default();
        assert!(location.system_changed(""));
        location.record_system("");
        assert!(!location.system_changed(""));
        assert!(location.system_changed("Shinrarta Dezhra"));
    }
}
