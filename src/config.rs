//! Settings surface for the relay.
//!
//! Loaded from `settings.toml` under the user configuration directory and
//! written back with defaults on first run. Every key carries an explicit
//! serde default so a partial file never turns legitimate zero/empty values
//! into "unset". Settings-file migration is deliberately out of scope; the
//! engine only consumes this surface.

use crate::mqtt::config::BrokerSettings;
use crate::telemetry::GroupMode;
use color_eyre::eyre::{eyre, Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Output encoding for a whole telemetry category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PayloadFormat {
    /// The whole snapshot/record as one JSON payload.
    Raw,
    /// Per-field topics with diffing.
    #[default]
    Processed,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub dashboard: DashboardSettings,
    pub journal: JournalSettings,
    pub location: LocationSettings,
    pub state: StateSettings,
    pub topics: TopicSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSettings {
    pub enabled: bool,
    pub format: PayloadFormat,
    /// Field names whose publication is disabled, matched case-insensitively.
    pub disabled_fields: Vec<String>,
    pub flags_mode: GroupMode,
    /// Per-bit enable mask for discrete flag publication.
    pub flags_filter: u32,
    pub pips_mode: GroupMode,
    pub fuel_mode: GroupMode,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            format: PayloadFormat::Processed,
            disabled_fields: Vec::new(),
            flags_mode: GroupMode::Discrete,
            flags_filter: u32::MAX,
            pips_mode: GroupMode::Discrete,
            fuel_mode: GroupMode::Discrete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalSettings {
    pub enabled: bool,
    pub format: PayloadFormat,
}

impl Default for JournalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            format: PayloadFormat::Processed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationSettings {
    pub enabled: bool,
}

impl Default for LocationSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSettings {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicSettings {
    pub root: String,
    pub lowercase: bool,
    /// Logical field name → topic segment, keys matched case-insensitively.
    pub overrides: HashMap<String, String>,
}

impl Default for TopicSettings {
    fn default() -> Self {
        Self {
            root: "Telemetry".to_string(),
            lowercase: false,
            overrides: default_topic_overrides(),
        }
    }
}

impl Settings {
    pub fn config_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("telemetry-relay").join("settings.toml"))
            .ok_or_else(|| eyre!("no user configuration directory available"))
    }

    /// Loads the settings file, writing one with defaults on first run.
    pub fn load_or_init() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let settings = Self::load(&path)?;
            info!("Loaded settings from {}", path.display());
            Ok(settings)
        } else {
            let settings = Self::default();
            settings.save(&path)?;
            info!("Wrote default settings to {}", path.display());
            Ok(settings)
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read settings file {}", path.display()))?;
        toml::from_str(&text)
            .wrap_err_with(|| format!("failed to parse settings file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
        }
        let text = toml::to_string_pretty(self).wrap_err("failed to serialize settings")?;
        fs::write(path, text)
            .wrap_err_with(|| format!("failed to write settings file {}", path.display()))
    }

    /// True if the changed keys require the broker connection to be restarted.
    /// Topic and encoding changes can be applied on the fly.
    pub fn connection_reset_required(&self, other: &Settings) -> bool {
        self.broker != other.broker
    }
}

/// The stock topic map, mirroring the host's field vocabulary.
fn default_topic_overrides() -> HashMap<String, String> {
    [
        ("dashboard", "Dashboard"),
        ("journal", "Journal"),
        ("location", "Location"),
        ("state", "State"),
        ("status", "Status"),
        ("online", "Online"),
        ("system", "System"),
        ("station", "Station"),
        ("pips", "Pips"),
        ("sys", "Sys"),
        ("eng", "Eng"),
        ("wep", "Wep"),
        ("fuel", "Fuel"),
        ("fuelmain", "Main"),
        ("fuelreservoir", "Reservoir"),
    ]
    .into_iter()
    .map(|(field, segment)| (field.to_string(), segment.to_string()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let settings = Settings::default();
        let text = toml::to_string_pretty(&settings).expect("serializes");
        let parsed: Settings = toml::from_str(&text).expect("parses");
        assert_eq!(settings, parsed);
    }

    #[test]
    fn empty_file_yields_defaults() {
        let parsed: Settings = toml::from_str("").expect("parses");
        assert_eq!(parsed, Settings::default());
    }

    #[test]
    fn partial_section_keeps_documented_defaults() {
        let parsed: Settings = toml::from_str("[dashboard]\nflags_filter = 5\n").expect("parses");
        assert_eq!(parsed.dashboard.flags_filter, 5);
        assert!(parsed.dashboard.enabled);
        assert_eq!(parsed.journal, JournalSettings::default());
    }

    #[test]
    fn broker_changes_require_a_connection_reset() {
        let current = Settings::default();
        let mut next = current.clone();
        next.broker.port = 8883;
        assert!(current.connection_reset_required(&next));

        let mut topics_only = current.clone();
        topics_only.topics.root = "Relay".to_string();
        topics_only.dashboard.format = PayloadFormat::Raw;
        assert!(!current.connection_reset_required(&topics_only));
    }
}
