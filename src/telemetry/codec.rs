//! Per-field payload encoding strategies.
//!
//! Each dashboard field maps to exactly one codec variant. The variant is
//! resolved once from configuration into a [`CodecTable`] instead of being
//! re-inspected on every tick; fields without a dedicated codec fall through
//! to plain scalar stringification.

use crate::config::DashboardSettings;
use crate::telemetry::{scalar_payload, PublishIntent, TopicMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Sub-topic labels for the three power-distribution pips, in array order.
pub const PIP_LABELS: [&str; 3] = ["sys", "eng", "wep"];

/// Sub-topic labels for the 32 dashboard status flag bits, LSB first.
pub const FLAG_LABELS: [&str; 32] = [
    "Docked",
    "Landed",
    "LandingGearDown",
    "ShieldsUp",
    "Supercruise",
    "FlightAssistOff",
    "HardpointsDeployed",
    "InWing",
    "LightsOn",
    "CargoScoopDeployed",
    "SilentRunning",
    "ScoopingFuel",
    "SrvHandbrake",
    "SrvTurret",
    "SrvUnderShip",
    "SrvDriveAssist",
    "FsdMassLocked",
    "FsdCharging",
    "FsdCooldown",
    "LowFuel",
    "Overheating",
    "HasLatLong",
    "IsInDanger",
    "BeingInterdicted",
    "InMainShip",
    "InFighter",
    "InSrv",
    "HudAnalysisMode",
    "NightVision",
    "AltitudeFromAverageRadius",
    "FsdJump",
    "SrvHighBeam",
];

/// Sub-mode for bitfield and grouped-numeric fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GroupMode {
    /// One publication per sub-element on its own sub-topic.
    #[default]
    Discrete,
    /// One publication carrying the whole group.
    Combined,
}

/// Encoding strategy for a single dashboard field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCodec {
    /// Plain string conversion on the field's resolved topic.
    Scalar,
    /// 32-bit status flags with a per-bit enable filter.
    Flags { filter: u32, mode: GroupMode },
    /// Fixed-size power-distribution triplet.
    Pips { mode: GroupMode },
    /// Named fuel-tank sub-mapping.
    Fuel { mode: GroupMode },
}

impl FieldCodec {
    /// Encodes a changed field into zero or more publish intents.
    ///
    /// `old` is the previously published raw value, if any; only the flags
    /// codec cares. Malformed values degrade to scalar encoding, never error.
    pub fn encode(
        self,
        field: &str,
        old: Option<&Value>,
        new: &Value,
        category: &str,
        topics: &TopicMap,
    ) -> Vec<PublishIntent> {
        let field_topic = topics.resolve(field);
        match self {
            FieldCodec::Scalar => vec![PublishIntent::new(
                topics.join(&[category, &field_topic]),
                scalar_payload(new),
            )],
            FieldCodec::Flags { filter, mode } => {
                let Some(bits) = value_as_bits(new) else {
                    return FieldCodec::Scalar.encode(field, old, new, category, topics);
                };
                match mode {
                    GroupMode::Combined => vec![PublishIntent::new(
                        topics.join(&[category, &field_topic]),
                        bits.to_string(),
                    )],
                    GroupMode::Discrete => {
                        // First observation has no prior value; the complement
                        // baseline makes every bit a change candidate so the
                        // true initial state is still reported discretely.
                        let baseline = old.and_then(value_as_bits).unwrap_or(!bits);
                        let changed = baseline ^ bits;
                        let mut intents = Vec::new();
                        for (i, label) in FLAG_LABELS.iter().enumerate() {
                            let mask = 1u32 << i;
                            if changed & mask != 0 && filter & mask != 0 {
                                let payload = if bits & mask != 0 { "1" } else { "0" };
                                intents.push(PublishIntent::new(
                                    topics.join(&[
                                        category,
                                        &field_topic,
                                        &topics.resolve(label),
                                    ]),
                                    payload.to_string(),
                                ));
                            }
                        }
                        intents
                    }
                }
            }
            FieldCodec::Pips { mode } => {
                let Some(values) = new.as_array() else {
                    return FieldCodec::Scalar.encode(field, old, new, category, topics);
                };
                match mode {
                    GroupMode::Discrete => values
                        .iter()
                        .zip(PIP_LABELS)
                        .map(|(value, label)| {
                            PublishIntent::new(
                                topics.join(&[category, &field_topic, &topics.resolve(label)]),
                                scalar_payload(value),
                            )
                        })
                        .collect(),
                    GroupMode::Combined => vec![PublishIntent::new(
                        topics.join(&[category, &field_topic]),
                        joined_payload(values.iter()),
                    )],
                }
            }
            FieldCodec::Fuel { mode } => {
                let Some(tanks) = new.as_object() else {
                    return FieldCodec::Scalar.encode(field, old, new, category, topics);
                };
                match mode {
                    GroupMode::Discrete => tanks
                        .iter()
                        .map(|(tank, value)| {
                            PublishIntent::new(
                                topics.join(&[category, &field_topic, &topics.resolve(tank)]),
                                scalar_payload(value),
                            )
                        })
                        .collect(),
                    GroupMode::Combined => vec![PublishIntent::new(
                        topics.join(&[category, &field_topic]),
                        joined_payload(tanks.values()),
                    )],
                }
            }
        }
    }
}

/// Field-name to codec dispatch, resolved once per configuration update.
#[derive(Debug)]
pub struct CodecTable {
    codecs: HashMap<String, FieldCodec>,
}

impl CodecTable {
    pub fn from_settings(dashboard: &DashboardSettings) -> Self {
        let codecs = HashMap::from([
            (
                "flags".to_string(),
                FieldCodec::Flags {
                    filter: dashboard.flags_filter,
                    mode: dashboard.flags_mode,
                },
            ),
            (
                "pips".to_string(),
                FieldCodec::Pips {
                    mode: dashboard.pips_mode,
                },
            ),
            (
                "fuel".to_string(),
                FieldCodec::Fuel {
                    mode: dashboard.fuel_mode,
                },
            ),
        ]);
        Self { codecs }
    }

    pub fn codec_for(&self, field: &str) -> FieldCodec {
        self.codecs
            .get(&field.to_ascii_lowercase())
            .copied()
            .unwrap_or(FieldCodec::Scalar)
    }
}

fn value_as_bits(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|bits| u32::try_from(bits).ok())
}

fn joined_payload<'a>(values: impl Iterator<Item = &'a Value>) -> String {
    values
        .map(|value| scalar_payload(value))
        .collect::<Vec<_>>()
        .join(", ")
}
