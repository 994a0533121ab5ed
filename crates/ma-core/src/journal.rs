//! Journal event decoding.
//!
//! Journal records arrive as loosely typed JSON objects. [`JournalEntry::decode`]
//! converts each one into a closed set of [`JournalEvent`] variants exactly
//! once, so the accumulators never look at raw JSON. Decoding never fails:
//! malformed sub-items are skipped and unknown records become
//! [`JournalEvent::Ignored`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::fingerprint::ProspectFingerprint;
use crate::state::ContentLevel;

/// Inventory key for limpets in cargo snapshots.
pub const DRONES_KEY: &str = "drones";

/// Kind of limpet launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DroneKind {
    Prospector,
    Collection,
}

impl DroneKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Prospector => "prospector",
            Self::Collection => "collection",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "prospector" => Some(Self::Prospector),
            "collection" => Some(Self::Collection),
            _ => None,
        }
    }
}

impl fmt::Display for DroneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One valid `(material, proportion)` pair from a prospecting report.
#[derive(Debug, Clone, PartialEq)]
pub struct ProspectMaterial {
    /// Lower-cased material name.
    pub name: String,
    /// Percentage of the asteroid made up of this material.
    pub proportion: f64,
}

/// A decoded `ProspectedAsteroid` event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProspectReport {
    pub materials: Vec<ProspectMaterial>,
    /// Entries dropped for a missing name or non-numeric proportion.
    pub skipped_materials: usize,
    pub content: Option<String>,
    pub content_localised: Option<String>,
    /// Percentage of the original mass still present.
    pub remaining: Option<f64>,
    pub body: Option<String>,
}

impl ProspectReport {
    fn from_record(record: &Map<String, Value>) -> Self {
        let mut materials = Vec::new();
        let mut skipped_materials = 0;
        if let Some(items) = record.get("Materials").and_then(Value::as_array) {
            for item in items {
                let name = item.get("Name").and_then(Value::as_str);
                let proportion = item.get("Proportion").and_then(lenient_f64);
                match (name, proportion) {
                    (Some(name), Some(proportion)) => materials.push(ProspectMaterial {
                        name: name.to_lowercase(),
                        proportion,
                    }),
                    _ => skipped_materials += 1,
                }
            }
        }

        Self {
            materials,
            skipped_materials,
            content: string_field(record, "Content"),
            content_localised: string_field(record, "Content_Localised"),
            remaining: record.get("Remaining").and_then(lenient_f64),
            body: string_field(record, "Body"),
        }
    }

    /// Dedup fingerprint, or `None` when no material entry was usable.
    pub fn fingerprint(&self) -> Option<ProspectFingerprint> {
        ProspectFingerprint::new(
            [
                self.content.as_deref().unwrap_or_default(),
                self.content_localised.as_deref().unwrap_or_default(),
            ],
            self.materials
                .iter()
                .map(|material| (material.name.as_str(), material.proportion)),
        )
    }

    /// Richness classification, preferring the localised label.
    pub fn content_level(&self) -> Option<ContentLevel> {
        [&self.content_localised, &self.content]
            .into_iter()
            .flatten()
            .filter(|label| !label.is_empty())
            .find_map(|label| ContentLevel::classify(label))
    }

    /// Whether the asteroid had already been partially mined.
    pub fn already_mined(&self) -> bool {
        self.remaining.is_some_and(|remaining| remaining < 100.0)
    }
}

/// A decoded `Cargo` event: lower-cased item name to count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CargoSnapshot {
    pub inventory: BTreeMap<String, i64>,
    /// Entries dropped for a missing name or non-integer count.
    pub skipped_items: usize,
}

impl CargoSnapshot {
    fn from_items(items: &[Value]) -> Self {
        let mut inventory = BTreeMap::new();
        let mut skipped_items = 0;
        for item in items {
            let name = item.get("Name").and_then(Value::as_str);
            let count = item.get("Count").and_then(Value::as_i64);
            match (name, count) {
                (Some(name), Some(count)) => {
                    inventory.insert(name.to_lowercase(), count);
                }
                _ => skipped_items += 1,
            }
        }
        Self {
            inventory,
            skipped_items,
        }
    }

    /// Limpets on board, if the snapshot lists them.
    pub fn drones(&self) -> Option<i64> {
        self.inventory.get(DRONES_KEY).copied()
    }

    /// Total tonnage excluding limpets.
    pub fn tonnage(&self) -> i64 {
        self.inventory
            .iter()
            .filter(|(name, _)| name.as_str() != DRONES_KEY)
            .map(|(_, count)| *count)
            .sum()
    }
}

/// Typed journal events relevant to mining.
#[derive(Debug, Clone, PartialEq)]
pub enum JournalEvent {
    LaunchDrone(DroneKind),
    ProspectedAsteroid(ProspectReport),
    Cargo(CargoSnapshot),
    SupercruiseEntry,
    MaterialCollected {
        name: String,
        count: u64,
    },
    MiningRefined {
        commodity: Option<String>,
    },
    /// Anything else, including records without an `event` tag.
    Ignored {
        event: Option<String>,
    },
}

impl JournalEvent {
    /// Short name used in logs and activity notifications.
    pub fn name(&self) -> &str {
        match self {
            Self::LaunchDrone(DroneKind::Prospector) => "LaunchDrone:prospector",
            Self::LaunchDrone(DroneKind::Collection) => "LaunchDrone:collection",
            Self::ProspectedAsteroid(_) => "ProspectedAsteroid",
            Self::Cargo(_) => "Cargo",
            Self::SupercruiseEntry => "SupercruiseEntry",
            Self::MaterialCollected { .. } => "MaterialCollected",
            Self::MiningRefined { .. } => "MiningRefined",
            Self::Ignored { event } => event.as_deref().unwrap_or("<untagged>"),
        }
    }
}

/// A decoded journal record.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    /// Parsed `timestamp`, or `None` when absent or unparseable.
    pub timestamp: Option<DateTime<Utc>>,
    /// System name carried by the record itself (e.g. `FSDJump`).
    pub system: Option<String>,
    /// Body name carried by the record itself.
    pub body: Option<String>,
    pub event: JournalEvent,
}

impl JournalEntry {
    /// Decodes one raw journal record.
    pub fn decode(raw: &Value) -> Self {
        let Some(record) = raw.as_object() else {
            tracing::debug!("journal record is not an object; ignoring");
            return Self {
                timestamp: None,
                system: None,
                body: None,
                event: JournalEvent::Ignored { event: None },
            };
        };

        let timestamp = record
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(parse_timestamp);
        let tag = record.get("event").and_then(Value::as_str);
        let event = tag.map_or(JournalEvent::Ignored { event: None }, |tag| {
            decode_event(tag, record)
        });

        Self {
            timestamp,
            system: crate::location::detect_system(record),
            body: string_field(record, "Body"),
            event,
        }
    }

    /// The event timestamp, falling back to the current time.
    pub fn timestamp_or_now(&self) -> DateTime<Utc> {
        self.timestamp.unwrap_or_else(Utc::now)
    }
}

fn decode_event(tag: &str, record: &Map<String, Value>) -> JournalEvent {
    let ignored = || JournalEvent::Ignored {
        event: Some(tag.to_string()),
    };

    match tag {
        "LaunchDrone" => record
            .get("Type")
            .and_then(Value::as_str)
            .and_then(DroneKind::parse)
            .map_or_else(ignored, JournalEvent::LaunchDrone),
        "ProspectedAsteroid" => JournalEvent::ProspectedAsteroid(ProspectReport::from_record(record)),
        "Cargo" => match record.get("Inventory").and_then(Value::as_array) {
            Some(items) => JournalEvent::Cargo(CargoSnapshot::from_items(items)),
            None => {
                tracing::debug!("Cargo event without an inventory list");
                ignored()
            }
        },
        "SupercruiseEntry" => JournalEvent::SupercruiseEntry,
        "MaterialCollected" => match record.get("Name").and_then(Value::as_str) {
            Some(name) => JournalEvent::MaterialCollected {
                name: name.to_lowercase(),
                count: record
                    .get("Count")
                    .and_then(lenient_i64)
                    .map_or(1, |count| u64::try_from(count.max(1)).unwrap_or(1)),
            },
            None => ignored(),
        },
        "MiningRefined" => JournalEvent::MiningRefined {
            commodity: record
                .get("Type")
                .and_then(Value::as_str)
                .and_then(normalize_commodity_symbol),
        },
        _ => ignored(),
    }
}

/// Parses a journal timestamp as UTC.
///
/// Accepts RFC 3339 (`Z` or an explicit offset) and naive ISO-8601 values,
/// which are taken to be UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    tracing::debug!(value, "unable to parse timestamp");
    None
}

/// Turns a journal symbol such as `$platinum_name;` into `platinum`.
pub fn normalize_commodity_symbol(symbol: &str) -> Option<String> {
    let trimmed = symbol.trim();
    let stripped = trimmed
        .strip_prefix('$')
        .map_or(trimmed, |rest| rest.trim_end_matches(';'));
    let stripped = stripped.strip_suffix("_name").unwrap_or(stripped);
    let normalized = stripped.trim().to_lowercase();
    (!normalized.is_empty()).then_some(normalized)
}

/// Turns a commodity key such as `low_temperature_diamonds` into the name
/// shown in game and listed by markets (`Low Temperature Diamonds`).
pub fn commodity_display_name(key: &str) -> String {
    key.split(['_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect::<String>()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn string_field(record: &Map<String, Value>, key: &str) -> Option<String> {
    record
        .get(key)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

/// Reads a number from a JSON number or a numeric string.
pub(crate) fn lenient_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|number| number.is_finite())
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "counts are small; fractional values truncate toward zero"
)]
fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|count| count.is_finite())
                .map(|count| count.trunc() as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}
