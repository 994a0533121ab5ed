//! Best-effort location lookups.
//!
//! The host may hand the tracker an auxiliary shared-state record alongside
//! each journal entry. Both that record and the entry itself are plain JSON
//! objects; any of them may lack location fields, so every lookup returns an
//! `Option` and "unknown" is an ordinary outcome.

use serde_json::{Map, Value};

/// The host's auxiliary state record.
pub type SharedState = Map<String, Value>;

const SYSTEM_KEYS: [&str; 3] = ["System", "SystemName", "StarSystem"];

/// Returns the star system named by the record, if any.
pub fn detect_system(record: &Map<String, Value>) -> Option<String> {
    SYSTEM_KEYS
        .iter()
        .find_map(|key| non_empty_str(record.get(*key)))
}

/// Returns the body, falling back to the system, named by the record.
pub fn detect_location(record: &Map<String, Value>) -> Option<String> {
    non_empty_str(record.get("Body")).or_else(|| detect_system(record))
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToString::to_string)
}
