//! Per-event update rules for [`SessionState`].
//!
//! Each rule is deterministic given the state, the decoded event and its
//! timestamp. Rules are not replay-safe in general: feeding the same raw
//! event twice counts it twice. Prospecting reports are the exception, and
//! that is handled by the fingerprint set rather than by the rules.
//!
//! Session start and end are not decided here; see [`crate::tracker`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::journal::{CargoSnapshot, DRONES_KEY, ProspectReport};
use crate::state::{ContentLevel, SessionState};

/// What a prospecting report did to the state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProspectOutcome {
    /// First sighting of this asteroid.
    New {
        content: Option<ContentLevel>,
        already_mined: bool,
    },
    /// Fingerprint already seen this session.
    Duplicate,
    /// No usable material entries; neither new nor duplicate.
    Unfingerprintable,
    /// Arrived outside a session.
    Inactive,
}

/// What a cargo snapshot did to the state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CargoUpdate {
    /// The snapshot only established the comparison baseline.
    pub baseline: bool,
    /// Positive deltas credited to `cargo_additions`.
    pub added: BTreeMap<String, i64>,
    /// The limpet count differs from the previous snapshot.
    pub limpets_changed: bool,
}

impl CargoUpdate {
    /// Whether the snapshot credited cargo or moved the limpet count.
    pub fn changed(&self) -> bool {
        !self.added.is_empty() || self.limpets_changed
    }
}

/// Counts a prospector launch. Always counted, in or out of a session.
pub fn record_prospector_launch(state: &mut SessionState) {
    state.prospector_launched_count += 1;
}

/// Counts a collector launch while mining. Returns whether it was counted.
pub fn record_collection_launch(state: &mut SessionState) -> bool {
    if !state.is_mining {
        return false;
    }
    state.collection_drones_launched += 1;
    true
}

/// Accounts for one prospecting report.
pub fn record_prospect(state: &mut SessionState, report: &ProspectReport) -> ProspectOutcome {
    if !state.is_mining {
        return ProspectOutcome::Inactive;
    }

    let Some(fingerprint) = report.fingerprint() else {
        tracing::debug!(
            skipped = report.skipped_materials,
            body = ?report.body,
            "prospected asteroid has no usable materials; cannot deduplicate"
        );
        return ProspectOutcome::Unfingerprintable;
    };

    if state.prospected_seen.contains(&fingerprint) {
        state.duplicate_prospected += 1;
        tracing::debug!(%fingerprint, "duplicate prospected asteroid; ignoring for stats");
        return ProspectOutcome::Duplicate;
    }

    state.prospected_seen.insert(fingerprint);
    state.prospected_count += 1;

    let content = report.content_level();
    if let Some(level) = content {
        *state.prospect_content_counts.entry(level).or_insert(0) += 1;
    }

    let already_mined = report.already_mined();
    if already_mined {
        state.already_mined_count += 1;
    }

    for material in &report.materials {
        state
            .prospected_samples
            .entry(material.name.clone())
            .or_default()
            .push(material.proportion);
    }

    ProspectOutcome::New {
        content,
        already_mined,
    }
}

/// Applies a cargo snapshot.
///
/// The first snapshot of a session (and every snapshot outside one) only
/// records the baseline, so cargo carried in before tracking began is never
/// credited. Later snapshots credit each positive per-item delta.
pub fn apply_cargo(
    state: &mut SessionState,
    snapshot: &CargoSnapshot,
    timestamp: Option<DateTime<Utc>>,
) -> CargoUpdate {
    state.current_cargo_tonnage = snapshot.tonnage();
    let previous_limpets = state.limpets_remaining;
    if let Some(limpets) = snapshot.drones() {
        if !state.limpets_start_initialized {
            state.limpets_start = Some(limpets);
            state.limpets_start_initialized = true;
        }
        state.limpets_remaining = Some(limpets);
    }

    let mut update = CargoUpdate {
        limpets_changed: matches!(
            (previous_limpets, snapshot.drones()),
            (Some(before), Some(after)) if before != after
        ),
        ..CargoUpdate::default()
    };

    if !state.is_mining || state.last_cargo_counts.is_empty() {
        state.last_cargo_counts.clone_from(&snapshot.inventory);
        update.baseline = true;
        return update;
    }

    for (name, count) in &snapshot.inventory {
        if name == DRONES_KEY {
            continue;
        }
        let previous = state.last_cargo_counts.get(name).copied().unwrap_or(0);
        let increment = count - previous;
        if increment <= 0 {
            continue;
        }
        *state.cargo_additions.entry(name.clone()).or_insert(0) += increment;
        state.harvested_commodities.insert(name.clone());
        state
            .commodity_start_times
            .entry(name.clone())
            .or_insert_with(|| timestamp.unwrap_or_else(Utc::now));
        update.added.insert(name.clone(), increment);
    }
    state.sync_cargo_totals();

    recompute_abandoned_limpets(state);
    state.last_cargo_counts.clone_from(&snapshot.inventory);
    update
}

/// Recomputes the abandoned-limpet estimate.
///
/// `start - remaining - (prospectors + collectors - 1)`, clamped at zero.
/// The `- 1` discounts the prospector whose launch opened the session. This
/// is a heuristic: a session that began any other way (for example restored
/// mid-flight) will be off by that one limpet.
pub fn recompute_abandoned_limpets(state: &mut SessionState) {
    let (Some(start), Some(remaining)) = (state.limpets_start, state.limpets_remaining) else {
        return;
    };
    let launched = to_i64(state.prospector_launched_count)
        .saturating_add(to_i64(state.collection_drones_launched))
        .saturating_sub(1);
    let abandoned = start.saturating_sub(remaining).saturating_sub(launched);
    state.abandoned_limpets = abandoned.max(0);
}

/// Counts a material pickup while mining. Returns whether it was counted.
pub fn record_material(state: &mut SessionState, name: &str, count: u64) -> bool {
    if !state.is_mining {
        return false;
    }
    *state
        .materials_collected
        .entry(name.to_lowercase())
        .or_insert(0) += count.max(1);
    true
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::journal::ProspectMaterial;

    fn mining_state() -> SessionState {
        SessionState {
            is_mining: true,
            ..SessionState::default()
        }
    }

    fn report(materials: &[(&str, f64)], content: &str, remaining: Option<f64>) -> ProspectReport {
        ProspectReport {
            materials: materials
                .iter()
                .map(|(name, proportion)| ProspectMaterial {
                    name: name.to_lowercase(),
                    proportion: *proportion,
                })
                .collect(),
            content: Some(content.to_string()),
            remaining,
            ..ProspectReport::default()
        }
    }

    fn cargo(items: &[(&str, i64)]) -> CargoSnapshot {
        CargoSnapshot {
            inventory: items
                .iter()
                .map(|(name, count)| ((*name).to_string(), *count))
                .collect(),
            skipped_items: 0,
        }
    }

    fn assert_totals_invariant(state: &SessionState) {
        let expected: BTreeMap<String, i64> = state
            .cargo_additions
            .iter()
            .filter(|(_, tons)| **tons > 0)
            .map(|(name, tons)| (name.clone(), *tons))
            .collect();
        assert_eq!(state.cargo_totals, expected);
    }

    #[test]
    fn reordered_prospect_is_a_duplicate() {
        let mut state = mining_state();
        let first = report(&[("Platinum", 28.5), ("Gold", 14.2)], "High", Some(100.0));
        let second = report(&[("Gold", 14.2), ("Platinum", 28.5)], "High", Some(100.0));

        assert_eq!(
            record_prospect(&mut state, &first),
            ProspectOutcome::New {
                content: Some(ContentLevel::High),
                already_mined: false
            }
        );
        assert_eq!(record_prospect(&mut state, &second), ProspectOutcome::Duplicate);
        assert_eq!(record_prospect(&mut state, &first), ProspectOutcome::Duplicate);

        assert_eq!(state.prospected_count, 1);
        assert_eq!(state.duplicate_prospected, 2);
        assert_eq!(state.content_count(ContentLevel::High), 1);
        assert_eq!(state.prospected_samples["platinum"], vec![28.5]);
    }

    #[test]
    fn partially_mined_asteroid_is_counted() {
        let mut state = mining_state();
        let rock = report(&[("Painite", 31.0)], "$AsteroidMaterialContent_Low;", Some(42.0));

        let outcome = record_prospect(&mut state, &rock);

        assert_eq!(
            outcome,
            ProspectOutcome::New {
                content: Some(ContentLevel::Low),
                already_mined: true
            }
        );
        assert_eq!(state.already_mined_count, 1);
    }

    #[test]
    fn unfingerprintable_prospect_changes_nothing() {
        let mut state = mining_state();
        let empty = ProspectReport {
            skipped_materials: 2,
            content: Some("High".to_string()),
            ..ProspectReport::default()
        };

        assert_eq!(
            record_prospect(&mut state, &empty),
            ProspectOutcome::Unfingerprintable
        );
        assert_eq!(state.prospected_count, 0);
        assert_eq!(state.duplicate_prospected, 0);
        assert!(state.prospect_content_counts.is_empty());
    }

    #[test]
    fn prospect_outside_session_is_ignored() {
        let mut state = SessionState::default();
        let rock = report(&[("Gold", 10.0)], "Medium", None);
        assert_eq!(record_prospect(&mut state, &rock), ProspectOutcome::Inactive);
        assert_eq!(state.prospected_count, 0);
        assert!(state.prospected_seen.is_empty());
    }

    #[test]
    fn first_snapshot_only_sets_baseline() {
        let mut state = mining_state();
        let update = apply_cargo(&mut state, &cargo(&[("platinum", 12), ("drones", 30)]), None);

        assert!(update.baseline);
        assert!(state.cargo_additions.is_empty());
        assert_eq!(state.last_cargo_counts.get("platinum"), Some(&12));
        assert_eq!(state.limpets_start, Some(30));
        assert_totals_invariant(&state);
    }

    #[test]
    fn deltas_are_credited_after_baseline() {
        let mut state = mining_state();
        let t = Utc.with_ymd_and_hms(3300, 1, 1, 12, 0, 40).unwrap();
        apply_cargo(&mut state, &cargo(&[("platinum", 2), ("drones", 30)]), None);

        let update = apply_cargo(
            &mut state,
            &cargo(&[("platinum", 6), ("gold", 3), ("drones", 28)]),
            Some(t),
        );

        assert!(!update.baseline);
        assert!(update.limpets_changed);
        assert!(update.changed());
        assert_eq!(update.added.get("platinum"), Some(&4));
        assert_eq!(state.current_cargo_tonnage, 9);
        assert_eq!(state.cargo_additions.get("platinum"), Some(&4));
        assert_eq!(state.cargo_additions.get("gold"), Some(&3));
        assert!(state.harvested_commodities.contains("gold"));
        assert_eq!(state.commodity_start_times.get("gold"), Some(&t));
        assert_eq!(state.limpets_start, Some(30));
        assert_eq!(state.limpets_remaining, Some(28));
        assert_totals_invariant(&state);
    }

    #[test]
    fn selling_cargo_does_not_reduce_additions() {
        let mut state = mining_state();
        apply_cargo(&mut state, &cargo(&[("gold", 0)]), None);
        apply_cargo(&mut state, &cargo(&[("gold", 5)]), None);
        apply_cargo(&mut state, &cargo(&[("gold", 1)]), None);
        apply_cargo(&mut state, &cargo(&[("gold", 4)]), None);

        assert_eq!(state.cargo_additions.get("gold"), Some(&8));
        assert_totals_invariant(&state);
    }

    #[test]
    fn unchanged_snapshot_reports_no_change() {
        let mut state = mining_state();
        apply_cargo(&mut state, &cargo(&[("gold", 2), ("drones", 10)]), None);
        let update = apply_cargo(&mut state, &cargo(&[("gold", 1), ("drones", 10)]), None);

        assert!(!update.baseline);
        assert!(!update.changed());
        assert_eq!(state.current_cargo_tonnage, 1);
    }

    #[test]
    fn commodity_start_time_is_set_once() {
        let mut state = mining_state();
        let first = Utc.with_ymd_and_hms(3300, 1, 1, 12, 1, 0).unwrap();
        let later = Utc.with_ymd_and_hms(3300, 1, 1, 12, 9, 0).unwrap();
        apply_cargo(&mut state, &cargo(&[("osmium", 0)]), None);
        apply_cargo(&mut state, &cargo(&[("osmium", 1)]), Some(first));
        apply_cargo(&mut state, &cargo(&[("osmium", 2)]), Some(later));
        assert_eq!(state.commodity_start_times.get("osmium"), Some(&first));
    }

    #[test]
    fn snapshots_outside_session_keep_refreshing_baseline() {
        let mut state = SessionState::default();
        apply_cargo(&mut state, &cargo(&[("gold", 1)]), None);
        let update = apply_cargo(&mut state, &cargo(&[("gold", 9)]), None);
        assert!(update.baseline);
        assert!(state.cargo_additions.is_empty());
        assert_eq!(state.last_cargo_counts.get("gold"), Some(&9));
    }

    #[test]
    fn abandoned_limpets_formula() {
        let mut state = mining_state();
        state.limpets_start = Some(50);
        state.limpets_remaining = Some(49);
        state.prospector_launched_count = 1;
        recompute_abandoned_limpets(&mut state);
        assert_eq!(state.abandoned_limpets, 1);
    }

    #[test]
    fn abandoned_limpets_clamps_at_zero() {
        let mut state = mining_state();
        state.limpets_start = Some(20);
        state.limpets_remaining = Some(20);
        state.prospector_launched_count = 3;
        state.collection_drones_launched = 2;
        recompute_abandoned_limpets(&mut state);
        assert_eq!(state.abandoned_limpets, 0);
    }

    #[test]
    fn collection_launch_needs_active_session() {
        let mut idle = SessionState::default();
        assert!(!record_collection_launch(&mut idle));
        assert_eq!(idle.collection_drones_launched, 0);

        let mut active = mining_state();
        assert!(record_collection_launch(&mut active));
        assert_eq!(active.collection_drones_launched, 1);
    }

    #[test]
    fn materials_accumulate_per_name() {
        let mut state = mining_state();
        record_material(&mut state, "iron", 3);
        record_material(&mut state, "Iron", 2);
        record_material(&mut state, "nickel", 0);
        assert_eq!(state.materials_collected.get("iron"), Some(&5));
        assert_eq!(state.materials_collected.get("nickel"), Some(&1));
    }
}
