//! End-of-session snapshot.
//!
//! A [`SessionSummary`] is a plain serde record so it can be printed as JSON,
//! stored, or rendered as text by the CLI.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rpm;
use crate::state::{ContentLevel, SessionState};
use crate::stats::{self, HistogramBin, PercentageStats};
use crate::timeline::SessionEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_seconds: i64,
    pub total_tons: i64,
    pub tons_per_hour: Option<f64>,
    /// Tons in the hold at the last cargo snapshot, limpets excluded.
    #[serde(default)]
    pub inventory_tonnage: i64,
    /// Body (or system) where the session started.
    pub location: Option<String>,
    pub system: Option<String>,
    pub prospected: ProspectingSummary,
    pub drones: DroneSummary,
    pub content: BTreeMap<ContentLevel, u64>,
    /// Prospected yields per material, bucketed by the configured bin width.
    pub yield_histogram: BTreeMap<String, Vec<HistogramBin>>,
    pub materials: BTreeMap<String, u64>,
    pub refinement: RefinementSummary,
    pub commodities: BTreeMap<String, CommoditySummary>,
    /// Timestamped session timeline, oldest first.
    #[serde(default)]
    pub events: Vec<SessionEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProspectingSummary {
    pub total: u64,
    pub already_mined: u64,
    pub duplicates: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroneSummary {
    pub prospectors_launched: u64,
    pub prospectors_lost: u64,
    pub collectors_launched: u64,
    pub collectors_abandoned: i64,
    pub limpets_remaining: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementSummary {
    pub lookback_seconds: i64,
    pub current_rpm: f64,
    pub max_rpm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommoditySummary {
    pub asteroids_prospected: usize,
    /// Share of prospected asteroids that contained this commodity.
    pub percentage_of_asteroids: f64,
    pub tons: i64,
    pub min_yield: Option<f64>,
    pub avg_yield: Option<f64>,
    pub max_yield: Option<f64>,
    pub tons_per_hour: Option<f64>,
}

impl SessionSummary {
    /// Builds a summary ending at the session end, or at `now` while the
    /// session is still running.
    ///
    /// Takes the state mutably because the refinement rate is brought up to
    /// date at that instant first. A session that never started is treated
    /// as starting when it ends.
    #[allow(
        clippy::cast_precision_loss,
        reason = "prospect counts are small"
    )]
    pub fn capture(state: &mut SessionState, now: DateTime<Utc>) -> Self {
        let end = state.mining_end.unwrap_or(now);
        rpm::update_rpm(state, end);

        let start = state.mining_start.unwrap_or(end);
        let end = end.max(start);
        let total_tons = state
            .cargo_totals
            .values()
            .fold(0_i64, |sum, tons| sum.saturating_add(*tons));

        let mut commodities = BTreeMap::new();
        for (commodity, tons) in &state.cargo_totals {
            let samples = state
                .prospected_samples
                .get(commodity)
                .map_or(&[][..], Vec::as_slice);
            let percentage_of_asteroids = if state.prospected_count == 0 {
                0.0
            } else {
                round_to(
                    samples.len() as f64 / state.prospected_count as f64 * 100.0,
                    3,
                )
            };
            let yields = stats::percentage_stats(samples);
            commodities.insert(
                commodity.clone(),
                CommoditySummary {
                    asteroids_prospected: samples.len(),
                    percentage_of_asteroids,
                    tons: *tons,
                    min_yield: yields.map(|PercentageStats { min, .. }| min),
                    avg_yield: yields.map(|PercentageStats { avg, .. }| round_to(avg, 2)),
                    max_yield: yields.map(|PercentageStats { max, .. }| max),
                    tons_per_hour: stats::commodity_tph(state, commodity, end)
                        .map(|rate| round_to(rate, 3)),
                },
            );
        }

        let content = ContentLevel::ALL
            .into_iter()
            .map(|level| (level, state.content_count(level)))
            .collect();

        Self {
            start,
            end,
            duration_seconds: (end - start).num_seconds().max(0),
            total_tons,
            tons_per_hour: stats::total_tph(state, end).map(|rate| round_to(rate, 3)),
            inventory_tonnage: state.current_cargo_tonnage,
            location: state.mining_location.clone(),
            system: state.current_system.clone(),
            prospected: ProspectingSummary {
                total: state.prospected_count,
                already_mined: state.already_mined_count,
                duplicates: state.duplicate_prospected,
            },
            drones: DroneSummary {
                prospectors_launched: state.prospector_launched_count,
                prospectors_lost: stats::prospectors_lost(state),
                collectors_launched: state.collection_drones_launched,
                collectors_abandoned: state.abandoned_limpets,
                limpets_remaining: state.limpets_remaining,
            },
            content,
            yield_histogram: stats::prospect_histogram(state),
            materials: state.materials_collected.clone(),
            refinement: RefinementSummary {
                lookback_seconds: state.refinement_lookback_seconds,
                current_rpm: round_to(state.current_rpm, 2),
                max_rpm: round_to(state.max_rpm, 2),
            },
            commodities,
            events: Vec::new(),
        }
    }

    /// Attaches the session timeline recorded alongside the state.
    #[must_use]
    pub fn with_events(mut self, events: Vec<SessionEvent>) -> Self {
        self.events = events;
        self
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(3300, 6, 1, 0, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    fn finished_state() -> SessionState {
        let mut state = SessionState::default();
        state.mining_start = Some(at(0));
        state.mining_end = Some(at(3600));
        state.mining_location = Some("Borann A 2 A Ring".to_string());
        state.current_system = Some("Borann".to_string());
        state.prospected_count = 4;
        state.prospector_launched_count = 5;
        state.collection_drones_launched = 3;
        state.prospect_content_counts.insert(ContentLevel::High, 1);
        state.prospect_content_counts.insert(ContentLevel::Low, 3);
        state
            .prospected_samples
            .insert("platinum".to_string(), vec![20.0, 30.0, 25.5]);
        state.cargo_additions.insert("platinum".to_string(), 24);
        state.cargo_totals.insert("platinum".to_string(), 24);
        state
            .commodity_start_times
            .insert("platinum".to_string(), at(1800));
        state.materials_collected.insert("iron".to_string(), 6);
        state.current_cargo_tonnage = 26;
        state.recent_refinements.push_back(at(3595));
        state
    }

    #[test]
    fn captures_totals_and_breakdown() {
        let mut state = finished_state();
        let summary = SessionSummary::capture(&mut state, at(3600));

        assert_eq!(summary.duration_seconds, 3600);
        assert_eq!(summary.total_tons, 24);
        assert_eq!(summary.tons_per_hour, Some(24.0));
        assert_eq!(summary.inventory_tonnage, 26);
        assert!(summary.events.is_empty());
        assert_eq!(summary.drones.prospectors_lost, 1);
        assert_eq!(summary.content[&ContentLevel::Medium], 0);
        assert!((summary.refinement.current_rpm - 6.0).abs() < 1e-9);

        let platinum = &summary.commodities["platinum"];
        assert_eq!(platinum.asteroids_prospected, 3);
        assert!((platinum.percentage_of_asteroids - 75.0).abs() < 1e-9);
        assert_eq!(platinum.min_yield, Some(20.0));
        assert_eq!(platinum.avg_yield, Some(25.17));
        assert_eq!(platinum.max_yield, Some(30.0));
        assert_eq!(platinum.tons_per_hour, Some(48.0));

        let bins = &summary.yield_histogram["platinum"];
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].label(), "20-30%");
        assert_eq!(bins[0].count, 2);
    }

    #[test]
    fn empty_session_has_no_rates() {
        let mut state = SessionState::default();
        let summary = SessionSummary::capture(&mut state, at(0));

        assert_eq!(summary.start, at(0));
        assert_eq!(summary.duration_seconds, 0);
        assert_eq!(summary.tons_per_hour, None);
        assert!(summary.commodities.is_empty());
        assert!(summary.yield_histogram.is_empty());
    }

    #[test]
    fn serializes_content_levels_by_name() {
        let mut state = finished_state();
        let summary = SessionSummary::capture(&mut state, at(3600));
        let json = serde_json::to_value(&summary).unwrap();

        insta::assert_snapshot!(json["content"].to_string(), @r#"{"High":1,"Low":3,"Medium":0}"#);
        assert_eq!(json["system"], "Borann");
    }

    #[test]
    fn carries_attached_timeline() {
        use crate::timeline::{STOP_REASON_SUPERCRUISE, SessionEventKind};

        let mut state = finished_state();
        let stopped = SessionEvent {
            timestamp: at(3600),
            kind: SessionEventKind::SessionStopped {
                reason: STOP_REASON_SUPERCRUISE.to_string(),
            },
        };
        let summary = SessionSummary::capture(&mut state, at(3600)).with_events(vec![stopped]);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["events"][0]["type"], "session_stopped");
        assert_eq!(json["events"][0]["reason"], "entered supercruise");
        assert_eq!(json["inventory_tonnage"], 26);

        let restored: SessionSummary = serde_json::from_value(json).unwrap();
        assert_eq!(restored.events, summary.events);
        assert_eq!(restored.inventory_tonnage, 26);
    }
}
