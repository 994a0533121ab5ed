//! Figures derived from [`SessionState`] on demand.
//!
//! Nothing here mutates the state. Rates are `None` whenever they would be
//! meaningless (no tons, no elapsed time).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::SessionState;

/// One bucket of a prospecting histogram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramBin {
    /// Lower bound in percent (inclusive).
    pub start: u32,
    /// Upper bound in percent (exclusive, except for the last bin).
    pub end: u32,
    pub count: u64,
}

impl HistogramBin {
    /// Label of the form `"20-30%"`.
    pub fn label(&self) -> String {
        format!("{}-{}%", self.start, self.end)
    }
}

/// Minimum, mean and maximum of a set of yield samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PercentageStats {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

/// Tons per hour for one commodity, measured from its first credited addition.
///
/// The span ends at `mining_end`, or at `now` while the session is running.
pub fn commodity_tph(state: &SessionState, commodity: &str, now: DateTime<Utc>) -> Option<f64> {
    let start = state.commodity_start_times.get(commodity)?;
    let tons = state.cargo_additions.get(commodity).copied().unwrap_or(0);
    rate_per_hour(tons, *start, state.mining_end.unwrap_or(now))
}

/// Tons per hour across every commodity over the whole session.
pub fn total_tph(state: &SessionState, now: DateTime<Utc>) -> Option<f64> {
    let start = state.mining_start?;
    let tons = state
        .cargo_additions
        .values()
        .filter(|tons| **tons > 0)
        .fold(0_i64, |sum, tons| sum.saturating_add(*tons));
    rate_per_hour(tons, start, state.mining_end.unwrap_or(now))
}

#[allow(
    clippy::cast_precision_loss,
    reason = "ton counts and session lengths are far below 2^52"
)]
fn rate_per_hour(tons: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<f64> {
    if tons <= 0 {
        return None;
    }
    let elapsed_hours = (end - start).num_milliseconds() as f64 / 3_600_000.0;
    if elapsed_hours <= 0.0 {
        return None;
    }
    Some(tons as f64 / elapsed_hours)
}

/// Buckets each material's yield samples into `histogram_bin_size`-wide bins.
///
/// Samples are clamped to `[0, 100]`; exactly 100 lands in the last bin.
/// Only non-empty bins are returned, in ascending order. Non-finite samples
/// are skipped.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "clamped samples divided by a bin width of at least 1 fit in u32"
)]
pub fn prospect_histogram(state: &SessionState) -> BTreeMap<String, Vec<HistogramBin>> {
    let size = state.histogram_bin_size.max(1);
    let last_index = (99 / size).min(99);

    let mut histogram = BTreeMap::new();
    for (material, samples) in &state.prospected_samples {
        let mut counts: BTreeMap<u32, u64> = BTreeMap::new();
        for value in samples.iter().filter(|value| value.is_finite()) {
            let clamped = value.clamp(0.0, 100.0);
            let index = ((clamped / f64::from(size)).floor() as u32).min(last_index);
            *counts.entry(index).or_default() += 1;
        }
        if counts.is_empty() {
            continue;
        }
        let bins = counts
            .into_iter()
            .map(|(index, count)| {
                let start = index * size;
                HistogramBin {
                    start,
                    end: start.saturating_add(size).min(100),
                    count,
                }
            })
            .collect();
        histogram.insert(material.clone(), bins);
    }
    histogram
}

/// Min/avg/max of the finite samples, or `None` if there are none.
#[allow(
    clippy::cast_precision_loss,
    reason = "sample counts are small"
)]
pub fn percentage_stats(samples: &[f64]) -> Option<PercentageStats> {
    let finite: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg = finite.iter().sum::<f64>() / finite.len() as f64;
    Some(PercentageStats { min, avg, max })
}

/// Prospectors that never produced a report (destroyed or wasted).
pub fn prospectors_lost(state: &SessionState) -> u64 {
    state
        .prospector_launched_count
        .saturating_sub(state.prospected_count)
}
