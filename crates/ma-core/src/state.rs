//! The mutable session aggregate.
//!
//! [`SessionState`] is created once per tracker and never replaced. Session
//! start and manual reset both clear it in place through [`SessionState::reset`],
//! which leaves the preference fields untouched.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::ProspectFingerprint;

/// Default sliding window for the refinement rate.
pub const DEFAULT_REFINEMENT_LOOKBACK_SECONDS: i64 = 10;

/// Default histogram bin width, in percent.
pub const DEFAULT_HISTOGRAM_BIN_SIZE: u32 = 10;

/// Overall richness of a prospected asteroid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ContentLevel {
    High,
    Medium,
    Low,
}

impl ContentLevel {
    /// All levels in classification priority order.
    pub const ALL: [Self; 3] = [Self::High, Self::Medium, Self::Low];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    /// Classifies a content label by case-insensitive substring match.
    ///
    /// The first match in `High`, `Medium`, `Low` order wins.
    pub fn classify(label: &str) -> Option<Self> {
        let lowered = label.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|level| lowered.contains(&level.as_str().to_lowercase()))
    }
}

impl fmt::Display for ContentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All derived metrics for the current (or most recently ended) session.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub is_mining: bool,
    pub is_paused: bool,
    pub mining_start: Option<DateTime<Utc>>,
    /// `None` while a session is active.
    pub mining_end: Option<DateTime<Utc>>,
    /// Body (or system, when no body is known) resolved at session start.
    pub mining_location: Option<String>,
    /// Last system name observed. Survives resets.
    pub current_system: Option<String>,

    pub prospected_count: u64,
    pub already_mined_count: u64,
    pub duplicate_prospected: u64,
    pub prospected_seen: HashSet<ProspectFingerprint>,
    /// Raw yield observations per material, in arrival order.
    pub prospected_samples: BTreeMap<String, Vec<f64>>,
    pub prospect_content_counts: BTreeMap<ContentLevel, u64>,

    /// Cumulative gain per commodity since the session started.
    pub cargo_additions: BTreeMap<String, i64>,
    /// Positive entries of `cargo_additions`.
    pub cargo_totals: BTreeMap<String, i64>,
    pub harvested_commodities: BTreeSet<String>,
    pub commodity_start_times: BTreeMap<String, DateTime<Utc>>,

    pub limpets_remaining: Option<i64>,
    pub limpets_start: Option<i64>,
    pub limpets_start_initialized: bool,
    pub collection_drones_launched: u64,
    pub prospector_launched_count: u64,
    pub abandoned_limpets: i64,

    pub materials_collected: BTreeMap<String, u64>,
    /// Previous cargo snapshot. Empty until the first snapshot of a session.
    pub last_cargo_counts: BTreeMap<String, i64>,
    /// Tons in the hold at the last snapshot, limpets excluded.
    pub current_cargo_tonnage: i64,

    pub recent_refinements: VecDeque<DateTime<Utc>>,
    pub current_rpm: f64,
    pub max_rpm: f64,

    // Preferences (kept across resets).
    pub refinement_lookback_seconds: i64,
    pub histogram_bin_size: u32,
    pub auto_unpause_on_event: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            is_mining: false,
            is_paused: false,
            mining_start: None,
            mining_end: None,
            mining_location: None,
            current_system: None,
            prospected_count: 0,
            already_mined_count: 0,
            duplicate_prospected: 0,
            prospected_seen: HashSet::new(),
            prospected_samples: BTreeMap::new(),
            prospect_content_counts: BTreeMap::new(),
            cargo_additions: BTreeMap::new(),
            cargo_totals: BTreeMap::new(),
            harvested_commodities: BTreeSet::new(),
            commodity_start_times: BTreeMap::new(),
            limpets_remaining: None,
            limpets_start: None,
            limpets_start_initialized: false,
            collection_drones_launched: 0,
            prospector_launched_count: 0,
            abandoned_limpets: 0,
            materials_collected: BTreeMap::new(),
            last_cargo_counts: BTreeMap::new(),
            current_cargo_tonnage: 0,
            recent_refinements: VecDeque::new(),
            current_rpm: 0.0,
            max_rpm: 0.0,
            refinement_lookback_seconds: DEFAULT_REFINEMENT_LOOKBACK_SECONDS,
            histogram_bin_size: DEFAULT_HISTOGRAM_BIN_SIZE,
            auto_unpause_on_event: true,
        }
    }
}

impl SessionState {
    /// Creates a state with a custom refinement window.
    pub fn with_lookback(refinement_lookback_seconds: i64) -> Self {
        Self {
            refinement_lookback_seconds,
            ..Self::default()
        }
    }

    /// Clears every session metric in place.
    ///
    /// Used both when a session starts and for a manual reset. Preferences and
    /// `current_system` are left alone.
    pub fn reset(&mut self) {
        self.is_mining = false;
        self.is_paused = false;
        self.mining_start = None;
        self.mining_end = None;
        self.mining_location = None;

        self.prospected_count = 0;
        self.already_mined_count = 0;
        self.duplicate_prospected = 0;
        self.prospected_seen.clear();
        self.prospected_samples.clear();
        self.prospect_content_counts.clear();

        self.cargo_additions.clear();
        self.cargo_totals.clear();
        self.harvested_commodities.clear();
        self.commodity_start_times.clear();

        self.limpets_remaining = None;
        self.limpets_start = None;
        self.limpets_start_initialized = false;
        self.collection_drones_launched = 0;
        self.prospector_launched_count = 0;
        self.abandoned_limpets = 0;

        self.materials_collected.clear();
        self.last_cargo_counts.clear();
        self.current_cargo_tonnage = 0;

        self.recent_refinements.clear();
        self.current_rpm = 0.0;
        self.max_rpm = 0.0;
    }

    /// Number of asteroids classified at the given richness.
    pub fn content_count(&self, level: ContentLevel) -> u64 {
        self.prospect_content_counts
            .get(&level)
            .copied()
            .unwrap_or(0)
    }

    /// Rebuilds `cargo_totals` from the positive entries of `cargo_additions`.
    pub(crate) fn sync_cargo_totals(&mut self) {
        self.cargo_additions.retain(|_, tons| *tons > 0);
        self.cargo_totals.clone_from(&self.cargo_additions);
    }
}
