//! Timestamped record of what happened during a session.
//!
//! The tracker reports a [`SessionEvent`] through
//! [`SessionObserver::on_event`] for every lifecycle change and mining
//! action it sees while a session is active. [`SessionRecorder`] is the
//! observer that keeps them, so a summary can carry the full timeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::journal::{CargoSnapshot, DRONES_KEY, DroneKind, ProspectReport};
use crate::state::{ContentLevel, SessionState};
use crate::tracker::SessionObserver;

/// Reason given when a prospector launch opens a session.
pub const START_REASON_PROSPECTOR: &str = "prospector launched";

/// Reason given when supercruise entry closes a session.
pub const STOP_REASON_SUPERCRUISE: &str = "entered supercruise";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: SessionEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEventKind {
    SessionStarted {
        reason: String,
    },
    SessionStopped {
        reason: String,
    },
    /// `auto` is set when mining activity, not the user, changed the flag.
    Paused {
        auto: bool,
    },
    Resumed {
        auto: bool,
    },
    LaunchDrone {
        drone: String,
    },
    ProspectedAsteroid {
        materials: Vec<ProspectedMaterial>,
        content: Option<ContentLevel>,
        remaining_percent: Option<f64>,
        already_mined: bool,
        duplicate: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
    },
    Cargo {
        /// Tons in the hold, limpets excluded.
        total_cargo: i64,
        inventory: BTreeMap<String, i64>,
        limpets: Option<i64>,
    },
    MiningRefined {
        commodity: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProspectedMaterial {
    pub name: String,
    pub percentage: f64,
}

impl SessionEventKind {
    pub(crate) fn launch(kind: DroneKind) -> Self {
        Self::LaunchDrone {
            drone: kind.as_str().to_string(),
        }
    }

    pub(crate) fn prospect(report: &ProspectReport, duplicate: bool) -> Self {
        Self::ProspectedAsteroid {
            materials: report
                .materials
                .iter()
                .map(|material| ProspectedMaterial {
                    name: material.name.clone(),
                    percentage: material.proportion,
                })
                .collect(),
            content: report.content_level(),
            remaining_percent: report.remaining,
            already_mined: report.already_mined(),
            duplicate,
            body: report.body.clone(),
        }
    }

    pub(crate) fn cargo(snapshot: &CargoSnapshot) -> Self {
        Self::Cargo {
            total_cargo: snapshot.tonnage(),
            inventory: snapshot
                .inventory
                .iter()
                .filter(|(name, _)| name.as_str() != DRONES_KEY)
                .map(|(name, count)| (name.clone(), *count))
                .collect(),
            limpets: snapshot.drones(),
        }
    }
}

/// Observer that keeps the timeline of the current session.
///
/// A new session start or a manual reset discards what came before.
#[derive(Debug, Default)]
pub struct SessionRecorder {
    events: Vec<SessionEvent>,
}

impl SessionRecorder {
    pub fn events(&self) -> &[SessionEvent] {
        &self.events
    }

    /// Hands over the recorded timeline, leaving the recorder empty.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }
}

impl SessionObserver for SessionRecorder {
    fn on_reset(&mut self, _state: &SessionState) {
        self.events.clear();
    }

    fn on_event(&mut self, event: &SessionEvent, _state: &SessionState) {
        if matches!(event.kind, SessionEventKind::SessionStarted { .. }) {
            self.events.clear();
        }
        self.events.push(event.clone());
    }
}
