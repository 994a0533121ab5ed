//! Session lifecycle controller.
//!
//! [`SessionTracker`] owns the [`SessionState`] and is the only thing that
//! mutates it. Journal entries are delivered serially; each one is decoded,
//! dispatched to the matching accumulator, and followed by a refresh
//! notification to the [`SessionObserver`].
//!
//! # States
//!
//! ```text
//! INACTIVE --(prospector launched)--> ACTIVE --(supercruise entry)--> INACTIVE
//! ```
//!
//! Pausing is an orthogonal flag on top of either state. It only suspends
//! the timer-driven rate refresh ([`SessionTracker::tick`]); event
//! accumulators keep running.
//!
//! While a session is active every lifecycle change and mining action is
//! also reported as a [`SessionEvent`] for the session timeline.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::accumulate::{self, ProspectOutcome};
use crate::journal::{DroneKind, JournalEntry, JournalEvent};
use crate::location::{self, SharedState};
use crate::rpm;
use crate::state::SessionState;
use crate::timeline::{
    START_REASON_PROSPECTOR, STOP_REASON_SUPERCRUISE, SessionEvent, SessionEventKind,
};

/// Receives notifications from the tracker.
///
/// Observers get read-only access to the state. Every method has an empty
/// default so implementors only override what they need.
pub trait SessionObserver {
    /// Called after every processed entry and state transition.
    fn on_refresh(&mut self, _state: &SessionState) {}

    /// A session started. The state has already been reset.
    fn on_session_start(&mut self, _state: &SessionState) {}

    /// A session ended. Counters are still populated.
    fn on_session_end(&mut self, _state: &SessionState) {}

    /// A manual reset is about to clear the state.
    fn on_reset(&mut self, _state: &SessionState) {}

    /// Mining activity was observed (launches, prospects, cargo, refinements).
    ///
    /// Only first sightings of an asteroid count; a duplicate prospect is not
    /// activity and never resumes a paused session.
    fn on_activity(&mut self, _reason: &str, _state: &SessionState) {}

    /// The pause flag changed.
    fn on_pause_changed(&mut self, _paused: bool, _state: &SessionState) {}

    /// A timeline entry for the active session.
    fn on_event(&mut self, _event: &SessionEvent, _state: &SessionState) {}
}

impl SessionObserver for () {}

/// Event-driven mining session tracker.
#[derive(Debug)]
pub struct SessionTracker<O = ()> {
    state: SessionState,
    observer: O,
}

impl Default for SessionTracker<()> {
    fn default() -> Self {
        Self::new(SessionState::default(), ())
    }
}

impl<O: SessionObserver> SessionTracker<O> {
    /// Creates a tracker around an initial state (usually carrying preferences).
    pub const fn new(state: SessionState, observer: O) -> Self {
        Self { state, observer }
    }

    /// Read access to the current state.
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    pub const fn observer(&self) -> &O {
        &self.observer
    }

    pub const fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// Decodes and processes one raw journal record.
    ///
    /// Never fails: malformed input is skipped or logged at debug level.
    pub fn handle_entry(&mut self, raw: &Value, shared: Option<&SharedState>) {
        let entry = JournalEntry::decode(raw);
        self.apply(&entry, shared);
    }

    /// Processes one decoded journal entry.
    pub fn apply(&mut self, entry: &JournalEntry, shared: Option<&SharedState>) {
        let at = entry.timestamp_or_now();
        match &entry.event {
            JournalEvent::LaunchDrone(kind @ DroneKind::Prospector) => {
                if !self.state.is_mining {
                    self.start_session(entry, shared);
                }
                accumulate::record_prospector_launch(&mut self.state);
                self.activity(entry.event.name(), at);
                self.record(at, SessionEventKind::launch(*kind));
            }
            JournalEvent::LaunchDrone(kind @ DroneKind::Collection) => {
                if accumulate::record_collection_launch(&mut self.state) {
                    self.activity(entry.event.name(), at);
                    self.record(at, SessionEventKind::launch(*kind));
                }
            }
            JournalEvent::ProspectedAsteroid(report) => {
                let outcome = accumulate::record_prospect(&mut self.state, report);
                if matches!(outcome, ProspectOutcome::New { .. }) {
                    self.activity(entry.event.name(), at);
                }
                if outcome != ProspectOutcome::Inactive {
                    let duplicate = outcome == ProspectOutcome::Duplicate;
                    self.record(at, SessionEventKind::prospect(report, duplicate));
                }
            }
            JournalEvent::Cargo(snapshot) => {
                let update = accumulate::apply_cargo(&mut self.state, snapshot, entry.timestamp);
                if self.state.is_mining && !update.baseline {
                    if !update.added.is_empty() {
                        tracing::debug!(added = ?update.added, "cargo additions credited");
                    }
                    self.activity(entry.event.name(), at);
                }
                if update.changed() {
                    self.record(at, SessionEventKind::cargo(snapshot));
                }
            }
            JournalEvent::SupercruiseEntry => {
                if self.state.is_mining {
                    self.end_session(entry, shared);
                }
            }
            JournalEvent::MaterialCollected { name, count } => {
                accumulate::record_material(&mut self.state, name, *count);
            }
            JournalEvent::MiningRefined { commodity } => {
                if self.state.is_mining {
                    let rate = rpm::register_refinement(&mut self.state, at);
                    tracing::trace!(?commodity, rate, "refinement registered");
                    self.activity(entry.event.name(), at);
                    self.record(
                        at,
                        SessionEventKind::MiningRefined {
                            commodity: commodity.clone(),
                        },
                    );
                }
            }
            JournalEvent::Ignored { .. } => {}
        }

        if let Some(system) = entry
            .system
            .clone()
            .or_else(|| shared.and_then(location::detect_system))
        {
            self.state.current_system = Some(system);
        }

        self.observer.on_refresh(&self.state);
    }

    /// Manual reset: ends any session and clears every metric.
    pub fn reset(&mut self) {
        self.observer.on_reset(&self.state);
        self.state.reset();
        tracing::info!("mining session state reset");
        self.observer.on_refresh(&self.state);
    }

    /// Sets the pause flag by hand.
    pub fn set_paused(&mut self, paused: bool) {
        if self.state.is_paused == paused {
            return;
        }
        self.state.is_paused = paused;
        tracing::debug!(paused, "pause state changed");
        self.observer.on_pause_changed(paused, &self.state);
        let kind = if paused {
            SessionEventKind::Paused { auto: false }
        } else {
            SessionEventKind::Resumed { auto: false }
        };
        self.record(Utc::now(), kind);
        self.observer.on_refresh(&self.state);
    }

    /// Timer-driven rate refresh.
    ///
    /// Returns the recomputed rate, or `None` while paused or outside a
    /// session, in which case the caller should stop rescheduling.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<f64> {
        if !self.state.is_mining || self.state.is_paused {
            return None;
        }
        Some(rpm::update_rpm(&mut self.state, now))
    }

    /// Changes the refinement window. Takes effect on the next recompute.
    pub const fn set_refinement_lookback_seconds(&mut self, seconds: i64) {
        self.state.refinement_lookback_seconds = seconds;
    }

    /// Changes the prospecting histogram bin width.
    pub const fn set_histogram_bin_size(&mut self, size: u32) {
        self.state.histogram_bin_size = size;
    }

    /// Whether mining activity clears the pause flag.
    pub const fn set_auto_unpause_on_event(&mut self, enabled: bool) {
        self.state.auto_unpause_on_event = enabled;
    }

    /// Splits the tracker into its state and observer.
    pub fn into_parts(self) -> (SessionState, O) {
        (self.state, self.observer)
    }

    fn start_session(&mut self, entry: &JournalEntry, shared: Option<&SharedState>) {
        let started_at = entry.timestamp_or_now();
        self.state.reset();
        self.state.is_mining = true;
        self.state.mining_start = Some(started_at);
        self.state.mining_end = None;
        self.state.mining_location = shared
            .and_then(location::detect_location)
            .or_else(|| entry.body.clone())
            .or_else(|| entry.system.clone());
        if let Some(system) = shared.and_then(location::detect_system) {
            self.state.current_system = Some(system);
        }

        tracing::info!(
            start = %started_at,
            location = ?self.state.mining_location,
            "mining session started (prospector launched)"
        );
        self.observer.on_session_start(&self.state);
        self.record(
            started_at,
            SessionEventKind::SessionStarted {
                reason: START_REASON_PROSPECTOR.to_string(),
            },
        );
    }

    fn end_session(&mut self, entry: &JournalEntry, shared: Option<&SharedState>) {
        let ended_at = entry.timestamp_or_now();
        self.record(
            ended_at,
            SessionEventKind::SessionStopped {
                reason: STOP_REASON_SUPERCRUISE.to_string(),
            },
        );
        self.state.is_mining = false;
        self.state.mining_end = Some(ended_at);
        if let Some(system) = shared.and_then(location::detect_system) {
            self.state.current_system = Some(system);
        }

        tracing::info!(
            end = %ended_at,
            prospected = self.state.prospected_count,
            "mining session ended (entered supercruise)"
        );
        self.observer.on_session_end(&self.state);
    }

    fn activity(&mut self, reason: &str, at: DateTime<Utc>) {
        if self.state.is_paused && self.state.auto_unpause_on_event {
            tracing::debug!(reason, "mining activity detected; resuming");
            self.state.is_paused = false;
            self.observer.on_pause_changed(false, &self.state);
            self.record(at, SessionEventKind::Resumed { auto: true });
        }
        self.observer.on_activity(reason, &self.state);
    }

    /// Reports a timeline entry. Nothing is recorded outside a session.
    fn record(&mut self, timestamp: DateTime<Utc>, kind: SessionEventKind) {
        if !self.state.is_mining {
            return;
        }
        let event = SessionEvent { timestamp, kind };
        self.observer.on_event(&event, &self.state);
    }
}
