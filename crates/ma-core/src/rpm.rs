//! Refinements-per-minute over a sliding window.
//!
//! The rate is an exact count of refinements inside the window, scaled to a
//! per-minute figure. It is not smoothed: with no new refinements it steps
//! down to zero as entries age out, driven by whoever calls [`update_rpm`].

use chrono::{DateTime, Duration, Utc};

use crate::state::SessionState;

/// Records a refinement and recomputes the rate at that instant.
pub fn register_refinement(state: &mut SessionState, timestamp: DateTime<Utc>) -> f64 {
    state.recent_refinements.push_back(timestamp);
    update_rpm(state, timestamp)
}

/// Evicts expired refinements and recomputes `current_rpm` and `max_rpm`.
///
/// Refinements are appended in time order, so eviction only ever inspects
/// the front of the queue. An entry expires once it is strictly older than
/// `now - window`.
#[allow(
    clippy::cast_precision_loss,
    reason = "window sizes and refinement counts are tiny"
)]
pub fn update_rpm(state: &mut SessionState, now: DateTime<Utc>) -> f64 {
    let window = state.refinement_lookback_seconds.max(1);
    // An unrepresentable cutoff means nothing can have expired yet.
    let cutoff = Duration::try_seconds(window).and_then(|span| now.checked_sub_signed(span));

    if let Some(cutoff) = cutoff {
        while state
            .recent_refinements
            .front()
            .is_some_and(|oldest| *oldest < cutoff)
        {
            state.recent_refinements.pop_front();
        }
    }

    let rpm = state.recent_refinements.len() as f64 * 60.0 / window as f64;
    state.current_rpm = rpm;
    if rpm > state.max_rpm {
        state.max_rpm = rpm;
    }
    rpm
}
