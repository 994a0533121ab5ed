//! Core domain logic for mining analytics.
//!
//! This crate contains the fundamental types and logic for:
//! - Journal decoding: turning raw journal records into typed events
//! - Session tracking: the lifecycle controller and per-event accumulators
//! - Rates and statistics: refinements per minute, tons per hour, histograms
//! - Session timeline: timestamped events recorded while mining
//! - Market prices: the shared sell-price ledger

pub mod accumulate;
mod fingerprint;
pub mod journal;
pub mod location;
pub mod market;
pub mod rpm;
pub mod state;
pub mod stats;
pub mod summary;
pub mod timeline;
pub mod tracker;

pub use fingerprint::{PROPORTION_PRECISION, ProspectFingerprint};
pub use journal::{JournalEntry, JournalEvent};
pub use location::SharedState;
pub use market::{LookupTicket, MarketLedger, PriceEstimate, SellTotals};
pub use state::{ContentLevel, SessionState};
pub use summary::SessionSummary;
pub use timeline::{SessionEvent, SessionEventKind, SessionRecorder};
pub use tracker::{SessionObserver, SessionTracker};
