//! Cached commodity sell prices.
//!
//! The ledger is the only piece of session data shared with background
//! threads. Every field sits behind one mutex so the "already attempted or
//! in flight?" check and the insert happen atomically.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::state::SessionState;
use crate::tracker::SessionObserver;

/// Best sell price found for a commodity near a reference system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEstimate {
    pub commodity: String,
    /// Credits per ton.
    pub sell_price: f64,
    pub station_name: String,
    pub system_name: String,
    pub market_updated_at: Option<String>,
    pub distance_ly: Option<f64>,
    pub distance_to_arrival: Option<f64>,
    pub demand: Option<f64>,
    pub supply: Option<f64>,
}

/// Estimated value of the session's cargo.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SellTotals {
    /// Credits per commodity, for commodities with a known price.
    pub per_commodity: BTreeMap<String, f64>,
    pub total: f64,
}

#[derive(Debug, Default)]
struct LedgerInner {
    /// Bumped by every `clear`; tickets from an older generation are stale.
    generation: u64,
    attempted: HashSet<String>,
    in_flight: HashSet<String>,
    prices: BTreeMap<String, PriceEstimate>,
}

/// Thread-safe price cache with per-commodity lookup bookkeeping.
#[derive(Debug, Default)]
pub struct MarketLedger {
    inner: Mutex<LedgerInner>,
}

impl MarketLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        // The guarded data stays consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims a lookup for `commodity`.
    ///
    /// Returns `None` when the key is blank, already in flight, or was
    /// attempted earlier this session.
    pub fn begin_lookup(self: &Arc<Self>, commodity: &str) -> Option<LookupTicket> {
        let key = normalize_key(commodity)?;
        let mut inner = self.lock();
        if inner.attempted.contains(&key) || inner.in_flight.contains(&key) {
            return None;
        }
        inner.in_flight.insert(key.clone());
        let generation = inner.generation;
        drop(inner);

        Some(LookupTicket {
            ledger: Arc::clone(self),
            key,
            generation,
            finished: false,
        })
    }

    /// Cached price for a commodity.
    pub fn price(&self, commodity: &str) -> Option<PriceEstimate> {
        let key = normalize_key(commodity)?;
        self.lock().prices.get(&key).cloned()
    }

    pub fn is_in_flight(&self, commodity: &str) -> bool {
        normalize_key(commodity).is_some_and(|key| self.lock().in_flight.contains(&key))
    }

    pub fn was_attempted(&self, commodity: &str) -> bool {
        normalize_key(commodity).is_some_and(|key| self.lock().attempted.contains(&key))
    }

    /// Values the given cargo at the cached prices.
    ///
    /// Commodities without a price are left out of both the breakdown and
    /// the grand total.
    #[allow(clippy::cast_precision_loss, reason = "cargo tonnage is small")]
    pub fn sell_totals(&self, cargo_totals: &BTreeMap<String, i64>) -> SellTotals {
        let inner = self.lock();
        let mut totals = SellTotals::default();
        for (commodity, tons) in cargo_totals {
            let Some(estimate) = inner.prices.get(commodity) else {
                continue;
            };
            let value = estimate.sell_price * *tons as f64;
            totals.total += value;
            totals.per_commodity.insert(commodity.clone(), value);
        }
        totals
    }

    /// Forgets every price and lookup. Lookups still running are discarded
    /// when they complete and never touch lookups claimed after the clear.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.generation = inner.generation.wrapping_add(1);
        inner.attempted.clear();
        inner.in_flight.clear();
        inner.prices.clear();
    }
}

/// Exclusive right to look up one commodity.
///
/// Dropping the ticket without completing it releases the key so a later
/// request can retry.
#[derive(Debug)]
pub struct LookupTicket {
    ledger: Arc<MarketLedger>,
    key: String,
    generation: u64,
    finished: bool,
}

impl LookupTicket {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Records the outcome of the lookup.
    ///
    /// The key moves from in flight to attempted whether or not a price was
    /// found. Returns `true` if a price was stored; a ledger cleared while
    /// the lookup ran ignores the result.
    pub fn complete(mut self, estimate: Option<PriceEstimate>) -> bool {
        self.finished = true;
        let mut inner = self.ledger.lock();
        if inner.generation != self.generation || !inner.in_flight.remove(&self.key) {
            return false;
        }
        inner.attempted.insert(self.key.clone());
        match estimate {
            Some(estimate) => {
                inner.prices.insert(self.key.clone(), estimate);
                true
            }
            None => false,
        }
    }
}

impl Drop for LookupTicket {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut inner = self.ledger.lock();
        if inner.generation == self.generation {
            inner.in_flight.remove(&self.key);
        }
    }
}

/// Prices are per session: a new session starts with an empty ledger.
impl SessionObserver for Arc<MarketLedger> {
    fn on_session_start(&mut self, _state: &SessionState) {
        self.clear();
        tracing::debug!("market ledger cleared for new session");
    }
}

fn normalize_key(commodity: &str) -> Option<String> {
    let key = commodity.trim().to_lowercase();
    (!key.is_empty()).then_some(key)
}
