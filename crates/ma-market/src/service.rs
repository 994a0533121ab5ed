//! Background price lookups.
//!
//! A lookup is claimed on the caller's thread through the ledger, then the
//! network round trip runs on a tokio task. The tracker is never touched from
//! the task; results only land in the shared [`MarketLedger`].

use std::sync::Arc;

use ma_core::journal::commodity_display_name;
use ma_core::{MarketLedger, SessionState};
use tokio::task::JoinHandle;

use crate::{MarketPreferences, PriceSource};

/// Queues market searches and caches the prices they find.
#[derive(Debug)]
pub struct MarketSearchService<S> {
    source: Arc<S>,
    ledger: Arc<MarketLedger>,
    prefs: MarketPreferences,
}

impl<S: PriceSource> MarketSearchService<S> {
    pub fn new(source: S, ledger: Arc<MarketLedger>, prefs: MarketPreferences) -> Self {
        Self {
            source: Arc::new(source),
            ledger,
            prefs,
        }
    }

    pub fn ledger(&self) -> &Arc<MarketLedger> {
        &self.ledger
    }

    /// Starts a lookup for one commodity.
    ///
    /// Returns `None` without doing anything while the session is paused,
    /// when no reference system is known, or when the commodity was already
    /// looked up (or is being looked up). Must be called from within a tokio
    /// runtime. The task resolves to whether a price was stored.
    pub fn request_price(&self, commodity: &str, state: &SessionState) -> Option<JoinHandle<bool>> {
        if state.is_paused {
            return None;
        }
        let reference_system = state.current_system.clone()?;
        let ticket = self.ledger.begin_lookup(commodity)?;

        let source = Arc::clone(&self.source);
        let prefs = self.prefs.clone();
        Some(tokio::spawn(async move {
            let name = commodity_display_name(ticket.key());
            match source.best_price(&name, &reference_system, &prefs).await {
                Ok(estimate) => {
                    if let Some(estimate) = &estimate {
                        tracing::debug!(
                            commodity = %estimate.commodity,
                            station = %estimate.station_name,
                            system = %estimate.system_name,
                            sell_price = estimate.sell_price,
                            "market price found"
                        );
                    }
                    ticket.complete(estimate)
                }
                Err(err) => {
                    tracing::debug!(commodity = %name, error = %err, "market search failed");
                    ticket.complete(None)
                }
            }
        }))
    }

    /// Starts lookups for every commodity in the session's cargo.
    pub fn request_cargo_prices(&self, state: &SessionState) -> Vec<JoinHandle<bool>> {
        state
            .cargo_totals
            .keys()
            .filter_map(|commodity| self.request_price(commodity, state))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::Mutex;

    use ma_core::PriceEstimate;

    use super::*;
    use crate::MarketError;

    #[derive(Debug, Default)]
    struct FakeSource {
        calls: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl PriceSource for FakeSource {
        fn best_price(
            &self,
            commodity: &str,
            reference_system: &str,
            _prefs: &MarketPreferences,
        ) -> impl Future<Output = Result<Option<PriceEstimate>, MarketError>> + Send {
            self.calls
                .lock()
                .unwrap()
                .push((commodity.to_string(), reference_system.to_string()));
            let result = if self.fail {
                Err(MarketError::Status { status: 503 })
            } else {
                Ok(Some(PriceEstimate {
                    commodity: commodity.to_string(),
                    sell_price: 1000.0,
                    station_name: "Ray Gateway".to_string(),
                    system_name: reference_system.to_string(),
                    market_updated_at: None,
                    distance_ly: None,
                    distance_to_arrival: None,
                    demand: None,
                    supply: None,
                }))
            };
            async move { result }
        }
    }

    fn mining_state() -> SessionState {
        let mut state = SessionState::default();
        state.is_mining = true;
        state.current_system = Some("Borann".to_string());
        state.cargo_totals.insert("platinum".to_string(), 4);
        state
            .cargo_totals
            .insert("low_temperature_diamonds".to_string(), 2);
        state
    }

    fn service(fail: bool) -> MarketSearchService<FakeSource> {
        MarketSearchService::new(
            FakeSource {
                fail,
                ..FakeSource::default()
            },
            MarketLedger::new(),
            MarketPreferences::default(),
        )
    }

    #[tokio::test]
    async fn prices_cargo_and_values_it() {
        let service = service(false);
        let state = mining_state();

        let handles = service.request_cargo_prices(&state);
        assert_eq!(handles.len(), 2);
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let totals = service.ledger().sell_totals(&state.cargo_totals);
        assert!((totals.total - 6000.0).abs() < 1e-9);

        let calls = service.source.calls.lock().unwrap().clone();
        assert!(calls.contains(&("Low Temperature Diamonds".to_string(), "Borann".to_string())));
    }

    #[tokio::test]
    async fn repeated_request_is_refused() {
        let service = service(false);
        let state = mining_state();

        let first = service.request_price("platinum", &state).unwrap();
        assert!(service.request_price("Platinum", &state).is_none());
        assert!(first.await.unwrap());
        assert!(service.request_price("platinum", &state).is_none());
        assert_eq!(service.source.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn paused_or_unknown_system_is_refused() {
        let service = service(false);

        let mut state = mining_state();
        state.is_paused = true;
        assert!(service.request_price("platinum", &state).is_none());

        let mut state = mining_state();
        state.current_system = None;
        assert!(service.request_price("platinum", &state).is_none());

        assert!(!service.ledger().was_attempted("platinum"));
        assert!(service.source.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failures_are_swallowed_and_not_retried() {
        let service = service(true);
        let state = mining_state();

        let handle = service.request_price("platinum", &state).unwrap();
        assert!(!handle.await.unwrap());
        assert!(service.ledger().was_attempted("platinum"));
        assert_eq!(service.ledger().price("platinum"), None);
    }
}
