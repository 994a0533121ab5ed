//! Station market lookups for mined commodities.
//!
//! Provides:
//! - [`SpanshClient`]: searches Spansh for the best place to sell a commodity
//! - [`MarketSearchService`]: runs lookups in the background and fills the
//!   shared [`MarketLedger`](ma_core::MarketLedger)

mod service;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ma_core::PriceEstimate;
use ma_core::journal::parse_timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

pub use service::MarketSearchService;

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const SPANSH_API_URL: &str = "https://spansh.co.uk/api";
const DEFAULT_RESULT_SIZE: u32 = 10;
const MAX_RANGE_VALUE: u64 = 1_000_000_000;

const STATION_TYPES: [&str; 7] = [
    "Asteroid base",
    "Coriolis Starport",
    "Dodec Starport",
    "Mega ship",
    "Ocellus Starport",
    "Orbis Starport",
    "Space Construction Depot",
];
const SURFACE_TYPES: [&str; 6] = [
    "Dockable Planet Station",
    "Outpost",
    "Planetary Construction Depot",
    "Planetary Port",
    "Settlement",
    "Surface Settlement",
];
const CARRIER_TYPES: [&str; 1] = ["Drake-Class carrier"];

/// Market client errors.
#[derive(Debug, Error)]
pub enum MarketError {
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The search endpoint answered with a non-success status.
    #[error("market search returned status {status}")]
    Status { status: u16 },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// How search results are ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Highest sell price first, then nearest.
    #[default]
    BestPrice,
    Nearest,
}

impl SortMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BestPrice => "best_price",
            Self::Nearest => "nearest",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Search filters for price lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketPreferences {
    /// Require a large landing pad. `None` means no preference.
    pub has_large_pad: Option<bool>,
    pub min_demand: u64,
    /// Ignore markets not updated within this many days. Zero disables the filter.
    pub age_days: u32,
    /// Maximum distance from the reference system, in light years.
    pub distance_ly: Option<f64>,
    /// Maximum distance from the arrival star, in light seconds.
    pub distance_to_arrival_ls: Option<f64>,
    pub sort_mode: SortMode,
    pub include_carriers: bool,
    pub include_surface: bool,
}

impl Default for MarketPreferences {
    fn default() -> Self {
        Self {
            has_large_pad: None,
            min_demand: 1000,
            age_days: 30,
            distance_ly: Some(100.0),
            distance_to_arrival_ls: Some(5000.0),
            sort_mode: SortMode::BestPrice,
            include_carriers: true,
            include_surface: true,
        }
    }
}

/// Anything that can price a commodity near a reference system.
pub trait PriceSource: Send + Sync + 'static {
    /// Finds the best sell price, or `Ok(None)` when no station qualifies.
    fn best_price(
        &self,
        commodity: &str,
        reference_system: &str,
        prefs: &MarketPreferences,
    ) -> impl Future<Output = Result<Option<PriceEstimate>, MarketError>> + Send;
}

/// Spansh station search client.
///
/// # Thread Safety
///
/// The client is safe to clone and share across threads. Each clone shares
/// the underlying HTTP connection pool.
#[derive(Debug, Clone)]
pub struct SpanshClient {
    http: reqwest::Client,
    base_url: String,
}

impl SpanshClient {
    /// Creates a client for the public Spansh API.
    pub fn new() -> Result<Self, MarketError> {
        Self::with_base_url(SPANSH_API_URL)
    }

    /// Creates a client against a different API root.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, MarketError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(MarketError::ClientBuild)?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Searches for the best station to sell `commodity` near `reference_system`.
    pub async fn search_best_price(
        &self,
        commodity: &str,
        reference_system: &str,
        prefs: &MarketPreferences,
    ) -> Result<Option<PriceEstimate>, MarketError> {
        let commodity = commodity.trim();
        let reference_system = reference_system.trim();
        if commodity.is_empty() || reference_system.is_empty() {
            return Ok(None);
        }

        let url = format!("{}/stations/search", self.base_url);
        let payload = build_payload(commodity, reference_system, prefs);
        tracing::debug!(%url, %payload, "spansh market search request");

        let response = self.http.post(&url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MarketError::Status {
                status: status.as_u16(),
            });
        }
        let body = response.text().await?;
        let data: Value = serde_json::from_str(&body)
            .map_err(|err| MarketError::InvalidResponse(err.to_string()))?;

        if let Some(reference) = data.get("search_reference").and_then(Value::as_str) {
            tracing::debug!(
                url = %format!("https://spansh.co.uk/stations/search/{reference}/1"),
                "spansh market search reference"
            );
        }
        Ok(select_estimate(&data, commodity, prefs, Utc::now()))
    }
}

impl PriceSource for SpanshClient {
    fn best_price(
        &self,
        commodity: &str,
        reference_system: &str,
        prefs: &MarketPreferences,
    ) -> impl Future<Output = Result<Option<PriceEstimate>, MarketError>> + Send {
        self.search_best_price(commodity, reference_system, prefs)
    }
}

fn build_payload(commodity: &str, reference_system: &str, prefs: &MarketPreferences) -> Value {
    let mut station_types: Vec<&str> = STATION_TYPES.to_vec();
    if prefs.include_carriers {
        station_types.extend(CARRIER_TYPES);
    }
    if prefs.include_surface {
        station_types.extend(SURFACE_TYPES);
    }

    let mut filters = json!({
        "has_market": {"value": true},
        "type": {"value": station_types},
        "market": [{
            "name": commodity,
            "demand": {"comparison": "<=>", "value": [prefs.min_demand, MAX_RANGE_VALUE]},
        }],
    });
    if let Some(has_large_pad) = prefs.has_large_pad {
        filters["has_large_pad"] = json!({"value": has_large_pad});
    }
    if let Some(distance) = prefs.distance_ly {
        filters["distance"] = json!({"min": 0.0, "max": distance});
    }
    if let Some(distance) = prefs.distance_to_arrival_ls {
        filters["distance_to_arrival"] = json!({"comparison": "<=>", "value": [0, distance]});
    }
    if prefs.age_days > 0 {
        filters["market_updated_at"] = json!({
            "comparison": "<=>",
            "value": [format!("now-{}d", prefs.age_days), "now"],
        });
    }

    let sort = match prefs.sort_mode {
        SortMode::BestPrice => json!([
            {"market_sell_price": [{"name": commodity, "direction": "desc"}]},
            {"distance": {"direction": "asc"}},
        ]),
        SortMode::Nearest => json!([{"distance": {"direction": "asc"}}]),
    };

    json!({
        "filters": filters,
        "reference_system": reference_system,
        "sort": sort,
        "size": DEFAULT_RESULT_SIZE,
        "page": 0,
    })
}

/// Picks the first result that passes the local filters and lists a price.
///
/// Spansh already applies the filters server-side; arrival distance and
/// market age are checked again because stale or unknown values slip through.
fn select_estimate(
    data: &Value,
    commodity: &str,
    prefs: &MarketPreferences,
    now: DateTime<Utc>,
) -> Option<PriceEstimate> {
    let results = data.get("results")?.as_array()?;
    let cutoff = (prefs.age_days > 0)
        .then_some(prefs.age_days)
        .and_then(|days| chrono::Duration::try_days(i64::from(days)))
        .and_then(|age| now.checked_sub_signed(age));

    results
        .iter()
        .filter_map(Value::as_object)
        .filter(|station| within_arrival_distance(station, prefs.distance_to_arrival_ls))
        .filter(|station| {
            cutoff.is_none_or(|cutoff| {
                station
                    .get("market_updated_at")
                    .and_then(Value::as_str)
                    .and_then(parse_timestamp)
                    .is_some_and(|updated| updated >= cutoff)
            })
        })
        .find_map(|station| extract_estimate(station, commodity))
}

fn within_arrival_distance(station: &serde_json::Map<String, Value>, max: Option<f64>) -> bool {
    let (Some(max), Some(distance)) = (
        max,
        station.get("distance_to_arrival").and_then(Value::as_f64),
    ) else {
        return true;
    };
    distance <= max
}

fn extract_estimate(
    station: &serde_json::Map<String, Value>,
    commodity: &str,
) -> Option<PriceEstimate> {
    let target = commodity.to_lowercase();
    station
        .get("market")?
        .as_array()?
        .iter()
        .filter_map(Value::as_object)
        .find_map(|entry| {
            let name = entry.get("commodity").and_then(Value::as_str)?.trim();
            if name.to_lowercase() != target {
                return None;
            }
            let sell_price = entry.get("sell_price").and_then(Value::as_f64)?;
            let text = |key: &str| {
                station
                    .get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            Some(PriceEstimate {
                commodity: name.to_string(),
                sell_price,
                station_name: text("name"),
                system_name: text("system_name"),
                market_updated_at: station
                    .get("market_updated_at")
                    .and_then(Value::as_str)
                    .map(ToString::to_string),
                distance_ly: station.get("distance").and_then(Value::as_f64),
                distance_to_arrival: station.get("distance_to_arrival").and_then(Value::as_f64),
                demand: entry.get("demand").and_then(Value::as_f64),
                supply: entry.get("supply").and_then(Value::as_f64),
            })
        })
}
