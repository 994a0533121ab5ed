//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use ma_core::SessionState;
use ma_core::state::{DEFAULT_HISTOGRAM_BIN_SIZE, DEFAULT_REFINEMENT_LOOKBACK_SECONDS};
use ma_market::MarketPreferences;
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the session history database.
    pub database_path: PathBuf,
    /// Directory holding `Journal.*.log` files.
    pub journal_dir: Option<PathBuf>,
    /// Sliding window for refinements per minute, in seconds.
    pub refinement_lookback_seconds: i64,
    /// Prospecting histogram bin width, in percent.
    pub histogram_bin_size: u32,
    /// Clear the pause flag when mining activity is seen.
    pub auto_unpause_on_event: bool,
    /// Price lookup filters.
    pub market: MarketPreferences,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("journal_dir", &self.journal_dir)
            .field(
                "refinement_lookback_seconds",
                &self.refinement_lookback_seconds,
            )
            .field("histogram_bin_size", &self.histogram_bin_size)
            .field("auto_unpause_on_event", &self.auto_unpause_on_event)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("sessions.db"),
            journal_dir: default_journal_dir(),
            refinement_lookback_seconds: DEFAULT_REFINEMENT_LOOKBACK_SECONDS,
            histogram_bin_size: DEFAULT_HISTOGRAM_BIN_SIZE,
            auto_unpause_on_event: true,
            market: MarketPreferences::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (MA_*, nested keys with `__`)
        figment = figment.merge(Env::prefixed("MA_").split("__"));

        figment.extract()
    }

    /// A fresh tracker state carrying the configured preferences.
    pub fn session_state(&self) -> SessionState {
        let mut state = SessionState::with_lookback(self.refinement_lookback_seconds);
        state.histogram_bin_size = self.histogram_bin_size;
        state.auto_unpause_on_event = self.auto_unpause_on_event;
        state
    }
}

/// Returns the platform-specific config directory for ma.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ma"))
}

/// Returns the platform-specific data directory for ma.
///
/// On Linux: `~/.local/share/ma`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("ma"))
}

/// Where the game writes its journals on Windows.
fn default_journal_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| {
        home.join("Saved Games")
            .join("Frontier Developments")
            .join("Elite Dangerous")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_data_path_ends_with_ma() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "ma");
    }

    #[test]
    fn test_default_config_uses_data_dir_for_db() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("sessions.db"));
        assert_eq!(config.refinement_lookback_seconds, 10);
        assert_eq!(config.histogram_bin_size, 10);
        assert!(config.auto_unpause_on_event);
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "refinement_lookback_seconds = 30\nauto_unpause_on_event = false\n\n[market]\nmin_demand = 0\nsort_mode = \"nearest\"\n",
        )
        .unwrap();

        let config = Config::load_from(Some(&path)).unwrap();
        assert_eq!(config.refinement_lookback_seconds, 30);
        assert!(!config.auto_unpause_on_event);
        assert_eq!(config.market.min_demand, 0);
        assert_eq!(config.market.sort_mode, ma_market::SortMode::Nearest);
        // Untouched market fields keep their defaults.
        assert_eq!(config.market.age_days, 30);
    }

    #[test]
    fn test_session_state_carries_preferences() {
        let config = Config {
            refinement_lookback_seconds: 45,
            histogram_bin_size: 5,
            auto_unpause_on_event: false,
            ..Config::default()
        };
        let state = config.session_state();
        assert_eq!(state.refinement_lookback_seconds, 45);
        assert_eq!(state.histogram_bin_size, 5);
        assert!(!state.auto_unpause_on_event);
        assert!(!state.is_mining);
    }
}
