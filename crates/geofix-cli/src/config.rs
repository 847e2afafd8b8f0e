//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use geofix_core::dataset::LOCATE_WINDOW_SECONDS;
use geofix_core::locator::LocatorAlgorithm;
use geofix_core::source::AcceptBounds;
use geofix_core::stats::StatsThresholds;
use geofix_core::trace::SplitThresholds;
use serde::{Deserialize, Serialize};

/// Application configuration.
///
/// Every field doubles as a default that individual command flags may
/// override for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Keep only events inside this time range, e.g. `2013-01-13..2013-01-20`.
    pub time_range: Option<String>,

    /// Keep only GPS fixes inside this area filter.
    pub location: Option<String>,

    /// Merge every device into one dataset.
    pub combine_all: bool,

    /// Start-time bounds a capture must satisfy to be used at all.
    pub accept: AcceptBounds,

    /// Fix-assignment defaults.
    pub locator: LocatorConfig,

    /// Trace split thresholds.
    pub trace: SplitThresholds,

    /// Histogram diversity gates.
    pub stats: StatsThresholds,
}

/// Defaults for the locating subcommands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// `before`, `after`, `closest`, or `interpolate`.
    pub algorithm: String,

    /// Largest usable gap between an event and a fix, in seconds. Zero or
    /// less means unlimited.
    pub window_seconds: f64,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            algorithm: LocatorAlgorithm::default().as_str().to_string(),
            window_seconds: LOCATE_WINDOW_SECONDS,
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

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

        // Load from environment variables (GEOFIX_*)
        figment = figment.merge(Env::prefixed("GEOFIX_"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for geofix.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("geofix"))
}
