//! Configuration loading using Figment
//!
//! Configuration is loaded from:
//! 1. A TOML file (base configuration)
//! 2. Environment variables prefixed with `RASTER_SCAN_`, nested keys separated
//!    by `__` (e.g. `RASTER_SCAN_SCAN__SAMPLE_RATE=2e6`)
//!
//! # Example
//! ```no_run
//! use raster_scan::config::AppConfig;
//!
//! let config = AppConfig::load_from("config/scan.toml")?;
//! println!("Application: {}", config.application.name);
//! # Ok::<(), raster_scan::ScanError>(())
//! ```

use crate::decomb::{LagCorrection, DEFAULT_MAX_LAG_SECONDS};
use crate::error::{ScanError, ScanResult};
use crate::geometry::ScanParams;
use crate::trajectory::AffineMapper;
use crate::validation::{is_finite, is_not_empty, is_one_of};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "RASTER_SCAN_";

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["pretty", "compact", "json"];

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Fixed scan inputs
    #[serde(default)]
    pub scan: ScanParams,
    /// Bidirectional lag correction
    #[serde(default)]
    pub decomb: DecombConfig,
    /// Scan-space to device-space transform; identity when absent
    #[serde(default)]
    pub mapper: Option<AffineMapper>,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// Decomb settings, with lags in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecombConfig {
    /// Search for the lag instead of applying `shift_seconds`
    #[serde(default = "default_auto")]
    pub auto: bool,
    /// Largest lag searched when `auto` is set
    #[serde(default = "default_max_lag")]
    pub max_lag_seconds: f64,
    /// Lag applied when `auto` is not set
    #[serde(default)]
    pub shift_seconds: f64,
}

impl Default for DecombConfig {
    fn default() -> Self {
        Self {
            auto: default_auto(),
            max_lag_seconds: default_max_lag(),
            shift_seconds: 0.0,
        }
    }
}

impl DecombConfig {
    /// The correction these settings describe.
    pub fn correction(&self) -> LagCorrection {
        if self.auto {
            LagCorrection::Auto {
                max_lag_seconds: self.max_lag_seconds,
            }
        } else {
            LagCorrection::Fixed {
                seconds: self.shift_seconds,
            }
        }
    }
}

// Default value functions
fn default_name() -> String {
    "raster-scan".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_auto() -> bool {
    true
}

fn default_max_lag() -> f64 {
    DEFAULT_MAX_LAG_SECONDS
}

impl AppConfig {
    /// Load configuration from a TOML file and environment variables
    pub fn load_from<P: AsRef<Path>>(path: P) -> ScanResult<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(path.as_ref()))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    /// Extract and validate configuration from any figment
    pub fn from_figment(figment: Figment) -> ScanResult<Self> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> ScanResult<()> {
        let app = &self.application;
        is_not_empty(&app.name).map_err(|e| invalid("application.name", e))?;
        is_one_of(&app.log_level, LOG_LEVELS).map_err(|_| {
            ScanError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                app.log_level,
                LOG_LEVELS.join(", ")
            ))
        })?;
        is_one_of(&app.log_format, LOG_FORMATS).map_err(|_| {
            ScanError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                app.log_format,
                LOG_FORMATS.join(", ")
            ))
        })?;

        self.scan.validate()?;

        let decomb = &self.decomb;
        is_finite(decomb.max_lag_seconds).map_err(|e| invalid("decomb.max_lag_seconds", e))?;
        if decomb.max_lag_seconds < 0.0 {
            return Err(invalid("decomb.max_lag_seconds", "Value must not be negative"));
        }
        is_finite(decomb.shift_seconds).map_err(|e| invalid("decomb.shift_seconds", e))?;

        if let Some(mapper) = &self.mapper {
            let values = mapper.matrix.iter().flatten().chain(mapper.offset.iter());
            for &v in values {
                is_finite(v).map_err(|e| invalid("mapper", e))?;
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ScanError {
    ScanError::Configuration(format!("{field}: {reason}"))
}
