//! Application configuration
//!
//! Loaded from a TOML file. Every section and field is optional and falls
//! back to the defaults below.
//!
//! ```toml
//! [pricing]
//! vat_rate = 0.15
//!
//! [pricing.default_percentages]
//! administrative = 5.0
//! operational = 5.0
//! profit = 15.0
//!
//! [storage]
//! data_dir = "/var/lib/boq-pricing"
//! io_timeout_ms = 5000
//! debounce_ms = 250
//! cache_ttl_secs = 300
//! cache_max_entries = 1000
//! deprecated_keys = ["pricing-cache"]
//! deprecated_prefixes = ["tmp:"]
//!
//! [retention]
//! keep_last = 10
//!
//! [logging]
//! level = "info"
//! format = "text"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::application::{EngineConfig, RetentionPolicy};
use crate::domain::DefaultPercentages;
use crate::infrastructure::storage::{CacheConfig, StorageConfig};
pub use crate::shared::ConfigError;

const APP_DIR: &str = "boq-pricing";

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AppConfig {
    #[validate(nested)]
    pub pricing: PricingSection,
    #[validate(nested)]
    pub storage: StorageSection,
    pub retention: RetentionSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PricingSection {
    /// Fraction, `0.15` for 15 %
    #[validate(range(min = 0.0, max = 1.0))]
    pub vat_rate: f64,
    #[validate(custom(function = "validate_percentages"))]
    pub default_percentages: DefaultPercentages,
}

impl Default for PricingSection {
    fn default() -> Self {
        Self {
            vat_rate: 0.15,
            default_percentages: DefaultPercentages::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StorageSection {
    /// Defaults to the platform data directory
    pub data_dir: Option<PathBuf>,
    #[validate(range(min = 1))]
    pub io_timeout_ms: u64,
    pub debounce_ms: u64,
    /// `0` disables expiry
    pub cache_ttl_secs: u64,
    #[validate(range(min = 1))]
    pub cache_max_entries: usize,
    pub deprecated_keys: Vec<String>,
    pub deprecated_prefixes: Vec<String>,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: None,
            io_timeout_ms: 5_000,
            debounce_ms: 250,
            cache_ttl_secs: 300,
            cache_max_entries: 1_000,
            deprecated_keys: Vec::new(),
            deprecated_prefixes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSection {
    /// Absent keeps every version
    pub keep_last: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    /// `text` or `json`
    pub format: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

fn validate_percentages(p: &DefaultPercentages) -> Result<(), ValidationError> {
    let values = [p.administrative, p.operational, p.profit];
    if values.iter().all(|v| v.is_finite() && *v >= 0.0) {
        Ok(())
    } else {
        Err(ValidationError::new("percentages_non_negative"))
    }
}

impl AppConfig {
    /// Read and validate `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the config, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            vat_rate: self.pricing.vat_rate,
            default_percentages: self.pricing.default_percentages,
        }
    }

    pub fn storage_config(&self) -> StorageConfig {
        let s = &self.storage;
        StorageConfig {
            io_timeout: Duration::from_millis(s.io_timeout_ms),
            debounce: Duration::from_millis(s.debounce_ms),
            cache: CacheConfig {
                ttl: (s.cache_ttl_secs > 0).then(|| Duration::from_secs(s.cache_ttl_secs)),
                max_entries: s.cache_max_entries,
            },
            deprecated_keys: s.deprecated_keys.clone(),
            deprecated_prefixes: s.deprecated_prefixes.clone(),
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            keep_last: self.retention.keep_last,
        }
    }

    /// Where the file adapter keeps its records
    pub fn data_dir(&self) -> PathBuf {
        self.storage.data_dir.clone().unwrap_or_else(default_data_dir)
    }
}

/// `~/.config/boq-pricing/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.toml")
}

pub fn default_data_dir() -> PathBuf {
    dirs_next::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("store")
}
