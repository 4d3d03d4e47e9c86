//! Run configuration
//!
//! Settings come from an optional TOML file; every field has a default so an
//! empty file (or none at all) reproduces the stock setup:
//!
//! ```toml
//! database = "currency_data.db"
//! table = "currency_data_historical"
//! metadata = "currency.json"
//! log_dir = "logs"
//!
//! [bootstrap]
//! lookback_years = 3
//! batch_size = 10
//!
//! [append]
//! batch_size = 5
//!
//! [retry]
//! max_attempts = 5
//! base_delay_secs = 10.0
//! multiplier = 2.0
//! ```

use crate::currency::DEFAULT_TICKER_SUFFIX;
use crate::data::retry::RetryPolicy;
use crate::error::{FxError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "fxhistory.toml";

/// Longest bootstrap window accepted
pub const MAX_LOOKBACK_YEARS: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: PathBuf,
    pub table: String,
    pub metadata: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub ticker_suffix: String,
    pub bootstrap: BootstrapSettings,
    pub append: AppendSettings,
    pub retry: RetryPolicy,
    pub provider: ProviderSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapSettings {
    pub lookback_years: u32,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppendSettings {
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: PathBuf::from("currency_data.db"),
            table: "currency_data_historical".to_string(),
            metadata: PathBuf::from("currency.json"),
            log_dir: Some(PathBuf::from("logs")),
            ticker_suffix: DEFAULT_TICKER_SUFFIX.to_string(),
            bootstrap: BootstrapSettings::default(),
            append: AppendSettings::default(),
            retry: RetryPolicy::default(),
            provider: ProviderSettings::default(),
        }
    }
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            lookback_years: 3,
            batch_size: 10,
        }
    }
}

impl Default for AppendSettings {
    fn default() -> Self {
        Self { batch_size: 5 }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: "https://query2.finance.yahoo.com/v8/finance/chart".to_string(),
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
        }
    }
}

impl Settings {
    /// Load settings.
    ///
    /// An explicit path must exist and parse. Without one, `fxhistory.toml`
    /// in the working directory is used if present, else the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::from_file(fallback)?
                } else {
                    Self::default()
                }
            }
        };
        settings.validate()?;
        Ok(settings)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            FxError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
            .map_err(|e| FxError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse settings from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| FxError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        validate_table_name(&self.table)?;
        if self.bootstrap.batch_size == 0 || self.append.batch_size == 0 {
            return Err(FxError::Config("batch_size must be at least 1".to_string()));
        }
        if self.bootstrap.lookback_years == 0
            || self.bootstrap.lookback_years > MAX_LOOKBACK_YEARS
        {
            return Err(FxError::Config(format!(
                "bootstrap.lookback_years must be between 1 and {}, got {}",
                MAX_LOOKBACK_YEARS, self.bootstrap.lookback_years
            )));
        }
        if self.provider.timeout_secs == 0 {
            return Err(FxError::Config(
                "provider.timeout_secs must be at least 1".to_string(),
            ));
        }
        self.retry.validate()
    }
}

/// Table names end up in SQL text, so only plain identifiers are accepted
pub fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if !valid {
        return Err(FxError::Config(format!("Invalid table name: '{}'", name)));
    }
    Ok(())
}
