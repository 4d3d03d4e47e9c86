//! Currency codes and the instruments quoted against them

use crate::error::{FxError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ticker suffix Yahoo Finance uses for USD-based FX quotes (`EUR=X`).
pub const DEFAULT_TICKER_SUFFIX: &str = "=X";

/// ISO 4217 style currency code: exactly three ASCII letters, stored uppercase
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Parse from a code, normalizing to uppercase
    pub fn parse(code: &str) -> Result<Self> {
        let trimmed = code.trim();
        if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(FxError::Parse(format!("Invalid currency code: '{}'", code)));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Get the code as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CurrencyCode {
    type Err = FxError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = FxError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A currency as requested from the market-data provider
///
/// Identity is the code alone; the suffix only shapes the provider ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub code: CurrencyCode,
    pub ticker_suffix: String,
}

impl Instrument {
    /// Create an instrument with an explicit ticker suffix
    pub fn new(code: CurrencyCode, ticker_suffix: impl Into<String>) -> Self {
        Self {
            code,
            ticker_suffix: ticker_suffix.into(),
        }
    }

    /// Create an instrument using the default `=X` suffix
    pub fn fx(code: &str) -> Result<Self> {
        Ok(Self::new(CurrencyCode::parse(code)?, DEFAULT_TICKER_SUFFIX))
    }

    /// Provider ticker, e.g. `EUR=X`
    pub fn ticker(&self) -> String {
        format!("{}{}", self.code, self.ticker_suffix)
    }
}

impl PartialEq for Instrument {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for Instrument {}

impl std::hash::Hash for Instrument {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.code.hash(state);
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ticker())
    }
}
