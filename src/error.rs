//! Error types for rusty-fxhistory

use crate::currency::CurrencyCode;
use std::fmt;
use thiserror::Error;

/// Main error type for rusty-fxhistory
#[derive(Error, Debug)]
pub enum FxError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No persisted data in table '{table}'; run the initial load first")]
    EmptyStore { table: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl FxError {
    /// Whether the failure is worth another attempt against the provider.
    pub fn is_transient(&self) -> bool {
        matches!(self, FxError::Transport(_))
    }
}

/// Result type alias for rusty-fxhistory operations
pub type Result<T> = std::result::Result<T, FxError>;

/// Why instruments went missing from a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingReason {
    /// Every attempt for the batch failed.
    BatchFailed { attempts: u32, last_error: String },
    /// The provider answered, but with no rows.
    EmptyResponse,
    /// The provider answered for the batch but left these instruments out.
    NoData,
}

/// Non-fatal: instruments omitted from a fetched series.
///
/// Collected on the [`RunContext`](crate::context::RunContext) and logged; never aborts a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialDataWarning {
    pub batch: usize,
    pub instruments: Vec<CurrencyCode>,
    pub reason: MissingReason,
}

impl fmt::Display for PartialDataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<&str> = self.instruments.iter().map(|c| c.as_str()).collect();
        match &self.reason {
            MissingReason::BatchFailed {
                attempts,
                last_error,
            } => write!(
                f,
                "batch {} [{}] skipped after {} attempts: {}",
                self.batch,
                codes.join(", "),
                attempts,
                last_error
            ),
            MissingReason::EmptyResponse => write!(
                f,
                "batch {} [{}] returned no rows",
                self.batch,
                codes.join(", ")
            ),
            MissingReason::NoData => write!(
                f,
                "batch {}: no data for [{}]",
                self.batch,
                codes.join(", ")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_is_transient() {
        assert!(FxError::Transport("timeout".into()).is_transient());
        assert!(!FxError::Store("locked".into()).is_transient());
        assert!(!FxError::Config("bad".into()).is_transient());
    }

    #[test]
    fn test_empty_store_message() {
        let err = FxError::EmptyStore {
            table: "currency_data_historical".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("currency_data_historical"));
        assert!(msg.contains("initial load"));
    }

    #[test]
    fn test_warning_display() {
        let warning = PartialDataWarning {
            batch: 2,
            instruments: vec![CurrencyCode::parse("EUR").unwrap(), CurrencyCode::parse("GBP").unwrap()],
            reason: MissingReason::BatchFailed {
                attempts: 5,
                last_error: "HTTP 503".to_string(),
            },
        };
        let msg = warning.to_string();
        assert!(msg.contains("batch 2"));
        assert!(msg.contains("EUR, GBP"));
        assert!(msg.contains("5 attempts"));
    }
}
