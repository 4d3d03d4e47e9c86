//! Market data sources
//!
//! - Yahoo Finance: free daily FX closes (`EUR=X` style tickers)
//! - Scripted: canned responses for tests and offline runs

#[cfg(feature = "yahoo")]
pub mod yahoo;
pub mod scripted;

#[cfg(feature = "yahoo")]
pub use yahoo::YahooProvider;
pub use scripted::ScriptedProvider;

use crate::currency::Instrument;
use crate::data::series::Series;
use crate::error::Result;
use chrono::NaiveDate;

/// A provider of daily close prices
///
/// One call covers a whole batch of instruments over an inclusive date
/// window. Instruments the provider has nothing for are simply absent from
/// the returned series; transient failures come back as
/// [`FxError::Transport`](crate::error::FxError::Transport) so the caller can retry.
pub trait RateProvider {
    /// Human-readable name of this provider
    fn name(&self) -> &str;

    /// Fetch closes for `instruments` between `start` and `end`, both inclusive
    fn fetch_batch(
        &self,
        instruments: &[Instrument],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Series>;
}
