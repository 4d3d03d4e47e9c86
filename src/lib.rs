//! # rusty_fxhistory
//!
//! Builds and maintains a SQLite table of daily FX closes: one column per
//! currency, one row per date.
//!
//! Two modes share one reconciler:
//! - **bootstrap** fetches a multi-year window and replaces the table
//! - **incremental** reads the last stored date and appends only what is missing
//!
//! Downloads run in batches with exponential backoff; a batch that keeps
//! failing is reported as a warning instead of failing the run.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rusty_fxhistory::prelude::*;
//!
//! # fn main() -> rusty_fxhistory::Result<()> {
//! let settings = Settings::load(None)?;
//! let provider = YahooProvider::new(&settings.provider)?;
//! let mut ctx = RunContext::new("append");
//!
//! let report = jobs::append(&settings, &mut ctx, &provider, &SystemClock, &ThreadSleeper)?;
//! println!("{}", report.outcome);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod context;
pub mod currency;
pub mod data;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod metadata;
pub mod reconcile;
pub mod store;

pub use error::{FxError, Result};

pub mod prelude {
    //! Commonly used types and traits
    pub use crate::clock::{Clock, FixedClock, Sleeper, SystemClock, ThreadSleeper};
    pub use crate::config::Settings;
    pub use crate::context::RunContext;
    pub use crate::currency::{CurrencyCode, Instrument};
    pub use crate::data::{RateProvider, RetryPolicy, Series, SeriesFetcher};
    #[cfg(feature = "yahoo")]
    pub use crate::data::sources::YahooProvider;
    pub use crate::error::{FxError, MissingReason, PartialDataWarning, Result};
    pub use crate::jobs::{self, RunReport, StoreStatus};
    pub use crate::reconcile::{Reconciler, RunOutcome};
    pub use crate::store::{PersistedTable, SeriesStore, SqliteStore};
}
