//! Series reconciliation: bootstrap and incremental modes
//!
//! Bootstrap fetches a full lookback window and replaces the stored table.
//! Incremental reads the stored table, works out which days are missing,
//! fetches only those and appends them:
//!
//! ```text
//! START -> CHECK_STALENESS -> UP_TO_DATE
//!                          -> FETCH -> NO_DATA
//!                                   -> GAP_FILL -> PERSIST
//! ```
//!
//! Every terminal state is a success; only store or configuration failures
//! surface as errors.

use crate::clock::{Clock, Sleeper};
use crate::context::RunContext;
use crate::currency::Instrument;
use crate::data::fetcher::SeriesFetcher;
use crate::data::retry::RetryPolicy;
use crate::data::series::{GapFillReport, Series};
use crate::data::sources::RateProvider;
use crate::error::{FxError, Result};
use crate::store::SeriesStore;
use chrono::{Duration, NaiveDate};
use std::fmt;

/// How a reconciliation run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Bootstrap wrote a fresh table
    Replaced {
        rows: usize,
        instruments: usize,
        start: NaiveDate,
        end: NaiveDate,
    },
    /// Incremental run appended new rows
    Appended {
        rows: usize,
        start: NaiveDate,
        end: NaiveDate,
    },
    /// Stored data already reaches today; nothing fetched or written
    UpToDate { last_date: NaiveDate },
    /// The provider had nothing for the window; nothing written
    NoNewData { start: NaiveDate, end: NaiveDate },
}

impl RunOutcome {
    /// Rows written to the store
    pub fn rows_written(&self) -> usize {
        match self {
            RunOutcome::Replaced { rows, .. } | RunOutcome::Appended { rows, .. } => *rows,
            RunOutcome::UpToDate { .. } | RunOutcome::NoNewData { .. } => 0,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Replaced {
                rows,
                instruments,
                start,
                end,
            } => write!(
                f,
                "replaced table with {} rows x {} currencies ({} to {})",
                rows, instruments, start, end
            ),
            RunOutcome::Appended { rows, start, end } => {
                write!(f, "appended {} rows ({} to {})", rows, start, end)
            }
            RunOutcome::UpToDate { last_date } => {
                write!(f, "already up to date (last date {})", last_date)
            }
            RunOutcome::NoNewData { start, end } => {
                write!(f, "no new data between {} and {}", start, end)
            }
        }
    }
}

/// Days to fetch after `last_date`, or `None` if the store already covers today
pub fn missing_range(last_date: NaiveDate, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    if last_date >= today {
        return None;
    }
    let start = last_date.succ_opt()?;
    Some((start, today))
}

/// Start of a lookback window of `years` years ending `today`
pub fn lookback_start(today: NaiveDate, years: u32) -> Result<NaiveDate> {
    today
        .checked_sub_signed(Duration::days(365 * i64::from(years)))
        .ok_or_else(|| {
            FxError::Config(format!(
                "Lookback of {} years from {} is out of the supported date range",
                years, today
            ))
        })
}

pub struct Reconciler<'a> {
    provider: &'a dyn RateProvider,
    store: &'a mut dyn SeriesStore,
    clock: &'a dyn Clock,
    sleeper: &'a dyn Sleeper,
    retry: RetryPolicy,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        provider: &'a dyn RateProvider,
        store: &'a mut dyn SeriesStore,
        clock: &'a dyn Clock,
        sleeper: &'a dyn Sleeper,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            store,
            clock,
            sleeper,
            retry,
        }
    }

    fn fetch(
        &self,
        ctx: &mut RunContext,
        instruments: &[Instrument],
        start: NaiveDate,
        end: NaiveDate,
        batch_size: usize,
    ) -> Result<Series> {
        SeriesFetcher::new(self.provider, &self.retry, self.sleeper)
            .fetch(ctx, instruments, start, end, batch_size)
    }

    fn gap_fill(series: &mut Series) -> GapFillReport {
        let report = series.gap_fill();
        log::info!(
            "Gap-fill: {} missing cells before, {} after",
            report.missing_before,
            report.missing_after
        );
        for instrument in series.empty_instruments() {
            log::warn!("{} has no values in the fetched window", instrument.ticker());
        }
        report
    }

    /// Fetch the full lookback window and replace the stored table.
    ///
    /// An empty fetch leaves the store untouched.
    pub fn bootstrap(
        &mut self,
        ctx: &mut RunContext,
        instruments: &[Instrument],
        lookback_years: u32,
        batch_size: usize,
    ) -> Result<RunOutcome> {
        if instruments.is_empty() {
            return Err(FxError::Config("No instruments to bootstrap".to_string()));
        }

        let end = self.clock.today();
        let start = lookback_start(end, lookback_years)?;
        log::info!(
            "Bootstrap: {} instruments, {} to {}",
            instruments.len(),
            start,
            end
        );

        let mut series = self.fetch(ctx, instruments, start, end, batch_size)?;
        if series.is_empty() {
            log::warn!("Bootstrap fetched no data; leaving the store untouched");
            return Ok(RunOutcome::NoNewData { start, end });
        }

        Self::gap_fill(&mut series);
        self.store.replace(&series)?;

        Ok(RunOutcome::Replaced {
            rows: series.len(),
            instruments: series.width(),
            start,
            end,
        })
    }

    /// Fetch the days after the last stored date and append them.
    pub fn incremental(&mut self, ctx: &mut RunContext, batch_size: usize) -> Result<RunOutcome> {
        let table = self.store.read()?.ok_or_else(|| FxError::EmptyStore {
            table: self.store.table().to_string(),
        })?;

        let Some(last_date) = table.last_date() else {
            return Err(FxError::EmptyStore { table: table.table });
        };
        let instruments = table.instruments();
        log::info!(
            "Last date in store: {} ({} currencies)",
            last_date,
            instruments.len()
        );
        if instruments.is_empty() {
            return Err(FxError::Store(format!(
                "Table '{}' has no recognizable currency columns",
                table.table
            )));
        }

        let today = self.clock.today();
        let Some((start, end)) = missing_range(last_date, today) else {
            log::info!("Store is up to date, no new data needed");
            return Ok(RunOutcome::UpToDate { last_date });
        };

        log::info!("Fetching missing data from {} to {}", start, end);
        let mut series = self.fetch(ctx, &instruments, start, end, batch_size)?;
        if series.is_empty() {
            log::warn!("No new data was retrieved");
            return Ok(RunOutcome::NoNewData { start, end });
        }

        let overlap = series.retain_after(last_date);
        if overlap > 0 {
            log::warn!("Dropped {} fetched rows already in the store", overlap);
        }
        if series.is_empty() {
            return Ok(RunOutcome::NoNewData { start, end });
        }

        Self::gap_fill(&mut series);
        let rows = self.store.append(&series)?;

        Ok(RunOutcome::Appended {
            rows,
            start: series.first_date().unwrap_or(start),
            end: series.last_date().unwrap_or(end),
        })
    }
}
