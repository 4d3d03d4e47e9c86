//! Job entry points: initial load, daily append, status and export
//!
//! Each job wires settings, a provider, a store and a [`RunContext`] into a
//! [`Reconciler`] run and reports what happened.

use crate::clock::{Clock, Sleeper};
use crate::config::Settings;
use crate::context::RunContext;
use crate::currency::Instrument;
use crate::data::sources::RateProvider;
use crate::error::{FxError, PartialDataWarning, Result};
use crate::metadata;
use crate::reconcile::{Reconciler, RunOutcome};
use crate::store::{SeriesStore, SqliteStore};
use chrono::NaiveDate;
use std::io::Write;
use std::path::PathBuf;
use uuid::Uuid;

/// Result of one job run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub job: String,
    pub outcome: RunOutcome,
    pub warnings: Vec<PartialDataWarning>,
}

impl RunReport {
    fn finish(ctx: &mut RunContext, outcome: RunOutcome) -> Self {
        let elapsed = chrono::Local::now() - ctx.started_at();
        log::info!(
            "Job '{}' ({}) completed in {:.1}s: {}",
            ctx.job(),
            ctx.run_id(),
            elapsed.num_milliseconds() as f64 / 1000.0,
            outcome
        );
        let warnings = ctx.take_warnings();
        if !warnings.is_empty() {
            log::warn!("{} batch(es) came back incomplete", warnings.len());
        }
        Self {
            run_id: ctx.run_id(),
            job: ctx.job().to_string(),
            outcome,
            warnings,
        }
    }

    /// True when every batch delivered data
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Snapshot of the persisted table
#[derive(Debug, Clone, PartialEq)]
pub struct StoreStatus {
    pub database: PathBuf,
    pub table: String,
    pub exists: bool,
    pub rows: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub instruments: Vec<Instrument>,
}

fn open_store(settings: &Settings) -> Result<SqliteStore> {
    Ok(SqliteStore::open(&settings.database, &settings.table)?
        .with_ticker_suffix(settings.ticker_suffix.clone()))
}

fn report(ctx: &mut RunContext, result: Result<RunOutcome>) -> Result<RunReport> {
    match result {
        Ok(outcome) => Ok(RunReport::finish(ctx, outcome)),
        Err(e) => {
            log::error!("Job '{}' ({}) failed: {}", ctx.job(), ctx.run_id(), e);
            Err(e)
        }
    }
}

fn bootstrap(
    settings: &Settings,
    ctx: &mut RunContext,
    provider: &dyn RateProvider,
    clock: &dyn Clock,
    sleeper: &dyn Sleeper,
) -> Result<RunOutcome> {
    let records = metadata::load_metadata(&settings.metadata, &settings.ticker_suffix)?;
    let instruments = metadata::instruments(&records);
    let mut store = open_store(settings)?;
    Reconciler::new(provider, &mut store, clock, sleeper, settings.retry.clone()).bootstrap(
        ctx,
        &instruments,
        settings.bootstrap.lookback_years,
        settings.bootstrap.batch_size,
    )
}

/// Bootstrap the table from the metadata instrument list
pub fn initial_load(
    settings: &Settings,
    ctx: &mut RunContext,
    provider: &dyn RateProvider,
    clock: &dyn Clock,
    sleeper: &dyn Sleeper,
) -> Result<RunReport> {
    log::info!("Starting initial load (run {})", ctx.run_id());
    let result = bootstrap(settings, ctx, provider, clock, sleeper);
    report(ctx, result)
}

/// Append the days missing since the last stored date
pub fn append(
    settings: &Settings,
    ctx: &mut RunContext,
    provider: &dyn RateProvider,
    clock: &dyn Clock,
    sleeper: &dyn Sleeper,
) -> Result<RunReport> {
    log::info!("Starting data append (run {})", ctx.run_id());
    let result = open_store(settings).and_then(|mut store| {
        Reconciler::new(provider, &mut store, clock, sleeper, settings.retry.clone())
            .incremental(ctx, settings.append.batch_size)
    });
    report(ctx, result)
}

/// Describe the persisted table without touching the provider
pub fn status(settings: &Settings) -> Result<StoreStatus> {
    let store = open_store(settings)?;
    let table = store.read()?;
    Ok(StoreStatus {
        database: settings.database.clone(),
        table: settings.table.clone(),
        exists: table.is_some(),
        rows: table.as_ref().map_or(0, |t| t.row_count()),
        first_date: table.as_ref().and_then(|t| t.series.first_date()),
        last_date: table.as_ref().and_then(|t| t.last_date()),
        instruments: table.map(|t| t.instruments()).unwrap_or_default(),
    })
}

/// Write the persisted table as CSV (`date,<CODE>...`), returning the row count.
///
/// Missing cells are written as empty fields.
pub fn export_csv<W: Write>(settings: &Settings, writer: W) -> Result<usize> {
    let store = open_store(settings)?;
    let table = store.read()?.ok_or_else(|| FxError::EmptyStore {
        table: settings.table.clone(),
    })?;

    let csv_err = |e: csv::Error| FxError::Io(e.into());
    let mut out = csv::Writer::from_writer(writer);

    let mut header = vec!["date".to_string()];
    header.extend(table.series.instruments().iter().map(|i| i.code.to_string()));
    out.write_record(&header).map_err(csv_err)?;

    let mut written = 0;
    for (date, row) in table.series.rows() {
        let mut record = Vec::with_capacity(row.len() + 1);
        record.push(date.format("%Y-%m-%d").to_string());
        record.extend(row.iter().map(|v| v.map(|c| c.to_string()).unwrap_or_default()));
        out.write_record(&record).map_err(csv_err)?;
        written += 1;
    }
    out.flush()?;

    log::info!("Exported {} rows from '{}'", written, table.table);
    Ok(written)
}
