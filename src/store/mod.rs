//! Persistence of the canonical rate table

pub mod columns;
pub mod sqlite;

pub use columns::{ColumnEntry, ColumnKey, ColumnMap};
pub use sqlite::SqliteStore;

use crate::currency::Instrument;
use crate::data::series::Series;
use crate::error::Result;
use chrono::NaiveDate;

/// The persisted table as read back from the store
#[derive(Debug, Clone)]
pub struct PersistedTable {
    pub table: String,
    pub columns: ColumnMap,
    pub series: Series,
}

impl PersistedTable {
    /// Latest persisted date
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.series.last_date()
    }

    /// Instruments that already have a column
    pub fn instruments(&self) -> Vec<Instrument> {
        self.columns.instruments()
    }

    pub fn row_count(&self) -> usize {
        self.series.len()
    }
}

/// Storage for the canonical series
///
/// `replace` rewrites the table from scratch; `append` only adds rows and
/// never deduplicates, so callers must not hand it dates already stored.
pub trait SeriesStore {
    /// Name of the backing table
    fn table(&self) -> &str;

    /// Read the whole table, or `None` if it does not exist
    fn read(&self) -> Result<Option<PersistedTable>>;

    /// Drop and recreate the table from `series`
    fn replace(&mut self, series: &Series) -> Result<()>;

    /// Insert the rows of `series`, returning how many were written
    fn append(&mut self, series: &Series) -> Result<usize>;
}
