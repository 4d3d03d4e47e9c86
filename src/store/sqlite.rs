//! Rate table storage with SQLite
//!
//! Layout for a table `T`:
//! - `T(date TEXT PRIMARY KEY, close_eur REAL, close_jpy REAL, ...)`
//! - `T__columns(position, column_key, code, ticker_suffix)` mapping columns to instruments
//!
//! Tables without the mapping companion (written by the older extraction
//! scripts) are still readable: their column names are decoded, and the
//! first append writes the mapping so later reads no longer depend on names.

use super::columns::{ColumnKey, ColumnMap};
use super::{PersistedTable, SeriesStore};
use crate::config::validate_table_name;
use crate::currency::{CurrencyCode, Instrument, DEFAULT_TICKER_SUFFIX};
use crate::data::series::Series;
use crate::error::{FxError, Result};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use std::path::Path;

const DATE_COLUMN: &str = "date";
const DATE_FORMAT: &str = "%Y-%m-%d";
/// Layout of the timestamp-typed date column in tables from the older scripts
const LEGACY_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// SQLite-backed [`SeriesStore`]
pub struct SqliteStore {
    conn: Connection,
    table: String,
    ticker_suffix: String,
}

fn store_err(context: &'static str) -> impl FnOnce(rusqlite::Error) -> FxError {
    move |e| FxError::Store(format!("{}: {}", context, e))
}

/// Quote an identifier for SQL text
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Dates are stored as `YYYY-MM-DD`; older tables may carry a time suffix
fn parse_stored_date(raw: &str) -> Result<NaiveDate> {
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| FxError::Store(format!("Malformed date '{}' in table: {}", raw, e)))
}

impl SqliteStore {
    /// Create or open database at path
    pub fn open(db_path: &Path, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        let conn = Connection::open(db_path).map_err(|e| {
            FxError::Store(format!("Failed to open database {}: {}", db_path.display(), e))
        })?;
        log::info!("Connected to {}", db_path.display());
        Ok(Self::with_connection(conn, table))
    }

    /// Create in-memory database (for testing)
    pub fn in_memory(table: &str) -> Result<Self> {
        validate_table_name(table)?;
        let conn = Connection::open_in_memory()
            .map_err(store_err("Failed to create in-memory database"))?;
        Ok(Self::with_connection(conn, table))
    }

    fn with_connection(conn: Connection, table: &str) -> Self {
        Self {
            conn,
            table: table.to_string(),
            ticker_suffix: DEFAULT_TICKER_SUFFIX.to_string(),
        }
    }

    /// Suffix assumed for instruments recovered from unmapped `close_<code>` columns
    pub fn with_ticker_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.ticker_suffix = suffix.into();
        self
    }

    /// Raw connection, for inspection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn mapping_table(&self) -> String {
        format!("{}__columns", self.table)
    }

    fn exists(conn: &Connection, name: &str) -> Result<bool> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![name],
                |row| row.get(0),
            )
            .map_err(store_err("Failed to inspect schema"))?;
        Ok(count > 0)
    }

    pub fn table_exists(&self) -> Result<bool> {
        Self::exists(&self.conn, &self.table)
    }

    /// Number of persisted rows (0 if the table does not exist)
    pub fn row_count(&self) -> Result<usize> {
        if !self.table_exists()? {
            return Ok(0);
        }
        let count: i64 = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", quote_ident(&self.table)),
                [],
                |row| row.get(0),
            )
            .map_err(store_err("Failed to count rows"))?;
        Ok(count as usize)
    }

    /// Latest persisted date, without loading the table
    pub fn last_date(&self) -> Result<Option<NaiveDate>> {
        if !self.table_exists()? {
            return Ok(None);
        }
        let date_col = self.date_column()?;
        let max: Option<String> = self
            .conn
            .query_row(
                &format!(
                    "SELECT MAX({}) FROM {}",
                    quote_ident(&date_col),
                    quote_ident(&self.table)
                ),
                [],
                |row| row.get(0),
            )
            .map_err(store_err("Failed to read last date"))?;
        max.as_deref().map(parse_stored_date).transpose()
    }

    /// Format of the dates already stored, so appended rows match them
    fn stored_date_format(&self, date_column: &str) -> Result<&'static str> {
        let sample: Option<String> = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE {} IS NOT NULL LIMIT 1",
                    quote_ident(date_column),
                    quote_ident(&self.table),
                    quote_ident(date_column)
                ),
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err("Failed to sample stored dates"))?;
        Ok(match sample {
            Some(raw) if raw.len() > 10 => LEGACY_DATE_FORMAT,
            _ => DATE_FORMAT,
        })
    }

    fn table_columns(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(&self.table)))
            .map_err(store_err("Failed to prepare schema query"))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(store_err("Failed to query schema"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(store_err("Failed to read schema"))?;
        Ok(names)
    }

    fn date_column(&self) -> Result<String> {
        self.table_columns()?
            .into_iter()
            .find(|c| c.eq_ignore_ascii_case(DATE_COLUMN))
            .ok_or_else(|| {
                FxError::Store(format!("Table '{}' has no date column", self.table))
            })
    }

    /// Resolve the price columns of the existing table.
    ///
    /// Returns the map and whether it came from the mapping table.
    fn load_columns(&self, table_columns: &[String]) -> Result<(ColumnMap, bool)> {
        let price_columns: Vec<&String> = table_columns
            .iter()
            .filter(|c| !c.eq_ignore_ascii_case(DATE_COLUMN))
            .collect();

        let mut map = ColumnMap::new();

        if Self::exists(&self.conn, &self.mapping_table())? {
            let mut stmt = self
                .conn
                .prepare(&format!(
                    "SELECT column_key, code, ticker_suffix FROM {} ORDER BY position",
                    quote_ident(&self.mapping_table())
                ))
                .map_err(store_err("Failed to prepare column mapping query"))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })
                .map_err(store_err("Failed to query column mapping"))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(store_err("Failed to read column mapping"))?;

            for (key, code, suffix) in rows {
                if !price_columns.iter().any(|c| **c == key) {
                    log::warn!("Mapped column '{}' missing from table, skipping", key);
                    continue;
                }
                let code = CurrencyCode::parse(&code).map_err(|e| {
                    FxError::Store(format!("Corrupt column mapping for '{}': {}", key, e))
                })?;
                map.insert(ColumnKey::raw(key), Instrument::new(code, suffix));
            }
            for column in price_columns {
                if map.instrument_for(column).is_none() {
                    log::warn!("Column '{}' has no mapping, skipping", column);
                }
            }
            return Ok((map, true));
        }

        for column in price_columns {
            match ColumnKey::decode(column) {
                Some(code) => {
                    let suffix = ColumnKey::legacy_suffix(column)
                        .unwrap_or_else(|| self.ticker_suffix.clone());
                    if !map.insert(ColumnKey::raw(column.as_str()), Instrument::new(code, suffix)) {
                        log::warn!("Duplicate currency column '{}', skipping", column);
                    }
                }
                None => log::warn!("Skipping unrecognized column '{}'", column),
            }
        }
        Ok((map, false))
    }

    fn write_mapping(tx: &Transaction<'_>, mapping_table: &str, columns: &ColumnMap) -> Result<()> {
        let mapping = quote_ident(mapping_table);
        tx.execute(&format!("DROP TABLE IF EXISTS {}", mapping), [])
            .map_err(store_err("Failed to drop column mapping"))?;
        tx.execute(
            &format!(
                "CREATE TABLE {} (
                    position INTEGER PRIMARY KEY,
                    column_key TEXT NOT NULL UNIQUE,
                    code TEXT NOT NULL UNIQUE,
                    ticker_suffix TEXT NOT NULL
                )",
                mapping
            ),
            [],
        )
        .map_err(store_err("Failed to create column mapping"))?;

        let mut stmt = tx
            .prepare(&format!(
                "INSERT INTO {} (position, column_key, code, ticker_suffix) VALUES (?1, ?2, ?3, ?4)",
                mapping
            ))
            .map_err(store_err("Failed to prepare column mapping insert"))?;
        for (position, entry) in columns.iter().enumerate() {
            stmt.execute(params![
                position as i64,
                entry.key.as_str(),
                entry.instrument.code.as_str(),
                entry.instrument.ticker_suffix,
            ])
            .map_err(store_err("Failed to insert column mapping"))?;
        }
        Ok(())
    }

    fn insert_rows(
        tx: &Transaction<'_>,
        table: &str,
        date_column: &str,
        date_format: &str,
        columns: &ColumnMap,
        series: &Series,
    ) -> Result<usize> {
        let mut names = vec![quote_ident(date_column)];
        names.extend(columns.iter().map(|e| quote_ident(e.key.as_str())));
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();

        let mut stmt = tx
            .prepare(&format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(table),
                names.join(", "),
                placeholders.join(", ")
            ))
            .map_err(store_err("Failed to prepare insert"))?;

        let positions: Vec<Option<usize>> = columns
            .iter()
            .map(|e| series.column_index(&e.instrument.code))
            .collect();

        let mut written = 0;
        for (date, row) in series.rows() {
            let mut values = Vec::with_capacity(names.len());
            values.push(Value::Text(date.format(date_format).to_string()));
            for pos in &positions {
                values.push(match pos.and_then(|p| row[p]) {
                    Some(close) => Value::Real(close),
                    None => Value::Null,
                });
            }
            stmt.execute(params_from_iter(values)).map_err(|e| {
                FxError::Store(format!("Failed to insert row for {}: {}", date, e))
            })?;
            written += 1;
        }
        Ok(written)
    }
}

impl SeriesStore for SqliteStore {
    fn table(&self) -> &str {
        &self.table
    }

    fn read(&self) -> Result<Option<PersistedTable>> {
        if !self.table_exists()? {
            return Ok(None);
        }

        let table_columns = self.table_columns()?;
        let date_col = table_columns
            .iter()
            .find(|c| c.eq_ignore_ascii_case(DATE_COLUMN))
            .cloned()
            .ok_or_else(|| FxError::Store(format!("Table '{}' has no date column", self.table)))?;
        let (columns, mapped) = self.load_columns(&table_columns)?;

        let mut select = vec![quote_ident(&date_col)];
        select.extend(columns.iter().map(|e| quote_ident(e.key.as_str())));

        let mut series = Series::with_instruments(columns.instruments());
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM {}",
                select.join(", "),
                quote_ident(&self.table)
            ))
            .map_err(store_err("Failed to prepare table read"))?;

        let width = columns.len();
        let rows = stmt
            .query_map([], |row| {
                let date: String = row.get(0)?;
                let mut values = Vec::with_capacity(width);
                for idx in 0..width {
                    values.push(row.get::<_, Option<f64>>(idx + 1)?);
                }
                Ok((date, values))
            })
            .map_err(store_err("Failed to read table"))?;

        let mut duplicates = 0;
        for row in rows {
            let (raw_date, values) = row.map_err(store_err("Failed to read row"))?;
            let date = parse_stored_date(&raw_date)?;
            if series.contains_date(date) {
                duplicates += 1;
                continue;
            }
            series.insert_row(date, values);
        }
        if duplicates > 0 {
            log::warn!(
                "Table '{}' holds {} duplicate dates; kept the first of each",
                self.table,
                duplicates
            );
        }

        log::info!(
            "Read {} rows, {} currency columns from '{}'{}",
            series.len(),
            columns.len(),
            self.table,
            if mapped { "" } else { " (unmapped column names)" }
        );

        Ok(Some(PersistedTable {
            table: self.table.clone(),
            columns,
            series,
        }))
    }

    fn replace(&mut self, series: &Series) -> Result<()> {
        let columns = ColumnMap::from_instruments(series.instruments());
        let table = quote_ident(&self.table);
        let mapping_table = self.mapping_table();

        let tx = self
            .conn
            .transaction()
            .map_err(store_err("Failed to begin transaction"))?;

        tx.execute(&format!("DROP TABLE IF EXISTS {}", table), [])
            .map_err(store_err("Failed to drop table"))?;

        let mut defs = vec![format!("{} TEXT PRIMARY KEY NOT NULL", quote_ident(DATE_COLUMN))];
        defs.extend(columns.iter().map(|e| format!("{} REAL", quote_ident(e.key.as_str()))));
        tx.execute(&format!("CREATE TABLE {} ({})", table, defs.join(", ")), [])
            .map_err(store_err("Failed to create table"))?;

        Self::write_mapping(&tx, &mapping_table, &columns)?;
        let written =
            Self::insert_rows(&tx, &self.table, DATE_COLUMN, DATE_FORMAT, &columns, series)?;

        tx.commit().map_err(store_err("Failed to commit replace"))?;
        log::info!(
            "Replaced table '{}' with {} rows, {} currency columns",
            self.table,
            written,
            columns.len()
        );
        Ok(())
    }

    fn append(&mut self, series: &Series) -> Result<usize> {
        if !self.table_exists()? {
            return Err(FxError::Store(format!(
                "Cannot append: table '{}' does not exist",
                self.table
            )));
        }

        let table_columns = self.table_columns()?;
        let date_col = table_columns
            .iter()
            .find(|c| c.eq_ignore_ascii_case(DATE_COLUMN))
            .cloned()
            .ok_or_else(|| FxError::Store(format!("Table '{}' has no date column", self.table)))?;
        let (columns, mapped) = self.load_columns(&table_columns)?;

        let unknown: Vec<&str> = series
            .instruments()
            .iter()
            .filter(|i| columns.key_for(&i.code).is_none())
            .map(|i| i.code.as_str())
            .collect();
        if !unknown.is_empty() {
            return Err(FxError::Store(format!(
                "Schema mismatch: table '{}' has no column for {}",
                self.table,
                unknown.join(", ")
            )));
        }

        let date_format = self.stored_date_format(&date_col)?;
        let mapping_table = self.mapping_table();
        let tx = self
            .conn
            .transaction()
            .map_err(store_err("Failed to begin transaction"))?;
        if !mapped {
            Self::write_mapping(&tx, &mapping_table, &columns)?;
        }
        let written = Self::insert_rows(&tx, &self.table, &date_col, date_format, &columns, series)?;
        tx.commit().map_err(store_err("Failed to commit append"))?;

        log::info!("Appended {} rows to '{}'", written, self.table);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, day).unwrap()
    }

    fn sample() -> Series {
        let eur = Instrument::fx("EUR").unwrap();
        let jpy = Instrument::fx("JPY").unwrap();
        let mut series = Series::with_instruments([eur, jpy]);
        series.insert_row(d(1), vec![Some(0.92), Some(151.0)]);
        series.insert_row(d(2), vec![Some(0.93), None]);
        series
    }

    #[test]
    fn test_missing_table_reads_none() {
        let store = SqliteStore::in_memory("rates").unwrap();
        assert!(store.read().unwrap().is_none());
        assert_eq!(store.row_count().unwrap(), 0);
        assert_eq!(store.last_date().unwrap(), None);
    }

    #[test]
    fn test_replace_then_read() {
        let mut store = SqliteStore::in_memory("rates").unwrap();
        store.replace(&sample()).unwrap();

        let table = store.read().unwrap().unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.last_date(), Some(d(2)));
        assert_eq!(table.series, sample());
        assert_eq!(store.last_date().unwrap(), Some(d(2)));
    }

    #[test]
    fn test_replace_overwrites() {
        let mut store = SqliteStore::in_memory("rates").unwrap();
        store.replace(&sample()).unwrap();

        let chf = Instrument::fx("CHF").unwrap();
        store
            .replace(&Series::from_closes(chf.clone(), [(d(9), 0.88)]))
            .unwrap();

        let table = store.read().unwrap().unwrap();
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.instruments(), vec![chf]);
    }

    #[test]
    fn test_append_adds_rows_and_nulls() {
        let mut store = SqliteStore::in_memory("rates").unwrap();
        store.replace(&sample()).unwrap();

        let eur = Instrument::fx("EUR").unwrap();
        let written = store
            .append(&Series::from_closes(eur.clone(), [(d(3), 0.94)]))
            .unwrap();
        assert_eq!(written, 1);

        let table = store.read().unwrap().unwrap();
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.series.get(d(3), &eur.code), Some(0.94));
        assert_eq!(
            table.series.get(d(3), &CurrencyCode::parse("JPY").unwrap()),
            None
        );
    }

    #[test]
    fn test_append_duplicate_date_fails() {
        let mut store = SqliteStore::in_memory("rates").unwrap();
        store.replace(&sample()).unwrap();

        let eur = Instrument::fx("EUR").unwrap();
        let err = store
            .append(&Series::from_closes(eur, [(d(2), 0.99)]))
            .unwrap_err();
        assert!(matches!(err, FxError::Store(_)));
        assert_eq!(store.row_count().unwrap(), 2);
    }

    #[test]
    fn test_append_unknown_instrument_is_schema_mismatch() {
        let mut store = SqliteStore::in_memory("rates").unwrap();
        store.replace(&sample()).unwrap();

        let gbp = Instrument::fx("GBP").unwrap();
        let err = store
            .append(&Series::from_closes(gbp, [(d(3), 0.79)]))
            .unwrap_err();
        assert!(err.to_string().contains("Schema mismatch"));
    }

    #[test]
    fn test_append_without_table_fails() {
        let mut store = SqliteStore::in_memory("rates").unwrap();
        let err = store.append(&sample()).unwrap_err();
        assert!(matches!(err, FxError::Store(_)));
    }

    #[test]
    fn test_reads_legacy_table() {
        let mut store = SqliteStore::in_memory("currency_data_historical").unwrap();
        store
            .connection()
            .execute_batch(
                r#"
                CREATE TABLE currency_data_historical (
                    "Date" TIMESTAMP,
                    "('Close', 'EUR=X')" REAL,
                    "('Open', 'EUR=X')" REAL,
                    "('Close', 'JPY=X')" REAL,
                    "garbage" TEXT
                );
                INSERT INTO currency_data_historical VALUES ('2024-04-01 00:00:00', 0.92, 0.91, 151.0, 'x');
                INSERT INTO currency_data_historical VALUES ('2024-04-02 00:00:00', 0.93, 0.92, 152.0, 'y');
                "#,
            )
            .unwrap();

        let table = store.read().unwrap().unwrap();
        let codes: Vec<String> = table
            .instruments()
            .iter()
            .map(|i| i.code.to_string())
            .collect();
        assert_eq!(codes, vec!["EUR", "JPY"]);
        assert_eq!(table.instruments()[0].ticker(), "EUR=X");
        assert_eq!(table.last_date(), Some(d(2)));

        // First append adopts the legacy columns into a mapping
        let eur = Instrument::fx("EUR").unwrap();
        store
            .append(&Series::from_closes(eur, [(d(3), 0.94)]))
            .unwrap();
        assert!(SqliteStore::exists(store.connection(), "currency_data_historical__columns").unwrap());

        // Appended dates follow the timestamp layout already in the column
        let stored: Vec<String> = store
            .connection()
            .prepare(r#"SELECT "Date" FROM currency_data_historical ORDER BY "Date""#)
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(stored[2], "2024-04-03 00:00:00");

        let table = store.read().unwrap().unwrap();
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.columns.len(), 2);
    }

    #[test]
    fn test_append_keeps_plain_date_format() {
        let mut store = SqliteStore::in_memory("rates").unwrap();
        store.replace(&sample()).unwrap();
        let eur = Instrument::fx("EUR").unwrap();
        store
            .append(&Series::from_closes(eur, [(d(3), 0.94)]))
            .unwrap();

        let last: String = store
            .connection()
            .query_row("SELECT MAX(date) FROM rates", [], |row| row.get(0))
            .unwrap();
        assert_eq!(last, "2024-04-03");
    }

    #[test]
    fn test_invalid_table_name_rejected() {
        assert!(matches!(
            SqliteStore::in_memory("bad name"),
            Err(FxError::Config(_))
        ));
    }
}
