//! Currency metadata loading
//!
//! The metadata file is a JSON object keyed by currency code; each value
//! holds display attributes that are carried along but not interpreted.
//!
//! ```json
//! {
//!   "EUR": { "name": "Euro", "symbol": "€" },
//!   "JPY": { "name": "Japanese Yen", "symbol": "¥" }
//! }
//! ```

use crate::currency::{CurrencyCode, Instrument};
use crate::error::{FxError, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// One row of the normalized metadata table
#[derive(Debug, Clone)]
pub struct InstrumentRecord {
    pub instrument: Instrument,
    pub attributes: Map<String, Value>,
}

impl InstrumentRecord {
    /// Display name from the `name` attribute, falling back to the code
    pub fn display_name(&self) -> &str {
        self.attributes
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_else(|| self.instrument.code.as_str())
    }
}

/// Load instrument records from a metadata file, ordered by code
pub fn load_metadata(path: &Path, ticker_suffix: &str) -> Result<Vec<InstrumentRecord>> {
    let contents = fs::read_to_string(path).map_err(|e| {
        FxError::Config(format!(
            "Failed to read metadata file {}: {}",
            path.display(),
            e
        ))
    })?;

    let records = parse_metadata(&contents, ticker_suffix)
        .map_err(|e| FxError::Config(format!("{}: {}", path.display(), e)))?;

    log::info!(
        "Loaded {} instruments from {}",
        records.len(),
        path.display()
    );
    Ok(records)
}

/// Parse metadata JSON text
pub fn parse_metadata(contents: &str, ticker_suffix: &str) -> Result<Vec<InstrumentRecord>> {
    let root: Value = serde_json::from_str(contents)
        .map_err(|e| FxError::Config(format!("Malformed metadata JSON: {}", e)))?;

    let Value::Object(entries) = root else {
        return Err(FxError::Config(
            "Metadata must be a JSON object keyed by currency code".to_string(),
        ));
    };

    let mut records = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        let code = CurrencyCode::parse(&key)
            .map_err(|e| FxError::Config(format!("Bad metadata key: {}", e)))?;

        let attributes = match value {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };

        records.push(InstrumentRecord {
            instrument: Instrument::new(code, ticker_suffix),
            attributes,
        });
    }

    if records.is_empty() {
        return Err(FxError::Config("Metadata lists no instruments".to_string()));
    }

    // serde_json's map is already key-ordered, but lowercase keys sort differently
    records.sort_by(|a, b| a.instrument.code.cmp(&b.instrument.code));
    records.dedup_by(|a, b| a.instrument.code == b.instrument.code);

    Ok(records)
}

/// Convenience: just the instruments, in metadata order
pub fn instruments(records: &[InstrumentRecord]) -> Vec<Instrument> {
    records.iter().map(|r| r.instrument.clone()).collect()
}
