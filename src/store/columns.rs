//! Instrument ↔ column identity
//!
//! New tables name price columns `close_<code>` and record the mapping in a
//! companion table, so identity is looked up rather than parsed. Decoding a
//! column name is only needed for tables written before the mapping existed,
//! whose columns look like `('Close', 'EUR=X')`.

use crate::currency::{CurrencyCode, Instrument};
use hashbrown::HashMap;
use std::fmt;

/// Name of a price column in the persisted table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnKey(String);

impl ColumnKey {
    /// Column key for a currency: `close_eur`
    pub fn for_code(code: &CurrencyCode) -> Self {
        Self(format!("close_{}", code.as_str().to_ascii_lowercase()))
    }

    /// Wrap an existing column name as-is
    pub fn raw(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover the currency code from a column name.
    ///
    /// Accepts `close_<code>` and the tuple form `('Close', '<CODE>=X')`.
    /// Anything else, including other tuple fields such as `'Open'`, is `None`.
    pub fn decode(name: &str) -> Option<CurrencyCode> {
        let name = name.trim();
        if let Some(code) = name.strip_prefix("close_") {
            return parse_exact(code);
        }

        let inner = name.strip_prefix('(')?.strip_suffix(')')?;
        let mut parts = inner
            .split(',')
            .map(|p| p.trim().trim_matches(|c| c == '\'' || c == '"'));
        let field = parts.next()?;
        let ticker = parts.next()?;
        if field != "Close" || parts.next().is_some() {
            return None;
        }
        parse_exact(ticker.split('=').next()?)
    }

    /// Ticker suffix carried by a tuple-form name (`=X` for `('Close', 'EUR=X')`)
    pub fn legacy_suffix(name: &str) -> Option<String> {
        let ticker = name.trim().trim_end_matches(')').rsplit(',').next()?;
        let ticker = ticker.trim().trim_matches(|c| c == '\'' || c == '"');
        ticker.find('=').map(|idx| ticker[idx..].to_string())
    }
}

fn parse_exact(code: &str) -> Option<CurrencyCode> {
    if code.len() != 3 {
        return None;
    }
    CurrencyCode::parse(code).ok()
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One mapped price column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnEntry {
    pub key: ColumnKey,
    pub instrument: Instrument,
}

/// Ordered mapping between price columns and instruments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMap {
    entries: Vec<ColumnEntry>,
    by_code: HashMap<CurrencyCode, usize>,
}

impl ColumnMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard mapping for a list of instruments
    pub fn from_instruments(instruments: &[Instrument]) -> Self {
        let mut map = Self::new();
        for instrument in instruments {
            map.insert(ColumnKey::for_code(&instrument.code), instrument.clone());
        }
        map
    }

    /// Add an entry. Returns false (and changes nothing) if the code is already mapped.
    pub fn insert(&mut self, key: ColumnKey, instrument: Instrument) -> bool {
        if self.by_code.contains_key(&instrument.code) {
            return false;
        }
        self.by_code.insert(instrument.code.clone(), self.entries.len());
        self.entries.push(ColumnEntry { key, instrument });
        true
    }

    pub fn key_for(&self, code: &CurrencyCode) -> Option<&ColumnKey> {
        self.by_code.get(code).map(|&idx| &self.entries[idx].key)
    }

    pub fn instrument_for(&self, key: &str) -> Option<&Instrument> {
        self.entries
            .iter()
            .find(|e| e.key.as_str() == key)
            .map(|e| &e.instrument)
    }

    pub fn instruments(&self) -> Vec<Instrument> {
        self.entries.iter().map(|e| e.instrument.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_round_trip() {
        for code in ["EUR", "JPY", "GBP", "CHF", "ZAR"] {
            let code = CurrencyCode::parse(code).unwrap();
            let key = ColumnKey::for_code(&code);
            assert_eq!(ColumnKey::decode(key.as_str()), Some(code));
        }
    }

    #[test]
    fn test_decode_legacy_tuple() {
        assert_eq!(
            ColumnKey::decode("('Close', 'EUR=X')").map(|c| c.to_string()),
            Some("EUR".to_string())
        );
        assert_eq!(
            ColumnKey::decode("(\"Close\", \"JPY=X\")").map(|c| c.to_string()),
            Some("JPY".to_string())
        );
        assert_eq!(
            ColumnKey::legacy_suffix("('Close', 'EUR=X')"),
            Some("=X".to_string())
        );
    }

    #[test]
    fn test_decode_skips_unrelated_columns() {
        assert_eq!(ColumnKey::decode("('Open', 'EUR=X')"), None);
        assert_eq!(ColumnKey::decode("('Close', 'EURUSD=X')"), None);
        assert_eq!(ColumnKey::decode("Date"), None);
        assert_eq!(ColumnKey::decode("close_euro"), None);
        assert_eq!(ColumnKey::decode("index"), None);
    }

    #[test]
    fn test_column_map() {
        let eur = Instrument::fx("EUR").unwrap();
        let jpy = Instrument::fx("JPY").unwrap();
        let mut map = ColumnMap::from_instruments(&[eur.clone(), jpy.clone()]);

        assert_eq!(map.len(), 2);
        assert_eq!(map.key_for(&eur.code).map(|k| k.as_str()), Some("close_eur"));
        assert_eq!(map.instrument_for("close_jpy"), Some(&jpy));
        assert!(!map.insert(ColumnKey::raw("other"), eur));
        assert_eq!(map.instruments(), vec![Instrument::fx("EUR").unwrap(), jpy]);
    }
}
