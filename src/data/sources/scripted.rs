//! Scripted data source - testing stub
//!
//! Serves closes from an in-memory table, optionally preceded by a queue of
//! canned responses, and records every request it receives. Use it to drive
//! the fetcher and reconciler without network access.

use super::RateProvider;
use crate::currency::{CurrencyCode, Instrument};
use crate::data::series::Series;
use crate::error::{FxError, Result};
use chrono::NaiveDate;
use hashbrown::{HashMap, HashSet};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

/// One canned reply
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Answer from the closes table
    Table,
    /// Answer with no rows
    Empty,
    /// Fail with a transport error
    TransportError(String),
}

/// A request seen by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedRequest {
    pub codes: Vec<CurrencyCode>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Default)]
pub struct ScriptedProvider {
    closes: HashMap<CurrencyCode, BTreeMap<NaiveDate, f64>>,
    failing: HashSet<CurrencyCode>,
    script: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<ScriptedRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add closes for one currency
    pub fn with_closes(
        mut self,
        code: &str,
        closes: impl IntoIterator<Item = (NaiveDate, f64)>,
    ) -> Self {
        if let Ok(code) = CurrencyCode::parse(code) {
            self.closes.entry(code).or_default().extend(closes);
        }
        self
    }

    /// Every batch containing `code` fails with a transport error
    pub fn failing_for(mut self, code: &str) -> Self {
        if let Ok(code) = CurrencyCode::parse(code) {
            self.failing.insert(code);
        }
        self
    }

    /// Queue replies consumed one per call, before falling back to the table
    pub fn with_script(self, responses: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.extend(responses);
        }
        self
    }

    /// Number of `fetch_batch` calls so far
    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// All requests so far, in order
    pub fn requests(&self) -> Vec<ScriptedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn from_table(&self, instruments: &[Instrument], start: NaiveDate, end: NaiveDate) -> Series {
        let mut series = Series::new();
        for instrument in instruments {
            let Some(closes) = self.closes.get(&instrument.code) else {
                continue;
            };
            let window: Vec<(NaiveDate, f64)> =
                closes.range(start..=end).map(|(d, c)| (*d, *c)).collect();
            if !window.is_empty() {
                series.outer_join(Series::from_closes(instrument.clone(), window));
            }
        }
        series
    }
}

impl RateProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fetch_batch(
        &self,
        instruments: &[Instrument],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Series> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(ScriptedRequest {
                codes: instruments.iter().map(|i| i.code.clone()).collect(),
                start,
                end,
            });
        }

        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or(ScriptedResponse::Table);

        match next {
            ScriptedResponse::Empty => return Ok(Series::new()),
            ScriptedResponse::TransportError(msg) => return Err(FxError::Transport(msg)),
            ScriptedResponse::Table => {}
        }

        if let Some(bad) = instruments.iter().find(|i| self.failing.contains(&i.code)) {
            return Err(FxError::Transport(format!(
                "scripted failure for {}",
                bad.ticker()
            )));
        }

        Ok(self.from_table(instruments, start, end))
    }
}
