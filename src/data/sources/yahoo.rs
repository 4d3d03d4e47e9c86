//! Yahoo Finance data source integration
//!
//! Fetches daily FX closes from the v8 chart API, one request per ticker.
//! Yahoo has no official API; format changes surface as transport errors so
//! the batch gets retried and, failing that, skipped.

use super::RateProvider;
use crate::config::ProviderSettings;
use crate::currency::Instrument;
use crate::data::series::Series;
use crate::error::{FxError, Result};
use chrono::NaiveDate;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    close: Option<Vec<Option<f64>>>,
}

/// Yahoo Finance data source (no API key required)
pub struct YahooProvider {
    client: Client,
    base_url: String,
}

impl YahooProvider {
    /// Create a new Yahoo Finance data source
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(|e| FxError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn chart_url(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> String {
        let period1 = start.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
        let period2 = end
            .succ_opt()
            .unwrap_or(end)
            .and_time(chrono::NaiveTime::MIN)
            .and_utc()
            .timestamp();
        format!(
            "{}/{}?period1={}&period2={}&interval=1d&events=history",
            self.base_url, ticker, period1, period2
        )
    }

    /// Fetch one ticker. `Ok(None)` means Yahoo has nothing for it.
    fn fetch_ticker(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<Vec<(NaiveDate, f64)>>> {
        let url = self.chart_url(ticker, start, end);
        log::debug!("GET {}", url);

        let response = self.client.get(&url).send().map_err(|e| {
            FxError::Transport(format!("HTTP request for {} failed: {}", ticker, e))
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(FxError::Transport(format!(
                "Yahoo Finance returned {} for {}",
                status, ticker
            )));
        }

        let body = response.text().map_err(|e| {
            FxError::Transport(format!("Failed to read response for {}: {}", ticker, e))
        })?;

        parse_chart(ticker, &body, start, end)
    }
}

/// Parse a chart API body into (date, close) pairs within `[start, end]`
fn parse_chart(
    ticker: &str,
    body: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Option<Vec<(NaiveDate, f64)>>> {
    let chart: ChartResponse = serde_json::from_str(body).map_err(|e| {
        FxError::Transport(format!("Unexpected response format for {}: {}", ticker, e))
    })?;

    let Some(data) = chart.chart.result.and_then(|r| r.into_iter().next()) else {
        return match chart.chart.error {
            Some(err) if err.code == "Not Found" => Ok(None),
            Some(err) => Err(FxError::Transport(format!(
                "{} for {}: {}",
                err.code, ticker, err.description
            ))),
            None => Ok(None),
        };
    };

    let offset = data.meta.and_then(|m| m.gmtoffset).unwrap_or(0);
    let timestamps = data.timestamp.unwrap_or_default();
    let closes = data
        .indicators
        .quote
        .into_iter()
        .next()
        .and_then(|q| q.close)
        .unwrap_or_default();

    let mut rows = Vec::with_capacity(timestamps.len());
    for (ts, close) in timestamps.iter().zip(closes) {
        let Some(close) = close else { continue };
        let date = chrono::DateTime::from_timestamp(ts + offset, 0)
            .map(|dt| dt.date_naive())
            .ok_or_else(|| FxError::Transport(format!("Invalid timestamp {} for {}", ts, ticker)))?;
        if date < start || date > end {
            continue;
        }
        rows.push((date, close));
    }

    if rows.is_empty() {
        return Ok(None);
    }
    Ok(Some(rows))
}

impl RateProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch_batch(
        &self,
        instruments: &[Instrument],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Series> {
        collect_batch(instruments, |ticker| self.fetch_ticker(ticker, start, end))
    }
}

/// Fetch every ticker of a batch, keeping the ones that succeed.
///
/// A failing ticker is logged and left out, like a ticker with no data. The
/// batch only fails, and so gets retried, when no ticker came back at all
/// and at least one of them errored.
fn collect_batch<F>(instruments: &[Instrument], mut fetch: F) -> Result<Series>
where
    F: FnMut(&str) -> Result<Option<Vec<(NaiveDate, f64)>>>,
{
    let mut series = Series::new();
    let mut last_error = None;
    for instrument in instruments {
        let ticker = instrument.ticker();
        match fetch(&ticker) {
            Ok(Some(rows)) => {
                log::info!("Downloaded {} rows for {}", rows.len(), ticker);
                series.outer_join(Series::from_closes(instrument.clone(), rows));
            }
            Ok(None) => log::warn!("No data available for {}", ticker),
            Err(e) => {
                log::warn!("Skipping {}: {}", ticker, e);
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if series.width() == 0 => Err(e),
        _ => Ok(series),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_provider_creation() {
        let provider = YahooProvider::new(&ProviderSettings::default());
        assert!(provider.is_ok());
    }

    #[test]
    fn test_chart_url() {
        let provider = YahooProvider::new(&ProviderSettings::default()).unwrap();
        let url = provider.chart_url("EUR=X", d(2024, 1, 2), d(2024, 1, 3));
        assert!(url.contains("/EUR=X?"));
        assert!(url.contains("period1=1704153600"));
        assert!(url.contains("period2=1704326400"));
        assert!(url.contains("interval=1d"));
    }

    #[test]
    fn test_parse_chart() {
        let body = r#"{"chart":{"result":[{
            "meta":{"gmtoffset":0},
            "timestamp":[1704153600,1704240000,1704326400],
            "indicators":{"quote":[{"close":[0.91,null,0.92]}]}
        }],"error":null}}"#;

        let rows = parse_chart("EUR=X", body, d(2024, 1, 2), d(2024, 1, 3))
            .unwrap()
            .unwrap();
        assert_eq!(rows, vec![(d(2024, 1, 2), 0.91)]);
    }

    #[test]
    fn test_parse_chart_gmt_offset() {
        // 23:00 UTC on Jan 1 with a +1h exchange offset is Jan 2
        let body = r#"{"chart":{"result":[{
            "meta":{"gmtoffset":3600},
            "timestamp":[1704150000],
            "indicators":{"quote":[{"close":[1.27]}]}
        }],"error":null}}"#;

        let rows = parse_chart("GBP=X", body, d(2024, 1, 1), d(2024, 1, 5))
            .unwrap()
            .unwrap();
        assert_eq!(rows, vec![(d(2024, 1, 2), 1.27)]);
    }

    #[test]
    fn test_parse_chart_not_found() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let rows = parse_chart("XXX=X", body, d(2024, 1, 1), d(2024, 1, 5)).unwrap();
        assert!(rows.is_none());
    }

    #[test]
    fn test_parse_chart_garbage_is_transport_error() {
        let err = parse_chart("EUR=X", "<html>", d(2024, 1, 1), d(2024, 1, 5)).unwrap_err();
        assert!(err.is_transient());
    }

    fn fx(codes: &[&str]) -> Vec<Instrument> {
        codes.iter().map(|c| Instrument::fx(c).unwrap()).collect()
    }

    #[test]
    fn test_batch_keeps_successful_tickers() {
        let batch = fx(&["EUR", "JPY", "GBP"]);
        let mut seen = Vec::new();
        let series = collect_batch(&batch, |ticker| {
            seen.push(ticker.to_string());
            match ticker {
                "JPY=X" => Err(FxError::Transport("HTTP 502".into())),
                "GBP=X" => Ok(None),
                _ => Ok(Some(vec![(d(2024, 1, 2), 0.91)])),
            }
        })
        .unwrap();

        assert_eq!(seen, vec!["EUR=X", "JPY=X", "GBP=X"]);
        assert_eq!(series.width(), 1);
        assert_eq!(series.get(d(2024, 1, 2), &batch[0].code), Some(0.91));
    }

    #[test]
    fn test_batch_fails_when_nothing_succeeds() {
        let batch = fx(&["EUR", "JPY"]);
        let err = collect_batch(&batch, |ticker| match ticker {
            "EUR=X" => Ok(None),
            _ => Err(FxError::Transport("timeout".into())),
        })
        .unwrap_err();
        assert!(err.is_transient());

        let empty = collect_batch(&batch, |_| Ok(None)).unwrap();
        assert!(empty.is_empty());
    }
}
