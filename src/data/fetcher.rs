//! Batched series download
//!
//! Instruments are split into fixed-size batches; each batch is one provider
//! call wrapped in the retry policy. A batch that keeps failing is skipped
//! and reported as a [`PartialDataWarning`], the rest of the run carries on.
//! A provider answer with zero rows is not a failure and is never retried.

use crate::clock::Sleeper;
use crate::context::RunContext;
use crate::currency::Instrument;
use crate::data::retry::{RetryOutcome, RetryPolicy};
use crate::data::series::Series;
use crate::data::sources::RateProvider;
use crate::error::{FxError, MissingReason, PartialDataWarning, Result};
use chrono::NaiveDate;

pub struct SeriesFetcher<'a> {
    provider: &'a dyn RateProvider,
    retry: &'a RetryPolicy,
    sleeper: &'a dyn Sleeper,
}

impl<'a> SeriesFetcher<'a> {
    pub fn new(
        provider: &'a dyn RateProvider,
        retry: &'a RetryPolicy,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            provider,
            retry,
            sleeper,
        }
    }

    /// Fetch `[start, end]` for all instruments, merged on date.
    pub fn fetch(
        &self,
        ctx: &mut RunContext,
        instruments: &[Instrument],
        start: NaiveDate,
        end: NaiveDate,
        batch_size: usize,
    ) -> Result<Series> {
        if batch_size == 0 {
            return Err(FxError::Config("batch size must be at least 1".to_string()));
        }

        let mut merged = Series::new();
        if instruments.is_empty() || start > end {
            return Ok(merged);
        }

        let total = instruments.len().div_ceil(batch_size);
        log::info!(
            "Fetching {} instruments from {} ({} to {}) in {} batches",
            instruments.len(),
            self.provider.name(),
            start,
            end,
            total
        );

        for (idx, batch) in instruments.chunks(batch_size).enumerate() {
            let batch_no = idx + 1;
            let tickers: Vec<String> = batch.iter().map(Instrument::ticker).collect();
            log::info!("Processing batch {}/{}: {:?}", batch_no, total, tickers);

            let outcome = self
                .retry
                .run(self.sleeper, |_| self.provider.fetch_batch(batch, start, end));

            match outcome {
                RetryOutcome::Succeeded { value, .. } if value.is_empty() => {
                    ctx.warn(PartialDataWarning {
                        batch: batch_no,
                        instruments: batch.iter().map(|i| i.code.clone()).collect(),
                        reason: MissingReason::EmptyResponse,
                    });
                }
                RetryOutcome::Succeeded { value, attempts } => {
                    log::info!(
                        "Batch {}/{}: {} rows after {} attempt(s)",
                        batch_no,
                        total,
                        value.len(),
                        attempts
                    );
                    let empty = value.empty_instruments();
                    let missing: Vec<_> = batch
                        .iter()
                        .filter(|i| !value.contains(&i.code) || empty.contains(i))
                        .map(|i| i.code.clone())
                        .collect();
                    if !missing.is_empty() {
                        ctx.warn(PartialDataWarning {
                            batch: batch_no,
                            instruments: missing,
                            reason: MissingReason::NoData,
                        });
                    }
                    merged.outer_join(value);
                }
                RetryOutcome::Exhausted {
                    attempts,
                    last_error,
                } => {
                    log::error!(
                        "Batch {}/{} failed after {} attempt(s): {}",
                        batch_no,
                        total,
                        attempts,
                        last_error
                    );
                    ctx.warn(PartialDataWarning {
                        batch: batch_no,
                        instruments: batch.iter().map(|i| i.code.clone()).collect(),
                        reason: MissingReason::BatchFailed {
                            attempts,
                            last_error: last_error.to_string(),
                        },
                    });
                }
            }
        }

        log::info!(
            "Fetched {} rows x {} instruments",
            merged.len(),
            merged.width()
        );
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::RecordingSleeper;
    use crate::data::sources::scripted::{ScriptedProvider, ScriptedResponse};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, day).unwrap()
    }

    fn fx(codes: &[&str]) -> Vec<Instrument> {
        codes.iter().map(|c| Instrument::fx(c).unwrap()).collect()
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let provider = ScriptedProvider::new();
        let sleeper = RecordingSleeper::new();
        let retry = RetryPolicy::default();
        let fetcher = SeriesFetcher::new(&provider, &retry, &sleeper);
        let mut ctx = RunContext::new("test");

        let err = fetcher
            .fetch(&mut ctx, &fx(&["EUR"]), d(1), d(2), 0)
            .unwrap_err();
        assert!(matches!(err, FxError::Config(_)));
        assert_eq!(provider.calls(), 0);
    }

    #[test]
    fn test_batches_are_joined_on_date() {
        let provider = ScriptedProvider::new()
            .with_closes("EUR", [(d(1), 0.91), (d(2), 0.92)])
            .with_closes("JPY", [(d(2), 150.0), (d(3), 151.0)]);
        let sleeper = RecordingSleeper::new();
        let retry = RetryPolicy::default();
        let fetcher = SeriesFetcher::new(&provider, &retry, &sleeper);
        let mut ctx = RunContext::new("test");

        let series = fetcher
            .fetch(&mut ctx, &fx(&["EUR", "JPY"]), d(1), d(3), 1)
            .unwrap();

        assert_eq!(provider.calls(), 2);
        assert_eq!(series.len(), 3);
        assert_eq!(series.width(), 2);
        assert!(ctx.warnings().is_empty());
    }

    #[test]
    fn test_empty_response_not_retried() {
        let provider = ScriptedProvider::new().with_script([ScriptedResponse::Empty]);
        let sleeper = RecordingSleeper::new();
        let retry = RetryPolicy::default();
        let fetcher = SeriesFetcher::new(&provider, &retry, &sleeper);
        let mut ctx = RunContext::new("test");

        let series = fetcher
            .fetch(&mut ctx, &fx(&["EUR", "GBP"]), d(1), d(3), 5)
            .unwrap();

        assert!(series.is_empty());
        assert_eq!(provider.calls(), 1);
        assert!(sleeper.sleeps().is_empty());
        assert_eq!(ctx.warnings().len(), 1);
        assert_eq!(ctx.warnings()[0].reason, MissingReason::EmptyResponse);
    }

    #[test]
    fn test_transient_failure_recovers() {
        let provider = ScriptedProvider::new()
            .with_closes("EUR", [(d(1), 0.91)])
            .with_script([ScriptedResponse::TransportError("HTTP 429".into())]);
        let sleeper = RecordingSleeper::new();
        let retry = RetryPolicy::default();
        let fetcher = SeriesFetcher::new(&provider, &retry, &sleeper);
        let mut ctx = RunContext::new("test");

        let series = fetcher.fetch(&mut ctx, &fx(&["EUR"]), d(1), d(1), 5).unwrap();

        assert_eq!(series.len(), 1);
        assert_eq!(provider.calls(), 2);
        assert_eq!(sleeper.sleeps().len(), 1);
        assert!(ctx.warnings().is_empty());
    }

    #[test]
    fn test_missing_instrument_reported() {
        let provider = ScriptedProvider::new().with_closes("EUR", [(d(1), 0.91)]);
        let sleeper = RecordingSleeper::new();
        let retry = RetryPolicy::default();
        let fetcher = SeriesFetcher::new(&provider, &retry, &sleeper);
        let mut ctx = RunContext::new("test");

        let series = fetcher
            .fetch(&mut ctx, &fx(&["EUR", "XAU"]), d(1), d(1), 5)
            .unwrap();

        assert_eq!(series.width(), 1);
        let warning = &ctx.warnings()[0];
        assert_eq!(warning.reason, MissingReason::NoData);
        assert_eq!(warning.instruments[0].as_str(), "XAU");
    }
}
