//! Market data: the series model, retry policy, providers and the batched fetcher

pub mod fetcher;
pub mod retry;
pub mod series;
pub mod sources;

pub use fetcher::SeriesFetcher;
pub use retry::{RetryOutcome, RetryPolicy};
pub use series::{GapFillReport, PricePoint, Series};
pub use sources::{RateProvider, ScriptedProvider};
