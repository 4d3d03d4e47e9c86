//! Bounded retry with exponential backoff

use crate::clock::Sleeper;
use crate::error::{FxError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on any single backoff wait
pub const MAX_DELAY: Duration = Duration::from_secs(3600);

/// How often to retry and how long to wait in between
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Wait after the first failure, in seconds
    pub base_delay_secs: f64,
    /// Growth factor applied to the wait after every further failure
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 10.0,
            multiplier: 2.0,
        }
    }
}

/// Final result of a retried operation
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { attempts: u32, last_error: FxError },
}

impl RetryPolicy {
    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_secs: 0.0,
            multiplier: 1.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(FxError::Config("retry.max_attempts must be at least 1".into()));
        }
        if !self.base_delay_secs.is_finite() || self.base_delay_secs < 0.0 {
            return Err(FxError::Config(format!(
                "retry.base_delay_secs must be non-negative, got {}",
                self.base_delay_secs
            )));
        }
        if self.base_delay_secs > MAX_DELAY.as_secs_f64() {
            return Err(FxError::Config(format!(
                "retry.base_delay_secs must be at most {}, got {}",
                MAX_DELAY.as_secs(),
                self.base_delay_secs
            )));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(FxError::Config(format!(
                "retry.multiplier must be >= 1.0, got {}",
                self.multiplier
            )));
        }
        Ok(())
    }

    /// Wait after failed attempt `attempt` (1-based), capped at [`MAX_DELAY`]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if self.base_delay_secs == 0.0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay_secs * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .map(|delay| delay.min(MAX_DELAY))
            .unwrap_or(MAX_DELAY)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. Only transient errors are
    /// retried; any other error ends the loop at once.
    pub fn run<T, F>(&self, sleeper: &dyn Sleeper, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => {
                    return RetryOutcome::Succeeded {
                        value,
                        attempts: attempt,
                    }
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.delay_after(attempt);
                    log::warn!(
                        "Attempt {}/{} failed: {}. Retrying in {:.1}s",
                        attempt,
                        max_attempts,
                        e,
                        delay.as_secs_f64()
                    );
                    sleeper.sleep(delay);
                    attempt += 1;
                }
                Err(e) => {
                    return RetryOutcome::Exhausted {
                        attempts: attempt,
                        last_error: e,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::RecordingSleeper;

    #[test]
    fn test_delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(10));
        assert_eq!(policy.delay_after(2), Duration::from_secs(20));
        assert_eq!(policy.delay_after(4), Duration::from_secs(80));
    }

    #[test]
    fn test_exhausts_after_max_attempts() {
        let sleeper = RecordingSleeper::new();
        let mut calls = 0;
        let outcome: RetryOutcome<()> = RetryPolicy::default().run(&sleeper, |_| {
            calls += 1;
            Err(FxError::Transport("connection reset".into()))
        });

        assert_eq!(calls, 5);
        match outcome {
            RetryOutcome::Exhausted { attempts, last_error } => {
                assert_eq!(attempts, 5);
                assert!(last_error.is_transient());
            }
            RetryOutcome::Succeeded { .. } => panic!("expected exhaustion"),
        }
        let secs: Vec<u64> = sleeper.sleeps().iter().map(|d| d.as_secs()).collect();
        assert_eq!(secs, vec![10, 20, 40, 80]);
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let sleeper = RecordingSleeper::new();
        let outcome = RetryPolicy::default().run(&sleeper, |attempt| {
            if attempt < 3 {
                Err(FxError::Transport("HTTP 503".into()))
            } else {
                Ok(attempt * 10)
            }
        });

        match outcome {
            RetryOutcome::Succeeded { value, attempts } => {
                assert_eq!(value, 30);
                assert_eq!(attempts, 3);
            }
            RetryOutcome::Exhausted { .. } => panic!("expected success"),
        }
        assert_eq!(sleeper.sleeps().len(), 2);
    }

    #[test]
    fn test_permanent_error_not_retried() {
        let sleeper = RecordingSleeper::new();
        let outcome: RetryOutcome<()> = RetryPolicy::default()
            .run(&sleeper, |_| Err(FxError::Parse("bad ticker".into())));

        assert!(matches!(outcome, RetryOutcome::Exhausted { attempts: 1, .. }));
        assert!(sleeper.sleeps().is_empty());
    }

    #[test]
    fn test_long_policy_caps_delay() {
        let policy = RetryPolicy {
            max_attempts: 80,
            base_delay_secs: 10.0,
            multiplier: 2.0,
        };
        assert!(policy.validate().is_ok());
        assert_eq!(policy.delay_after(79), MAX_DELAY);
        assert_eq!(policy.delay_after(u32::MAX), MAX_DELAY);
        let immediate = RetryPolicy {
            base_delay_secs: 0.0,
            ..policy.clone()
        };
        assert_eq!(immediate.delay_after(u32::MAX), Duration::ZERO);

        let sleeper = RecordingSleeper::new();
        let outcome: RetryOutcome<()> =
            policy.run(&sleeper, |_| Err(FxError::Transport("timeout".into())));

        assert!(matches!(outcome, RetryOutcome::Exhausted { attempts: 80, .. }));
        let sleeps = sleeper.sleeps();
        assert_eq!(sleeps.len(), 79);
        assert_eq!(sleeps[0], Duration::from_secs(10));
        assert!(sleeps.iter().all(|d| *d <= MAX_DELAY));
        assert_eq!(sleeps[78], MAX_DELAY);
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::none().validate().is_ok());
        let bad = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert!(bad.validate().is_err());
        let shrinking = RetryPolicy {
            multiplier: 0.5,
            ..RetryPolicy::default()
        };
        assert!(shrinking.validate().is_err());
        let glacial = RetryPolicy {
            base_delay_secs: 7200.0,
            ..RetryPolicy::default()
        };
        assert!(glacial.validate().is_err());
    }
}
