//! Retrying, bounded-parallel quote fetcher.
//!
//! Each symbol gets its own bounded retry loop. Transient failures back off
//! exponentially; permanent ones end the loop at once. A failed symbol is
//! reported, never propagated, so one bad ticker cannot abort a cycle.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bot::Shutdown;
use crate::models::{Quote, QuoteBook, Symbol};

use super::{FetchError, QuoteProvider};

/// Longest server-requested delay we honour.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Retry schedule for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Randomization factor applied to each delay (0 = none)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

/// How a retried operation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt<T> {
    Success(T),
    /// Every attempt failed with a retryable error
    Exhausted { attempts: u32, last: FetchError },
    /// A non-retryable error ended the loop
    Fatal { attempts: u32, error: FetchError },
    /// Shutdown arrived before the loop finished
    Cancelled { attempts: u32 },
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.initial_delay_ms))
            .with_max_interval(Duration::from_millis(self.max_delay_ms))
            .with_multiplier(self.multiplier)
            .with_randomization_factor(self.jitter)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Run `op` until it succeeds, fails permanently, runs out of attempts,
    /// or shutdown interrupts a backoff wait. `op` receives the 1-based attempt.
    pub async fn run<T, F, Fut>(&self, shutdown: &Shutdown, mut op: F) -> Attempt<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let max_delay = Duration::from_millis(self.max_delay_ms);
        let mut backoff = self.backoff();
        let mut attempts = 0;

        loop {
            if shutdown.is_triggered() {
                return Attempt::Cancelled { attempts };
            }
            attempts += 1;

            let error = match op(attempts).await {
                Ok(value) => return Attempt::Success(value),
                Err(e) if !e.is_retryable() => return Attempt::Fatal { attempts, error: e },
                Err(e) => e,
            };

            if attempts >= max_attempts {
                return Attempt::Exhausted {
                    attempts,
                    last: error,
                };
            }

            let delay = match error.retry_after() {
                Some(requested) => requested.min(MAX_RETRY_AFTER),
                None => backoff.next_backoff().unwrap_or(max_delay),
            };
            debug!(attempt = attempts, delay_ms = delay.as_millis() as u64, error = %error, "Retrying");

            if !shutdown.sleep(delay).await {
                return Attempt::Cancelled { attempts };
            }
        }
    }
}

/// A symbol the source could not price this cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchFailure {
    pub symbol: Symbol,
    pub attempts: u32,
    pub error: FetchError,
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} after {} attempt(s)", self.symbol, self.error, self.attempts)
    }
}

/// Quotes obtained plus per-symbol failures.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub quotes: QuoteBook,
    pub failures: Vec<FetchFailure>,
}

/// Fetches a symbol set through a provider with retries.
pub struct MarketDataSource<P> {
    provider: P,
    policy: RetryPolicy,
    concurrency: usize,
}

impl<P: QuoteProvider> MarketDataSource<P> {
    pub fn new(provider: P, policy: RetryPolicy, concurrency: usize) -> Self {
        Self {
            provider,
            policy,
            concurrency: concurrency.max(1),
        }
    }

    /// Fetch every symbol. Never fails as a whole; see `FetchReport::failures`.
    pub async fn fetch(&self, symbols: &BTreeSet<Symbol>, shutdown: &Shutdown) -> FetchReport {
        let outcomes: Vec<(Symbol, Attempt<Quote>)> = stream::iter(symbols.iter().cloned())
            .map(|symbol| async move {
                let outcome = self
                    .policy
                    .run(shutdown, |_| self.provider.fetch_quote(&symbol))
                    .await;
                (symbol, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = FetchReport::default();
        for (symbol, outcome) in outcomes {
            let (attempts, error) = match outcome {
                Attempt::Success(quote) => {
                    report.quotes.insert(symbol, quote);
                    continue;
                }
                Attempt::Exhausted { attempts, last } => (attempts, last),
                Attempt::Fatal { attempts, error } => (attempts, error),
                Attempt::Cancelled { attempts } => (attempts, FetchError::Cancelled),
            };
            warn!(symbol = %symbol, attempts, error = %error, "Quote unavailable");
            report.failures.push(FetchFailure {
                symbol,
                attempts,
                error,
            });
        }
        report.failures.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        info!(
            requested = symbols.len(),
            received = report.quotes.len(),
            failed = report.failures.len(),
            "Market data fetched"
        );
        report
    }
}
