//! Market data: Yahoo chart client and the retrying fetcher built on it.

mod market_data;
mod quote_client;
mod types;

pub use market_data::{Attempt, FetchFailure, FetchReport, MarketDataSource, RetryPolicy};
pub use quote_client::{FetchError, QuoteProvider, YahooClient, YAHOO_CHART_BASE};

#[cfg(test)]
pub(crate) use market_data::tests::{fast_policy, ScriptedProvider};
