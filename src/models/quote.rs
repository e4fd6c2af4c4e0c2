//! Quote model: one symbol's latest price plus the recent daily bars it came with.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Ticker identifier (e.g. "AAPL", "BTC-USD").
pub type Symbol = String;

/// Quotes for one cycle keyed by symbol.
pub type QuoteBook = BTreeMap<Symbol, Quote>;

/// Latest price for a symbol, fetched fresh each cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: Symbol,

    /// Last traded price
    pub price: Decimal,

    /// Provider timestamp of `price`
    pub timestamp: DateTime<Utc>,

    /// Daily closes, oldest first. The last entry may be today's partial bar.
    #[serde(default)]
    pub closes: Vec<f64>,

    /// Daily volumes aligned with `closes`
    #[serde(default)]
    pub volumes: Vec<f64>,
}

impl Quote {
    /// Quote without bar history.
    pub fn spot(symbol: impl Into<Symbol>, price: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            timestamp,
            closes: Vec::new(),
            volumes: Vec::new(),
        }
    }

    /// Attach bar history.
    pub fn with_history(mut self, closes: Vec<f64>, volumes: Vec<f64>) -> Self {
        self.closes = closes;
        self.volumes = volumes;
        self
    }
}
