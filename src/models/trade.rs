//! Trade intents produced by strategies and the records a ledger keeps once they fill.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Symbol;

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

/// An intended trade. Not yet validated against cash or holdings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeAction {
    pub symbol: Symbol,
    pub side: TradeSide,
    pub quantity: Decimal,

    /// Why the strategy wants this trade
    #[serde(default)]
    pub reason: String,
}

impl TradeAction {
    pub fn buy(symbol: impl Into<Symbol>, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side: TradeSide::Buy,
            quantity,
            reason: String::new(),
        }
    }

    pub fn sell(symbol: impl Into<Symbol>, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side: TradeSide::Sell,
            quantity,
            reason: String::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
}

/// A filled trade. Append-only within a ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// 1-based sequence number within the owning ledger
    pub seq: u64,

    pub timestamp: DateTime<Utc>,
    pub symbol: Symbol,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,

    /// Change in cash caused by this trade (negative for buys)
    pub cash_delta: Decimal,

    /// Cash balance right after the trade
    pub cash_after: Decimal,

    /// Realized P&L, sells only
    #[serde(default)]
    pub realized_pnl: Option<Decimal>,

    #[serde(default)]
    pub reason: String,
}

impl TradeRecord {
    /// Gross traded value.
    pub fn notional(&self) -> Decimal {
        self.quantity * self.price
    }

    /// True for a sell that closed at a profit.
    pub fn is_win(&self) -> bool {
        self.realized_pnl.is_some_and(|pnl| pnl > Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(side: TradeSide, realized_pnl: Option<Decimal>) -> TradeRecord {
        TradeRecord {
            seq: 1,
            timestamp: Utc::now(),
            symbol: "X".to_string(),
            side,
            quantity: dec!(10),
            price: dec!(50),
            cash_delta: dec!(-500),
            cash_after: dec!(9500),
            realized_pnl,
            reason: String::new(),
        }
    }

    #[test]
    fn test_notional() {
        assert_eq!(record(TradeSide::Buy, None).notional(), dec!(500));
    }

    #[test]
    fn test_win_classification() {
        assert!(!record(TradeSide::Buy, None).is_win());
        assert!(record(TradeSide::Sell, Some(dec!(12.5))).is_win());
        assert!(!record(TradeSide::Sell, Some(dec!(0))).is_win());
        assert!(!record(TradeSide::Sell, Some(dec!(-3))).is_win());
    }

    #[test]
    fn test_side_serializes_uppercase() {
        let json = serde_json::to_string(&TradeSide::Sell).unwrap();
        assert_eq!(json, "\"SELL\"");
    }
}
