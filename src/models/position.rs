//! Position model: one agent's holding in one symbol.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Symbol;

/// Broad asset class, shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Stock,
    Etf,
    Crypto,
}

const KNOWN_ETFS: &[&str] = &[
    "SPY", "QQQ", "IWM", "DIA", "VTI", "VOO", "XLF", "XLE", "XLK", "XLV", "ARKK", "ARKG", "GLD",
    "SLV", "TLT", "HYG", "VNQ", "EEM",
];

impl AssetClass {
    /// Classify a ticker the way the quote provider names them.
    pub fn classify(symbol: &str) -> Self {
        let upper = symbol.to_uppercase();
        if upper.ends_with("-USD") {
            AssetClass::Crypto
        } else if KNOWN_ETFS.contains(&upper.as_str()) {
            AssetClass::Etf
        } else {
            AssetClass::Stock
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Stock => "stock",
            AssetClass::Etf => "etf",
            AssetClass::Crypto => "crypto",
        }
    }
}

/// An open position. Quantity is always positive; closed positions are removed
/// from the ledger rather than kept at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,

    /// Units held (fractional allowed)
    pub quantity: Decimal,

    /// Average cost per unit
    pub avg_cost: Decimal,

    /// Last known market price
    pub last_price: Decimal,

    /// Highest mark seen since the position was opened
    pub high_water: Decimal,

    pub asset_class: AssetClass,

    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Open a new position from a fill.
    pub fn open(symbol: Symbol, quantity: Decimal, price: Decimal, at: DateTime<Utc>) -> Self {
        let asset_class = AssetClass::classify(&symbol);
        Self {
            symbol,
            quantity,
            avg_cost: price,
            last_price: price,
            high_water: price,
            asset_class,
            opened_at: at,
        }
    }

    /// Add to the position (averaging in). Returns `None`, leaving the
    /// position untouched, if the new cost basis does not fit a `Decimal`.
    pub fn add(&mut self, quantity: Decimal, price: Decimal) -> Option<()> {
        let (new_quantity, avg_cost) = self.averaged_with(quantity, price)?;
        self.quantity = new_quantity;
        self.avg_cost = avg_cost;
        self.mark(price);
        Some(())
    }

    fn averaged_with(&self, quantity: Decimal, price: Decimal) -> Option<(Decimal, Decimal)> {
        let total_cost = self
            .quantity
            .checked_mul(self.avg_cost)?
            .checked_add(quantity.checked_mul(price)?)?;
        let new_quantity = self.quantity.checked_add(quantity)?;
        if new_quantity.is_zero() {
            return Some((new_quantity, self.avg_cost));
        }
        Some((new_quantity, total_cost.checked_div(new_quantity)?))
    }

    /// Reduce the position at `price`, returning realized P&L on the reduced units.
    /// Callers validate that `quantity <= self.quantity`. Returns `None`,
    /// leaving the position untouched, if the P&L does not fit a `Decimal`.
    pub fn reduce(&mut self, quantity: Decimal, price: Decimal) -> Option<Decimal> {
        let reduced = quantity.min(self.quantity);
        let pnl = reduced.checked_mul(price.checked_sub(self.avg_cost)?)?;
        self.quantity -= reduced;
        self.mark(price);
        Some(pnl)
    }

    /// Update the mark and the high-water mark.
    pub fn mark(&mut self, price: Decimal) {
        self.last_price = price;
        if price > self.high_water {
            self.high_water = price;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.quantity.is_zero()
    }

    pub fn market_value(&self) -> Decimal {
        self.quantity * self.last_price
    }

    pub fn cost_basis(&self) -> Decimal {
        self.quantity * self.avg_cost
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.market_value() - self.cost_basis()
    }

    /// Unrealized return as a fraction of cost (0.05 = +5%).
    pub fn unrealized_return(&self) -> Decimal {
        if self.avg_cost.is_zero() {
            return Decimal::ZERO;
        }
        (self.last_price - self.avg_cost) / self.avg_cost
    }
}
