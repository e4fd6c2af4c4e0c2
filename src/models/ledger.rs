//! Per-agent ledger: cash, open positions, fill history and equity curve.
//!
//! `apply` is the only operation that moves cash or positions. It validates the
//! whole action before touching any field, so a rejected action leaves the
//! ledger exactly as it was.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::{Position, Quote, QuoteBook, Symbol, TradeAction, TradeRecord, TradeSide};

/// Agent identifier (e.g. "momentum_pete").
pub type AgentId = String;

/// Why an action was not applied. Rejections are expected outcomes, not failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rejection {
    #[error("insufficient cash: need ${needed:.2}, have ${available:.2}")]
    InsufficientCash { needed: Decimal, available: Decimal },

    #[error("insufficient position: hold {held}, requested {requested}")]
    InsufficientPosition { held: Decimal, requested: Decimal },

    #[error("quantity must be positive, got {quantity}")]
    InvalidQuantity { quantity: Decimal },

    #[error("price must be positive, got {price}")]
    InvalidPrice { price: Decimal },

    #[error("quote is for {quote}, action is for {action}")]
    QuoteMismatch { action: Symbol, quote: Symbol },

    #[error("order value overflows: {quantity} x {price}")]
    Overflow { quantity: Decimal, price: Decimal },
}

/// One point on an agent's equity curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub cycle: u64,
    pub timestamp: DateTime<Utc>,
    pub equity: Decimal,
    pub cash: Decimal,
}

/// Minimum spacing between equity points unless the value moved.
const EQUITY_POINT_INTERVAL_HOURS: i64 = 1;
const EQUITY_POINT_MIN_MOVE: Decimal = dec!(1);

/// Financial state of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioLedger {
    pub agent_id: AgentId,
    pub starting_cash: Decimal,
    pub cash: Decimal,
    pub positions: BTreeMap<Symbol, Position>,
    pub trades: Vec<TradeRecord>,
    #[serde(default)]
    pub equity_curve: Vec<EquityPoint>,
    pub created_at: DateTime<Utc>,
}

impl PortfolioLedger {
    /// Fresh ledger holding only cash.
    pub fn new(agent_id: impl Into<AgentId>, starting_cash: Decimal, at: DateTime<Utc>) -> Self {
        Self {
            agent_id: agent_id.into(),
            starting_cash,
            cash: starting_cash,
            positions: BTreeMap::new(),
            trades: Vec::new(),
            equity_curve: Vec::new(),
            created_at: at,
        }
    }

    /// Apply a trade action at the quote's price.
    ///
    /// Buys need `cash >= quantity * price`; sells need at least `quantity`
    /// units held. Fills at `quote.price`, timestamped with `quote.timestamp`.
    pub fn apply(&mut self, action: &TradeAction, quote: &Quote) -> Result<TradeRecord, Rejection> {
        if action.symbol != quote.symbol {
            return Err(Rejection::QuoteMismatch {
                action: action.symbol.clone(),
                quote: quote.symbol.clone(),
            });
        }
        if action.quantity <= Decimal::ZERO {
            return Err(Rejection::InvalidQuantity {
                quantity: action.quantity,
            });
        }
        if quote.price <= Decimal::ZERO {
            return Err(Rejection::InvalidPrice { price: quote.price });
        }

        let price = quote.price;
        let overflow = || Rejection::Overflow {
            quantity: action.quantity,
            price,
        };
        let notional = action.quantity.checked_mul(price).ok_or_else(overflow)?;

        let (cash_delta, realized_pnl) = match action.side {
            TradeSide::Buy => {
                if self.cash < notional {
                    return Err(Rejection::InsufficientCash {
                        needed: notional,
                        available: self.cash,
                    });
                }

                match self.positions.get_mut(&action.symbol) {
                    Some(position) => position.add(action.quantity, price).ok_or_else(overflow)?,
                    None => {
                        self.positions.insert(
                            action.symbol.clone(),
                            Position::open(action.symbol.clone(), action.quantity, price, quote.timestamp),
                        );
                    }
                }
                (-notional, None)
            }
            TradeSide::Sell => {
                let held = self
                    .positions
                    .get(&action.symbol)
                    .map(|p| p.quantity)
                    .unwrap_or(Decimal::ZERO);
                if held < action.quantity {
                    return Err(Rejection::InsufficientPosition {
                        held,
                        requested: action.quantity,
                    });
                }
                self.cash.checked_add(notional).ok_or_else(overflow)?;

                let mut closed = false;
                let mut pnl = Decimal::ZERO;
                if let Some(position) = self.positions.get_mut(&action.symbol) {
                    pnl = position.reduce(action.quantity, price).ok_or_else(overflow)?;
                    closed = position.is_closed();
                }
                if closed {
                    self.positions.remove(&action.symbol);
                }
                (notional, Some(pnl))
            }
        };

        self.cash += cash_delta;

        let record = TradeRecord {
            seq: self.trades.len() as u64 + 1,
            timestamp: quote.timestamp,
            symbol: action.symbol.clone(),
            side: action.side,
            quantity: action.quantity,
            price,
            cash_delta,
            cash_after: self.cash,
            realized_pnl,
            reason: action.reason.clone(),
        };
        self.trades.push(record.clone());

        Ok(record)
    }

    /// Refresh marks of held positions from this cycle's quotes.
    /// Symbols without a quote keep their previous mark.
    pub fn mark(&mut self, quotes: &QuoteBook) {
        for (symbol, position) in self.positions.iter_mut() {
            if let Some(quote) = quotes.get(symbol) {
                if quote.price > Decimal::ZERO {
                    position.mark(quote.price);
                }
            }
        }
    }

    /// Replace this ledger with a fresh one at the starting cash.
    pub fn reset(&mut self, at: DateTime<Utc>) {
        *self = Self::new(self.agent_id.clone(), self.starting_cash, at);
    }

    /// Append an equity point if enough time passed or the value moved.
    pub fn record_equity(&mut self, cycle: u64, at: DateTime<Utc>) {
        let equity = self.equity();

        if let Some(last) = self.equity_curve.last() {
            let recent = at - last.timestamp < Duration::hours(EQUITY_POINT_INTERVAL_HOURS);
            let flat = (equity - last.equity).abs() < EQUITY_POINT_MIN_MOVE;
            if recent && flat {
                return;
            }
        }

        self.equity_curve.push(EquityPoint {
            cycle,
            timestamp: at,
            equity,
            cash: self.cash,
        });
    }

    pub fn positions_value(&self) -> Decimal {
        self.positions.values().map(|p| p.market_value()).sum()
    }

    /// Cash plus the marked value of every position.
    pub fn equity(&self) -> Decimal {
        self.cash + self.positions_value()
    }

    pub fn total_pnl(&self) -> Decimal {
        self.equity() - self.starting_cash
    }

    /// Return versus starting cash, in percent.
    pub fn return_pct(&self) -> Decimal {
        if self.starting_cash.is_zero() {
            return Decimal::ZERO;
        }
        self.total_pnl() / self.starting_cash * dec!(100)
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.trades.iter().filter_map(|t| t.realized_pnl).sum()
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.positions.values().map(|p| p.unrealized_pnl()).sum()
    }

    /// Share of closing trades that made money, in percent.
    pub fn win_rate(&self) -> f64 {
        let closed: Vec<_> = self.trades.iter().filter(|t| t.realized_pnl.is_some()).collect();
        if closed.is_empty() {
            return 0.0;
        }
        let wins = closed.iter().filter(|t| t.is_win()).count();
        wins as f64 / closed.len() as f64 * 100.0
    }

    /// The `k` most recent trades, newest first.
    pub fn recent_trades(&self, k: usize) -> impl Iterator<Item = &TradeRecord> {
        self.trades.iter().rev().take(k)
    }

    pub fn holds(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }
}
