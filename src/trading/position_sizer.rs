//! Position sizing: cap each entry by equity share and available cash.

use rust_decimal::{Decimal, RoundingStrategy};

use super::StrategyConfig;

/// Decimal places kept on order quantities.
pub const QUANTITY_DP: u32 = 4;

/// Calculator for entry sizes.
pub struct PositionSizer<'a> {
    config: &'a StrategyConfig,
}

impl<'a> PositionSizer<'a> {
    pub fn new(config: &'a StrategyConfig) -> Self {
        Self { config }
    }

    /// Units to buy at `price`.
    ///
    /// Spend is `min(equity * max_position_pct, cash * max_cash_use_pct)`,
    /// the quantity is rounded down to 4 decimal places, and anything worth
    /// less than `min_order_value` sizes to zero.
    pub fn quantity(&self, equity: Decimal, cash: Decimal, price: Decimal) -> Decimal {
        if price <= Decimal::ZERO || cash <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let max_position_value = equity * self.config.max_position_pct;
        let max_spend = max_position_value.min(cash * self.config.max_cash_use_pct);
        if max_spend <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let quantity =
            (max_spend / price).round_dp_with_strategy(QUANTITY_DP, RoundingStrategy::ToZero);

        if quantity <= Decimal::ZERO || quantity * price < self.config.min_order_value {
            return Decimal::ZERO;
        }
        quantity
    }
}
