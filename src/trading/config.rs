//! Per-agent strategy configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::StrategyKind;

/// Decision and risk parameters for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Which decision policy the agent runs
    pub kind: StrategyKind,

    // === Entry Rules ===
    /// Net signal strength needed to act (0-5 scale)
    pub min_signal_strength: f64,

    /// RSI level treated as oversold
    pub rsi_oversold: f64,

    /// RSI level treated as overbought
    pub rsi_overbought: f64,

    /// Volume / 20-day average volume that counts as a spike
    pub volume_spike_multiplier: f64,

    // === Sizing ===
    /// Maximum share of equity in a single new position (0-1)
    pub max_position_pct: Decimal,

    /// Share of cash that may be spent on one entry (0-1)
    pub max_cash_use_pct: Decimal,

    /// Smallest order worth placing, in dollars
    pub min_order_value: Decimal,

    /// Maximum number of concurrent positions
    pub max_positions: usize,

    // === Exit Rules ===
    /// Stop loss as a fraction of cost (0.05 = exit at -5%)
    pub stop_loss_pct: Decimal,

    /// Take profit as a fraction of cost
    pub take_profit_pct: Decimal,

    /// Trailing stop measured from the high-water mark, applied only while in profit
    pub trailing_stop_pct: Decimal,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            kind: StrategyKind::Confluence,
            min_signal_strength: 2.0,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            volume_spike_multiplier: 1.5,
            max_position_pct: dec!(0.15),  // 15% of equity per position
            max_cash_use_pct: dec!(0.9),   // Keep a 10% cash buffer
            min_order_value: dec!(10),     // $10 minimum order
            max_positions: 12,
            stop_loss_pct: dec!(0.05),     // 5% stop loss
            take_profit_pct: dec!(0.10),   // 10% profit target
            trailing_stop_pct: dec!(0.03), // 3% off the high
        }
    }
}

impl StrategyConfig {
    pub fn momentum() -> Self {
        Self {
            kind: StrategyKind::Momentum,
            max_positions: 8,
            ..Self::default()
        }
    }

    pub fn cautious() -> Self {
        Self {
            kind: StrategyKind::Confluence,
            min_signal_strength: 3.0,
            max_position_pct: dec!(0.08),
            max_positions: 10,
            stop_loss_pct: dec!(0.03),
            take_profit_pct: dec!(0.06),
            trailing_stop_pct: dec!(0.02),
            ..Self::default()
        }
    }

    pub fn mean_reversion() -> Self {
        Self {
            kind: StrategyKind::MeanReversion,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            max_position_pct: dec!(0.12),
            max_positions: 8,
            stop_loss_pct: dec!(0.06),
            take_profit_pct: dec!(0.08),
            trailing_stop_pct: dec!(0.04),
            ..Self::default()
        }
    }

    pub fn volume_breakout() -> Self {
        Self {
            kind: StrategyKind::VolumeBreakout,
            min_signal_strength: 1.5,
            volume_spike_multiplier: 1.8,
            max_positions: 8,
            take_profit_pct: dec!(0.12),
            trailing_stop_pct: dec!(0.04),
            ..Self::default()
        }
    }

    pub fn yolo() -> Self {
        Self {
            kind: StrategyKind::Yolo,
            min_signal_strength: 1.0,
            max_position_pct: dec!(0.35),
            max_cash_use_pct: dec!(0.98),
            max_positions: 4,
            stop_loss_pct: dec!(0.15),
            take_profit_pct: dec!(0.30),
            trailing_stop_pct: dec!(0.08),
            ..Self::default()
        }
    }

    /// Reject parameter combinations that cannot produce sensible orders.
    pub fn validate(&self) -> Result<(), String> {
        let fraction = |name: &str, v: Decimal| {
            if v <= Decimal::ZERO || v > Decimal::ONE {
                Err(format!("{} must be in (0, 1], got {}", name, v))
            } else {
                Ok(())
            }
        };
        fraction("max_position_pct", self.max_position_pct)?;
        fraction("max_cash_use_pct", self.max_cash_use_pct)?;
        fraction("stop_loss_pct", self.stop_loss_pct)?;
        fraction("trailing_stop_pct", self.trailing_stop_pct)?;

        if self.take_profit_pct <= Decimal::ZERO {
            return Err("take_profit_pct must be positive".to_string());
        }
        if self.max_positions == 0 {
            return Err("max_positions must be at least 1".to_string());
        }
        if self.rsi_oversold >= self.rsi_overbought {
            return Err(format!(
                "rsi_oversold ({}) must be below rsi_overbought ({})",
                self.rsi_oversold, self.rsi_overbought
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        for config in [
            StrategyConfig::momentum(),
            StrategyConfig::cautious(),
            StrategyConfig::mean_reversion(),
            StrategyConfig::volume_breakout(),
            StrategyConfig::yolo(),
        ] {
            assert!(config.validate().is_ok(), "{:?}", config.kind);
        }
    }

    #[test]
    fn test_validate_rejects_bad_fraction() {
        let config = StrategyConfig {
            max_position_pct: dec!(1.5),
            ..StrategyConfig::default()
        };
        assert!(config.validate().unwrap_err().contains("max_position_pct"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: StrategyConfig =
            serde_json::from_str(r#"{"kind": "yolo", "max_positions": 2}"#).unwrap();
        assert_eq!(config.kind, StrategyKind::Yolo);
        assert_eq!(config.max_positions, 2);
        assert_eq!(config.stop_loss_pct, dec!(0.05));
    }
}
