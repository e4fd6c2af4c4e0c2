//! Agent strategies: indicator scoring, entry selection and exit rules.
//!
//! Every strategy scores the same indicator components; a `StrategyKind`
//! weights them differently. Decisions are pure functions of the ledger and
//! the cycle's quotes:
//! - Exits first: stop loss, take profit, trailing stop, bearish signal
//! - Entries next, strongest signal first, bounded by `max_positions`

use std::fmt;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::metrics::IndicatorSet;
use crate::models::{PortfolioLedger, Position, Quote, QuoteBook, Symbol, TradeAction};

use super::{PositionSizer, StrategyConfig};

/// Decision policy of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Trend and rate of change
    Momentum,
    /// Every indicator, equally weighted
    Confluence,
    /// RSI and Bollinger extremes
    MeanReversion,
    /// Volume spikes confirming direction
    VolumeBreakout,
    /// Confluence scoring with aggressive sizing set by config
    Yolo,
}

impl StrategyKind {
    pub fn label(&self) -> &'static str {
        match self {
            StrategyKind::Momentum => "Momentum",
            StrategyKind::Confluence => "Confluence",
            StrategyKind::MeanReversion => "Mean Reversion",
            StrategyKind::VolumeBreakout => "Volume Breakout",
            StrategyKind::Yolo => "YOLO",
        }
    }

    fn weight(&self, component: Component) -> f64 {
        use Component::*;
        match (self, component) {
            (StrategyKind::Confluence | StrategyKind::Yolo, _) => 1.0,

            (StrategyKind::Momentum, RateOfChange) => 2.0,
            (StrategyKind::Momentum, Trend) => 1.5,
            (StrategyKind::Momentum, Macd | Crossover | Volume) => 1.0,
            (StrategyKind::Momentum, Rsi | Bollinger) => 0.0,

            (StrategyKind::MeanReversion, Bollinger) => 1.5,
            (StrategyKind::MeanReversion, Rsi) => 1.0,
            (StrategyKind::MeanReversion, _) => 0.0,

            (StrategyKind::VolumeBreakout, Volume) => 2.0,
            (StrategyKind::VolumeBreakout, Trend | RateOfChange) => 1.0,
            (StrategyKind::VolumeBreakout, Macd) => 0.5,
            (StrategyKind::VolumeBreakout, _) => 0.0,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Component {
    Rsi,
    Macd,
    Bollinger,
    Volume,
    Trend,
    Crossover,
    RateOfChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

/// Scored view of one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub symbol: Symbol,
    pub action: SignalAction,
    pub buy_strength: f64,
    pub sell_strength: f64,
    pub buy_reasons: Vec<String>,
    pub sell_reasons: Vec<String>,
}

impl Signal {
    fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            action: SignalAction::Hold,
            buy_strength: 0.0,
            sell_strength: 0.0,
            buy_reasons: Vec::new(),
            sell_reasons: Vec::new(),
        }
    }

    fn hold(symbol: &str, reason: &str) -> Self {
        let mut signal = Self::new(symbol);
        signal.buy_reasons.push(reason.to_string());
        signal
    }

    pub fn net(&self) -> f64 {
        self.buy_strength - self.sell_strength
    }

    /// Reasons for the signal's own side, at most three, joined for a trade record.
    pub fn summary(&self) -> String {
        let reasons = match self.action {
            SignalAction::Sell => &self.sell_reasons,
            _ => &self.buy_reasons,
        };
        reasons.iter().take(3).cloned().collect::<Vec<_>>().join(" | ")
    }
}

/// Why a held position should be closed.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitReason {
    StopLoss { ret: Decimal },
    TakeProfit { ret: Decimal },
    TrailingStop { drawdown: Decimal },
    Bearish(String),
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = |d: &Decimal| (*d * dec!(100)).round_dp(1);
        match self {
            ExitReason::StopLoss { ret } => write!(f, "Stop loss triggered ({}% loss)", pct(ret)),
            ExitReason::TakeProfit { ret } => {
                write!(f, "Take profit triggered ({}% gain)", pct(ret))
            }
            ExitReason::TrailingStop { drawdown } => {
                write!(f, "Trailing stop ({}% from high)", pct(drawdown))
            }
            ExitReason::Bearish(reasons) => f.write_str(reasons),
        }
    }
}

/// Trading strategy engine for one agent.
pub struct Strategy {
    config: StrategyConfig,
}

impl Strategy {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    // ==================== Signals ====================

    /// Score a quote's bar history. Short history means hold.
    pub fn analyze(&self, quote: &Quote) -> Signal {
        let Some(ind) = IndicatorSet::compute(&quote.closes, &quote.volumes) else {
            return Signal::hold(&quote.symbol, "Insufficient data");
        };

        let kind = self.config.kind;
        let mut signal = Signal::new(&quote.symbol);

        let buy = |c: Component, points: f64, reason: String, s: &mut Signal| {
            let w = kind.weight(c);
            if w > 0.0 {
                s.buy_strength += points * w;
                s.buy_reasons.push(reason);
            }
        };
        let sell = |c: Component, points: f64, reason: String, s: &mut Signal| {
            let w = kind.weight(c);
            if w > 0.0 {
                s.sell_strength += points * w;
                s.sell_reasons.push(reason);
            }
        };

        // RSI
        if ind.rsi < self.config.rsi_oversold {
            buy(Component::Rsi, 1.5, format!("RSI oversold ({:.1})", ind.rsi), &mut signal);
        } else if ind.rsi < 40.0 {
            buy(Component::Rsi, 0.5, format!("RSI approaching oversold ({:.1})", ind.rsi), &mut signal);
        } else if ind.rsi > self.config.rsi_overbought {
            sell(Component::Rsi, 1.5, format!("RSI overbought ({:.1})", ind.rsi), &mut signal);
        } else if ind.rsi > 65.0 {
            sell(Component::Rsi, 0.5, format!("RSI approaching overbought ({:.1})", ind.rsi), &mut signal);
        }

        // MACD histogram
        let (hist, prev_hist) = (ind.macd_hist, ind.prev_macd_hist);
        if hist > 0.0 && prev_hist <= 0.0 {
            buy(Component::Macd, 1.5, "MACD bullish crossover".to_string(), &mut signal);
        } else if hist > 0.0 && hist > prev_hist {
            buy(Component::Macd, 0.5, "MACD momentum increasing".to_string(), &mut signal);
        }
        if hist < 0.0 && prev_hist >= 0.0 {
            sell(Component::Macd, 1.5, "MACD bearish crossover".to_string(), &mut signal);
        } else if hist < 0.0 && hist < prev_hist {
            sell(Component::Macd, 0.5, "MACD momentum decreasing".to_string(), &mut signal);
        }

        // Bollinger %B
        let bb = ind.bb_pct;
        if bb < 0.05 {
            buy(Component::Bollinger, 1.0, format!("Price at lower Bollinger Band ({:.2})", bb), &mut signal);
        } else if bb < 0.2 {
            buy(Component::Bollinger, 0.5, format!("Price near lower Bollinger Band ({:.2})", bb), &mut signal);
        } else if bb > 0.95 {
            sell(Component::Bollinger, 1.0, format!("Price at upper Bollinger Band ({:.2})", bb), &mut signal);
        } else if bb > 0.8 {
            sell(Component::Bollinger, 0.5, format!("Price near upper Bollinger Band ({:.2})", bb), &mut signal);
        }

        // Volume confirms the day's direction
        if ind.volume_ratio > self.config.volume_spike_multiplier {
            if ind.daily_return() > 0.0 {
                let reason = format!("Volume spike ({:.1}x avg) on up move", ind.volume_ratio);
                buy(Component::Volume, 0.75, reason, &mut signal);
            } else {
                let reason = format!("Volume spike ({:.1}x avg) on down move", ind.volume_ratio);
                sell(Component::Volume, 0.75, reason, &mut signal);
            }
        }

        // Moving average trend
        if ind.price > ind.sma10 && ind.sma10 > ind.sma20 {
            buy(Component::Trend, 0.5, "Price above rising MAs".to_string(), &mut signal);
        } else if ind.price < ind.sma10 && ind.sma10 < ind.sma20 {
            sell(Component::Trend, 0.5, "Price below falling MAs".to_string(), &mut signal);
        }

        // EMA9 / SMA20 crossover
        if ind.ema9 > ind.sma20 && ind.prev_ema9 <= ind.prev_sma20 {
            buy(Component::Crossover, 0.75, "EMA9 crossed above SMA20".to_string(), &mut signal);
        } else if ind.ema9 < ind.sma20 && ind.prev_ema9 >= ind.prev_sma20 {
            sell(Component::Crossover, 0.75, "EMA9 crossed below SMA20".to_string(), &mut signal);
        }

        // Rate of change
        if ind.roc5 > 3.0 && ind.roc10 > 0.0 {
            let reason = format!("Strong short-term momentum (+{:.1}% in 5d)", ind.roc5);
            buy(Component::RateOfChange, 0.5, reason, &mut signal);
        } else if ind.roc5 < -3.0 && ind.roc10 < 0.0 {
            let reason = format!("Negative momentum ({:.1}% in 5d)", ind.roc5);
            sell(Component::RateOfChange, 0.5, reason, &mut signal);
        }

        let net = signal.net();
        signal.action = if net >= self.config.min_signal_strength {
            SignalAction::Buy
        } else if net <= -self.config.min_signal_strength {
            SignalAction::Sell
        } else {
            SignalAction::Hold
        };
        signal
    }

    // ==================== Exits ====================

    /// Exit reasons for a held position at the quote's price. Empty means keep.
    pub fn check_exit(&self, position: &Position, quote: &Quote) -> Vec<ExitReason> {
        let price = quote.price;
        if position.avg_cost <= Decimal::ZERO || price <= Decimal::ZERO {
            return Vec::new();
        }

        let ret = (price - position.avg_cost) / position.avg_cost;
        let high = position.high_water.max(price);
        let drawdown = (price - high) / high;

        let mut reasons = Vec::new();
        if ret <= -self.config.stop_loss_pct {
            reasons.push(ExitReason::StopLoss { ret });
        }
        if ret >= self.config.take_profit_pct {
            reasons.push(ExitReason::TakeProfit { ret });
        }
        if drawdown <= -self.config.trailing_stop_pct && ret > Decimal::ZERO {
            reasons.push(ExitReason::TrailingStop { drawdown });
        }

        if reasons.is_empty() {
            let signal = self.analyze(quote);
            if signal.action == SignalAction::Sell
                && signal.sell_strength >= self.config.min_signal_strength
            {
                reasons.push(ExitReason::Bearish(signal.summary()));
            }
        }
        reasons
    }

    // ==================== Decisions ====================

    /// Trade actions for this cycle. Reads the ledger, never mutates it.
    /// Symbols without a quote are skipped. The agent is the ledger's
    /// `agent_id`; there is no separate agent argument.
    pub fn decide(&self, ledger: &PortfolioLedger, quotes: &QuoteBook) -> Vec<TradeAction> {
        let mut actions = Vec::new();
        let mut cash = ledger.cash;
        let mut open = ledger.positions.len();

        for (symbol, position) in &ledger.positions {
            let Some(quote) = quotes.get(symbol) else {
                continue;
            };
            let reasons = self.check_exit(position, quote);
            if reasons.is_empty() {
                continue;
            }

            let reason = reasons
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" | ");
            cash += position.quantity * quote.price;
            open -= 1;
            actions.push(TradeAction::sell(symbol.clone(), position.quantity).with_reason(reason));
        }

        let equity = ledger.cash
            + ledger
                .positions
                .iter()
                .map(|(symbol, p)| {
                    let price = quotes.get(symbol).map(|q| q.price).unwrap_or(p.last_price);
                    p.quantity * price
                })
                .sum::<Decimal>();

        let mut candidates: Vec<(Signal, &Quote)> = quotes
            .values()
            .filter(|q| !ledger.holds(&q.symbol))
            .map(|q| (self.analyze(q), q))
            .filter(|(s, _)| {
                s.action == SignalAction::Buy && s.buy_strength >= self.config.min_signal_strength
            })
            .collect();
        candidates.sort_by(|(a, _), (b, _)| {
            b.buy_strength
                .total_cmp(&a.buy_strength)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });

        let sizer = PositionSizer::new(&self.config);
        for (signal, quote) in candidates {
            if open >= self.config.max_positions {
                break;
            }
            let quantity = sizer.quantity(equity, cash, quote.price);
            if quantity.is_zero() {
                continue;
            }
            cash -= quantity * quote.price;
            open += 1;
            actions.push(TradeAction::buy(quote.symbol.clone(), quantity).with_reason(signal.summary()));
        }

        actions
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::TradeSide;
    use chrono::{DateTime, TimeZone, Utc};

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap()
    }

    /// Flat at 100 for 40 bars, then a sharp five-day selloff to 70.
    pub(crate) fn selloff_quote(symbol: &str) -> Quote {
        let mut closes = vec![100.0; 40];
        closes.extend([90.0, 85.0, 80.0, 75.0, 70.0]);
        let volumes = vec![1_000_000.0; closes.len()];
        Quote::spot(symbol, dec!(70), at()).with_history(closes, volumes)
    }

    /// Flat at 100 for 40 bars, then ten days of +2% compounding.
    fn breakout_quote(symbol: &str, spike: bool) -> Quote {
        let mut closes = vec![100.0; 40];
        let mut price: f64 = 100.0;
        for _ in 0..10 {
            price *= 1.02;
            closes.push(price);
        }
        let mut volumes = vec![1_000_000.0; closes.len()];
        if spike {
            if let Some(last) = volumes.last_mut() {
                *last = 3_000_000.0;
            }
        }
        let last = Decimal::try_from(price).unwrap().round_dp(4);
        Quote::spot(symbol, last, at()).with_history(closes, volumes)
    }

    fn ledger() -> PortfolioLedger {
        PortfolioLedger::new("test_agent", dec!(10000), at())
    }

    fn book(quotes: Vec<Quote>) -> QuoteBook {
        quotes.into_iter().map(|q| (q.symbol.clone(), q)).collect()
    }

    #[test]
    fn test_short_history_holds() {
        let strategy = Strategy::new(StrategyConfig::yolo());
        let quote = Quote::spot("AAPL", dec!(190), at()).with_history(vec![190.0; 10], vec![]);

        assert_eq!(strategy.analyze(&quote).action, SignalAction::Hold);
        assert!(strategy.decide(&ledger(), &book(vec![quote])).is_empty());
    }

    #[test]
    fn test_mean_reversion_buys_selloff() {
        let strategy = Strategy::new(StrategyConfig::mean_reversion());
        let signal = strategy.analyze(&selloff_quote("XYZ"));

        assert_eq!(signal.action, SignalAction::Buy);
        assert_eq!(signal.sell_strength, 0.0);
        assert!(signal.buy_reasons.iter().any(|r| r.starts_with("RSI oversold")));
    }

    #[test]
    fn test_threshold_separates_agents() {
        let quote = selloff_quote("XYZ");

        let yolo = Strategy::new(StrategyConfig::yolo()).analyze(&quote);
        let cautious = Strategy::new(StrategyConfig::cautious()).analyze(&quote);

        // Same scores, different thresholds
        assert_eq!(yolo.net(), cautious.net());
        assert_eq!(yolo.action, SignalAction::Buy);
        assert_eq!(cautious.action, SignalAction::Hold);
    }

    #[test]
    fn test_momentum_buys_breakout() {
        let strategy = Strategy::new(StrategyConfig::momentum());
        let signal = strategy.analyze(&breakout_quote("MOMO", false));

        assert_eq!(signal.action, SignalAction::Buy);
        assert!(signal.buy_reasons.iter().any(|r| r.contains("momentum")));
    }

    #[test]
    fn test_volume_breakout_needs_spike() {
        let strategy = Strategy::new(StrategyConfig::volume_breakout());

        let quiet = strategy.analyze(&breakout_quote("VOL", false));
        let loud = strategy.analyze(&breakout_quote("VOL", true));

        assert!(loud.buy_strength > quiet.buy_strength);
        assert_eq!(loud.action, SignalAction::Buy);
    }

    #[test]
    fn test_decide_sizes_entry() {
        let strategy = Strategy::new(StrategyConfig::mean_reversion());
        let actions = strategy.decide(&ledger(), &book(vec![selloff_quote("XYZ")]));

        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].side, TradeSide::Buy);
        // 12% of 10k = 1200 at $70
        assert_eq!(actions[0].quantity, dec!(17.1428));
        assert!(!actions[0].reason.is_empty());
    }

    #[test]
    fn test_decide_respects_max_positions() {
        let config = StrategyConfig {
            max_positions: 1,
            ..StrategyConfig::mean_reversion()
        };
        let strategy = Strategy::new(config);
        let quotes = book(vec![selloff_quote("AAA"), selloff_quote("BBB")]);

        let actions = strategy.decide(&ledger(), &quotes);

        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].symbol, "AAA");
    }

    #[test]
    fn test_stop_loss_exit() {
        let strategy = Strategy::new(StrategyConfig::default()); // 5% stop
        let mut ledger = ledger();
        ledger
            .apply(&TradeAction::buy("X", dec!(10)), &Quote::spot("X", dec!(100), at()))
            .unwrap();

        let actions = strategy.decide(&ledger, &book(vec![Quote::spot("X", dec!(94), at())]));

        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].side, TradeSide::Sell);
        assert_eq!(actions[0].quantity, dec!(10));
        assert!(actions[0].reason.starts_with("Stop loss"));
    }

    #[test]
    fn test_take_profit_and_trailing_stop() {
        let strategy = Strategy::new(StrategyConfig::default()); // 10% target, 3% trail
        let mut position = Position::open("X".to_string(), dec!(1), dec!(100), at());

        let reasons = strategy.check_exit(&position, &Quote::spot("X", dec!(111), at()));
        assert!(matches!(reasons[0], ExitReason::TakeProfit { .. }));

        position.mark(dec!(108));
        let reasons = strategy.check_exit(&position, &Quote::spot("X", dec!(104), at()));
        assert!(matches!(reasons[0], ExitReason::TrailingStop { .. }));

        // Drawdown without profit is not a trailing stop
        let reasons = strategy.check_exit(&position, &Quote::spot("X", dec!(99), at()));
        assert!(reasons.is_empty());
    }

    #[test]
    fn test_missing_quote_is_skipped() {
        let strategy = Strategy::new(StrategyConfig::default());
        let mut ledger = ledger();
        ledger
            .apply(&TradeAction::buy("X", dec!(10)), &Quote::spot("X", dec!(100), at()))
            .unwrap();

        assert!(strategy.decide(&ledger, &QuoteBook::new()).is_empty());
    }

    #[test]
    fn test_decide_is_pure() {
        let strategy = Strategy::new(StrategyConfig::yolo());
        let ledger = ledger();
        let quotes = book(vec![selloff_quote("AAA"), breakout_quote("BBB", true)]);

        let first = strategy.decide(&ledger, &quotes);
        let second = strategy.decide(&ledger, &quotes);

        assert_eq!(first, second);
        assert_eq!(ledger, self::ledger());
    }
}
