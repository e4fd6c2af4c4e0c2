//! Arena configuration: roster, watchlist, trading window and data source.
//!
//! Defaults describe the full five-agent arena. A JSON file may override
//! any subset of fields.

use std::collections::HashSet;
use std::path::Path;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::api::{RetryPolicy, YAHOO_CHART_BASE};
use crate::bot::MarketHours;
use crate::error::ArenaError;
use crate::models::Symbol;
use crate::trading::StrategyConfig;

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub emoji: String,
    /// CSS colour used on the dashboard
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub strategy: StrategyConfig,
}

fn default_color() -> String {
    "#8b949e".to_string()
}

impl AgentConfig {
    fn new(id: &str, name: &str, emoji: &str, color: &str, description: &str, strategy: StrategyConfig) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            emoji: emoji.to_string(),
            color: color.to_string(),
            description: description.to_string(),
            strategy,
        }
    }
}

/// Quote source settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Bar history requested with each quote
    pub history_range: String,
    /// Symbols fetched in parallel
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            base_url: YAHOO_CHART_BASE.to_string(),
            timeout_secs: 15,
            history_range: "3mo".to_string(),
            concurrency: 4,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub title: String,
    /// Trades shown per agent
    pub recent_trades: usize,
    /// Browser auto-refresh, seconds
    pub refresh_secs: u32,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            title: "Bot Arena".to_string(),
            recent_trades: 10,
            refresh_secs: 120,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Cash each agent starts with (and returns to on reset)
    pub starting_cash: Decimal,

    /// Minutes between cycle starts
    pub interval_minutes: u64,

    /// Symbols every agent scans for entries
    pub watchlist: Vec<Symbol>,

    pub agents: Vec<AgentConfig>,

    pub market_hours: MarketHours,

    pub data: DataConfig,

    pub dashboard: DashboardConfig,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        let watchlist = [
            // Stocks
            "AAPL", "MSFT", "NVDA", "TSLA", "AMZN", "META", "GOOGL", "AMD", "NFLX", "PLTR",
            // ETFs
            "SPY", "QQQ", "IWM", "XLF", "XLE", "ARKK",
            // Crypto
            "BTC-USD", "ETH-USD", "SOL-USD", "DOGE-USD",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let agents = vec![
            AgentConfig::new(
                "momentum_pete",
                "Momentum Pete",
                "🚀",
                "#58a6ff",
                "Rides trends: rate of change, moving averages and MACD",
                StrategyConfig::momentum(),
            ),
            AgentConfig::new(
                "cautious_carl",
                "Cautious Carl",
                "🛡️",
                "#3fb950",
                "Waits for full indicator confluence, small sizes, tight stops",
                StrategyConfig::cautious(),
            ),
            AgentConfig::new(
                "mean_reversion_mary",
                "Mean Reversion Mary",
                "🔄",
                "#bc8cff",
                "Buys oversold, sells overbought: RSI and Bollinger extremes",
                StrategyConfig::mean_reversion(),
            ),
            AgentConfig::new(
                "volume_victor",
                "Volume Victor",
                "📊",
                "#f0883e",
                "Follows volume spikes in the direction of the move",
                StrategyConfig::volume_breakout(),
            ),
            AgentConfig::new(
                "yolo_yolanda",
                "YOLO Yolanda",
                "🎲",
                "#f85149",
                "Low conviction bar, big positions, wide stops",
                StrategyConfig::yolo(),
            ),
        ];

        Self {
            starting_cash: dec!(10000),
            interval_minutes: 15,
            watchlist,
            agents,
            market_hours: MarketHours::default(),
            data: DataConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

impl ArenaConfig {
    /// Defaults, overridden by `path` when given. The result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ArenaError> {
        let config = match path {
            None => Self::default(),
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    ArenaError::config(format!("cannot read {}: {}", path.display(), e))
                })?;
                serde_json::from_str(&raw).map_err(|e| {
                    ArenaError::config(format!("invalid config {}: {}", path.display(), e))
                })?
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ArenaError> {
        if self.agents.is_empty() {
            return Err(ArenaError::config("roster is empty"));
        }

        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.id.trim().is_empty() {
                return Err(ArenaError::config("agent id must not be empty"));
            }
            if !seen.insert(agent.id.as_str()) {
                return Err(ArenaError::config(format!("duplicate agent id '{}'", agent.id)));
            }
            agent
                .strategy
                .validate()
                .map_err(|e| ArenaError::config(format!("agent '{}': {}", agent.id, e)))?;
        }

        if self.interval_minutes == 0 {
            return Err(ArenaError::config("interval_minutes must be at least 1"));
        }
        if self.starting_cash <= Decimal::ZERO {
            return Err(ArenaError::config("starting_cash must be positive"));
        }
        if self.watchlist.is_empty() {
            return Err(ArenaError::config("watchlist is empty"));
        }
        if self.data.retry.max_attempts == 0 {
            return Err(ArenaError::config("retry.max_attempts must be at least 1"));
        }
        self.market_hours.validate().map_err(ArenaError::config)?;

        Ok(())
    }

    /// Roster ids in configured order.
    pub fn roster(&self) -> impl Iterator<Item = &str> {
        self.agents.iter().map(|a| a.id.as_str())
    }
}
