//! Data models for quotes, trades, positions, ledgers and the arena snapshot.

mod arena;
mod ledger;
mod position;
mod quote;
mod trade;

pub use arena::{AgentCycleSummary, ArenaState, CycleSummary, RejectedAction, SNAPSHOT_VERSION};
pub use ledger::{AgentId, EquityPoint, PortfolioLedger, Rejection};
pub use position::{AssetClass, Position};
pub use quote::{Quote, QuoteBook, Symbol};
pub use trade::{TradeAction, TradeRecord, TradeSide};
