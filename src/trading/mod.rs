//! Trading logic: strategy scoring, exits and position sizing.

mod config;
mod position_sizer;
mod strategy;

pub use config::StrategyConfig;
pub use position_sizer::PositionSizer;
pub use strategy::{ExitReason, Signal, SignalAction, Strategy, StrategyKind};

#[cfg(test)]
pub(crate) use strategy::tests::selloff_quote;
