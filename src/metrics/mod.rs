//! Indicator math over daily bars.

pub mod indicators;

pub use indicators::{IndicatorSet, MIN_BARS};
