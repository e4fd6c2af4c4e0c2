//! Arena state: every agent's ledger plus cycle bookkeeping. This is the unit
//! of persistence; a snapshot always describes one fully applied cycle.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AgentId, PortfolioLedger, Rejection, Symbol, TradeAction};

/// Snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// An action the ledger refused, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedAction {
    pub action: TradeAction,
    pub rejection: Rejection,
}

/// What happened to one agent during a cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentCycleSummary {
    /// Fills appended this cycle
    pub executed: usize,

    /// Actions decided but not sent to the ledger (signal-only runs)
    #[serde(default)]
    pub unapplied: Vec<TradeAction>,

    #[serde(default)]
    pub rejected: Vec<RejectedAction>,
}

/// Outcome of the most recent cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub cycle: u64,
    pub ran_at: DateTime<Utc>,
    pub signal_only: bool,
    pub quotes_received: usize,

    /// "SYMBOL: reason" for each symbol the data source could not price
    #[serde(default)]
    pub data_failures: Vec<String>,

    pub agents: BTreeMap<AgentId, AgentCycleSummary>,
}

/// Aggregate state of the whole roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaState {
    pub version: u32,

    /// Completed cycles. Only ever increases, including across resets.
    pub cycle: u64,

    pub last_run_at: Option<DateTime<Utc>>,

    pub ledgers: BTreeMap<AgentId, PortfolioLedger>,

    #[serde(default)]
    pub last_cycle: Option<CycleSummary>,
}

impl ArenaState {
    /// Fresh state with one ledger per roster agent.
    pub fn new<'a>(
        roster: impl IntoIterator<Item = &'a str>,
        starting_cash: Decimal,
        at: DateTime<Utc>,
    ) -> Self {
        let ledgers = roster
            .into_iter()
            .map(|id| (id.to_string(), PortfolioLedger::new(id, starting_cash, at)))
            .collect();

        Self {
            version: SNAPSHOT_VERSION,
            cycle: 0,
            last_run_at: None,
            ledgers,
            last_cycle: None,
        }
    }

    /// Roster ids missing from this state, and ids present that the roster does not name.
    pub fn roster_diff<'a>(
        &self,
        roster: impl IntoIterator<Item = &'a str>,
    ) -> (Vec<AgentId>, Vec<AgentId>) {
        let expected: BTreeSet<&str> = roster.into_iter().collect();
        let missing = expected
            .iter()
            .filter(|id| !self.ledgers.contains_key(**id))
            .map(|id| id.to_string())
            .collect();
        let extra = self
            .ledgers
            .keys()
            .filter(|id| !expected.contains(id.as_str()))
            .cloned()
            .collect();
        (missing, extra)
    }

    /// Working copy for the next cycle. The live state is untouched until the
    /// copy has been persisted.
    pub fn next_cycle(&self, at: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.cycle += 1;
        next.last_run_at = Some(at);
        next
    }

    /// Reset every ledger to its starting cash. The cycle counter is kept.
    pub fn reset_all(&mut self, at: DateTime<Utc>) {
        for ledger in self.ledgers.values_mut() {
            ledger.reset(at);
        }
        self.last_cycle = None;
    }

    /// Every symbol currently held by any agent.
    pub fn held_symbols(&self) -> BTreeSet<Symbol> {
        self.ledgers
            .values()
            .flat_map(|l| l.positions.keys().cloned())
            .collect()
    }

    /// Ledgers ordered by return, best first. Ties fall back to agent id so the
    /// order is stable.
    pub fn standings(&self) -> Vec<&PortfolioLedger> {
        let mut ranked: Vec<_> = self.ledgers.values().collect();
        ranked.sort_by(|a, b| {
            b.return_pct()
                .cmp(&a.return_pct())
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });
        ranked
    }

    pub fn total_trades(&self) -> usize {
        self.ledgers.values().map(|l| l.trades.len()).sum()
    }
}
