//! Cycle scheduler: the fetch, decide, apply, persist, render, publish loop.
//!
//! One cycle runs at a time and owns the only mutable copy of the arena.
//! Work happens on a clone of the live state; the clone replaces it only
//! after it has been written to disk, so a failed or interrupted cycle
//! leaves the previous snapshot in charge.

mod market_hours;
mod shutdown;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::api::{MarketDataSource, QuoteProvider};
use crate::config::ArenaConfig;
use crate::dashboard::DashboardRenderer;
use crate::deploy::{DeployPublisher, PublishBundle};
use crate::error::ArenaError;
use crate::models::{
    AgentCycleSummary, AgentId, ArenaState, CycleSummary, RejectedAction, Symbol, TradeAction,
};
use crate::store::StateStore;
use crate::trading::Strategy;

pub use market_hours::{is_eligible, next_open, MarketHours};
pub use shutdown::Shutdown;

/// Longest single idle wait before the window is checked again.
const MAX_IDLE_WAIT: Duration = Duration::from_secs(60 * 60);

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching,
    Deciding,
    Applying,
    Persisting,
    Rendering,
    Publishing,
    Sleeping,
    Terminated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Fetching => "fetching",
            Phase::Deciding => "deciding",
            Phase::Applying => "applying",
            Phase::Persisting => "persisting",
            Phase::Rendering => "rendering",
            Phase::Publishing => "publishing",
            Phase::Sleeping => "sleeping",
            Phase::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// How `run` behaves.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Run one cycle regardless of the trading window, then stop
    pub once: bool,
    /// Run cycles outside the trading window
    pub ignore_hours: bool,
    /// Decide but never apply; intents are recorded in the cycle summary
    pub signal_only: bool,
    /// Time between cycle starts
    pub interval: Duration,
}

impl RunOptions {
    pub fn continuous(interval: Duration) -> Self {
        Self {
            once: false,
            ignore_hours: false,
            signal_only: false,
            interval,
        }
    }
}

/// How a single cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed,
    /// Shutdown arrived before persisting; the working copy was dropped
    Cancelled,
}

pub struct CycleScheduler<P> {
    config: ArenaConfig,
    strategies: BTreeMap<AgentId, Strategy>,
    source: MarketDataSource<P>,
    store: StateStore,
    renderer: DashboardRenderer,
    publisher: DeployPublisher,
    shutdown: Shutdown,
    options: RunOptions,
    state: ArenaState,
    phase: Phase,
}

impl<P: QuoteProvider> CycleScheduler<P> {
    /// Validate the configuration and load (or create) the arena snapshot.
    pub async fn new(
        config: ArenaConfig,
        source: MarketDataSource<P>,
        store: StateStore,
        publisher: DeployPublisher,
        shutdown: Shutdown,
        options: RunOptions,
    ) -> Result<Self, ArenaError> {
        config.validate()?;
        if options.interval.is_zero() {
            return Err(ArenaError::config("cycle interval must be positive"));
        }

        let roster: Vec<&str> = config.roster().collect();
        let state = store
            .load_or_init(&roster, config.starting_cash, Utc::now())
            .await?;

        let strategies = config
            .agents
            .iter()
            .map(|a| (a.id.clone(), Strategy::new(a.strategy.clone())))
            .collect();
        let renderer = DashboardRenderer::new(&config.agents, &config.dashboard);

        info!(
            agents = roster.len(),
            cycle = state.cycle,
            watchlist = config.watchlist.len(),
            "Scheduler ready"
        );

        Ok(Self {
            config,
            strategies,
            source,
            store,
            renderer,
            publisher,
            shutdown,
            options,
            state,
            phase: Phase::Idle,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Last persisted state.
    pub fn state(&self) -> &ArenaState {
        &self.state
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = %self.phase, to = %phase, "Phase change");
        self.phase = phase;
    }

    /// Run until shutdown, or for a single cycle in one-shot mode.
    ///
    /// Returns an error only for persistence failures.
    pub async fn run(&mut self) -> Result<(), ArenaError> {
        info!(
            once = self.options.once,
            signal_only = self.options.signal_only,
            ignore_hours = self.options.ignore_hours,
            interval_secs = self.options.interval.as_secs(),
            "Starting arena"
        );

        loop {
            if self.shutdown.is_triggered() {
                break;
            }
            self.enter(Phase::Idle);

            let now = Utc::now();
            let gated = !self.options.once && !self.options.ignore_hours;
            if gated && !is_eligible(now, &self.config.market_hours) {
                if !self.wait_for_open(now).await {
                    break;
                }
                continue;
            }

            let started = Instant::now();
            if self.run_cycle(now).await? == CycleOutcome::Cancelled {
                break;
            }
            if self.options.once {
                break;
            }

            self.enter(Phase::Sleeping);
            let wait = self.options.interval.saturating_sub(started.elapsed());
            debug!(wait_secs = wait.as_secs(), "Sleeping until next cycle");
            if !self.shutdown.sleep(wait).await {
                break;
            }
        }

        self.enter(Phase::Terminated);
        info!(cycle = self.state.cycle, "Arena stopped");
        Ok(())
    }

    /// Sleep towards the next market open, at most `MAX_IDLE_WAIT` at a time.
    /// Returns false if shutdown interrupted the wait.
    async fn wait_for_open(&mut self, now: DateTime<Utc>) -> bool {
        self.enter(Phase::Sleeping);
        let opens = next_open(now, &self.config.market_hours);
        let wait = (opens - now).to_std().unwrap_or_default().min(MAX_IDLE_WAIT);
        info!(next_open = %opens, wait_secs = wait.as_secs(), "Market closed, waiting");
        self.shutdown.sleep(wait).await
    }

    /// One full cycle started at `now`.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleOutcome, ArenaError> {
        // Fetching
        self.enter(Phase::Fetching);
        let symbols = cycle_symbols(&self.config, &self.state);
        let report = self.source.fetch(&symbols, &self.shutdown).await;
        if self.shutdown.is_triggered() {
            info!("Shutdown during fetch, cycle dropped");
            return Ok(CycleOutcome::Cancelled);
        }

        // Deciding
        self.enter(Phase::Deciding);
        let mut next = self.state.next_cycle(now);
        let mut decisions: Vec<(AgentId, Vec<TradeAction>)> = Vec::with_capacity(next.ledgers.len());
        for (id, ledger) in next.ledgers.iter_mut() {
            ledger.mark(&report.quotes);
            let actions = match self.strategies.get(id) {
                Some(strategy) => strategy.decide(ledger, &report.quotes),
                None => Vec::new(),
            };
            decisions.push((id.clone(), actions));
        }
        if self.shutdown.is_triggered() {
            info!("Shutdown before applying, cycle dropped");
            return Ok(CycleOutcome::Cancelled);
        }

        // Applying
        self.enter(Phase::Applying);
        let mut agents = BTreeMap::new();
        for (id, actions) in decisions {
            let Some(ledger) = next.ledgers.get_mut(&id) else {
                continue;
            };
            let mut summary = AgentCycleSummary::default();

            for action in actions {
                if self.options.signal_only {
                    info!(agent = %id, side = action.side.as_str(), symbol = %action.symbol, qty = %action.quantity, reason = %action.reason, "[SIGNAL ONLY] Would trade");
                    summary.unapplied.push(action);
                    continue;
                }
                let Some(quote) = report.quotes.get(&action.symbol) else {
                    warn!(agent = %id, symbol = %action.symbol, "No quote for decided action, skipped");
                    continue;
                };
                match ledger.apply(&action, quote) {
                    Ok(record) => {
                        info!(
                            agent = %id,
                            side = record.side.as_str(),
                            symbol = %record.symbol,
                            qty = %record.quantity,
                            price = %record.price,
                            value = %record.notional().round_dp(2),
                            pnl = ?record.realized_pnl,
                            reason = %record.reason,
                            "Trade filled"
                        );
                        summary.executed += 1;
                    }
                    Err(rejection) => {
                        warn!(agent = %id, symbol = %action.symbol, %rejection, "Trade rejected");
                        summary.rejected.push(RejectedAction { action, rejection });
                    }
                }
            }

            ledger.record_equity(next.cycle, now);
            agents.insert(id, summary);
        }

        next.last_cycle = Some(CycleSummary {
            cycle: next.cycle,
            ran_at: now,
            signal_only: self.options.signal_only,
            quotes_received: report.quotes.len(),
            data_failures: report.failures.iter().map(|f| f.to_string()).collect(),
            agents,
        });

        if self.shutdown.is_triggered() {
            info!("Shutdown before persisting, cycle dropped");
            return Ok(CycleOutcome::Cancelled);
        }

        // Persisting; not interruptible
        self.enter(Phase::Persisting);
        self.store.save(&next).await?;
        self.state = next;

        self.log_cycle();

        // Rendering and publishing failures never stop the loop
        if let Err(e) = self.publish().await {
            error!(error = %e, cycle = self.state.cycle, "Failed to stage dashboard");
        }

        Ok(CycleOutcome::Completed)
    }

    /// Render the live state and stage it for publishing.
    pub async fn publish(&mut self) -> Result<PublishBundle, ArenaError> {
        self.enter(Phase::Rendering);
        let artifact = self.renderer.render(&self.state);

        self.enter(Phase::Publishing);
        self.publisher.stage(&artifact, &self.state).await
    }

    /// Reset every ledger to the starting cash, keeping the cycle counter,
    /// then persist and re-stage the dashboard.
    pub async fn reset(&mut self) -> Result<PublishBundle, ArenaError> {
        let mut next = self.state.clone();
        next.reset_all(Utc::now());
        self.store.save(&next).await?;
        self.state = next;
        info!(cycle = self.state.cycle, agents = self.state.ledgers.len(), "Arena reset");
        self.publish().await
    }

    fn log_cycle(&self) {
        let summary = self.state.last_cycle.as_ref();
        info!(
            cycle = self.state.cycle,
            quotes = summary.map(|s| s.quotes_received).unwrap_or(0),
            failures = summary.map(|s| s.data_failures.len()).unwrap_or(0),
            "Cycle complete"
        );

        for ledger in self.state.ledgers.values() {
            let agent = summary.and_then(|s| s.agents.get(&ledger.agent_id));
            info!(
                agent = %ledger.agent_id,
                equity = %ledger.equity().round_dp(2),
                cash = %ledger.cash.round_dp(2),
                return_pct = %ledger.return_pct().round_dp(2),
                positions = ledger.positions.len(),
                executed = agent.map(|a| a.executed).unwrap_or(0),
                rejected = agent.map(|a| a.rejected.len()).unwrap_or(0),
                "Agent"
            );
        }

        info!("Leaderboard: {}", leaderboard_line(&self.state));
    }
}

/// `1. alpha +3.00% | 2. beta +0.00%`
pub fn leaderboard_line(state: &ArenaState) -> String {
    state
        .standings()
        .iter()
        .enumerate()
        .map(|(i, l)| {
            let ret = l.return_pct().round_dp(2);
            let sign = if ret.is_sign_negative() { "" } else { "+" };
            format!("{}. {} {}{:.2}%", i + 1, l.agent_id, sign, ret)
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Watchlist plus every held symbol, so exits can be priced.
pub fn cycle_symbols(config: &ArenaConfig, state: &ArenaState) -> BTreeSet<Symbol> {
    let mut symbols = state.held_symbols();
    symbols.extend(config.watchlist.iter().cloned());
    symbols
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{fast_policy, FetchError, ScriptedProvider};
    use crate::config::AgentConfig;
    use crate::dashboard::DASHBOARD_FILE;
    use crate::trading::{selloff_quote, StrategyConfig};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap()
    }

    fn config() -> ArenaConfig {
        ArenaConfig {
            watchlist: vec!["XYZ".to_string(), "QQQ".to_string()],
            agents: vec![
                AgentConfig {
                    id: "mary".to_string(),
                    name: "Mary".to_string(),
                    emoji: String::new(),
                    color: "#bc8cff".to_string(),
                    description: String::new(),
                    strategy: StrategyConfig::mean_reversion(),
                },
                AgentConfig {
                    id: "carl".to_string(),
                    name: "Carl".to_string(),
                    emoji: String::new(),
                    color: "#3fb950".to_string(),
                    description: String::new(),
                    strategy: StrategyConfig::cautious(),
                },
            ],
            ..ArenaConfig::default()
        }
    }

    fn once() -> RunOptions {
        RunOptions {
            once: true,
            ..RunOptions::continuous(Duration::from_secs(60))
        }
    }

    async fn scheduler(
        dirs: &TempDir,
        provider: ScriptedProvider,
        options: RunOptions,
    ) -> Result<CycleScheduler<ScriptedProvider>, ArenaError> {
        CycleScheduler::new(
            config(),
            MarketDataSource::new(provider, fast_policy(2), 2),
            StateStore::new(dirs.path().join("data")),
            DeployPublisher::new(dirs.path().join("site")),
            Shutdown::new(),
            options,
        )
        .await
    }

    fn selloff_provider() -> ScriptedProvider {
        ScriptedProvider::default()
            .with("XYZ", vec![Ok(selloff_quote("XYZ"))])
            .with("QQQ", vec![ScriptedProvider::quote("QQQ", dec!(450))])
    }

    #[tokio::test]
    async fn test_one_shot_persists_renders_and_stages() {
        let dirs = tempfile::tempdir().unwrap();
        let mut scheduler = scheduler(&dirs, selloff_provider(), once()).await.unwrap();

        tokio_test::assert_ok!(scheduler.run().await);

        assert_eq!(scheduler.phase(), Phase::Terminated);
        assert_eq!(scheduler.state().cycle, 1);

        let stored = StateStore::new(dirs.path().join("data")).load().await.unwrap().unwrap();
        assert_eq!(&stored, scheduler.state());
        assert_eq!(stored.ledgers["mary"].positions["XYZ"].quantity, dec!(17.1428));

        let summary = stored.last_cycle.unwrap();
        assert_eq!(summary.quotes_received, 2);
        assert_eq!(summary.agents["mary"].executed, 1);

        assert!(dirs.path().join("site").join(DASHBOARD_FILE).exists());
        assert!(dirs.path().join("site").join("data").join("arena_state.json").exists());
    }

    #[tokio::test]
    async fn test_no_quotes_still_persists_next_cycle() {
        let dirs = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::default()
            .with("XYZ", vec![Err(FetchError::Server(503))])
            .with("QQQ", vec![Err(FetchError::Timeout)]);
        let mut scheduler = scheduler(&dirs, provider, once()).await.unwrap();
        let before = scheduler.state().clone();

        let outcome = scheduler.run_cycle(at()).await.unwrap();

        assert_eq!(outcome, CycleOutcome::Completed);
        let after = scheduler.state();
        assert_eq!(after.cycle, before.cycle + 1);
        assert_eq!(after.last_run_at, Some(at()));
        assert_eq!(after.total_trades(), 0);
        assert_eq!(after.ledgers["mary"].cash, before.ledgers["mary"].cash);

        let summary = after.last_cycle.as_ref().unwrap();
        assert_eq!(summary.quotes_received, 0);
        assert_eq!(summary.data_failures.len(), 2);

        let stored = StateStore::new(dirs.path().join("data")).load().await.unwrap().unwrap();
        assert_eq!(stored.cycle, 1);
    }

    #[tokio::test]
    async fn test_signal_only_leaves_positions_untouched() {
        let dirs = tempfile::tempdir().unwrap();
        let options = RunOptions {
            signal_only: true,
            ..once()
        };
        let mut scheduler = scheduler(&dirs, selloff_provider(), options).await.unwrap();

        scheduler.run_cycle(at()).await.unwrap();

        let state = scheduler.state();
        assert_eq!(state.cycle, 1);
        assert!(state.ledgers["mary"].positions.is_empty());
        assert_eq!(state.ledgers["mary"].cash, dec!(10000));

        let mary = &state.last_cycle.as_ref().unwrap().agents["mary"];
        assert_eq!(mary.executed, 0);
        assert_eq!(mary.unapplied.len(), 1);
        assert_eq!(mary.unapplied[0].symbol, "XYZ");
    }

    #[tokio::test]
    async fn test_held_symbols_are_fetched_and_exited() {
        let dirs = tempfile::tempdir().unwrap();
        let provider = selloff_provider()
            // Down 10% from the $70 entry, past the 6% stop
            .with("XYZ", vec![Ok(selloff_quote("XYZ")), ScriptedProvider::quote("XYZ", dec!(63))]);
        let mut scheduler = scheduler(&dirs, provider, once()).await.unwrap();

        scheduler.run_cycle(at()).await.unwrap();
        assert!(scheduler.state().ledgers["mary"].holds("XYZ"));

        scheduler.run_cycle(at()).await.unwrap();
        let mary = &scheduler.state().ledgers["mary"];
        assert!(!mary.holds("XYZ"));
        assert_eq!(mary.trades.len(), 2);
        assert!(mary.realized_pnl() < dec!(0));
    }

    #[tokio::test]
    async fn test_shutdown_before_cycle_drops_work() {
        let dirs = tempfile::tempdir().unwrap();
        let mut scheduler = scheduler(&dirs, selloff_provider(), once()).await.unwrap();
        scheduler.shutdown.trigger();

        assert_eq!(scheduler.run_cycle(at()).await.unwrap(), CycleOutcome::Cancelled);
        assert_eq!(scheduler.state().cycle, 0);

        scheduler.run().await.unwrap();
        assert_eq!(scheduler.phase(), Phase::Terminated);
        assert_eq!(scheduler.state().cycle, 0);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_previous_cycle() {
        let dirs = tempfile::tempdir().unwrap();
        let mut scheduler = scheduler(&dirs, selloff_provider(), once()).await.unwrap();
        scheduler.run_cycle(at()).await.unwrap();
        let site = dirs.path().join("site").join(DASHBOARD_FILE);
        let staged = tokio::fs::read(&site).await.unwrap();

        // A directory where the temp file goes makes the atomic write fail
        tokio::fs::create_dir(dirs.path().join("data").join(".arena_state.json.tmp"))
            .await
            .unwrap();

        let Err(err) = scheduler.run_cycle(at() + chrono::Duration::minutes(15)).await else {
            panic!("expected a persistence error");
        };
        assert_eq!(err.exit_status(), 3);
        assert_eq!(scheduler.phase(), Phase::Persisting);
        assert_eq!(scheduler.state().cycle, 1);

        let stored = StateStore::new(dirs.path().join("data")).load().await.unwrap().unwrap();
        assert_eq!(stored.cycle, 1);
        assert_eq!(&stored, scheduler.state());
        assert_eq!(tokio::fs::read(&site).await.unwrap(), staged);
    }

    #[tokio::test]
    async fn test_closed_market_wait_is_sleeping() {
        let dirs = tempfile::tempdir().unwrap();
        let mut scheduler = scheduler(&dirs, selloff_provider(), once()).await.unwrap();
        scheduler.shutdown.trigger();

        let saturday = Utc.with_ymd_and_hms(2026, 3, 7, 16, 0, 0).unwrap();
        assert!(!scheduler.wait_for_open(saturday).await);
        assert_eq!(scheduler.phase(), Phase::Sleeping);
        assert_eq!(scheduler.state().cycle, 0);
    }

    #[tokio::test]
    async fn test_reset_keeps_cycle_counter() {
        let dirs = tempfile::tempdir().unwrap();
        let mut scheduler = scheduler(&dirs, selloff_provider(), once()).await.unwrap();
        scheduler.run_cycle(at()).await.unwrap();

        let bundle = scheduler.reset().await.unwrap();

        assert_eq!(bundle.cycle, 1);
        let state = scheduler.state();
        assert_eq!(state.cycle, 1);
        assert_eq!(state.total_trades(), 0);
        assert_eq!(state.ledgers["mary"].cash, dec!(10000));
        assert!(state.last_cycle.is_none());
    }

    #[tokio::test]
    async fn test_empty_roster_is_config_error() {
        let dirs = tempfile::tempdir().unwrap();
        let config = ArenaConfig {
            agents: vec![],
            ..config()
        };

        let result = CycleScheduler::new(
            config,
            MarketDataSource::new(ScriptedProvider::default(), fast_policy(1), 1),
            StateStore::new(dirs.path()),
            DeployPublisher::new(dirs.path().join("site")),
            Shutdown::new(),
            once(),
        )
        .await;

        let Err(err) = result else {
            panic!("expected a configuration error");
        };
        assert_eq!(err.exit_status(), 2);
    }

    #[test]
    fn test_leaderboard_line() {
        let state = ArenaState::new(["beta", "alpha"], dec!(100), at());
        assert_eq!(leaderboard_line(&state), "1. alpha +0.00% | 2. beta +0.00%");
        let symbols: Vec<_> = cycle_symbols(&config(), &state).into_iter().collect();
        assert_eq!(symbols, vec!["QQQ".to_string(), "XYZ".to_string()]);
    }
}
