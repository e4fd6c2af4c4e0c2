//! Bot Arena
//!
//! Runs a roster of simulated trading agents against live quotes during
//! market hours and stages a dashboard comparing them.

mod api;
mod bot;
mod config;
mod dashboard;
mod deploy;
mod error;
mod metrics;
mod models;
mod store;
mod trading;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::api::{MarketDataSource, YahooClient};
use crate::bot::{cycle_symbols, is_eligible, next_open, CycleScheduler, RunOptions, Shutdown};
use crate::config::ArenaConfig;
use crate::dashboard::DashboardRenderer;
use crate::deploy::{DeployPublisher, PublishBundle};
use crate::error::{exit_status_for, ArenaError};
use crate::models::ArenaState;
use crate::store::StateStore;

/// Multi-agent paper-trading arena.
#[derive(Parser)]
#[command(name = "arena")]
#[command(about = "Pit simulated trading agents against each other on live quotes", long_about = None)]
struct Cli {
    /// Directory holding the arena snapshot
    #[arg(long, env = "ARENA_DATA_DIR", default_value = "./data", global = true)]
    data_dir: PathBuf,

    /// Directory the dashboard is staged into
    #[arg(long, env = "ARENA_SITE_DIR", default_value = "./site", global = true)]
    site_dir: PathBuf,

    /// JSON file overriding the built-in configuration
    #[arg(long, env = "ARENA_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG wins if set
    #[arg(long, env = "ARENA_LOG", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run trading cycles
    Run {
        /// Minutes between cycle starts (overrides the config)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Run a single cycle now and exit
        #[arg(long)]
        once: bool,

        /// Decide but do not trade
        #[arg(long)]
        signal_only: bool,

        /// Run outside market hours
        #[arg(long)]
        ignore_hours: bool,
    },

    /// Show standings from the last snapshot
    Status,

    /// Reset every agent to its starting cash
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Re-render and stage the dashboard from the last snapshot
    Render,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install logger: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(exit_status_for(&e))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = ArenaConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            interval,
            once,
            signal_only,
            ignore_hours,
        } => {
            let minutes = interval.unwrap_or(config.interval_minutes);
            if minutes == 0 {
                return Err(ArenaError::config("--interval must be at least 1 minute").into());
            }
            let options = RunOptions {
                once,
                ignore_hours,
                signal_only,
                interval: Duration::from_secs(minutes * 60),
            };

            let shutdown = Shutdown::listen();
            let mut scheduler = build_scheduler(&cli.data_dir, &cli.site_dir, config, shutdown, options).await?;
            scheduler.run().await?;
        }

        Commands::Status => {
            let store = StateStore::new(&cli.data_dir);
            let Some(state) = store.load().await? else {
                println!("No arena snapshot at {}. Start one with 'arena run'.", store.path().display());
                return Ok(());
            };
            print_status(&config, &state);
        }

        Commands::Reset { yes } => {
            if !yes {
                let confirmed = Confirm::new()
                    .with_prompt("Reset every agent to its starting cash? Trade history will be lost")
                    .default(false)
                    .interact()
                    .context("Failed to read confirmation")?;
                if !confirmed {
                    println!("Reset cancelled.");
                    return Ok(());
                }
            }

            let store = StateStore::new(&cli.data_dir);
            realign_roster(&store, &config).await?;

            let options = RunOptions::continuous(Duration::from_secs(config.interval_minutes * 60));
            let mut scheduler =
                build_scheduler(&cli.data_dir, &cli.site_dir, config, Shutdown::new(), options).await?;
            let bundle = scheduler.reset().await?;
            println!("Arena reset at cycle {}.", scheduler.state().cycle);
            print_bundle(&bundle);
        }

        Commands::Render => {
            let store = StateStore::new(&cli.data_dir);
            let roster: Vec<&str> = config.roster().collect();
            let state = store.load_or_init(&roster, config.starting_cash, Utc::now()).await?;

            let renderer = DashboardRenderer::new(&config.agents, &config.dashboard);
            let publisher = DeployPublisher::new(&cli.site_dir);
            let bundle = publisher.stage(&renderer.render(&state), &state).await?;
            print_bundle(&bundle);
        }

        Commands::Config => {
            let json = serde_json::to_string_pretty(&config).context("Failed to serialize config")?;
            println!("{}", json);
        }
    }

    Ok(())
}

async fn build_scheduler(
    data_dir: &Path,
    site_dir: &Path,
    config: ArenaConfig,
    shutdown: Shutdown,
    options: RunOptions,
) -> Result<CycleScheduler<YahooClient>> {
    let client = YahooClient::with_base_url(
        config.data.base_url.clone(),
        Duration::from_secs(config.data.timeout_secs),
    )?
    .with_range(config.data.history_range.clone());
    let source = MarketDataSource::new(client, config.data.retry.clone(), config.data.concurrency);

    let scheduler = CycleScheduler::new(
        config,
        source,
        StateStore::new(data_dir),
        DeployPublisher::new(site_dir),
        shutdown,
        options,
    )
    .await?;
    Ok(scheduler)
}

/// Replace a snapshot whose agents no longer match the roster with a fresh
/// one, keeping the cycle counter.
async fn realign_roster(store: &StateStore, config: &ArenaConfig) -> Result<()> {
    let Some(state) = store.load().await? else {
        return Ok(());
    };
    let (missing, extra) = state.roster_diff(config.roster());
    if missing.is_empty() && extra.is_empty() {
        return Ok(());
    }

    info!(?missing, ?extra, "Roster changed, rebuilding snapshot");
    let mut rebuilt = ArenaState::new(config.roster(), config.starting_cash, Utc::now());
    rebuilt.cycle = state.cycle;
    rebuilt.last_run_at = state.last_run_at;
    store.save(&rebuilt).await?;
    Ok(())
}

fn print_status(config: &ArenaConfig, state: &ArenaState) {
    let now = Utc::now();
    let last_run = state
        .last_run_at
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "never".to_string());

    println!("\n=== Bot Arena: cycle {} (last run {}) ===", state.cycle, last_run);
    if is_eligible(now, &config.market_hours) {
        println!("Market open");
    } else {
        println!("Market closed, opens {}", next_open(now, &config.market_hours).format("%Y-%m-%d %H:%M UTC"));
    }
    println!("Next cycle requests {} symbols", cycle_symbols(config, state).len());

    println!(
        "\n{:<4} {:<24} {:>12} {:>12} {:>9} {:>5} {:>7} {:>6}",
        "#", "AGENT", "EQUITY", "P&L", "RETURN", "POS", "TRADES", "WIN%"
    );
    println!("{}", "-".repeat(86));

    for (rank, ledger) in state.standings().iter().enumerate() {
        let name = config
            .agents
            .iter()
            .find(|a| a.id == ledger.agent_id)
            .map(|a| a.name.as_str())
            .unwrap_or(ledger.agent_id.as_str());
        println!(
            "{:<4} {:<24} {:>12.2} {:>12.2} {:>8.2}% {:>5} {:>7} {:>5.0}%",
            rank + 1,
            truncate(name, 22),
            ledger.equity(),
            ledger.total_pnl(),
            ledger.return_pct(),
            ledger.positions.len(),
            ledger.trades.len(),
            ledger.win_rate(),
        );
    }

    if let Some(summary) = &state.last_cycle {
        if !summary.data_failures.is_empty() {
            println!("\nUnavailable last cycle:");
            for failure in &summary.data_failures {
                println!("  {}", failure);
            }
        }
    }
}

fn print_bundle(bundle: &PublishBundle) {
    if !bundle.has_changes() {
        println!("Site unchanged.");
        return;
    }
    for file in bundle.files.iter().filter(|f| f.changed) {
        println!("  staged {} ({} bytes)", file.path, file.bytes);
    }
    println!("Suggested commit: {}", bundle.commit_message);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from(["arena", "--data-dir", "/tmp/a", "run", "--once", "--signal-only"]).unwrap();
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/a"));
        match cli.command {
            Commands::Run { once, signal_only, ignore_hours, interval } => {
                assert!(once && signal_only && !ignore_hours);
                assert_eq!(interval, None);
            }
            _ => panic!("expected run"),
        }
    }

    #[tokio::test]
    async fn test_realign_roster_keeps_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let mut old = ArenaState::new(["retired"], rust_decimal_macros::dec!(500), Utc::now());
        old.cycle = 42;
        store.save(&old).await.unwrap();

        let config = ArenaConfig::default();
        realign_roster(&store, &config).await.unwrap();

        let state = store.load().await.unwrap().unwrap();
        assert_eq!(state.cycle, 42);
        assert_eq!(state.ledgers.len(), config.agents.len());
        assert!(state.roster_diff(config.roster()).0.is_empty());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Mean Reversion Mary", 10), "Mean Re...");
        assert_eq!(truncate("Carl", 10), "Carl");
    }
}
