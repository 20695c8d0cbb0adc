//! FIXORA — football value-bet engine and ROI attribution
//!
//! Entry point. Loads configuration (refusing to start on conflicting
//! values), initialises structured logging, opens the ledger store and runs
//! one command: recommend, settle or report.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

use fixora::config::{AppConfig, StoreBackend};
use fixora::engine::accountant::Accountant;
use fixora::engine::ValueEngine;
use fixora::storage::{self, JsonLedgerStore, LedgerStore, SqliteStore};
use fixora::tracking::{PerformanceAggregate, RoiTracker, Scope};
use fixora::types::{Candidate, Outcome};

const BANNER: &str = r#"
 _____ _____  _____  ____  _____
|  ___|_ _\ \/ / _ \|  _ \|  _  |
| |_   | | \  / | | | |_) | |_| |
|  _|  | | /  \ |_| |  _ <|  _  |
|_|   |___/_/\_\___/|_| \_\_| |_|

  Football value bets, ranked and accounted
  v0.1.0
"#;

#[derive(Parser)]
#[command(name = "fixora")]
#[command(about = "Football value-bet engine with ROI attribution")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank a batch of candidates and track the surfaced bets
    Recommend {
        /// JSON file holding an array of candidates
        #[arg(long)]
        candidates: PathBuf,
        /// Rank only, do not record anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Settle a tracked bet
    Settle {
        #[arg(long)]
        bet_id: String,
        /// win, loss or void
        #[arg(long)]
        outcome: String,
    },
    /// Show performance aggregates
    Report {
        /// overall, market:<kind>, league:<name> or week
        #[arg(long, default_value = "overall")]
        scope: String,
        /// Only bets settled in the last seven days
        #[arg(long)]
        week: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();

    // Conflicting or invalid values stop here
    let cfg = AppConfig::load(&cli.config)?;

    init_logging(&cfg);

    eprintln!("{BANNER}");
    info!(
        config = %cli.config,
        min_odds = cfg.engine.odds_bounds.min,
        max_odds = cfg.engine.odds_bounds.max,
        kelly_multiplier = cfg.engine.kelly_multiplier,
        max_stake = %fixora::types::Fraction::new(cfg.engine.max_stake_fraction).to_percent(),
        backend = ?cfg.tracking.backend,
        "FIXORA starting up"
    );

    match cfg.tracking.backend {
        StoreBackend::Sqlite => {
            let store = SqliteStore::connect(&cfg.tracking.database_path).await?;
            run(cli.command, &cfg, store).await
        }
        StoreBackend::Json => {
            let store = JsonLedgerStore::new(&cfg.tracking.ledger_path);
            run(cli.command, &cfg, store).await
        }
    }
}

async fn run<S: LedgerStore>(command: Commands, cfg: &AppConfig, store: S) -> Result<()> {
    let ledger = storage::load_ledger_from(&store).await?;
    let tracker = RoiTracker::from_ledger(cfg.tracking.unit_stake, ledger);
    let accountant = Accountant::new(tracker, store);

    let output = match command {
        Commands::Recommend {
            candidates,
            dry_run,
        } => {
            let raw = std::fs::read_to_string(&candidates)
                .with_context(|| format!("Failed to read candidates: {}", candidates.display()))?;
            let batch: Vec<Candidate> = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse candidates: {}", candidates.display()))?;

            let engine = ValueEngine::from_config(cfg)?;
            let report = engine.run_cycle(&batch);

            let tracking = if dry_run {
                None
            } else {
                Some(accountant.track_cycle(&report).await?)
            };

            json!({
                "recommendations": report.recommendations(),
                "rejections": report.summary,
                "tracking": tracking,
            })
        }

        Commands::Settle { bet_id, outcome } => {
            let outcome: Outcome = outcome.parse()?;
            let settled = accountant.settle(&bet_id, outcome, Utc::now()).await?;
            json!({ "settled": settled })
        }

        Commands::Report { scope, week } => {
            let tracker = accountant.tracker();
            let min_bets = cfg.tracking.min_bets_for_report;
            let aggregate = if week || scope.eq_ignore_ascii_case("week") {
                tracker.weekly(Utc::now())
            } else {
                tracker.aggregate(&scope.parse::<Scope>()?)
            };

            let significant = |board: Vec<PerformanceAggregate>| -> Vec<PerformanceAggregate> {
                board
                    .into_iter()
                    .filter(|a| a.is_significant(min_bets))
                    .collect()
            };

            json!({
                "aggregate": aggregate,
                "significant": aggregate.is_significant(min_bets),
                "pending": tracker.pending().len(),
                "markets": significant(tracker.market_leaderboard()),
                "leagues": significant(tracker.league_leaderboard()),
                "risk": tracker.risk_report(&cfg.tracking.risk_thresholds()),
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Initialise the `tracing` subscriber. Logs go to stderr so stdout stays
/// clean JSON.
fn init_logging(cfg: &AppConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.logging.filter));

    let json_logging = cfg.logging.json || std::env::var("FIXORA_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
