//! Roster ingestion CLI.
//!
//! Modes: sync all teams (and rosters) for a sport, one team's roster, or
//! one specific player. `--update` forces a full refresh; the default is
//! incremental (teams with no persisted roster yet).
//!
//! Exit status: 0 on a clean run, 2 when the run completed but contained
//! per-entity failures, 1 when the run itself failed.

use anyhow::Result;
use clap::{Parser, Subcommand};
use roster_ingestion::fetch::FetchClient;
use roster_ingestion::orchestrate::{Mode, Orchestrator, RunOptions};
use roster_ingestion::store::{connect_with_retry, PgStore};
use roster_ingestion::{Config, SportId};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "roster-ingestion")]
#[command(about = "Multi-sport roster ingestion pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest all teams (and rosters where available) for a sport
    Sync {
        /// Sport tag (nba, nfl, mlb, nhl, soccer, ...)
        #[arg(short, long)]
        sport: String,
        /// Season override (sport-specific format)
        #[arg(long)]
        season: Option<String>,
        /// Full refresh: re-process teams that already have a roster
        #[arg(long)]
        update: bool,
    },
    /// Ingest one team and its roster
    Team {
        #[arg(short, long)]
        sport: String,
        /// External team identifier
        #[arg(short, long)]
        team: i64,
        #[arg(long)]
        season: Option<String>,
        #[arg(long)]
        update: bool,
    },
    /// Ingest one specific player
    Player {
        #[arg(short, long)]
        sport: String,
        /// External player identifier
        #[arg(short, long)]
        id: i64,
        #[arg(long)]
        season: Option<String>,
    },
}

impl Commands {
    fn to_options(&self) -> Result<RunOptions> {
        let (sport_tag, season, refresh) = match self {
            Commands::Sync { sport, season, update } => (sport, season, *update),
            Commands::Team { sport, season, update, .. } => (sport, season, *update),
            Commands::Player { sport, season, .. } => (sport, season, true),
        };
        let sport: SportId = sport_tag.parse()?;
        let mode = match self {
            Commands::Sync { .. } => Mode::FullSync { sport },
            Commands::Team { team, .. } => Mode::Team { sport, team: *team },
            Commands::Player { id, .. } => Mode::Player { sport, player: *id },
        };
        Ok(RunOptions {
            mode,
            refresh,
            season: season.clone(),
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env is a local convenience; deployed processes get real env vars.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("roster_ingestion=info".parse().expect("static directive")),
        )
        .init();

    match run().await {
        Ok(had_failures) => {
            if had_failures {
                warn!("run completed with failures");
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("run failed: {e:?}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<bool> {
    let cli = Cli::parse();
    let opts = cli.command.to_options()?;

    let config = Config::from_env()?;
    let fetcher = FetchClient::new(
        config.api_key.clone(),
        config.fetch_min_interval,
        config.http_timeout,
    )?;

    let pool = connect_with_retry(&config.database_url, 5).await?;
    let store = PgStore::new(pool);

    // Ctrl-C stops the run between team iterations; an in-flight upsert
    // always completes first.
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down...");
                shutdown.store(true, Ordering::Relaxed);
            }
        });
    }

    let orchestrator = Orchestrator::new(fetcher, store, shutdown);
    let summary = orchestrator.run(&opts).await?;
    Ok(summary.has_failures())
}
