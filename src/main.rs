use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use coaching_signals::config::{EngineConfig, SignalThresholds};
use coaching_signals::db::{self, PgSignalSource};
use coaching_signals::models::{CopilotAction, Signal};
use coaching_signals::source::{DataSnapshot, SnapshotSource};
use coaching_signals::{report, telemetry, window, InMemorySignalCache, SignalEngine};

#[derive(Parser)]
#[command(name = "coaching-signals")]
#[command(about = "Risk signal detection for coaching organizations", long_about = None)]
struct Cli {
    /// Default log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct EngineArgs {
    #[arg(long)]
    organization: String,
    /// Reference time (ISO-8601); defaults to now
    #[arg(long)]
    now: Option<String>,
    /// Read data from a JSON snapshot instead of Postgres
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// JSON file overriding detection thresholds
    #[arg(long)]
    thresholds: Option<PathBuf>,
    /// JSON action catalog used to resolve recommended actions
    #[arg(long)]
    actions: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo organization
    Seed,
    /// Import attendance rows from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print ranked signals for an organization
    Signals {
        #[command(flatten)]
        engine: EngineArgs,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Print the full signal list as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        engine: EngineArgs,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value = "signals.md")]
        out: PathBuf,
    },
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(6)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

fn engine_config(args: &EngineArgs) -> anyhow::Result<EngineConfig> {
    let thresholds = match &args.thresholds {
        Some(path) => SignalThresholds::from_json_file(path)?,
        None => SignalThresholds::default(),
    };
    Ok(EngineConfig {
        thresholds,
        ..EngineConfig::default()
    })
}

fn load_actions(path: Option<&Path>) -> anyhow::Result<Vec<CopilotAction>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read action catalog {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid action catalog {}", path.display()))
}

async fn run_engine(args: &EngineArgs) -> anyhow::Result<Vec<Signal>> {
    let config = engine_config(args)?;
    let now = args.now.as_deref();

    let signals = match &args.snapshot {
        Some(path) => {
            let source = SnapshotSource::new(DataSnapshot::from_json_file(path)?);
            SignalEngine::with_cache(source, InMemorySignalCache::new(), config)
                .get_signals(&args.organization, now)
                .await?
        }
        None => {
            let source = PgSignalSource::new(connect().await?);
            SignalEngine::with_cache(source, InMemorySignalCache::new(), config)
                .get_signals(&args.organization, now)
                .await?
        }
    };

    Ok(signals.as_ref().clone())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(&cli.log_level);

    match cli.command {
        Commands::InitDb => {
            db::init_db(&connect().await?).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&connect().await?).await?;
            println!("Seed data inserted for {}.", db::DEMO_ORGANIZATION);
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&connect().await?, &csv).await?;
            println!("Inserted {inserted} attendance rows from {}.", csv.display());
        }
        Commands::Signals { engine, limit, json } => {
            let signals = run_engine(&engine).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&signals)?);
                return Ok(());
            }

            if signals.is_empty() {
                println!("No signals for {}.", engine.organization);
                return Ok(());
            }

            let actions = load_actions(engine.actions.as_deref())?;
            println!("Signals for {} by priority:", engine.organization);
            for signal in signals.iter().take(limit) {
                println!(
                    "- [{}] {} ({})",
                    signal.severity,
                    signal.title,
                    window::to_iso(signal.detected_at)
                );
                println!("    {}", signal.summary);
                let next: Vec<String> =
                    coaching_signals::get_recommended_signal_actions(Some(signal), &actions)
                        .iter()
                        .map(|action| action.to_string())
                        .collect();
                if !next.is_empty() {
                    println!("    next: {}", next.join(", "));
                }
            }
        }
        Commands::Report { engine, limit, out } => {
            let signals = run_engine(&engine).await?;
            let actions = load_actions(engine.actions.as_deref())?;
            let generated_at = match engine.now.as_deref() {
                Some(now) => window::parse_timestamp(now).unwrap_or_else(Utc::now),
                None => Utc::now(),
            };
            let report =
                report::build_report(&engine.organization, generated_at, &signals, &actions, limit);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
