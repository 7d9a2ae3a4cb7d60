mod types;
mod indicators;
mod features;
mod exchange;
mod config;
mod storage;
mod database;
mod ml;
mod error;
mod profiling;
mod pipeline;

use std::path::Path;

use anyhow::{anyhow, Result};
use chrono::Duration;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{PipelineConfig, DEFAULT_CONFIG_PATH};
use crate::ml::SqliteChampionStore;
use crate::pipeline::{current_hour, parse_datetime, Pipeline, RunMode, RunReport, RunWindow};

#[derive(Parser)]
#[command(name = "btc-forecast")]
#[command(version = "0.1.0")]
#[command(about = "Hourly BTC price forecasting with champion/challenger model selection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once over a time window
    Run {
        /// Window start, "YYYY-MM-DD HH:MM:SS" UTC (default: end minus the lookback)
        #[arg(short, long)]
        start: Option<String>,
        /// Window end, exclusive (default: start of the current hour)
        #[arg(short, long)]
        end: Option<String>,
        /// Steps to execute
        #[arg(short, long, value_enum, default_value_t = RunMode::Full)]
        mode: RunMode,
    },
    /// Run the full pipeline every hour over the latest lookback window
    Watch {
        /// Seconds to wait after the hour before fetching
        #[arg(long, default_value = "60")]
        delay_secs: u64,
    },
    /// Write a configuration file with default values
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Show the stored champion and recent challengers
    ShowChampion {
        /// Number of challengers to list
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = run_cli(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run_cli(cli: Cli) -> Result<()> {
    if let Commands::InitConfig { force } = cli.command {
        return init_config(&cli.config, force);
    }

    let config = PipelineConfig::load(&cli.config)?;
    init_logging(cli.verbose, config.logging.json)?;
    config
        .validate()
        .map_err(|errors| anyhow!("Invalid configuration:\n  {}", errors.join("\n  ")))?;

    info!("BTC forecast pipeline v0.1.0");

    match cli.command {
        Commands::Run { start, end, mode } => {
            let window = resolve_window(start.as_deref(), end.as_deref(), config.training.lookback_hours)?;
            let pipeline = Pipeline::from_config(config).await?;
            let report = pipeline.run(mode, window).await?;
            print_report(&report);
        }
        Commands::Watch { delay_secs } => {
            watch(config, delay_secs).await?;
        }
        Commands::ShowChampion { limit } => {
            show_champion(&config, limit).await?;
        }
        Commands::InitConfig { .. } => {}
    }

    Ok(())
}

fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let initialized = if json { builder.json().try_init() } else { builder.try_init() };
    initialized.map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

fn init_config(path: &str, force: bool) -> Result<()> {
    if Path::new(path).exists() && !force {
        return Err(anyhow!("{} already exists, pass --force to overwrite", path));
    }
    std::fs::write(path, PipelineConfig::default().to_toml()?)?;
    println!("Wrote default configuration to {}", path);
    Ok(())
}

fn resolve_window(start: Option<&str>, end: Option<&str>, lookback_hours: u32) -> Result<RunWindow> {
    let end = match end {
        Some(s) => parse_datetime(s)?,
        None => current_hour()?,
    };
    match start {
        Some(s) => RunWindow::new(parse_datetime(s)?, end),
        None => RunWindow::lookback(end, lookback_hours),
    }
}

async fn watch(config: PipelineConfig, delay_secs: u64) -> Result<()> {
    let lookback = config.training.lookback_hours;
    let pipeline = Pipeline::from_config(config).await?;
    let delay = Duration::seconds(i64::try_from(delay_secs)?);

    info!("Watching: one full run per hour, {}s after the hour", delay_secs);
    loop {
        let window = RunWindow::latest(lookback)?;
        match pipeline.run(RunMode::Full, window).await {
            Ok(report) => print_report(&report),
            Err(e) => error!("Run over {} failed: {:#}", window, anyhow::Error::from(e)),
        }

        let next = current_hour()? + Duration::hours(1) + delay;
        let wait = (next - chrono::Utc::now()).to_std().unwrap_or_default();
        info!("Next run at {}", next.format("%Y-%m-%d %H:%M:%S"));

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                return Ok(());
            }
        }
    }
}

async fn show_champion(config: &PipelineConfig, limit: usize) -> Result<()> {
    use crate::ml::ChampionStore;

    let store = SqliteChampionStore::connect(&config.models.database_url, &config.models.models_dir).await?;
    let slot = &config.training.slot;

    println!("\n=== Champion '{}' ===", slot);
    match store.champion_record(slot).await? {
        Some(record) => {
            println!("Model:    {}", record.model_name);
            println!("Version:  {}", record.version);
            println!("Trained:  {}", record.trained_at.format("%Y-%m-%d %H:%M:%S"));
            println!("Hold-out: {}", record.metrics);
            println!("File:     {}", record.model_path.display());
        }
        None => println!("No champion yet"),
    }

    let challengers = store.list_challengers(slot).await?;
    if !challengers.is_empty() {
        println!("\n--- Recent challengers ---");
        for (model, metrics) in challengers.iter().take(limit) {
            println!("{:<18} {}", model.to_string(), metrics);
        }
    }

    Ok(())
}

fn print_report(report: &RunReport) {
    println!("\n=== Run {:?} over {} ===", report.mode, report.window);
    println!("Candles:      {}", report.candles);
    println!("Feature rows: {}", report.feature_rows);
    if let Some(path) = &report.profile_report {
        println!("Profile:      {}", path.display());
    }

    let Some(training) = &report.training else {
        return;
    };
    println!(
        "Challenger:   {} [{}] {}",
        training.challenger, training.challenger_params, training.challenger_metrics
    );
    println!("\n--- Cross-validation ---");
    for entry in &training.leaderboard {
        let marker = if entry.kind == training.challenger { "*" } else { " " };
        println!(
            "{} {:<18} MSE {:>14.4}  RMSE {:>10.4}  [{}]",
            marker,
            entry.kind.to_string(),
            entry.cv_mse,
            entry.cv_rmse,
            entry.params
        );
    }
    println!();
    println!("Decision:     {:?}", training.decision);
    println!("Serving:      {} {}", training.winner, training.winner_metrics);
    if let Some(version) = training.champion_version {
        println!("Champion v:   {}", version);
    }
    for record in &training.records {
        println!("{:<8}      {:.0} -> {:.2}", record.kind.as_str(), record.time, record.price);
    }
}
