// KuCoin Grid Bot - CLI
// Single entry point: init, run, status, reset

use std::path::Path;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use kucoin_grid_bot::{Config, GridEngine, GridRunner, KucoinClient, ResetReason, StateStore, TradingError};

#[derive(Parser)]
#[command(name = "grid-bot")]
#[command(version)]
#[command(about = "Single-symbol KuCoin spot grid bot", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Start the grid loop (Ctrl-C to stop; resting orders are kept)
    Run,

    /// Show the persisted grid snapshot
    Status,

    /// Cancel all open orders for the symbol and clear the snapshot
    Reset,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging first so config errors are visible
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Commands::Init { force } => init_config(&cli.config, force),
        Commands::Run => run(&cli.config).await,
        Commands::Status => show_status(&cli.config),
        Commands::Reset => reset(&cli.config).await,
    };

    if let Err(e) = result {
        error!("❌ {}", e);
        if matches!(e, TradingError::Config(_) | TradingError::ConfigMissing(_)) {
            error!("💡 Run `grid-bot init`, edit {}, or export KUCOIN_API_* variables", cli.config);
        }
        std::process::exit(1);
    }
}

fn init_config(path: &str, force: bool) -> Result<(), TradingError> {
    if Path::new(path).exists() && !force {
        warn!("⚠️  {} already exists, skipping (use --force to overwrite)", path);
        return Ok(());
    }
    std::fs::write(path, include_str!("../../config.toml.example"))?;
    info!("📝 Created {}", path);
    info!("💡 Next: set credentials, then run `grid-bot run`");
    Ok(())
}

async fn run(path: &str) -> Result<(), TradingError> {
    let config = Config::from_file(path)?;
    let client = KucoinClient::from_config(&config)?;
    let store = StateStore::new(&config.persistence.state_file);

    let engine = GridEngine::new(client, config.grid.clone(), store).with_candle_limit(config.exchange.candle_limit);
    let mut runner = GridRunner::new(engine, &config.runner);

    let token = runner.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Shutdown requested");
            token.cancel();
        }
    });

    info!(symbol = %config.exchange.symbol, mode = ?config.grid.mode, "Starting grid bot");
    runner.run().await;
    Ok(())
}

fn show_status(path: &str) -> Result<(), TradingError> {
    let config = Config::from_file(path)?;
    let state = StateStore::new(&config.persistence.state_file).load();

    println!("Symbol:        {}", config.exchange.symbol);
    println!("State file:    {}", config.persistence.state_file.display());
    if !state.is_active() {
        println!("Grid:          inactive");
    } else {
        println!("Grid:          {} levels, quantity {}", state.levels.len(), state.quantity);
        if let Some(reference) = state.reference_price {
            println!("Reference:     {} (step {})", reference, state.step);
        }
        for level in &state.levels {
            let entry = level
                .entry
                .as_ref()
                .map(|e| format!(" (entry {})", e.price))
                .unwrap_or_default();
            println!(
                "  {:>4} {:>16} {}{}",
                level.side.as_str(),
                level.price.to_string(),
                level.order_id.as_deref().unwrap_or("-"),
                entry
            );
        }
    }
    println!("Realized PnL:  {}", state.total_realized_pnl);
    println!("Fees paid:     {}", state.total_fees_paid);
    if let Some(start) = state.start_time {
        println!("Started:       {}", start.to_rfc3339());
    }
    if let Some(last) = state.last_activity {
        println!("Last activity: {}", last.to_rfc3339());
    }
    Ok(())
}

async fn reset(path: &str) -> Result<(), TradingError> {
    let config = Config::from_file(path)?;
    let client = KucoinClient::from_config(&config)?;
    let store = StateStore::new(&config.persistence.state_file);

    let mut engine = GridEngine::new(client, config.grid.clone(), store);
    engine.force_reset(ResetReason::Manual).await?;
    info!("✅ Grid cleared for {}", config.exchange.symbol);
    Ok(())
}
