use anyhow::Context;
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use configuration::{Config, LoggingConfig};
use core_types::{signal_collection_key, Signal};
use database::{connect, run_migrations, DbRepository};
use engine::{EngineError, LiveEngine};
use events::SignalBroadcaster;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use web_server::AppState;

/// How many broadcasts a slow WebSocket client may fall behind before losing some.
const BROADCAST_CAPACITY: usize = 256;

/// The main entry point for the Trendwatch signal service.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let cli = Cli::parse();

    let config = configuration::load_config().context("Failed to load configuration")?;
    let _log_guard = init_tracing(&config.logging);

    // Initialize the database connection and run migrations
    let db_pool = connect().await.context("Failed to connect to the database")?;
    run_migrations(&db_pool)
        .await
        .context("Failed to run database migrations")?;
    let db_repo = DbRepository::new(db_pool);

    // Execute the appropriate command
    match cli.command {
        Commands::Run => handle_run(config, db_repo).await,
        Commands::Watch(WatchArgs {
            action: WatchAction::Add { symbol },
        }) => handle_watch_add(&db_repo, &symbol).await,
        Commands::Watch(WatchArgs {
            action: WatchAction::List,
        }) => handle_watch_list(&db_repo).await,
        Commands::Signals(args) => handle_signals(&db_repo, args).await,
    }
}

/// Console output plus a daily rolling file. `RUST_LOG` wins over `logging.level`.
fn init_tracing(logging: &LoggingConfig) -> WorkerGuard {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let file_appender = tracing_appender::rolling::daily(&logging.directory, &logging.file_prefix);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    guard
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Streams klines, tracks Supertrend flips and simulates a position per symbol.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the live engine and the WebSocket/API server.
    Run,
    /// Manage the watched symbols.
    Watch(WatchArgs),
    /// Show the stored signal history of a symbol.
    Signals(SignalsArgs),
}

#[derive(Parser)]
struct WatchArgs {
    #[command(subcommand)]
    action: WatchAction,
}

#[derive(Subcommand)]
enum WatchAction {
    /// Start watching a symbol. A running engine picks it up immediately.
    Add {
        /// The symbol to watch (e.g., "BTCUSDT").
        symbol: String,
    },
    /// List the watched symbols.
    List,
}

#[derive(Parser)]
struct SignalsArgs {
    /// The symbol whose signals to show (e.g., "BTCUSDT").
    symbol: String,

    /// Only show the most recent N signals.
    #[arg(long)]
    limit: Option<usize>,

    /// Print the signals as JSON instead of a table.
    #[arg(long)]
    json: bool,
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn handle_run(config: Config, db_repo: DbRepository) -> anyhow::Result<()> {
    let broadcaster = SignalBroadcaster::new(BROADCAST_CAPACITY);
    let repo = Arc::new(db_repo.clone());
    let engine = LiveEngine::new(&config, repo.clone(), repo, broadcaster.clone())?;

    let state = AppState {
        db_repo,
        broadcaster,
    };
    let server = tokio::spawn(web_server::run_server(config.server.listen_addr, state));

    let engine_run = async {
        engine.run().await?;
        // Running pipelines keep streaming after the addition feed ends.
        std::future::pending::<()>().await;
        Ok::<(), EngineError>(())
    };

    tokio::select! {
        result = engine_run => result?,
        result = server => result??,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown signal received."),
    }

    engine.shutdown().await;
    Ok(())
}

async fn handle_watch_add(db_repo: &DbRepository, symbol: &str) -> anyhow::Result<()> {
    if db_repo.add_watch_symbol(symbol).await? {
        println!("Now watching {}.", symbol.to_uppercase());
    } else {
        println!("{} is already watched.", symbol.to_uppercase());
    }
    Ok(())
}

async fn handle_watch_list(db_repo: &DbRepository) -> anyhow::Result<()> {
    let symbols = db_repo.list_watch_symbols().await?;
    if symbols.is_empty() {
        println!("No symbols are watched. Add one with `trendwatch watch add <SYMBOL>`.");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Symbol", "Added"]);
    for row in symbols {
        table.add_row(vec![
            row.symbol,
            row.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

async fn handle_signals(db_repo: &DbRepository, args: SignalsArgs) -> anyhow::Result<()> {
    let collection_key = signal_collection_key(&args.symbol);
    let mut signals = db_repo.get_signals(&collection_key).await?;
    if let Some(limit) = args.limit {
        let skip = signals.len().saturating_sub(limit);
        signals.drain(..skip);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&signals)?);
        return Ok(());
    }
    if signals.is_empty() {
        println!("No signals stored in {}.", collection_key);
        return Ok(());
    }

    println!("{}", signal_table(&signals));
    Ok(())
}

fn signal_table(signals: &[Signal]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Bar Open (UTC)",
            "Signal",
            "Price",
            "Balance",
            "Coin",
            "P/L",
            "Total P/L",
        ]);
    for s in signals {
        table.add_row(vec![
            s.open_time.format("%Y-%m-%d %H:%M").to_string(),
            s.signal_type.to_string(),
            s.price.to_string(),
            cell(s.remaining_balance),
            cell(s.coin),
            cell(s.profit_or_loss),
            cell(s.total_profit_loss),
        ]);
    }
    table
}

/// Renders an unpriced field as a dash.
fn cell<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}
