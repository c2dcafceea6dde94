//! Grid trading backtester - main entry point
//!
//! This binary provides two subcommands:
//! - backtest: Run the grid strategy over a date range, optionally segmented
//! - segments: Print the segmentation plan for a date range

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "grid-backtest")]
#[command(about = "Grid trading backtester with trading-calendar aware segmentation", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run grid strategy backtest
    Backtest {
        /// Path to configuration file (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<String>,

        /// Instrument symbol (overrides config file)
        #[arg(short, long)]
        symbol: Option<String>,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,

        /// Only trade bars from this month (1-12)
        #[arg(long)]
        month: Option<u32>,

        /// Batch parameter for segmentation (1-5, clamped)
        #[arg(long)]
        min_buy_times: Option<u32>,

        /// Split the range into trading-calendar segments
        #[arg(long, conflicts_with = "no_segments")]
        segments: bool,

        /// Run the whole range as one segment
        #[arg(long)]
        no_segments: bool,

        /// Profit aggregation across segments (mean, median)
        #[arg(long)]
        method: Option<String>,

        /// Carry cash and positions from one segment into the next
        #[arg(long)]
        connect_segments: bool,

        /// Evaluate independent segments in parallel
        #[arg(long)]
        parallel: bool,

        /// Write executed trades to this CSV file under the results directory
        #[arg(long)]
        trades_out: Option<String>,

        /// Print the day-by-day report
        #[arg(long)]
        show_log: bool,
    },

    /// Print the segment plan for a date range
    Segments {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,

        /// Batch parameter (1-5, clamped)
        #[arg(long)]
        min_buy_times: Option<u32>,
    },
}

const LOG_DIR: &str = "logs";

/// Install the per-run log file (`logs/{command}_{timestamp}.log`) and,
/// unless the command owns the terminal, a compact console layer.
/// Returns the log file path.
fn setup_logging(verbose: bool, command_name: &str, console: bool) -> Result<PathBuf> {
    std::fs::create_dir_all(LOG_DIR)?;

    let log_filename = log_file_name(command_name, chrono::Local::now().naive_local());

    // RUST_LOG wins; --verbose only raises this crate to debug
    let default_directives = if verbose { "info,grid_backtest=debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(tracing_appender::rolling::never(LOG_DIR, &log_filename))
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);
    let console_layer = console.then(|| tracing_subscriber::fmt::layer().with_target(false).compact());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    Ok(PathBuf::from(LOG_DIR).join(log_filename))
}

fn log_file_name(command_name: &str, started: chrono::NaiveDateTime) -> String {
    format!("{}_{}.log", command_name, started.format("%Y-%m-%d_%H-%M-%S"))
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // The backtest command draws a progress bar, so it logs to the file only
    let (command_name, console) = match &cli.command {
        Commands::Backtest { .. } => ("backtest", false),
        Commands::Segments { .. } => ("segments", true),
    };

    let log_path = setup_logging(cli.verbose, command_name, console)?;
    info!(log_file = %log_path.display(), "Logging initialized");

    // Execute command
    match cli.command {
        Commands::Backtest {
            config,
            symbol,
            start,
            end,
            month,
            min_buy_times,
            segments,
            no_segments,
            method,
            connect_segments,
            parallel,
            trades_out,
            show_log,
        } => {
            let segments = match (segments, no_segments) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            commands::backtest::run(
                config,
                commands::backtest::BacktestOverrides {
                    symbol,
                    start,
                    end,
                    month,
                    min_buy_times,
                    segments,
                    method,
                    connect_segments,
                    parallel,
                    trades_out,
                    show_log,
                },
            )
        }

        Commands::Segments {
            config,
            start,
            end,
            min_buy_times,
        } => commands::segments::run(config, start, end, min_buy_times),
    }
}
