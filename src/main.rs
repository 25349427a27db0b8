use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use optionsbt::{
    commands::{expiry, pair, run, strike},
    config::{RawRunConfig, DEFAULT_LOT_SIZE, DEFAULT_STRIKE_INTERVAL, DEFAULT_UNDERLYING_KEY},
    retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS},
};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_OUTPUT_FILE: &str = "backtest_results.csv";

#[derive(Parser)]
#[command(name = "optionsbt")]
#[command(about = "Prices strategy signals as index option trades using historical market data")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest a signal file against historical option prices
    Run {
        /// Strategy report CSV with Trade #, Type, Signal, Date and Time columns
        #[arg(long, value_name = "PATH")]
        signals: PathBuf,
        /// Destination for the per-trade result table
        #[arg(short, long, value_name = "PATH", default_value = DEFAULT_OUTPUT_FILE)]
        output: PathBuf,
        /// Destination for the summary metrics table
        #[arg(long, value_name = "PATH")]
        summary: Option<PathBuf>,
        /// Weekday contracts expire on
        #[arg(long = "expiry-day", default_value = "Tuesday")]
        expiry_day: String,
        /// Weekday from which trades roll to the following expiry, or "No rollover"
        #[arg(long, default_value = "No rollover")]
        rollover: String,
        /// ATM, ITM1 or OTM1
        #[arg(long, default_value = "ATM")]
        moneyness: String,
        #[arg(long = "lot-size", default_value_t = DEFAULT_LOT_SIZE as i64)]
        lot_size: i64,
        /// 1minute or 5minute
        #[arg(long, default_value = "1minute")]
        interval: String,
        #[arg(long = "strike-interval", default_value_t = DEFAULT_STRIKE_INTERVAL)]
        strike_interval: f64,
        /// Instrument key of the underlying index
        #[arg(long = "underlying", default_value = DEFAULT_UNDERLYING_KEY)]
        underlying: String,
        /// Parallel workers (1 = sequential, 0 = one per CPU)
        #[arg(short, long, default_value_t = 1)]
        jobs: usize,
        /// Pause before retrying a failed price request
        #[arg(long = "retry-cooldown-secs", default_value_t = 60)]
        retry_cooldown_secs: u64,
        /// Attempts per price request, including the first
        #[arg(long = "max-attempts", default_value_t = DEFAULT_MAX_ATTEMPTS)]
        max_attempts: u32,
        /// Fraction of the cooldown added or removed at random (0..=1)
        #[arg(long = "retry-jitter", default_value_t = 0.0)]
        retry_jitter: f64,
        /// Hide the progress bar
        #[arg(long = "no-progress")]
        no_progress: bool,
    },
    /// Print the expiry a trade entered on a date would use
    Expiry {
        /// Entry date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
        #[arg(long = "expiry-day", default_value = "Tuesday")]
        expiry_day: String,
        #[arg(long, default_value = "No rollover")]
        rollover: String,
    },
    /// Print the strike selected for a spot price
    Strike {
        #[arg(long)]
        spot: f64,
        /// CALL or PUT
        #[arg(long)]
        side: String,
        #[arg(long, default_value = "ATM")]
        moneyness: String,
        #[arg(long = "strike-interval", default_value_t = DEFAULT_STRIKE_INTERVAL)]
        strike_interval: f64,
    },
    /// Validate a signal file and print the paired trades
    Pair {
        #[arg(long, value_name = "PATH")]
        signals: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let Cli { command } = cli;

    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            eprintln!("Ignoring unreadable .env file: {}", err);
        }
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match command {
        Commands::Run {
            signals,
            output,
            summary,
            expiry_day,
            rollover,
            moneyness,
            lot_size,
            interval,
            strike_interval,
            underlying,
            jobs,
            retry_cooldown_secs,
            max_attempts,
            retry_jitter,
            no_progress,
        } => {
            info!("Starting options backtest. Historical results do not predict future returns.");
            let options = run::RunOptions {
                signals,
                output,
                summary,
                config: RawRunConfig {
                    expiry_weekday: expiry_day,
                    rollover_rule: rollover,
                    moneyness_mode: moneyness,
                    lot_size,
                    data_interval: interval,
                    strike_interval,
                    underlying_key: underlying,
                    jobs,
                },
                retry: RetryPolicy {
                    max_attempts,
                    cooldown: Duration::from_secs(retry_cooldown_secs),
                    jitter_ratio: retry_jitter.clamp(0.0, 1.0),
                },
                today: chrono::Local::now().date_naive(),
                progress: !no_progress,
            };
            run::run(options)?;
        }
        Commands::Expiry {
            date,
            expiry_day,
            rollover,
        } => {
            expiry::run(&date, &expiry_day, &rollover)?;
        }
        Commands::Strike {
            spot,
            side,
            moneyness,
            strike_interval,
        } => {
            strike::run(spot, &side, &moneyness, strike_interval)?;
        }
        Commands::Pair { signals } => {
            pair::run(&signals)?;
        }
    }

    Ok(())
}
