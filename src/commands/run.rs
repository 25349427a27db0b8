use crate::backtester::BacktestRunner;
use crate::config::{Credentials, RawRunConfig, RunConfig};
use crate::performance::{PerformanceCalculator, PerformanceSummary};
use crate::pricing::PriceResolver;
use crate::progress::RunStatus;
use crate::report::{write_results_csv, write_summary_csv};
use crate::retry::RetryPolicy;
use crate::signals::{load_signals_file, pair_trades};
use crate::upstox::UpstoxGateway;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{info, warn};
use std::path::PathBuf;

pub struct RunOptions {
    pub signals: PathBuf,
    pub output: PathBuf,
    pub summary: Option<PathBuf>,
    pub config: RawRunConfig,
    pub retry: RetryPolicy,
    pub today: NaiveDate,
    pub progress: bool,
}

pub fn run(options: RunOptions) -> Result<()> {
    let config = RunConfig::from_raw(&options.config).context("invalid run configuration")?;
    info!(
        "Expiry {:?}, rollover {}, moneyness {}, lot size {}, interval {}",
        config.expiry_weekday,
        config.rollover_rule.label(),
        config.moneyness.label(),
        config.lot_size,
        config.data_interval.as_api_str()
    );

    let signals = load_signals_file(&options.signals)?;
    let trades = pair_trades(&signals)?;
    if trades.is_empty() {
        warn!("No trades found in {}", options.signals.display());
        return Ok(());
    }
    info!("Paired {} trade(s)", trades.len());

    let credentials = Credentials::from_env()?;
    let gateway = UpstoxGateway::new(&credentials)?;
    gateway
        .check_connection()
        .context("market data API rejected the access token")?;

    let resolver = PriceResolver::new(gateway, &config, options.today, options.retry);
    let runner = BacktestRunner::new(config, resolver)?;
    let status = if options.progress {
        RunStatus::with_progress_bar()
    } else {
        RunStatus::new()
    };

    let run = runner.run(&trades, &status)?;
    write_results_csv(&options.output, &run.results)?;
    info!("Results written to {}", options.output.display());

    let summary = PerformanceCalculator::summarize(&run.results);
    log_summary(&summary);
    if let Some(path) = &options.summary {
        write_summary_csv(path, &summary)?;
        info!("Summary written to {}", path.display());
    }

    let failed = run.failed_trade_ids();
    if !failed.is_empty() {
        warn!(
            "{} of {} trade(s) could not be priced: {}",
            failed.len(),
            run.results.len(),
            failed.join(", ")
        );
    }
    Ok(())
}

fn log_summary(summary: &PerformanceSummary) {
    info!(
        "Trades: {} total, {} priced, {} failed",
        summary.total_trades, summary.successful_trades, summary.failed_trades
    );
    info!(
        "Win rate {:.2}% ({} wins / {} losses), profit factor {:.2}",
        summary.win_rate, summary.winning_trades, summary.losing_trades, summary.profit_factor
    );
    info!(
        "Total P&L {:.2} (avg {:.2}), max profit {:.2}, max loss {:.2}, max drawdown {:.2}",
        summary.total_pnl,
        summary.average_pnl,
        summary.max_profit,
        summary.max_loss,
        summary.max_drawdown
    );
    for month in &summary.monthly {
        info!(
            "  {}: {} trade(s), total {:.2}",
            month.month, month.trades, month.total_pnl
        );
    }
}
