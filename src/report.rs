use crate::models::{PriceQuote, TradeResult};
use crate::performance::PerformanceSummary;
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Flat CSV view of a result row. Empty cells stand for missing values.
#[derive(Debug, Serialize)]
struct ResultRow<'a> {
    trade_id: &'a str,
    direction: &'static str,
    option_side: &'static str,
    entry_timestamp: String,
    exit_timestamp: String,
    expiry_date: Option<String>,
    strike: Option<f64>,
    spot_entry: Option<f64>,
    spot_exit: Option<f64>,
    entry_price: Option<f64>,
    entry_source: &'static str,
    entry_instrument: Option<&'a str>,
    entry_matched_strike: Option<f64>,
    entry_expiry_used: Option<String>,
    entry_sample_time: Option<String>,
    exit_price: Option<f64>,
    exit_source: &'static str,
    exit_instrument: Option<&'a str>,
    exit_matched_strike: Option<f64>,
    exit_expiry_used: Option<String>,
    exit_sample_time: Option<String>,
    data_source: String,
    pnl_per_lot: Option<f64>,
    pnl_total: Option<f64>,
    pnl_underlying: Option<f64>,
    error: Option<&'a str>,
}

struct LegColumns<'a> {
    price: Option<f64>,
    instrument: Option<&'a str>,
    matched_strike: Option<f64>,
    expiry_used: Option<String>,
    sample_time: Option<String>,
}

impl<'a> LegColumns<'a> {
    fn from_quote(quote: Option<&'a PriceQuote>) -> Self {
        Self {
            price: quote.map(|q| q.value),
            instrument: quote.map(|q| q.instrument_key.as_str()),
            matched_strike: quote.map(|q| q.matched_strike),
            expiry_used: quote.map(|q| q.expiry_used.to_string()),
            sample_time: quote.map(|q| q.sample_time.format(TIMESTAMP_FORMAT).to_string()),
        }
    }
}

impl<'a> ResultRow<'a> {
    fn from_result(result: &'a TradeResult) -> Self {
        let entry = LegColumns::from_quote(result.entry_quote.as_ref());
        let exit = LegColumns::from_quote(result.exit_quote.as_ref());
        Self {
            trade_id: &result.trade_id,
            direction: result.direction.as_str(),
            option_side: result.option_side.as_str(),
            entry_timestamp: result.entry_timestamp.format(TIMESTAMP_FORMAT).to_string(),
            exit_timestamp: result.exit_timestamp.format(TIMESTAMP_FORMAT).to_string(),
            expiry_date: result.expiry_date.map(|date| date.to_string()),
            strike: result.strike,
            spot_entry: result.spot_entry,
            spot_exit: result.spot_exit,
            entry_price: entry.price,
            entry_source: result.entry_source().as_str(),
            entry_instrument: entry.instrument,
            entry_matched_strike: entry.matched_strike,
            entry_expiry_used: entry.expiry_used,
            entry_sample_time: entry.sample_time,
            exit_price: exit.price,
            exit_source: result.exit_source().as_str(),
            exit_instrument: exit.instrument,
            exit_matched_strike: exit.matched_strike,
            exit_expiry_used: exit.expiry_used,
            exit_sample_time: exit.sample_time,
            data_source: result.data_source(),
            pnl_per_lot: result.pnl_per_lot,
            pnl_total: result.pnl_total,
            pnl_underlying: result.pnl_underlying,
            error: result.error.as_deref(),
        }
    }
}

pub fn write_results<W: Write>(writer: W, results: &[TradeResult]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for result in results {
        csv_writer
            .serialize(ResultRow::from_result(result))
            .with_context(|| format!("failed to write result row for trade {}", result.trade_id))?;
    }
    csv_writer.flush().context("failed to flush result table")?;
    Ok(())
}

pub fn write_results_csv(path: &Path, results: &[TradeResult]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_results(file, results)
}

fn summary_metrics(summary: &PerformanceSummary) -> Vec<(&'static str, String)> {
    vec![
        ("total_trades", summary.total_trades.to_string()),
        ("successful_trades", summary.successful_trades.to_string()),
        ("failed_trades", summary.failed_trades.to_string()),
        ("winning_trades", summary.winning_trades.to_string()),
        ("losing_trades", summary.losing_trades.to_string()),
        ("win_rate_pct", format!("{:.2}", summary.win_rate)),
        ("total_pnl", format!("{:.2}", summary.total_pnl)),
        ("average_pnl", format!("{:.2}", summary.average_pnl)),
        ("total_underlying_pnl", format!("{:.2}", summary.total_underlying_pnl)),
        ("max_profit", format!("{:.2}", summary.max_profit)),
        ("max_loss", format!("{:.2}", summary.max_loss)),
        ("max_drawdown", format!("{:.2}", summary.max_drawdown)),
        ("profit_factor", format!("{:.2}", summary.profit_factor)),
        ("average_win", format!("{:.2}", summary.average_win)),
        ("average_loss", format!("{:.2}", summary.average_loss)),
        ("median_win", format!("{:.2}", summary.median_win)),
        ("median_loss", format!("{:.2}", summary.median_loss)),
        ("std_dev_win", format!("{:.2}", summary.std_dev_win)),
        ("std_dev_loss", format!("{:.2}", summary.std_dev_loss)),
    ]
}

/// Two-column `metric,value` table followed by one block per month.
pub fn write_summary<W: Write>(writer: W, summary: &PerformanceSummary) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(writer);
    csv_writer.write_record(["metric", "value"])?;
    for (metric, value) in summary_metrics(summary) {
        csv_writer.write_record([metric, value.as_str()])?;
    }

    if !summary.monthly.is_empty() {
        csv_writer.write_record([
            "month",
            "trades",
            "total_pnl",
            "average_pnl",
            "best_trade",
            "worst_trade",
        ])?;
        for month in &summary.monthly {
            csv_writer.write_record([
                month.month.clone(),
                month.trades.to_string(),
                format!("{:.2}", month.total_pnl),
                format!("{:.2}", month.average_pnl),
                format!("{:.2}", month.best_trade),
                format!("{:.2}", month.worst_trade),
            ])?;
        }
    }
    csv_writer.flush().context("failed to flush summary table")?;
    Ok(())
}

pub fn write_summary_csv(path: &Path, summary: &PerformanceSummary) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_summary(file, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, OptionSide, PriceSource, Trade};
    use crate::performance::PerformanceCalculator;
    use chrono::NaiveDate;

    fn rows() -> Vec<TradeResult> {
        let date = NaiveDate::from_ymd_opt(2025, 11, 19).unwrap();
        let trade = |id: &str| Trade {
            trade_id: id.to_string(),
            direction: Direction::Long,
            entry_timestamp: date.and_hms_opt(9, 30, 0).unwrap(),
            exit_timestamp: date.and_hms_opt(11, 0, 0).unwrap(),
            option_side: OptionSide::Call,
        };
        let quote = |value: f64, h: u32| PriceQuote {
            value,
            source: PriceSource::Live,
            instrument_key: "NSE_FO|C25650".to_string(),
            matched_strike: 25_650.0,
            expiry_used: NaiveDate::from_ymd_opt(2025, 11, 25).unwrap(),
            sample_time: date.and_hms_opt(h, 0, 0).unwrap(),
        };

        let mut ok = TradeResult::pending(&trade("1"));
        ok.expiry_date = NaiveDate::from_ymd_opt(2025, 11, 25);
        ok.strike = Some(25_650.0);
        ok.spot_entry = Some(25_612.0);
        ok.spot_exit = Some(25_700.0);
        ok.entry_quote = Some(quote(100.0, 9));
        ok.exit_quote = Some(quote(140.0, 11));
        ok.pnl_per_lot = Some(40.0);
        ok.pnl_total = Some(2_600.0);
        ok.pnl_underlying = Some(88.0);

        let failed = TradeResult::pending(&trade("2")).into_failed("price unavailable: x".into());
        vec![ok, failed]
    }

    #[test]
    fn result_table_keeps_order_and_blank_cells() {
        let mut buffer = Vec::new();
        write_results(&mut buffer, &rows()).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("trade_id,direction,option_side,entry_timestamp"));
        assert!(lines[0].ends_with("pnl_underlying,error"));
        assert!(lines[1].starts_with("1,LONG,CALL,2025-11-19 09:30:00"));
        assert!(lines[1].contains("LIVE/LIVE"));
        assert!(lines[2].starts_with("2,LONG,CALL"));
        assert!(lines[2].contains(",ERROR,"));
        assert!(lines[2].ends_with("price unavailable: x"));
    }

    #[test]
    fn writes_result_and_summary_files() {
        let dir = tempfile::tempdir().unwrap();
        let results_path = dir.path().join("results.csv");
        let summary_path = dir.path().join("summary.csv");
        let results = rows();

        write_results_csv(&results_path, &results).unwrap();
        let summary = PerformanceCalculator::summarize(&results);
        write_summary_csv(&summary_path, &summary).unwrap();

        let mut reader = csv::Reader::from_path(&results_path).unwrap();
        assert_eq!(reader.records().count(), 2);

        let text = std::fs::read_to_string(&summary_path).unwrap();
        assert!(text.starts_with("metric,value\n"));
        assert!(text.contains("failed_trades,1\n"));
        assert!(text.contains("total_pnl,2600.00\n"));
        assert!(text.contains("2025-11,1,2600.00"));
    }
}
