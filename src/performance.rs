use crate::models::TradeResult;
use serde::Serialize;
use statrs::statistics::Statistics;
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyPerformance {
    /// `YYYY-MM` of the entry date.
    pub month: String,
    pub trades: usize,
    pub total_pnl: f64,
    pub average_pnl: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawdownCurve {
    pub cumulative: Vec<f64>,
    pub running_max: Vec<f64>,
    pub drawdown: Vec<f64>,
    /// Most negative drawdown, 0 for an empty or never-falling curve.
    pub max_drawdown: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub total_trades: usize,
    pub successful_trades: usize,
    pub failed_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub average_pnl: f64,
    pub total_underlying_pnl: f64,
    pub max_profit: f64,
    pub max_loss: f64,
    pub max_drawdown: f64,
    pub profit_factor: f64,
    pub average_win: f64,
    pub average_loss: f64,
    pub median_win: f64,
    pub median_loss: f64,
    pub std_dev_win: f64,
    pub std_dev_loss: f64,
    pub cumulative_pnl: Vec<f64>,
    pub drawdown: Vec<f64>,
    pub monthly: Vec<MonthlyPerformance>,
}

pub struct PerformanceCalculator;

impl PerformanceCalculator {
    /// Reduces a result table to summary statistics.
    ///
    /// Failed rows count toward `total_trades` and `failed_trades` only.
    /// A trade with positive total P&L is a win; zero or negative is a loss.
    pub fn summarize(results: &[TradeResult]) -> PerformanceSummary {
        let successful: Vec<&TradeResult> = results
            .iter()
            .filter(|result| result.is_success())
            .collect();
        let pnls: Vec<f64> = successful
            .iter()
            .map(|result| result.pnl_total.unwrap_or(0.0))
            .collect();
        let winners: Vec<f64> = pnls.iter().copied().filter(|pnl| *pnl > 0.0).collect();
        let losers: Vec<f64> = pnls.iter().copied().filter(|pnl| *pnl <= 0.0).collect();

        let total_pnl: f64 = pnls.iter().sum();
        let total_underlying_pnl: f64 = successful
            .iter()
            .filter_map(|result| result.pnl_underlying)
            .sum();
        let win_rate = if pnls.is_empty() {
            0.0
        } else {
            winners.len() as f64 / pnls.len() as f64 * 100.0
        };

        let curve = Self::drawdown_curve(&pnls);

        PerformanceSummary {
            total_trades: results.len(),
            successful_trades: successful.len(),
            failed_trades: results.len() - successful.len(),
            winning_trades: winners.len(),
            losing_trades: losers.len(),
            win_rate,
            total_pnl,
            average_pnl: Self::average(&pnls),
            total_underlying_pnl,
            max_profit: Self::max(&pnls),
            max_loss: Self::min(&pnls),
            max_drawdown: curve.max_drawdown,
            profit_factor: Self::profit_factor(&winners, &losers),
            average_win: Self::average(&winners),
            average_loss: Self::average(&losers),
            median_win: Self::median(&winners),
            median_loss: Self::median(&losers),
            std_dev_win: Self::std_dev(&winners),
            std_dev_loss: Self::std_dev(&losers),
            cumulative_pnl: curve.cumulative,
            drawdown: curve.drawdown,
            monthly: Self::monthly_breakdown(&successful),
        }
    }

    /// Cumulative sum of `pnls` with its running maximum and the drawdown
    /// `cumulative[i] - max(cumulative[0..=i])`.
    pub fn drawdown_curve(pnls: &[f64]) -> DrawdownCurve {
        let mut cumulative = Vec::with_capacity(pnls.len());
        let mut running = 0.0;
        for pnl in pnls {
            running += pnl;
            cumulative.push(running);
        }
        Self::drawdown_from_cumulative(cumulative)
    }

    pub fn drawdown_from_cumulative(cumulative: Vec<f64>) -> DrawdownCurve {
        let mut running_max = Vec::with_capacity(cumulative.len());
        let mut drawdown = Vec::with_capacity(cumulative.len());
        let mut peak = f64::NEG_INFINITY;
        let mut max_drawdown: f64 = 0.0;

        for value in &cumulative {
            peak = peak.max(*value);
            let dd = value - peak;
            running_max.push(peak);
            drawdown.push(dd);
            max_drawdown = max_drawdown.min(dd);
        }

        DrawdownCurve {
            cumulative,
            running_max,
            drawdown,
            max_drawdown,
        }
    }

    fn monthly_breakdown(successful: &[&TradeResult]) -> Vec<MonthlyPerformance> {
        let mut by_month: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for result in successful {
            let month = result.entry_timestamp.format("%Y-%m").to_string();
            by_month
                .entry(month)
                .or_default()
                .push(result.pnl_total.unwrap_or(0.0));
        }

        by_month
            .into_iter()
            .map(|(month, pnls)| MonthlyPerformance {
                month,
                trades: pnls.len(),
                total_pnl: pnls.iter().sum(),
                average_pnl: Self::average(&pnls),
                best_trade: Self::max(&pnls),
                worst_trade: Self::min(&pnls),
            })
            .collect()
    }

    /// Gross profit over gross loss; 0 when nothing was lost.
    fn profit_factor(winners: &[f64], losers: &[f64]) -> f64 {
        let gross_profit: f64 = winners.iter().sum();
        let gross_loss: f64 = losers.iter().sum::<f64>().abs();
        if gross_loss <= f64::EPSILON {
            0.0
        } else {
            gross_profit / gross_loss
        }
    }

    fn max(values: &[f64]) -> f64 {
        values
            .iter()
            .copied()
            .filter(|value| value.is_finite())
            .max_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
            .unwrap_or(0.0)
    }

    fn min(values: &[f64]) -> f64 {
        values
            .iter()
            .copied()
            .filter(|value| value.is_finite())
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
            .unwrap_or(0.0)
    }

    fn average(values: &[f64]) -> f64 {
        let mut sum = 0.0;
        let mut count = 0usize;

        for value in values.iter().copied() {
            if value.is_finite() {
                sum += value;
                count += 1;
            }
        }

        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    fn median(values: &[f64]) -> f64 {
        let mut filtered: Vec<f64> = values
            .iter()
            .copied()
            .filter(|value| value.is_finite())
            .collect();

        if filtered.is_empty() {
            return 0.0;
        }

        filtered.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let mid = filtered.len() / 2;

        if filtered.len() % 2 == 0 {
            (filtered[mid - 1] + filtered[mid]) / 2.0
        } else {
            filtered[mid]
        }
    }

    /// Sample standard deviation; 0 with fewer than two values.
    fn std_dev(values: &[f64]) -> f64 {
        if values.len() < 2 {
            return 0.0;
        }
        let std_dev = values.std_dev();
        if std_dev.is_finite() {
            std_dev
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, OptionSide, Trade};
    use chrono::NaiveDate;

    fn result(id: &str, month: u32, pnl_total: Option<f64>) -> TradeResult {
        let date = NaiveDate::from_ymd_opt(2025, month, 10).unwrap();
        let trade = Trade {
            trade_id: id.to_string(),
            direction: Direction::Long,
            entry_timestamp: date.and_hms_opt(9, 30, 0).unwrap(),
            exit_timestamp: date.and_hms_opt(14, 0, 0).unwrap(),
            option_side: OptionSide::Call,
        };
        let row = TradeResult::pending(&trade);
        match pnl_total {
            Some(total) => TradeResult {
                pnl_per_lot: Some(total / 65.0),
                pnl_total: Some(total),
                pnl_underlying: Some(total / 10.0),
                ..row
            },
            None => row.into_failed("price unavailable".to_string()),
        }
    }

    #[test]
    fn drawdown_tracks_running_maximum() {
        let curve = PerformanceCalculator::drawdown_from_cumulative(vec![100.0, 80.0, 120.0, 90.0]);
        assert_eq!(curve.running_max, vec![100.0, 100.0, 120.0, 120.0]);
        assert_eq!(curve.drawdown, vec![0.0, -20.0, 0.0, -30.0]);
        assert_eq!(curve.max_drawdown, -30.0);

        let from_pnls = PerformanceCalculator::drawdown_curve(&[100.0, -20.0, 40.0, -30.0]);
        assert_eq!(from_pnls.cumulative, vec![100.0, 80.0, 120.0, 90.0]);
        assert_eq!(from_pnls.max_drawdown, -30.0);
    }

    #[test]
    fn failed_rows_count_in_totals_only() {
        let results = vec![
            result("1", 10, Some(650.0)),
            result("2", 10, Some(-130.0)),
            result("3", 11, None),
            result("4", 11, Some(0.0)),
            result("5", 11, Some(1_300.0)),
        ];
        let summary = PerformanceCalculator::summarize(&results);

        assert_eq!(summary.total_trades, 5);
        assert_eq!(summary.successful_trades, 4);
        assert_eq!(summary.failed_trades, 1);
        assert_eq!(summary.winning_trades, 2);
        assert_eq!(summary.losing_trades, 2);
        assert_eq!(summary.win_rate, 50.0);
        assert_eq!(summary.total_pnl, 1_820.0);
        assert_eq!(summary.average_pnl, 455.0);
        assert_eq!(summary.max_profit, 1_300.0);
        assert_eq!(summary.max_loss, -130.0);
        assert_eq!(summary.cumulative_pnl, vec![650.0, 520.0, 520.0, 1_820.0]);
        assert_eq!(summary.max_drawdown, -130.0);
        assert!((summary.total_underlying_pnl - 182.0).abs() < 1e-9);
    }

    #[test]
    fn winner_and_loser_statistics() {
        let results = vec![
            result("1", 10, Some(100.0)),
            result("2", 10, Some(300.0)),
            result("3", 10, Some(-50.0)),
            result("4", 10, Some(-150.0)),
        ];
        let summary = PerformanceCalculator::summarize(&results);
        assert_eq!(summary.profit_factor, 2.0);
        assert_eq!(summary.average_win, 200.0);
        assert_eq!(summary.average_loss, -100.0);
        assert_eq!(summary.median_win, 200.0);
        assert!((summary.std_dev_win - 141.421_356).abs() < 1e-5);
        assert!((summary.std_dev_loss - 70.710_678).abs() < 1e-5);
    }

    #[test]
    fn profit_factor_is_zero_without_losses() {
        let results = vec![result("1", 10, Some(100.0))];
        let summary = PerformanceCalculator::summarize(&results);
        assert_eq!(summary.profit_factor, 0.0);
        assert_eq!(summary.std_dev_win, 0.0);
        assert_eq!(summary.max_drawdown, 0.0);
    }

    #[test]
    fn groups_by_entry_month() {
        let results = vec![
            result("1", 11, Some(50.0)),
            result("2", 10, Some(100.0)),
            result("3", 11, Some(-20.0)),
            result("4", 11, None),
        ];
        let summary = PerformanceCalculator::summarize(&results);
        assert_eq!(summary.monthly.len(), 2);
        assert_eq!(summary.monthly[0].month, "2025-10");
        assert_eq!(summary.monthly[0].trades, 1);
        assert_eq!(summary.monthly[1].month, "2025-11");
        assert_eq!(summary.monthly[1].trades, 2);
        assert_eq!(summary.monthly[1].total_pnl, 30.0);
        assert_eq!(summary.monthly[1].best_trade, 50.0);
        assert_eq!(summary.monthly[1].worst_trade, -20.0);
    }

    #[test]
    fn empty_table_summarizes_to_zeros() {
        let summary = PerformanceCalculator::summarize(&[]);
        assert_eq!(summary.total_trades, 0);
        assert_eq!(summary.win_rate, 0.0);
        assert_eq!(summary.max_drawdown, 0.0);
        assert!(summary.monthly.is_empty());
    }
}
