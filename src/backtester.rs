use crate::config::RunConfig;
use crate::error::BacktestError;
use crate::expiry::resolve_expiry;
use crate::market_data::MarketDataGateway;
use crate::models::{OptionSide, ResolvedContract, Trade, TradeResult};
use crate::pricing::PriceResolver;
use crate::progress::RunStatus;
use crate::strike::select_strike;
use log::{debug, info, warn};
use rayon::prelude::*;
use uuid::Uuid;

/// Realised P&L of one long option position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradePnl {
    pub per_lot: f64,
    pub total: f64,
    pub underlying: f64,
}

/// Both legs are bought options, so option P&L is exit minus entry for
/// calls and puts alike. The underlying move is signed by side.
pub fn compute_pnl(
    side: OptionSide,
    entry_price: f64,
    exit_price: f64,
    spot_entry: f64,
    spot_exit: f64,
    lot_size: u32,
) -> TradePnl {
    let per_lot = exit_price - entry_price;
    let underlying = match side {
        OptionSide::Call => spot_exit - spot_entry,
        OptionSide::Put => spot_entry - spot_exit,
    };
    TradePnl {
        per_lot,
        total: per_lot * lot_size as f64,
        underlying,
    }
}

#[derive(Debug, Clone)]
pub struct BacktestRun {
    pub run_id: Uuid,
    /// One row per input trade, in input order.
    pub results: Vec<TradeResult>,
}

impl BacktestRun {
    pub fn failed_trade_ids(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|result| !result.is_success())
            .map(|result| result.trade_id.as_str())
            .collect()
    }

    pub fn successful_count(&self) -> usize {
        self.results.iter().filter(|result| result.is_success()).count()
    }
}

pub struct BacktestRunner<G> {
    config: RunConfig,
    resolver: PriceResolver<G>,
}

impl<G: MarketDataGateway> BacktestRunner<G> {
    pub fn new(config: RunConfig, resolver: PriceResolver<G>) -> Result<Self, BacktestError> {
        if config.lot_size == 0 {
            return Err(BacktestError::invalid_config("lot size must be positive"));
        }
        if !config.strike_interval.is_finite() || config.strike_interval <= 0.0 {
            return Err(BacktestError::invalid_config(format!(
                "strike interval must be > 0 (value: {})",
                config.strike_interval
            )));
        }
        Ok(Self { config, resolver })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn resolver(&self) -> &PriceResolver<G> {
        &self.resolver
    }

    /// Prices every trade. A failing trade yields a row carrying its error;
    /// it never aborts the batch.
    pub fn run(&self, trades: &[Trade], status: &RunStatus) -> Result<BacktestRun, BacktestError> {
        let run_id = Uuid::new_v4();
        let workers = self.config.worker_count();
        info!(
            "Starting run {} over {} trade(s) with {} worker(s)",
            run_id,
            trades.len(),
            workers
        );
        status.start(trades.len());
        status.set_phase("Pricing trades");

        let price = |trade: &Trade| {
            let result = self.process_trade(trade);
            status.record(result.is_success());
            result
        };

        let results: Vec<TradeResult> = if workers <= 1 {
            trades.iter().map(price).collect()
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|err| {
                    BacktestError::invalid_config(format!("cannot start worker pool: {}", err))
                })?;
            pool.install(|| trades.par_iter().map(price).collect())
        };

        status.finish();
        let run = BacktestRun { run_id, results };
        let failed = run.failed_trade_ids();
        if failed.is_empty() {
            info!("Run {} priced all {} trade(s)", run.run_id, run.results.len());
        } else {
            warn!(
                "Run {} finished with {} failed trade(s): {}",
                run.run_id,
                failed.len(),
                failed.join(", ")
            );
        }
        Ok(run)
    }

    /// Expiry, spot, strike, both option legs, then P&L.
    pub fn process_trade(&self, trade: &Trade) -> TradeResult {
        let mut row = TradeResult::pending(trade);
        match self.price_trade(trade, &mut row) {
            Ok(()) => {
                debug!(
                    "Trade {} {} {} @ {:?}: pnl {:?}",
                    trade.trade_id,
                    trade.option_side.as_str(),
                    row.strike.unwrap_or_default(),
                    row.expiry_date,
                    row.pnl_total
                );
                row
            }
            Err(err) => {
                warn!("Trade {} failed: {}", trade.trade_id, err);
                row.into_failed(err.to_string())
            }
        }
    }

    fn price_trade(&self, trade: &Trade, row: &mut TradeResult) -> Result<(), BacktestError> {
        let expiry_date = resolve_expiry(
            trade.entry_timestamp.date(),
            self.config.expiry_weekday,
            self.config.rollover_rule,
        );
        row.expiry_date = Some(expiry_date);

        let spot_entry = self.resolver.get_spot_price(trade.entry_timestamp)?;
        row.spot_entry = Some(spot_entry);

        let strike = select_strike(
            spot_entry,
            trade.option_side,
            self.config.moneyness,
            self.config.strike_interval,
        )?;
        row.strike = Some(strike);

        let contract = ResolvedContract {
            expiry_date,
            strike,
            option_side: trade.option_side,
        };
        let entry_quote = self.resolver.resolve_price(trade.entry_timestamp, &contract)?;
        let exit_quote = self.resolver.resolve_price(trade.exit_timestamp, &contract)?;
        let spot_exit = self.resolver.get_spot_price(trade.exit_timestamp)?;
        row.spot_exit = Some(spot_exit);

        let pnl = compute_pnl(
            trade.option_side,
            entry_quote.value,
            exit_quote.value,
            spot_entry,
            spot_exit,
            self.config.lot_size,
        );
        row.entry_quote = Some(entry_quote);
        row.exit_quote = Some(exit_quote);
        row.pnl_per_lot = Some(pnl.per_lot);
        row.pnl_total = Some(pnl.total);
        row.pnl_underlying = Some(pnl.underlying);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::market_data::CandleRequest;
    use crate::models::{Candle, Direction, OptionContract, PriceSource};
    use crate::retry::RetryPolicy;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::collections::HashMap;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 19).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        day().and_hms_opt(h, m, 0).unwrap()
    }

    /// Every instrument closes at `base + minutes since open`, sampled
    /// every 15 minutes.
    struct RampGateway {
        chain: Vec<OptionContract>,
        base: HashMap<String, f64>,
    }

    impl MarketDataGateway for RampGateway {
        fn option_chain(
            &self,
            _underlying_key: &str,
            _expiry: NaiveDate,
        ) -> Result<Vec<OptionContract>, GatewayError> {
            Ok(self.chain.clone())
        }

        fn expired_contracts(
            &self,
            _underlying_key: &str,
            _expiry: NaiveDate,
        ) -> Result<Vec<OptionContract>, GatewayError> {
            Ok(Vec::new())
        }

        fn candles(&self, request: &CandleRequest) -> Result<Vec<Candle>, GatewayError> {
            let Some(base) = self.base.get(&request.instrument_key) else {
                return Err(GatewayError::InstrumentNotFound(request.instrument_key.clone()));
            };
            Ok((0..=375)
                .step_by(15)
                .map(|minute| {
                    let timestamp = at(9, 15) + chrono::Duration::minutes(minute);
                    let close = base + minute as f64;
                    Candle {
                        timestamp,
                        open: close,
                        high: close,
                        low: close,
                        close,
                        volume: 1.0,
                        open_interest: 0.0,
                    }
                })
                .collect())
        }
    }

    fn gateway() -> RampGateway {
        let expiry = NaiveDate::from_ymd_opt(2025, 11, 25).unwrap();
        let chain = vec![
            OptionContract {
                instrument_key: "NSE_FO|C25650".to_string(),
                trading_symbol: None,
                strike: 25_650.0,
                side: OptionSide::Call,
                expiry,
            },
            OptionContract {
                instrument_key: "NSE_FO|P25600".to_string(),
                trading_symbol: None,
                strike: 25_600.0,
                side: OptionSide::Put,
                expiry,
            },
        ];
        let mut base = HashMap::new();
        base.insert("NSE_INDEX|Nifty 50".to_string(), 25_612.0);
        base.insert("NSE_FO|C25650".to_string(), 100.0);
        base.insert("NSE_FO|P25600".to_string(), 300.0);
        RampGateway { chain, base }
    }

    fn trade(id: &str, direction: Direction, entry: NaiveDateTime, exit: NaiveDateTime) -> Trade {
        Trade {
            trade_id: id.to_string(),
            direction,
            entry_timestamp: entry,
            exit_timestamp: exit,
            option_side: direction.option_side(),
        }
    }

    fn runner(config: RunConfig) -> BacktestRunner<RampGateway> {
        let resolver = PriceResolver::new(gateway(), &config, day(), RetryPolicy::immediate(2));
        BacktestRunner::new(config, resolver).unwrap()
    }

    #[test]
    fn pnl_is_exit_minus_entry_for_both_sides() {
        let call = compute_pnl(OptionSide::Call, 100.0, 130.0, 25_600.0, 25_650.0, 65);
        assert_eq!(call.per_lot, 30.0);
        assert_eq!(call.total, 1_950.0);
        assert_eq!(call.underlying, 50.0);

        let put = compute_pnl(OptionSide::Put, 80.0, 60.0, 25_600.0, 25_650.0, 65);
        assert_eq!(put.per_lot, -20.0);
        assert_eq!(put.total, -1_300.0);
        assert_eq!(put.underlying, -50.0);
    }

    #[test]
    fn prices_long_and_short_trades() {
        let runner = runner(RunConfig::default());
        let trades = vec![
            trade("1", Direction::Long, at(9, 30), at(11, 30)),
            trade("2", Direction::Short, at(9, 30), at(10, 30)),
        ];
        let run = runner.run(&trades, &RunStatus::new()).unwrap();
        assert_eq!(run.results.len(), 2);

        let long = &run.results[0];
        assert_eq!(long.strike, Some(25_650.0));
        assert_eq!(long.expiry_date, NaiveDate::from_ymd_opt(2025, 11, 25));
        assert_eq!(long.entry_quote.as_ref().unwrap().value, 115.0);
        assert_eq!(long.exit_quote.as_ref().unwrap().value, 235.0);
        assert_eq!(long.pnl_per_lot, Some(120.0));
        assert_eq!(long.pnl_total, Some(120.0 * 65.0));
        assert_eq!(long.pnl_underlying, Some(120.0));
        assert_eq!(long.data_source(), "LIVE/LIVE");

        let short = &run.results[1];
        assert_eq!(short.strike, Some(25_600.0));
        assert_eq!(short.entry_source(), PriceSource::Live);
        assert_eq!(short.pnl_per_lot, Some(60.0));
        assert_eq!(short.pnl_underlying, Some(-60.0));
    }

    #[test]
    fn one_failing_trade_does_not_abort_batch() {
        let mut trades: Vec<Trade> = (1..=5)
            .map(|i| {
                trade(
                    &i.to_string(),
                    Direction::Long,
                    at(9, 30),
                    at(10, 0) + chrono::Duration::minutes(i * 15),
                )
            })
            .collect();
        trades[2] = trade("3", Direction::Short, at(9, 30), at(10, 45));

        // No history for the put, so trade 3 cannot be priced.
        let mut gateway = gateway();
        gateway.base.remove("NSE_FO|P25600");
        let config = RunConfig::default();
        let resolver = PriceResolver::new(gateway, &config, day(), RetryPolicy::immediate(2));
        let runner = BacktestRunner::new(config, resolver).unwrap();

        let status = RunStatus::new();
        let run = runner.run(&trades, &status).unwrap();
        assert_eq!(run.results.len(), 5);
        let ids: Vec<&str> = run.results.iter().map(|r| r.trade_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
        assert_eq!(run.failed_trade_ids(), vec!["3"]);

        let failed = &run.results[2];
        assert!(failed.error.is_some());
        assert!(failed.entry_quote.is_none());
        assert!(failed.pnl_total.is_none());
        assert_eq!(failed.strike, Some(25_600.0));

        for (i, row) in run.results.iter().enumerate().filter(|(i, _)| *i != 2) {
            assert!(row.is_success(), "row {} failed: {:?}", i, row.error);
            let entry = row.entry_quote.as_ref().unwrap().value;
            let exit = row.exit_quote.as_ref().unwrap().value;
            assert_eq!(row.pnl_total, Some((exit - entry) * 65.0));
        }

        let snapshot = status.snapshot();
        assert_eq!(snapshot.completed_trades, 5);
        assert_eq!(snapshot.failed_trades, 1);
        assert_eq!(snapshot.phase, "Completed");
    }

    #[test]
    fn parallel_run_preserves_input_order() {
        let config = RunConfig {
            jobs: 4,
            ..RunConfig::default()
        };
        let runner = runner(config);
        let trades: Vec<Trade> = (0..12)
            .map(|i| {
                let direction = if i % 2 == 0 { Direction::Long } else { Direction::Short };
                trade(
                    &format!("T{}", i),
                    direction,
                    at(9, 30) + chrono::Duration::minutes(i * 15),
                    at(13, 0),
                )
            })
            .collect();
        let run = runner.run(&trades, &RunStatus::new()).unwrap();
        let ids: Vec<String> = run.results.iter().map(|r| r.trade_id.clone()).collect();
        let expected: Vec<String> = trades.iter().map(|t| t.trade_id.clone()).collect();
        assert_eq!(ids, expected);
        assert_eq!(run.successful_count(), 12);
    }

    #[test]
    fn rejects_zero_lot_size() {
        let config = RunConfig {
            lot_size: 0,
            ..RunConfig::default()
        };
        let resolver = PriceResolver::new(gateway(), &config, day(), RetryPolicy::immediate(1));
        assert!(matches!(
            BacktestRunner::new(config, resolver),
            Err(BacktestError::InvalidConfiguration(_))
        ));
    }
}
