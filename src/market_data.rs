//! Boundary to the upstream market data provider.
//!
//! The gateway exposes raw listings and candle history; choosing between
//! live and archived data, retrying and caching belong to the price
//! resolver in [`crate::pricing`].

use crate::config::DataInterval;
use crate::error::GatewayError;
use crate::models::{Candle, OptionContract, OptionSide};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Regular session of the index derivatives segment, exchange-local time.
pub const MARKET_OPEN: (u32, u32) = (9, 15);
pub const MARKET_CLOSE: (u32, u32) = (15, 30);

const STRIKE_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandleRequest {
    pub instrument_key: String,
    pub interval: DataInterval,
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Read from the expired-instrument archive instead of live history.
    pub archived: bool,
}

impl CandleRequest {
    /// Window covering the requested day and the session before it.
    pub fn around(
        instrument_key: &str,
        timestamp: NaiveDateTime,
        interval: DataInterval,
        archived: bool,
    ) -> Self {
        let to = timestamp.date();
        let from = to.pred_opt().unwrap_or(to);
        Self {
            instrument_key: instrument_key.to_string(),
            interval,
            from,
            to,
            archived,
        }
    }
}

pub trait MarketDataGateway: Send + Sync {
    /// Contracts currently listed for `expiry` on the live option chain.
    fn option_chain(
        &self,
        underlying_key: &str,
        expiry: NaiveDate,
    ) -> Result<Vec<OptionContract>, GatewayError>;

    /// Contracts archived for an expiry that has already passed. An empty
    /// list means the exchange has not archived that expiry yet.
    fn expired_contracts(
        &self,
        underlying_key: &str,
        expiry: NaiveDate,
    ) -> Result<Vec<OptionContract>, GatewayError>;

    fn candles(&self, request: &CandleRequest) -> Result<Vec<Candle>, GatewayError>;
}

pub fn is_market_hours(timestamp: NaiveDateTime) -> bool {
    let open = NaiveTime::from_hms_opt(MARKET_OPEN.0, MARKET_OPEN.1, 0);
    let close = NaiveTime::from_hms_opt(MARKET_CLOSE.0, MARKET_CLOSE.1, 59);
    match (open, close) {
        (Some(open), Some(close)) => {
            let time = timestamp.time();
            time >= open && time <= close
        }
        _ => false,
    }
}

/// Market-hours candle closest to `target`. Ties keep the earlier sample.
pub fn nearest_market_sample(candles: &[Candle], target: NaiveDateTime) -> Option<&Candle> {
    candles
        .iter()
        .filter(|candle| is_market_hours(candle.timestamp))
        .min_by_key(|candle| {
            let distance = (candle.timestamp - target).num_seconds().abs();
            (distance, candle.timestamp)
        })
}

/// Listed contract for `strike` on `side`, falling back to the closest
/// listed strike of the same side. The flag is true on an exact match.
pub fn match_contract(
    contracts: &[OptionContract],
    strike: f64,
    side: OptionSide,
) -> Option<(&OptionContract, bool)> {
    let same_side = contracts.iter().filter(|contract| contract.side == side);

    if let Some(exact) = same_side
        .clone()
        .find(|contract| (contract.strike - strike).abs() < STRIKE_TOLERANCE)
    {
        return Some((exact, true));
    }

    same_side
        .min_by(|a, b| {
            let da = (a.strike - strike).abs();
            let db = (b.strike - strike).abs();
            da.partial_cmp(&db)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.strike.partial_cmp(&b.strike).unwrap_or(std::cmp::Ordering::Equal))
        })
        .map(|contract| (contract, false))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 19)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn candle(h: u32, m: u32, close: f64) -> Candle {
        Candle {
            timestamp: ts(h, m),
            open: close,
            high: close,
            low: close,
            close,
            volume: 100.0,
            open_interest: 0.0,
        }
    }

    fn contract(strike: f64, side: OptionSide) -> OptionContract {
        OptionContract {
            instrument_key: format!("NSE_FO|{}{}", strike, side.instrument_type()),
            trading_symbol: None,
            strike,
            side,
            expiry: NaiveDate::from_ymd_opt(2025, 11, 25).unwrap(),
        }
    }

    #[test]
    fn market_hours_are_inclusive() {
        assert!(is_market_hours(ts(9, 15)));
        assert!(is_market_hours(ts(15, 30)));
        assert!(!is_market_hours(ts(9, 14)));
        assert!(!is_market_hours(ts(15, 31)));
    }

    #[test]
    fn picks_closest_market_hours_sample() {
        let candles = vec![
            candle(9, 10, 1.0),
            candle(10, 39, 2.0),
            candle(10, 42, 3.0),
            candle(15, 45, 4.0),
        ];
        let picked = nearest_market_sample(&candles, ts(10, 40)).unwrap();
        assert_eq!(picked.close, 2.0);

        // Pre-open candle is closer but excluded.
        let picked = nearest_market_sample(&candles, ts(9, 0)).unwrap();
        assert_eq!(picked.close, 2.0);
    }

    #[test]
    fn no_sample_when_all_outside_session() {
        let candles = vec![candle(8, 0, 1.0), candle(16, 0, 2.0)];
        assert!(nearest_market_sample(&candles, ts(10, 0)).is_none());
    }

    #[test]
    fn candle_window_spans_previous_day() {
        let request = CandleRequest::around("KEY", ts(10, 0), DataInterval::OneMinute, false);
        assert_eq!(request.to, NaiveDate::from_ymd_opt(2025, 11, 19).unwrap());
        assert_eq!(request.from, NaiveDate::from_ymd_opt(2025, 11, 18).unwrap());
    }

    #[test]
    fn matches_exact_then_closest_strike_on_same_side() {
        let contracts = vec![
            contract(25_500.0, OptionSide::Call),
            contract(25_600.0, OptionSide::Put),
            contract(25_700.0, OptionSide::Call),
        ];

        let (found, exact) = match_contract(&contracts, 25_700.0, OptionSide::Call).unwrap();
        assert!(exact);
        assert_eq!(found.strike, 25_700.0);

        let (found, exact) = match_contract(&contracts, 25_650.0, OptionSide::Call).unwrap();
        assert!(!exact);
        assert_eq!(found.strike, 25_700.0);

        let (found, _) = match_contract(&contracts, 25_500.0, OptionSide::Put).unwrap();
        assert_eq!(found.strike, 25_600.0);

        assert!(match_contract(&[], 25_500.0, OptionSide::Put).is_none());
    }
}
