use crate::config::{DataInterval, RunConfig};
use crate::error::{BacktestError, GatewayError};
use crate::market_data::{match_contract, nearest_market_sample, CandleRequest, MarketDataGateway};
use crate::models::{OptionContract, OptionSide, PriceQuote, PriceSource, ResolvedContract};
use crate::retry::{RetryExhausted, RetryPolicy};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use dashmap::DashMap;
use log::{debug, info, warn};
use std::sync::Arc;

/// Strike in hundredths, so it can key a hash map.
type StrikeKey = i64;

fn strike_key(strike: f64) -> StrikeKey {
    (strike * 100.0).round() as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct QuoteKey {
    timestamp: NaiveDateTime,
    expiry: NaiveDate,
    strike: StrikeKey,
    side: OptionSide,
}

struct SampledPrice {
    value: f64,
    sample_time: NaiveDateTime,
}

/// Resolves spot and option prices for trade legs.
///
/// Owns read-through caches for live instrument lookups, archived contract
/// listings and finished quotes. The caches are insert-if-absent maps, so
/// one resolver can be shared by parallel workers.
pub struct PriceResolver<G> {
    gateway: G,
    underlying_key: String,
    interval: DataInterval,
    today: NaiveDate,
    retry: RetryPolicy,
    live_instruments: DashMap<(NaiveDate, StrikeKey, OptionSide), OptionContract>,
    expired_contracts: DashMap<NaiveDate, Arc<Vec<OptionContract>>>,
    quotes: DashMap<QuoteKey, PriceQuote>,
    spots: DashMap<NaiveDateTime, f64>,
}

impl<G: MarketDataGateway> PriceResolver<G> {
    /// `today` decides whether an expiry is served from live or archived data.
    pub fn new(gateway: G, config: &RunConfig, today: NaiveDate, retry: RetryPolicy) -> Self {
        Self {
            gateway,
            underlying_key: config.underlying_key.clone(),
            interval: config.data_interval,
            today,
            retry,
            live_instruments: DashMap::new(),
            expired_contracts: DashMap::new(),
            quotes: DashMap::new(),
            spots: DashMap::new(),
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Underlying index level at the market-hours sample nearest `timestamp`.
    pub fn get_spot_price(&self, timestamp: NaiveDateTime) -> Result<f64, BacktestError> {
        if let Some(cached) = self.spots.get(&timestamp) {
            return Ok(*cached);
        }

        let context = format!("{} spot @ {}", self.underlying_key, timestamp);
        let sampled = self
            .retry
            .run(&context, || {
                let request =
                    CandleRequest::around(&self.underlying_key, timestamp, self.interval, false);
                self.sample_price(&request, timestamp)
            })
            .map_err(|exhausted| leg_failure(&context, exhausted))?;

        let value = *self.spots.entry(timestamp).or_insert(sampled.value);
        Ok(value)
    }

    /// Option price for one trade leg, with provenance.
    ///
    /// Expiries before `today` are served from the expired-instrument
    /// archive, everything else from the live chain. Transient failures are
    /// retried per the injected policy; a leg that still fails surfaces as
    /// `PriceUnavailable`.
    pub fn resolve_price(
        &self,
        timestamp: NaiveDateTime,
        contract: &ResolvedContract,
    ) -> Result<PriceQuote, BacktestError> {
        let key = QuoteKey {
            timestamp,
            expiry: contract.expiry_date,
            strike: strike_key(contract.strike),
            side: contract.option_side,
        };
        if let Some(cached) = self.quotes.get(&key) {
            debug!("Using cached quote for {}", describe(contract, timestamp));
            return Ok(cached.clone());
        }

        let expired = contract.expiry_date < self.today;
        if expired && timestamp.date() > contract.expiry_date {
            return Err(BacktestError::ExpiryBoundaryViolation {
                timestamp,
                expiry: contract.expiry_date,
            });
        }

        let context = describe(contract, timestamp);
        let quote = self
            .retry
            .run(&context, || {
                if expired {
                    self.expired_quote(timestamp, contract)
                } else {
                    self.live_quote(timestamp, contract)
                }
            })
            .map_err(|exhausted| leg_failure(&context, exhausted))?;

        let quote = self.quotes.entry(key).or_insert(quote).clone();
        Ok(quote)
    }

    /// Bare option price for a leg.
    pub fn get_option_price(
        &self,
        timestamp: NaiveDateTime,
        expiry_date: NaiveDate,
        strike: f64,
        option_side: OptionSide,
    ) -> Result<f64, BacktestError> {
        let contract = ResolvedContract {
            expiry_date,
            strike,
            option_side,
        };
        self.resolve_price(timestamp, &contract)
            .map(|quote| quote.value)
    }

    fn live_quote(
        &self,
        timestamp: NaiveDateTime,
        contract: &ResolvedContract,
    ) -> Result<PriceQuote, GatewayError> {
        let instrument = self.live_instrument(contract)?;
        let request =
            CandleRequest::around(&instrument.instrument_key, timestamp, self.interval, false);
        let sampled = self.sample_price(&request, timestamp)?;
        Ok(PriceQuote {
            value: sampled.value,
            source: PriceSource::Live,
            instrument_key: instrument.instrument_key,
            matched_strike: instrument.strike,
            expiry_used: contract.expiry_date,
            sample_time: sampled.sample_time,
        })
    }

    fn expired_quote(
        &self,
        timestamp: NaiveDateTime,
        contract: &ResolvedContract,
    ) -> Result<PriceQuote, GatewayError> {
        let (expiry_used, contracts) = self.archived_contracts(contract.expiry_date)?;
        let (instrument, exact) = match_contract(&contracts, contract.strike, contract.option_side)
            .ok_or_else(|| {
                GatewayError::InstrumentNotFound(format!(
                    "no archived {} contracts for expiry {}",
                    contract.option_side.instrument_type(),
                    expiry_used
                ))
            })?;
        if !exact {
            warn!(
                "Strike {} not archived for {} {}; using closest strike {}",
                contract.strike,
                contract.option_side.as_str(),
                expiry_used,
                instrument.strike
            );
        }

        let request =
            CandleRequest::around(&instrument.instrument_key, timestamp, self.interval, true);
        let sampled = self.sample_price(&request, timestamp)?;
        Ok(PriceQuote {
            value: sampled.value,
            source: PriceSource::Expired,
            instrument_key: instrument.instrument_key.clone(),
            matched_strike: instrument.strike,
            expiry_used,
            sample_time: sampled.sample_time,
        })
    }

    fn live_instrument(&self, contract: &ResolvedContract) -> Result<OptionContract, GatewayError> {
        let key = (
            contract.expiry_date,
            strike_key(contract.strike),
            contract.option_side,
        );
        if let Some(cached) = self.live_instruments.get(&key) {
            return Ok(cached.clone());
        }

        debug!("Fetching live option chain for {}", contract.expiry_date);
        let chain = self
            .gateway
            .option_chain(&self.underlying_key, contract.expiry_date)?;
        let (instrument, exact) = match_contract(&chain, contract.strike, contract.option_side)
            .ok_or_else(|| {
                GatewayError::InstrumentNotFound(format!(
                    "no live {} contracts for expiry {}",
                    contract.option_side.instrument_type(),
                    contract.expiry_date
                ))
            })?;
        if !exact {
            warn!(
                "Strike {} not on live chain for {} {}; using closest strike {}",
                contract.strike,
                contract.option_side.as_str(),
                contract.expiry_date,
                instrument.strike
            );
        }

        let instrument = self
            .live_instruments
            .entry(key)
            .or_insert_with(|| instrument.clone())
            .clone();
        Ok(instrument)
    }

    /// Archived listing for `expiry`, or for the following week's expiry
    /// when `expiry` has not been archived yet.
    fn archived_contracts(
        &self,
        expiry: NaiveDate,
    ) -> Result<(NaiveDate, Arc<Vec<OptionContract>>), GatewayError> {
        if let Some(contracts) = self.cached_archive(expiry)? {
            return Ok((expiry, contracts));
        }

        let next_week = expiry + Duration::days(7);
        warn!(
            "No expired contracts for {}; trying next-week expiry {}",
            expiry, next_week
        );
        if let Some(contracts) = self.cached_archive(next_week)? {
            return Ok((next_week, contracts));
        }

        Err(GatewayError::NotArchived(expiry))
    }

    fn cached_archive(
        &self,
        expiry: NaiveDate,
    ) -> Result<Option<Arc<Vec<OptionContract>>>, GatewayError> {
        if let Some(cached) = self.expired_contracts.get(&expiry) {
            return Ok(Some(Arc::clone(&cached)));
        }

        debug!("Fetching expired contracts for {}", expiry);
        let contracts = self
            .gateway
            .expired_contracts(&self.underlying_key, expiry)?;
        if contracts.is_empty() {
            return Ok(None);
        }
        info!("Loaded {} expired contracts for {}", contracts.len(), expiry);

        let contracts = self
            .expired_contracts
            .entry(expiry)
            .or_insert_with(|| Arc::new(contracts))
            .clone();
        Ok(Some(contracts))
    }

    fn sample_price(
        &self,
        request: &CandleRequest,
        timestamp: NaiveDateTime,
    ) -> Result<SampledPrice, GatewayError> {
        let candles = self.gateway.candles(request)?;
        if candles.is_empty() {
            return Err(GatewayError::EmptyResponse(request.instrument_key.clone()));
        }

        let sample = nearest_market_sample(&candles, timestamp)
            .ok_or_else(|| GatewayError::NoMarketHoursData(request.instrument_key.clone()))?;
        debug!(
            "{} {}: O={:.2} H={:.2} L={:.2} C={:.2}",
            request.instrument_key,
            sample.timestamp.format("%H:%M"),
            sample.open,
            sample.high,
            sample.low,
            sample.close
        );

        if !sample.close.is_finite() || sample.close <= 0.0 {
            return Err(GatewayError::InvalidPrice {
                value: sample.close,
                context: request.instrument_key.clone(),
            });
        }

        Ok(SampledPrice {
            value: sample.close,
            sample_time: sample.timestamp,
        })
    }
}

fn describe(contract: &ResolvedContract, timestamp: NaiveDateTime) -> String {
    format!(
        "{} {} exp {} @ {}",
        contract.option_side.as_str(),
        contract.strike,
        contract.expiry_date,
        timestamp
    )
}

fn leg_failure(context: &str, exhausted: RetryExhausted) -> BacktestError {
    BacktestError::PriceUnavailable(format!(
        "{}: {} (after {} attempt{})",
        context,
        exhausted.last_error,
        exhausted.attempts,
        if exhausted.attempts == 1 { "" } else { "s" }
    ))
}
