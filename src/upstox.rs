use crate::config::Credentials;
use crate::error::GatewayError;
use crate::http_client::{build_blocking_client, DEFAULT_TIMEOUT};
use crate::market_data::{CandleRequest, MarketDataGateway};
use crate::models::{Candle, OptionContract, OptionSide};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::{debug, info};
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

const MIN_REQUEST_GAP: Duration = Duration::from_millis(250);

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    user_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChainRow {
    strike_price: Option<f64>,
    call_options: Option<Value>,
    put_options: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ExpiredContractRow {
    instrument_key: String,
    trading_symbol: Option<String>,
    strike_price: f64,
    instrument_type: String,
}

#[derive(Debug, Deserialize)]
struct CandleData {
    #[serde(default)]
    candles: Vec<Vec<Value>>,
}

/// Market data gateway backed by the Upstox v2 REST API.
pub struct UpstoxGateway {
    client: Client,
    base_url: Url,
    request_gate: Mutex<Option<Instant>>,
}

impl UpstoxGateway {
    pub fn new(credentials: &Credentials) -> Result<Self> {
        Self::with_timeout(credentials, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(credentials: &Credentials, timeout: Duration) -> Result<Self> {
        let client = build_blocking_client(Some(timeout), &credentials.access_token)?;
        let base_url = Url::parse(&credentials.base_url)
            .with_context(|| format!("invalid API base URL {}", credentials.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("API base URL {} cannot carry a path", credentials.base_url);
        }
        Ok(Self {
            client,
            base_url,
            request_gate: Mutex::new(None),
        })
    }

    /// Validates the token against the profile endpoint and returns the
    /// account holder's name.
    pub fn check_connection(&self) -> Result<String, GatewayError> {
        let url = self.endpoint(&["user", "profile"]);
        let profile: Profile = self.get_json(url, "user profile")?;
        let name = profile.user_name.unwrap_or_else(|| "Unknown".to_string());
        info!("Connected to Upstox as {}", name);
        Ok(name)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn throttle(&self) {
        if let Ok(mut guard) = self.request_gate.lock() {
            if let Some(last) = *guard {
                let elapsed = last.elapsed();
                if elapsed < MIN_REQUEST_GAP {
                    thread::sleep(MIN_REQUEST_GAP - elapsed);
                }
            }
            *guard = Some(Instant::now());
        }
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url, context: &str) -> Result<T, GatewayError> {
        self.throttle();
        debug!("GET {}", url);
        let response = self.client.get(url).send()?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                context: context.to_string(),
            });
        }
        let envelope: Envelope<T> = response.json()?;
        envelope
            .data
            .ok_or_else(|| GatewayError::Decode(format!("{}: response has no data", context)))
    }
}

impl MarketDataGateway for UpstoxGateway {
    fn option_chain(
        &self,
        underlying_key: &str,
        expiry: NaiveDate,
    ) -> Result<Vec<OptionContract>, GatewayError> {
        let mut url = self.endpoint(&["option", "chain"]);
        url.query_pairs_mut()
            .append_pair("instrument_key", underlying_key)
            .append_pair("expiry_date", &expiry.format("%Y-%m-%d").to_string());
        let rows: Vec<ChainRow> = self.get_json(url, &format!("option chain {}", expiry))?;
        Ok(chain_contracts(rows, expiry))
    }

    fn expired_contracts(
        &self,
        underlying_key: &str,
        expiry: NaiveDate,
    ) -> Result<Vec<OptionContract>, GatewayError> {
        let mut url = self.endpoint(&["expired-instruments", "option", "contract"]);
        url.query_pairs_mut()
            .append_pair("instrument_key", underlying_key)
            .append_pair("expiry_date", &expiry.format("%Y-%m-%d").to_string());
        let rows: Vec<ExpiredContractRow> =
            self.get_json(url, &format!("expired contracts {}", expiry))?;
        Ok(expired_contracts_from_rows(rows, expiry))
    }

    fn candles(&self, request: &CandleRequest) -> Result<Vec<Candle>, GatewayError> {
        let to = request.to.format("%Y-%m-%d").to_string();
        let from = request.from.format("%Y-%m-%d").to_string();
        let mut segments = Vec::with_capacity(6);
        if request.archived {
            segments.push("expired-instruments");
        }
        segments.extend([
            "historical-candle",
            request.instrument_key.as_str(),
            request.interval.as_api_str(),
            to.as_str(),
            from.as_str(),
        ]);
        let url = self.endpoint(&segments);

        let data: CandleData =
            self.get_json(url, &format!("candles {}", request.instrument_key))?;
        let candles = parse_candles(&data.candles)?;
        debug!(
            "Got {} candle(s) for {} from {} to {}",
            candles.len(),
            request.instrument_key,
            from,
            to
        );
        Ok(candles)
    }
}

/// Flattens option chain rows. A side's payload is either an object or a
/// list of objects carrying an `instrument_key`.
fn chain_contracts(rows: Vec<ChainRow>, expiry: NaiveDate) -> Vec<OptionContract> {
    let mut contracts = Vec::new();
    for row in rows {
        let Some(strike) = row.strike_price.filter(|strike| strike.is_finite()) else {
            continue;
        };
        for (side, payload) in [
            (OptionSide::Call, row.call_options.as_ref()),
            (OptionSide::Put, row.put_options.as_ref()),
        ] {
            if let Some(instrument_key) = payload.and_then(instrument_key_of) {
                contracts.push(OptionContract {
                    instrument_key,
                    trading_symbol: None,
                    strike,
                    side,
                    expiry,
                });
            }
        }
    }
    contracts
}

fn instrument_key_of(payload: &Value) -> Option<String> {
    let object = match payload {
        Value::Array(items) => items.first()?,
        other => other,
    };
    object
        .get("instrument_key")
        .and_then(Value::as_str)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
}

fn expired_contracts_from_rows(
    rows: Vec<ExpiredContractRow>,
    expiry: NaiveDate,
) -> Vec<OptionContract> {
    rows.into_iter()
        .filter_map(|row| {
            let side = match row.instrument_type.trim().to_ascii_uppercase().as_str() {
                "CE" => OptionSide::Call,
                "PE" => OptionSide::Put,
                _ => return None,
            };
            Some(OptionContract {
                instrument_key: row.instrument_key,
                trading_symbol: row.trading_symbol,
                strike: row.strike_price,
                side,
                expiry,
            })
        })
        .collect()
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.naive_local())
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").ok())
}

fn number(row: &[Value], index: usize) -> f64 {
    row.get(index).and_then(Value::as_f64).unwrap_or(0.0)
}

/// Candle rows are `[timestamp, open, high, low, close, volume, oi]`.
fn parse_candles(rows: &[Vec<Value>]) -> Result<Vec<Candle>, GatewayError> {
    rows.iter()
        .map(|row| {
            let raw_ts = row
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| GatewayError::Decode("candle row without timestamp".to_string()))?;
            let timestamp = parse_timestamp(raw_ts).ok_or_else(|| {
                GatewayError::Decode(format!("invalid candle timestamp {}", raw_ts))
            })?;
            let close = row
                .get(4)
                .and_then(Value::as_f64)
                .ok_or_else(|| GatewayError::Decode(format!("candle {} has no close", raw_ts)))?;
            Ok(Candle {
                timestamp,
                open: number(row, 1),
                high: number(row, 2),
                low: number(row, 3),
                close,
                volume: number(row, 5),
                open_interest: number(row, 6),
            })
        })
        .collect()
}
