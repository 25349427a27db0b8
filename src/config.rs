use crate::error::BacktestError;
use anyhow::{anyhow, Result};
use chrono::Weekday;
use std::env;

pub const DEFAULT_LOT_SIZE: u32 = 65;
pub const DEFAULT_STRIKE_INTERVAL: f64 = 50.0;
pub const DEFAULT_UNDERLYING_KEY: &str = "NSE_INDEX|Nifty 50";
pub const DEFAULT_BASE_URL: &str = "https://api.upstox.com/v2";

const ACCESS_TOKEN_ENV: &str = "UPSTOX_ACCESS_TOKEN";
const API_KEY_ENV: &str = "UPSTOX_API_KEY";
const API_SECRET_ENV: &str = "UPSTOX_API_SECRET";
const BASE_URL_ENV: &str = "UPSTOX_BASE_URL";

type ConfigResult<T> = std::result::Result<T, BacktestError>;

/// Parses a trading weekday name. Weekends never carry an expiry.
pub fn parse_weekday(raw: &str) -> ConfigResult<Weekday> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Ok(Weekday::Mon),
        "tuesday" | "tue" | "tues" => Ok(Weekday::Tue),
        "wednesday" | "wed" => Ok(Weekday::Wed),
        "thursday" | "thu" | "thurs" => Ok(Weekday::Thu),
        "friday" | "fri" => Ok(Weekday::Fri),
        other => Err(BacktestError::invalid_config(format!(
            "weekday must be Monday..Friday (value: {})",
            other
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloverRule {
    NoRollover,
    Weekday(Weekday),
}

impl RolloverRule {
    pub fn parse(raw: &str) -> ConfigResult<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "no rollover" | "no-rollover" | "no_rollover" | "none" => Ok(Self::NoRollover),
            _ => parse_weekday(&normalized).map(Self::Weekday),
        }
    }

    pub fn label(&self) -> String {
        match self {
            RolloverRule::NoRollover => "No rollover".to_string(),
            RolloverRule::Weekday(day) => format!("{:?}", day),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Moneyness {
    Atm,
    Itm1,
    Otm1,
}

impl Moneyness {
    pub fn parse(raw: &str) -> ConfigResult<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ATM" => Ok(Self::Atm),
            "ITM1" => Ok(Self::Itm1),
            "OTM1" => Ok(Self::Otm1),
            other => Err(BacktestError::invalid_config(format!(
                "moneyness must be ATM, ITM1 or OTM1 (value: {})",
                other
            ))),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Moneyness::Atm => "ATM",
            Moneyness::Itm1 => "ITM1",
            Moneyness::Otm1 => "OTM1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataInterval {
    OneMinute,
    FiveMinute,
}

impl DataInterval {
    pub fn parse(raw: &str) -> ConfigResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1minute" | "1-minute" | "1m" | "1min" => Ok(Self::OneMinute),
            "5minute" | "5-minute" | "5m" | "5min" => Ok(Self::FiveMinute),
            other => Err(BacktestError::invalid_config(format!(
                "data interval must be 1minute or 5minute (value: {})",
                other
            ))),
        }
    }

    /// Interval token used in historical candle URLs.
    pub fn as_api_str(&self) -> &'static str {
        match self {
            DataInterval::OneMinute => "1minute",
            DataInterval::FiveMinute => "5minute",
        }
    }
}

/// Unvalidated run settings as they arrive from the command line.
#[derive(Debug, Clone)]
pub struct RawRunConfig {
    pub expiry_weekday: String,
    pub rollover_rule: String,
    pub moneyness_mode: String,
    pub lot_size: i64,
    pub data_interval: String,
    pub strike_interval: f64,
    pub underlying_key: String,
    pub jobs: usize,
}

impl Default for RawRunConfig {
    fn default() -> Self {
        Self {
            expiry_weekday: "Tuesday".to_string(),
            rollover_rule: "No rollover".to_string(),
            moneyness_mode: "ATM".to_string(),
            lot_size: DEFAULT_LOT_SIZE as i64,
            data_interval: "1minute".to_string(),
            strike_interval: DEFAULT_STRIKE_INTERVAL,
            underlying_key: DEFAULT_UNDERLYING_KEY.to_string(),
            jobs: 1,
        }
    }
}

/// Read-only settings for one backtest run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub expiry_weekday: Weekday,
    pub rollover_rule: RolloverRule,
    pub moneyness: Moneyness,
    pub lot_size: u32,
    pub data_interval: DataInterval,
    pub strike_interval: f64,
    pub underlying_key: String,
    /// Worker count; 1 runs trades sequentially, 0 uses one worker per CPU.
    pub jobs: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            expiry_weekday: Weekday::Tue,
            rollover_rule: RolloverRule::NoRollover,
            moneyness: Moneyness::Atm,
            lot_size: DEFAULT_LOT_SIZE,
            data_interval: DataInterval::OneMinute,
            strike_interval: DEFAULT_STRIKE_INTERVAL,
            underlying_key: DEFAULT_UNDERLYING_KEY.to_string(),
            jobs: 1,
        }
    }
}

impl RunConfig {
    pub fn from_raw(raw: &RawRunConfig) -> ConfigResult<Self> {
        let expiry_weekday = parse_weekday(&raw.expiry_weekday)?;
        let rollover_rule = RolloverRule::parse(&raw.rollover_rule)?;
        let moneyness = Moneyness::parse(&raw.moneyness_mode)?;
        let data_interval = DataInterval::parse(&raw.data_interval)?;

        if raw.lot_size <= 0 || raw.lot_size > u32::MAX as i64 {
            return Err(BacktestError::invalid_config(format!(
                "lot size must be a positive integer (value: {})",
                raw.lot_size
            )));
        }
        if !raw.strike_interval.is_finite() || raw.strike_interval <= 0.0 {
            return Err(BacktestError::invalid_config(format!(
                "strike interval must be > 0 (value: {})",
                raw.strike_interval
            )));
        }
        let underlying_key = raw.underlying_key.trim().to_string();
        if underlying_key.is_empty() {
            return Err(BacktestError::invalid_config(
                "underlying instrument key must not be empty",
            ));
        }

        Ok(Self {
            expiry_weekday,
            rollover_rule,
            moneyness,
            lot_size: raw.lot_size as u32,
            data_interval,
            strike_interval: raw.strike_interval,
            underlying_key,
            jobs: raw.jobs,
        })
    }

    pub fn worker_count(&self) -> usize {
        if self.jobs == 0 {
            num_cpus::get().max(1)
        } else {
            self.jobs
        }
    }
}

/// Upstream API credentials. Opaque to the engine; handed to the gateway.
#[derive(Clone)]
pub struct Credentials {
    pub access_token: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub base_url: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        let access_token = env_value(ACCESS_TOKEN_ENV)
            .ok_or_else(|| anyhow!("{} must be set to fetch market data", ACCESS_TOKEN_ENV))?;
        let base_url = env_value(BASE_URL_ENV)
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            access_token,
            api_key: env_value(API_KEY_ENV),
            api_secret: env_value(API_SECRET_ENV),
            base_url,
        })
    }
}

fn env_value(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
