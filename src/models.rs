use anyhow::{anyhow, Result as AnyResult};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalType {
    Entry,
    Exit,
}

impl SignalType {
    pub fn parse(raw: &str) -> AnyResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "entry" => Ok(Self::Entry),
            "exit" => Ok(Self::Exit),
            other => Err(anyhow!("signal type must be Entry or Exit (value: {})", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn parse(raw: &str) -> AnyResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "long" => Ok(Self::Long),
            "short" => Ok(Self::Short),
            other => Err(anyhow!("direction must be Long or Short (value: {})", other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }

    /// Bullish signals buy calls, bearish signals buy puts.
    pub fn option_side(&self) -> OptionSide {
        match self {
            Direction::Long => OptionSide::Call,
            Direction::Short => OptionSide::Put,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionSide {
    Call,
    Put,
}

impl OptionSide {
    pub fn parse(raw: &str) -> AnyResult<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CALL" | "CE" | "C" => Ok(Self::Call),
            "PUT" | "PE" | "P" => Ok(Self::Put),
            other => Err(anyhow!("option side must be CALL or PUT (value: {})", other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OptionSide::Call => "CALL",
            OptionSide::Put => "PUT",
        }
    }

    /// Exchange instrument type code.
    pub fn instrument_type(&self) -> &'static str {
        match self {
            OptionSide::Call => "CE",
            OptionSide::Put => "PE",
        }
    }
}

/// One raw row of a strategy report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub trade_id: String,
    pub signal_type: SignalType,
    pub direction: Direction,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl TradeSignal {
    pub fn timestamp(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

/// An entry signal paired with its exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: String,
    pub direction: Direction,
    pub entry_timestamp: NaiveDateTime,
    pub exit_timestamp: NaiveDateTime,
    pub option_side: OptionSide,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedContract {
    pub expiry_date: NaiveDate,
    pub strike: f64,
    pub option_side: OptionSide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceSource {
    Live,
    Expired,
    /// Reserved for externally estimated prices; the resolver never emits it.
    Calculated,
    Error,
}

impl PriceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSource::Live => "LIVE",
            PriceSource::Expired => "EXPIRED",
            PriceSource::Calculated => "CALCULATED",
            PriceSource::Error => "ERROR",
        }
    }
}

/// A resolved option price together with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub value: f64,
    pub source: PriceSource,
    pub instrument_key: String,
    /// Strike of the instrument actually priced; differs from the requested
    /// strike when the closest listed strike was used.
    pub matched_strike: f64,
    /// Expiry of the instrument actually priced; differs from the requested
    /// expiry when the next-week archive was used.
    pub expiry_used: NaiveDate,
    pub sample_time: NaiveDateTime,
}

/// An option contract listed by the exchange, live or archived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub instrument_key: String,
    pub trading_symbol: Option<String>,
    pub strike: f64,
    pub side: OptionSide,
    pub expiry: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub open_interest: f64,
}

/// One row of the result table. Built once per input trade and never
/// mutated after the runner emits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeResult {
    pub trade_id: String,
    pub direction: Direction,
    pub option_side: OptionSide,
    pub entry_timestamp: NaiveDateTime,
    pub exit_timestamp: NaiveDateTime,
    pub expiry_date: Option<NaiveDate>,
    pub strike: Option<f64>,
    pub spot_entry: Option<f64>,
    pub spot_exit: Option<f64>,
    pub entry_quote: Option<PriceQuote>,
    pub exit_quote: Option<PriceQuote>,
    pub pnl_per_lot: Option<f64>,
    pub pnl_total: Option<f64>,
    pub pnl_underlying: Option<f64>,
    pub error: Option<String>,
}

impl TradeResult {
    pub fn pending(trade: &Trade) -> Self {
        Self {
            trade_id: trade.trade_id.clone(),
            direction: trade.direction,
            option_side: trade.option_side,
            entry_timestamp: trade.entry_timestamp,
            exit_timestamp: trade.exit_timestamp,
            expiry_date: None,
            strike: None,
            spot_entry: None,
            spot_exit: None,
            entry_quote: None,
            exit_quote: None,
            pnl_per_lot: None,
            pnl_total: None,
            pnl_underlying: None,
            error: None,
        }
    }

    /// Marks the row failed. Contract fields that were already resolved are
    /// kept for diagnosis; prices and P&L are cleared.
    pub fn into_failed(mut self, error: String) -> Self {
        self.spot_entry = None;
        self.spot_exit = None;
        self.entry_quote = None;
        self.exit_quote = None;
        self.pnl_per_lot = None;
        self.pnl_total = None;
        self.pnl_underlying = None;
        self.error = Some(error);
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn entry_source(&self) -> PriceSource {
        self.entry_quote
            .as_ref()
            .map(|quote| quote.source)
            .unwrap_or(PriceSource::Error)
    }

    pub fn exit_source(&self) -> PriceSource {
        self.exit_quote
            .as_ref()
            .map(|quote| quote.source)
            .unwrap_or(PriceSource::Error)
    }

    /// Combined provenance of both legs, e.g. `LIVE/LIVE`.
    pub fn data_source(&self) -> String {
        if !self.is_success() {
            return PriceSource::Error.as_str().to_string();
        }
        format!(
            "{}/{}",
            self.entry_source().as_str(),
            self.exit_source().as_str()
        )
    }
}
