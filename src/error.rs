use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

/// Errors raised while turning signals into priced option trades.
///
/// Only `MalformedTradeData` and `InvalidConfiguration` abort a run; every
/// other variant is captured on the failing trade's result row.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BacktestError {
    #[error("malformed trade data for trade {trade_id}: {reason}")]
    MalformedTradeData { trade_id: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("price unavailable: {0}")]
    PriceUnavailable(String),

    #[error("timestamp {timestamp} is after expiry {expiry}; expired history ends at expiry")]
    ExpiryBoundaryViolation {
        timestamp: NaiveDateTime,
        expiry: NaiveDate,
    },

    #[error("transport error: {0}")]
    Transport(String),
}

impl BacktestError {
    pub fn malformed(trade_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedTradeData {
            trade_id: trade_id.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    /// Structural and configuration errors abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MalformedTradeData { .. } | Self::InvalidConfiguration(_)
        )
    }
}

/// Failures surfaced by a market data gateway.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("API returned status {status} for {context}")]
    Status { status: u16, context: String },

    #[error("invalid response format: {0}")]
    Decode(String),

    #[error("instrument not found: {0}")]
    InstrumentNotFound(String),

    #[error("no contracts archived for expiry {0}")]
    NotArchived(NaiveDate),

    #[error("no candles returned for {0}")]
    EmptyResponse(String),

    #[error("no market-hours data for {0}")]
    NoMarketHoursData(String),

    #[error("invalid price {value} for {context}")]
    InvalidPrice { value: f64, context: String },
}

impl GatewayError {
    /// Whether a second attempt after the cooldown has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Status { .. }
                | Self::Decode(_)
                | Self::EmptyResponse(_)
                | Self::InvalidPrice { .. }
        )
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<GatewayError> for BacktestError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Transport(_) | GatewayError::Status { .. } => {
                BacktestError::Transport(err.to_string())
            }
            other => BacktestError::PriceUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_structural_errors_are_fatal() {
        assert!(BacktestError::malformed("7", "missing exit").is_fatal());
        assert!(BacktestError::invalid_config("bad weekday").is_fatal());
        assert!(!BacktestError::PriceUnavailable("x".into()).is_fatal());
        assert!(!BacktestError::Transport("x".into()).is_fatal());
    }

    #[test]
    fn classifies_transient_gateway_errors() {
        assert!(GatewayError::Transport("reset".into()).is_transient());
        assert!(GatewayError::Status {
            status: 429,
            context: "candles".into()
        }
        .is_transient());
        assert!(GatewayError::EmptyResponse("key".into()).is_transient());
        assert!(!GatewayError::InstrumentNotFound("CE 25600".into()).is_transient());
        assert!(!GatewayError::NoMarketHoursData("key".into()).is_transient());
        let date = NaiveDate::from_ymd_opt(2025, 11, 11).unwrap();
        assert!(!GatewayError::NotArchived(date).is_transient());
    }

    #[test]
    fn transport_failures_map_to_transport_variant() {
        let err: BacktestError = GatewayError::Transport("timeout".into()).into();
        assert!(matches!(err, BacktestError::Transport(_)));
        let err: BacktestError = GatewayError::InstrumentNotFound("PE".into()).into();
        assert!(matches!(err, BacktestError::PriceUnavailable(_)));
    }
}
