use crate::config::Moneyness;
use crate::error::BacktestError;
use crate::models::OptionSide;

/// Strikes stepped away from ATM when selecting an in-the-money contract.
const ITM_STEPS: f64 = 2.0;
/// Strikes stepped away from ATM when selecting an out-of-the-money contract.
const OTM_STEPS: f64 = 1.0;

/// Rounds the spot onto the strike grid: up for calls, down for puts.
pub fn atm_strike(spot_price: f64, side: OptionSide, interval: f64) -> f64 {
    let steps = spot_price / interval;
    match side {
        OptionSide::Call => steps.ceil() * interval,
        OptionSide::Put => steps.floor() * interval,
    }
}

pub fn select_strike(
    spot_price: f64,
    side: OptionSide,
    moneyness: Moneyness,
    interval: f64,
) -> Result<f64, BacktestError> {
    if !interval.is_finite() || interval <= 0.0 {
        return Err(BacktestError::invalid_config(format!(
            "strike interval must be > 0 (value: {})",
            interval
        )));
    }
    if !spot_price.is_finite() || spot_price <= 0.0 {
        return Err(BacktestError::PriceUnavailable(format!(
            "cannot select a strike from spot price {}",
            spot_price
        )));
    }

    let atm = atm_strike(spot_price, side, interval);
    let strike = match (moneyness, side) {
        (Moneyness::Atm, _) => atm,
        (Moneyness::Itm1, OptionSide::Call) => atm + ITM_STEPS * interval,
        (Moneyness::Itm1, OptionSide::Put) => atm - ITM_STEPS * interval,
        (Moneyness::Otm1, OptionSide::Call) => atm - OTM_STEPS * interval,
        (Moneyness::Otm1, OptionSide::Put) => atm + OTM_STEPS * interval,
    };
    Ok(strike)
}

/// Strikes around the spot on the call-side grid, ascending.
pub fn strike_ladder(spot_price: f64, interval: f64, strikes_each_side: u32) -> Vec<f64> {
    let atm = atm_strike(spot_price, OptionSide::Call, interval);
    let n = strikes_each_side as i64;
    (-n..=n).map(|i| atm + i as f64 * interval).collect()
}
