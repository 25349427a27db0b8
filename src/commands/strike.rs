use crate::config::Moneyness;
use crate::models::OptionSide;
use crate::strike::{select_strike, strike_ladder};
use anyhow::Result;

pub fn run(spot: f64, side: &str, moneyness: &str, interval: f64) -> Result<()> {
    let side = OptionSide::parse(side)?;
    let moneyness = Moneyness::parse(moneyness)?;
    let strike = select_strike(spot, side, moneyness, interval)?;

    println!("{} {} strike: {}", side.as_str(), moneyness.label(), strike);
    let ladder: Vec<String> = strike_ladder(spot, interval, 3)
        .into_iter()
        .map(|value| {
            if (value - strike).abs() < f64::EPSILON {
                format!("[{}]", value)
            } else {
                value.to_string()
            }
        })
        .collect();
    println!("ladder: {}", ladder.join(" "));
    Ok(())
}
