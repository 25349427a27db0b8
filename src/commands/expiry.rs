use crate::config::{parse_weekday, RolloverRule};
use crate::expiry::{next_occurrence, rollover_boundary, resolve_expiry};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::info;

pub fn run(date: &str, expiry_day: &str, rollover: &str) -> Result<()> {
    let entry_date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .with_context(|| format!("date must be YYYY-MM-DD (value: {})", date))?;
    let expiry_weekday = parse_weekday(expiry_day)?;
    let rollover_rule = RolloverRule::parse(rollover)?;

    let expiry = resolve_expiry(entry_date, expiry_weekday, rollover_rule);
    if let RolloverRule::Weekday(rollover_weekday) = rollover_rule {
        info!(
            "Next expiry after {} is {}; rollover boundary is {}",
            entry_date,
            next_occurrence(entry_date, expiry_weekday, false),
            rollover_boundary(entry_date, expiry_weekday, rollover_weekday)
        );
    }
    println!("{}", expiry.format("%Y-%m-%d (%A)"));
    Ok(())
}
