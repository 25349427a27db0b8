use crate::signals::{load_signals_file, pair_trades};
use anyhow::Result;
use log::info;
use std::path::Path;

pub fn run(signals: &Path) -> Result<()> {
    let rows = load_signals_file(signals)?;
    let trades = pair_trades(&rows)?;
    info!("{} signal row(s) paired into {} trade(s)", rows.len(), trades.len());

    println!("trade_id,direction,option_side,entry,exit");
    for trade in &trades {
        println!(
            "{},{},{},{},{}",
            trade.trade_id,
            trade.direction.as_str(),
            trade.option_side.as_str(),
            trade.entry_timestamp.format("%Y-%m-%d %H:%M:%S"),
            trade.exit_timestamp.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}
