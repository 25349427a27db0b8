use crate::error::BacktestError;
use crate::models::{Direction, SignalType, Trade, TradeSignal};
use chrono::{NaiveDate, NaiveTime};
use log::{debug, info};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

/// Column layout of a strategy report export. Extra columns are ignored.
#[derive(Debug, Deserialize)]
struct SignalRow {
    #[serde(rename = "Trade #")]
    trade_id: String,
    #[serde(rename = "Type")]
    signal_type: String,
    #[serde(rename = "Signal")]
    direction: String,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Time")]
    time: String,
}

impl SignalRow {
    fn into_signal(self, row_number: usize) -> Result<TradeSignal, BacktestError> {
        let trade_id = self.trade_id.trim().to_string();
        let label = if trade_id.is_empty() {
            format!("row {}", row_number)
        } else {
            trade_id.clone()
        };
        if trade_id.is_empty() {
            return Err(BacktestError::malformed(label, "missing trade id"));
        }

        let signal_type = SignalType::parse(&self.signal_type)
            .map_err(|err| BacktestError::malformed(&label, err.to_string()))?;
        let direction = Direction::parse(&self.direction)
            .map_err(|err| BacktestError::malformed(&label, err.to_string()))?;
        let date = parse_date(&self.date)
            .ok_or_else(|| BacktestError::malformed(&label, format!("invalid date {}", self.date)))?;
        let time = parse_time(&self.time)
            .ok_or_else(|| BacktestError::malformed(&label, format!("invalid time {}", self.time)))?;

        Ok(TradeSignal {
            trade_id,
            signal_type,
            direction,
            date,
            time,
        })
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    // Spreadsheet exports sometimes carry a midnight time after the date.
    let date_part = trimmed.split([' ', 'T']).next().unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .ok()
}

pub fn read_signals<R: Read>(reader: R) -> Result<Vec<TradeSignal>, BacktestError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut signals = Vec::new();
    for (index, record) in csv_reader.deserialize::<SignalRow>().enumerate() {
        // Header is line 1.
        let row_number = index + 2;
        let row = record.map_err(|err| {
            BacktestError::malformed(format!("row {}", row_number), err.to_string())
        })?;
        signals.push(row.into_signal(row_number)?);
    }
    Ok(signals)
}

pub fn load_signals_file(path: &Path) -> Result<Vec<TradeSignal>, BacktestError> {
    let file = std::fs::File::open(path).map_err(|err| {
        BacktestError::malformed(
            path.display().to_string(),
            format!("cannot open signal file: {}", err),
        )
    })?;
    let signals = read_signals(file)?;
    info!("Loaded {} signal row(s) from {}", signals.len(), path.display());
    Ok(signals)
}

#[derive(Default)]
struct PairSlot {
    entry: Option<(usize, TradeSignal)>,
    exit: Option<TradeSignal>,
}

/// Pairs entry and exit rows sharing a trade id and direction.
///
/// Every `(trade_id, direction)` group needs exactly one entry and one exit,
/// and the exit must come after the entry. Trades come back in the order
/// their entry rows appeared.
pub fn pair_trades(signals: &[TradeSignal]) -> Result<Vec<Trade>, BacktestError> {
    let mut groups: HashMap<(String, Direction), PairSlot> = HashMap::new();
    let mut group_order: Vec<(String, Direction)> = Vec::new();

    for (position, signal) in signals.iter().enumerate() {
        let key = (signal.trade_id.clone(), signal.direction);
        let slot = groups.entry(key.clone()).or_insert_with(|| {
            group_order.push(key.clone());
            PairSlot::default()
        });

        match signal.signal_type {
            SignalType::Entry => {
                if slot.entry.is_some() {
                    return Err(BacktestError::malformed(
                        &signal.trade_id,
                        format!("duplicate {} entry row", signal.direction.as_str()),
                    ));
                }
                slot.entry = Some((position, signal.clone()));
            }
            SignalType::Exit => {
                if slot.exit.is_some() {
                    return Err(BacktestError::malformed(
                        &signal.trade_id,
                        format!("duplicate {} exit row", signal.direction.as_str()),
                    ));
                }
                slot.exit = Some(signal.clone());
            }
        }
    }

    let mut paired: Vec<(usize, Trade)> = Vec::with_capacity(group_order.len());
    for key in group_order {
        let Some(slot) = groups.remove(&key) else {
            continue;
        };
        let (trade_id, direction) = key;
        let (position, entry) = slot.entry.ok_or_else(|| {
            BacktestError::malformed(
                &trade_id,
                format!("{} exit row has no matching entry", direction.as_str()),
            )
        })?;
        let exit = slot.exit.ok_or_else(|| {
            BacktestError::malformed(
                &trade_id,
                format!("{} entry row has no matching exit", direction.as_str()),
            )
        })?;

        let entry_timestamp = entry.timestamp();
        let exit_timestamp = exit.timestamp();
        if exit_timestamp <= entry_timestamp {
            return Err(BacktestError::malformed(
                &trade_id,
                format!(
                    "exit {} is not after entry {}",
                    exit_timestamp, entry_timestamp
                ),
            ));
        }

        paired.push((
            position,
            Trade {
                trade_id,
                direction,
                entry_timestamp,
                exit_timestamp,
                option_side: direction.option_side(),
            },
        ));
    }

    paired.sort_by_key(|(position, _)| *position);
    debug!("Paired {} trade(s) from {} signal row(s)", paired.len(), signals.len());
    Ok(paired.into_iter().map(|(_, trade)| trade).collect())
}
