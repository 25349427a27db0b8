use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Arc, Mutex};

/// Shared view of a running backtest. Cloned into workers; every clone
/// updates the same counters.
#[derive(Clone, Default)]
pub struct RunStatus {
    inner: Arc<Mutex<RunStatusData>>,
    bar: Option<ProgressBar>,
}

#[derive(Default)]
struct RunStatusData {
    phase: String,
    total_trades: usize,
    completed_trades: usize,
    failed_trades: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunStatusSnapshot {
    pub phase: String,
    pub total_trades: usize,
    pub completed_trades: usize,
    pub failed_trades: usize,
}

impl RunStatusSnapshot {
    /// Completed share of the run, 0..=100.
    pub fn percent(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        (self.completed_trades as f64 / self.total_trades as f64 * 100.0).min(100.0)
    }
}

impl RunStatus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RunStatusData {
                phase: "Initializing".to_string(),
                ..Default::default()
            })),
            bar: None,
        }
    }

    /// Status that also drives a terminal progress bar.
    pub fn with_progress_bar() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Self {
            bar: Some(bar),
            ..Self::new()
        }
    }

    pub fn set_phase<S: Into<String>>(&self, phase: S) {
        let phase = phase.into();
        if let Some(bar) = &self.bar {
            bar.set_message(phase.clone());
        }
        if let Ok(mut data) = self.inner.lock() {
            data.phase = phase;
        }
    }

    pub fn start(&self, total_trades: usize) {
        if let Some(bar) = &self.bar {
            bar.set_length(total_trades as u64);
            bar.set_position(0);
        }
        if let Ok(mut data) = self.inner.lock() {
            data.total_trades = total_trades;
            data.completed_trades = 0;
            data.failed_trades = 0;
        }
    }

    /// Records one finished trade. Counters only move forward.
    pub fn record(&self, success: bool) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
        if let Ok(mut data) = self.inner.lock() {
            data.completed_trades = (data.completed_trades + 1).min(data.total_trades.max(1));
            if !success {
                data.failed_trades += 1;
            }
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
        self.set_phase("Completed");
    }

    pub fn snapshot(&self) -> RunStatusSnapshot {
        if let Ok(data) = self.inner.lock() {
            RunStatusSnapshot {
                phase: data.phase.clone(),
                total_trades: data.total_trades,
                completed_trades: data.completed_trades,
                failed_trades: data.failed_trades,
            }
        } else {
            RunStatusSnapshot {
                phase: "Status unavailable".to_string(),
                total_trades: 0,
                completed_trades: 0,
                failed_trades: 0,
            }
        }
    }
}
