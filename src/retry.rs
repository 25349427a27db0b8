use crate::error::GatewayError;
use std::thread;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;
/// Long pause between attempts to stay inside upstream rate limits.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Bounded retry with a fixed cooldown between attempts.
///
/// Only transient gateway failures are retried; anything else is returned
/// after the first attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub cooldown: Duration,
    /// Fraction of the cooldown randomly added or removed, 0 for a fixed pause.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            cooldown: DEFAULT_COOLDOWN,
            jitter_ratio: 0.0,
        }
    }
}

/// Failure returned once the policy gives up.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last_error: GatewayError,
}

impl RetryPolicy {
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            cooldown: Duration::ZERO,
            jitter_ratio: 0.0,
        }
    }

    fn delay(&self) -> Duration {
        if self.jitter_ratio <= 0.0 || self.cooldown.is_zero() {
            return self.cooldown;
        }
        let base_ms = self.cooldown.as_millis() as u64;
        let jitter_range = (base_ms as f64 * self.jitter_ratio.min(1.0)) as u64;
        let jitter = fastrand::u64(0..=jitter_range * 2);
        Duration::from_millis(base_ms.saturating_sub(jitter_range).saturating_add(jitter))
    }

    pub fn run<T, F>(&self, context: &str, mut operation: F) -> Result<T, RetryExhausted>
    where
        F: FnMut() -> Result<T, GatewayError>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() || attempt >= max_attempts => {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: err,
                    });
                }
                Err(err) => {
                    let delay = self.delay();
                    log::warn!(
                        "Attempt {}/{} for {} failed: {}. Retrying in {}s.",
                        attempt,
                        max_attempts,
                        context,
                        err,
                        delay.as_secs()
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}
