//! Tick clock.
//!
//! The scheduler never assumes a tick took exactly one tick period. Each tick
//! asks the [`Clock`] how many whole time units passed since the previous
//! query and credits that amount to every active request.

use crate::config::PollerConfig;
use std::time::Duration;
use tokio::time::Instant;

/// Source of elapsed whole time units.
pub trait Clock: Send {
    /// Whole units elapsed since the previous call (or since construction on
    /// the first call). Moves the reference point forward past the units reported.
    fn elapsed_units(&mut self) -> crate::Result<u64>;
}

/// Wall-clock [`Clock`] backed by [`tokio::time::Instant`].
///
/// Uses tokio's clock so a paused test runtime advances it deterministically.
/// Time short of a whole unit is not dropped: the reference point only moves
/// forward by the units reported, so ticks shorter than one unit still add up.
#[derive(Debug)]
pub struct Stopwatch {
    last: Instant,
    unit: Duration,
    slack: Duration,
}

impl Stopwatch {
    /// Create a stopwatch whose reference point is now.
    pub fn new(unit: Duration, slack: Duration) -> Self {
        Self {
            last: Instant::now(),
            unit,
            slack,
        }
    }

    pub fn from_config(config: &PollerConfig) -> Self {
        Self::new(config.time_unit(), config.rounding_slack())
    }
}

impl Clock for Stopwatch {
    fn elapsed_units(&mut self) -> crate::Result<u64> {
        let now = Instant::now();
        let unit_nanos = self.unit.as_nanos();
        if unit_nanos == 0 {
            return Err(crate::PollError::Clock("time unit is zero".to_owned()));
        }

        let delta = now.saturating_duration_since(self.last) + self.slack;
        let units = delta.as_nanos() / unit_nanos;

        // Advance by whole units only so sub-unit remainders carry into the
        // next query. With slack the reference may sit slightly ahead of now.
        self.last = u32::try_from(units)
            .ok()
            .and_then(|whole| self.last.checked_add(self.unit.checked_mul(whole)?))
            .unwrap_or(now);

        Ok(u64::try_from(units).unwrap_or(u64::MAX))
    }
}
