//! Simulated calendar
//!
//! The ledger owns the clock: every epoch the orchestrator reads the latest
//! block timestamp and feeds it to [`SimClock`], which tracks epochs and
//! detects calendar-day rollovers (the trigger for price and curve updates).

use serde::{Deserialize, Serialize};

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Average month length used for `months_to_expiry`
const SECONDS_PER_MONTH: f64 = 30.4375 * SECONDS_PER_DAY as f64;

/// Tracks epochs and the last observed ledger timestamp
///
/// # Example
/// ```
/// use options_sim_core::SimClock;
///
/// let mut clock = SimClock::new();
/// assert!(clock.observe(1_000)); // first observation starts a day
/// assert!(!clock.observe(2_000)); // same day
/// assert!(clock.observe(86_400 + 5)); // next day
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimClock {
    /// Epochs completed since simulation start
    epoch: u64,
    /// Latest ledger timestamp seen (seconds)
    timestamp: Option<u64>,
    /// Calendar day of `timestamp`
    day: Option<u64>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current ledger timestamp.
    ///
    /// Returns `true` when the calendar day differs from the previous
    /// observation (including the very first one).
    pub fn observe(&mut self, timestamp: u64) -> bool {
        let day = timestamp / SECONDS_PER_DAY;
        let rolled = self.day != Some(day);
        self.timestamp = Some(timestamp);
        self.day = Some(day);
        rolled
    }

    pub fn advance_epoch(&mut self) {
        self.epoch += 1;
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn timestamp(&self) -> Option<u64> {
        self.timestamp
    }

    pub fn current_day(&self) -> Option<u64> {
        self.day
    }
}

/// Months between `now` and `maturity` (zero once matured)
pub fn months_to_expiry(now: u64, maturity: u64) -> f64 {
    maturity.saturating_sub(now) as f64 / SECONDS_PER_MONTH
}

/// How far to move the ledger clock after an epoch
///
/// Trading epochs advance by `active_secs` so positions get time to move;
/// quiet epochs jump `idle_secs` so expiries and day rollovers arrive sooner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeAdvance {
    pub active_secs: u64,
    pub idle_secs: u64,
}

impl Default for TimeAdvance {
    fn default() -> Self {
        Self {
            active_secs: 3_600,
            idle_secs: SECONDS_PER_DAY,
        }
    }
}

impl TimeAdvance {
    pub fn seconds_for(&self, traded: bool) -> u64 {
        if traded {
            self.active_secs
        } else {
            self.idle_secs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_counter() {
        let mut clock = SimClock::new();
        assert_eq!(clock.epoch(), 0);
        clock.advance_epoch();
        clock.advance_epoch();
        assert_eq!(clock.epoch(), 2);
    }

    #[test]
    fn test_months_to_expiry_saturates() {
        assert_eq!(months_to_expiry(100, 50), 0.0);
        let one_month = SECONDS_PER_MONTH as u64;
        assert!((months_to_expiry(0, one_month) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_time_advance_choice() {
        let advance = TimeAdvance::default();
        assert_eq!(advance.seconds_for(true), 3_600);
        assert_eq!(advance.seconds_for(false), SECONDS_PER_DAY);
    }
}
