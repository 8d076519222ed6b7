//! Simulated underlying price
//!
//! Geometric random walk: once per simulated day the maintenance agent
//! appends `price · exp(μ − σ²/2 + σ·z)` to the on-ledger feed, with `z`
//! drawn from the run's seeded RNG.

use crate::core::{Amount, AmountError};
use crate::rng::RngManager;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Feed name, also the prefix of every instrument key
    pub name: String,
    /// Decimal string, e.g. `"2000"`
    pub initial_price: String,
    /// Per-day volatility of the walk
    pub daily_volatility: f64,
    /// Per-day drift of the walk
    pub daily_drift: f64,
    /// Annualised volatility reported before the feed has history
    pub initial_volatility: f64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            name: "ETH/USD".to_string(),
            initial_price: "2000".to_string(),
            daily_volatility: 0.04,
            daily_drift: 0.0,
            initial_volatility: 0.8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PriceFeed {
    price: Amount,
    daily_volatility: f64,
    daily_drift: f64,
}

impl PriceFeed {
    pub fn new(start: Amount, daily_volatility: f64, daily_drift: f64) -> Self {
        Self {
            price: start,
            daily_volatility,
            daily_drift,
        }
    }

    pub fn price(&self) -> Amount {
        self.price
    }

    /// Advance one day and return the new price (never below one raw unit)
    pub fn step(&mut self, rng: &mut RngManager) -> Result<Amount, AmountError> {
        let sigma = self.daily_volatility;
        let z = rng.next_gaussian();
        let factor = (self.daily_drift - sigma * sigma / 2.0 + sigma * z).exp();
        let next = self.price.mul_fraction(factor)?;
        self.price = if next.is_positive() {
            next
        } else {
            Amount::new(1, next.scale())
        };
        Ok(self.price)
    }
}
