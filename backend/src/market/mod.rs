//! Working sets of instruments
//!
//! [`MarketState`] mirrors the ledger's listings, split by lifecycle:
//! `active` (before maturity), `expired` (past maturity with supply
//! outstanding) and `to_burn` (past maturity, nothing outstanding). Retired
//! instruments never come back into the working sets.

pub mod feed;

pub use feed::{FeedConfig, PriceFeed};

use crate::core::{Amount, SECONDS_PER_DAY};
use crate::ledger::{Ledger, LedgerError};
use crate::models::{OptionType, Symbol};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Strike/maturity/type combinations to keep listed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstrumentGrid {
    pub strikes: Vec<Amount>,
    /// Maturities as days after the listing day
    pub maturities_days: Vec<u64>,
    pub option_types: Vec<OptionType>,
}

impl InstrumentGrid {
    /// Every instrument of the grid for a listing day starting at `day_start`
    pub fn symbols(&self, feed: &str, day_start: u64) -> Vec<Symbol> {
        let mut out = Vec::new();
        for days in &self.maturities_days {
            let maturity = day_start + days * SECONDS_PER_DAY;
            for strike in &self.strikes {
                for option_type in &self.option_types {
                    out.push(Symbol::new(feed, *strike, maturity, *option_type));
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct MarketState {
    active: BTreeMap<String, Symbol>,
    expired: BTreeMap<String, Symbol>,
    to_burn: Vec<Symbol>,
    retired: BTreeSet<String>,
    /// Keys listed on the ledger or already requested
    listed: BTreeSet<String>,
}

impl MarketState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> impl Iterator<Item = &Symbol> {
        self.active.values()
    }

    pub fn expired(&self) -> impl Iterator<Item = &Symbol> {
        self.expired.values()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn expired_count(&self) -> usize {
        self.expired.len()
    }

    /// Retired instruments, oldest first
    pub fn to_burn(&self) -> &[Symbol] {
        &self.to_burn
    }

    pub fn is_listed(&self, key: &str) -> bool {
        self.listed.contains(key)
    }

    pub fn mark_listed(&mut self, key: &str) {
        self.listed.insert(key.to_string());
    }

    /// Grid instruments for the day of `now` not yet listed
    pub fn missing(&self, grid: &InstrumentGrid, feed: &str, now: u64) -> Vec<Symbol> {
        let day_start = now - now % SECONDS_PER_DAY;
        grid.symbols(feed, day_start)
            .into_iter()
            .filter(|s| !s.is_expired(now) && !self.is_listed(&s.key()))
            .collect()
    }

    /// Re-read listings and re-split them at time `now`.
    ///
    /// Returns the instruments retired by this refresh.
    pub fn refresh(&mut self, ledger: &dyn Ledger, now: u64, strike_scale: u32) -> Result<Vec<Symbol>, LedgerError> {
        self.active.clear();
        self.expired.clear();
        let mut retired_now = Vec::new();

        for key in ledger.symbols()? {
            self.listed.insert(key.clone());
            if self.retired.contains(&key) {
                continue;
            }
            let symbol = match Symbol::parse(&key, strike_scale) {
                Ok(symbol) => symbol,
                Err(e) => {
                    warn!(symbol = %key, error = %e, "ignoring unparseable listing");
                    continue;
                }
            };

            if !symbol.is_expired(now) {
                self.active.insert(key, symbol);
            } else if ledger.option_supply(&key)? > 0 {
                self.expired.insert(key, symbol);
            } else {
                debug!(symbol = %key, "retiring settled instrument");
                self.retired.insert(key);
                self.to_burn.push(symbol.clone());
                retired_now.push(symbol);
            }
        }
        Ok(retired_now)
    }
}
