//! Option instruments
//!
//! An instrument is one option contract: underlying feed, strike, maturity
//! and type. On the ledger it is addressed by a string key of the form
//!
//! ```text
//! <FEED>-E<C|P>-<strike raw units>-<maturity unix seconds>
//! ```
//!
//! e.g. `ETH/USD-EC-2000000000-1700000000` for a European call.

use crate::core::Amount;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SymbolError {
    #[error("Malformed symbol key: {0:?}")]
    Malformed(String),

    #[error("Unknown option type: {0:?}")]
    UnknownOptionType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    fn code(&self) -> char {
        match self {
            OptionType::Call => 'C',
            OptionType::Put => 'P',
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OptionType::Call => "call",
            OptionType::Put => "put",
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptionType {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "call" | "c" => Ok(OptionType::Call),
            "put" | "p" => Ok(OptionType::Put),
            other => Err(SymbolError::UnknownOptionType(other.to_string())),
        }
    }
}

/// Lifecycle of an instrument as seen by an agent.
///
/// `Unknown → Active → Expired → Settled`; transitions come from time
/// passing the maturity and from remote outcomes, never from local decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentState {
    /// Not listed on the ledger
    Unknown,
    /// Listed, before maturity: write / buy / sell / burn
    Active,
    /// Past maturity with supply outstanding: redeem / liquidate
    Expired,
    /// Past maturity, no supply left
    Settled,
}

/// One option contract
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    feed: String,
    strike: Amount,
    maturity: u64,
    option_type: OptionType,
}

impl Symbol {
    pub fn new(feed: impl Into<String>, strike: Amount, maturity: u64, option_type: OptionType) -> Self {
        Self {
            feed: feed.into(),
            strike,
            maturity,
            option_type,
        }
    }

    pub fn feed(&self) -> &str {
        &self.feed
    }

    pub fn strike(&self) -> Amount {
        self.strike
    }

    pub fn maturity(&self) -> u64 {
        self.maturity
    }

    pub fn option_type(&self) -> OptionType {
        self.option_type
    }

    /// Ledger key for this instrument
    pub fn key(&self) -> String {
        format!(
            "{}-E{}-{}-{}",
            self.feed,
            self.option_type.code(),
            self.strike.raw(),
            self.maturity
        )
    }

    /// Parse a ledger key; `strike_scale` is the decimals the strike is quoted in
    ///
    /// # Example
    /// ```
    /// use options_sim_core::models::{OptionType, Symbol};
    ///
    /// let symbol = Symbol::parse("ETH/USD-EP-1500000000-1700000000", 6).unwrap();
    /// assert_eq!(symbol.option_type(), OptionType::Put);
    /// assert_eq!(symbol.strike().to_string(), "1500.000000");
    /// assert_eq!(symbol.key(), "ETH/USD-EP-1500000000-1700000000");
    /// ```
    pub fn parse(key: &str, strike_scale: u32) -> Result<Self, SymbolError> {
        let malformed = || SymbolError::Malformed(key.to_string());

        let (rest, maturity) = key.rsplit_once('-').ok_or_else(malformed)?;
        let (head, strike) = rest.rsplit_once('-').ok_or_else(malformed)?;
        let (feed, code) = head.rsplit_once("-E").ok_or_else(malformed)?;
        if feed.is_empty() {
            return Err(malformed());
        }

        let option_type = code.parse()?;
        let strike: i128 = strike.parse().map_err(|_| malformed())?;
        let maturity: u64 = maturity.parse().map_err(|_| malformed())?;

        Ok(Self::new(feed, Amount::new(strike, strike_scale), maturity, option_type))
    }

    /// Expired once maturity is strictly before `now`
    pub fn is_expired(&self, now: u64) -> bool {
        self.maturity < now
    }

    /// Lifecycle state given listing status and outstanding supply
    pub fn state(&self, now: u64, listed: bool, outstanding: i128) -> InstrumentState {
        if !listed {
            InstrumentState::Unknown
        } else if !self.is_expired(now) {
            InstrumentState::Active
        } else if outstanding > 0 {
            InstrumentState::Expired
        } else {
            InstrumentState::Settled
        }
    }

    /// Intrinsic value per unit at settlement price `spot`
    pub fn intrinsic_value(&self, spot: &Amount) -> Result<Amount, crate::core::AmountError> {
        let diff = match self.option_type {
            OptionType::Call => spot.checked_sub(&self.strike)?,
            OptionType::Put => self.strike.checked_sub(spot)?,
        };
        Ok(if diff.is_positive() {
            diff
        } else {
            Amount::zero(diff.scale())
        })
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> Ordering {
        self.feed
            .cmp(&other.feed)
            .then(self.maturity.cmp(&other.maturity))
            .then(self.option_type.cmp(&other.option_type))
            .then(self.strike.scale().cmp(&other.strike.scale()))
            .then(self.strike.raw().cmp(&other.strike.raw()))
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}
