//! Simulation configuration
//!
//! One [`SimulationConfig`] is loaded (usually from TOML), validated once and
//! then passed to every component. Amounts are written as decimal strings
//! (`"1000.5"`) and converted to [`Amount`] at the run's `decimals`, so a
//! config never carries float balances.
//!
//! ```toml
//! seed = 7
//! decimals = 6
//!
//! [[agents]]
//! count = 2
//! starting_funds = "1000"
//!
//! [agents.strategy]
//! sell_urgency = 10.0
//! weights = { deposit_pool = 0.5 }
//!
//! [grid]
//! strikes = ["1800", "2000", "2200"]
//! maturities_days = [7, 30]
//! option_types = ["call", "put"]
//!
//! [pricing]
//! model = "subprocess"
//! program = "python3"
//! args = ["pricing/curve.py"]
//! ```

use crate::core::{Amount, TimeAdvance};
use crate::ledger::LedgerSetup;
use crate::market::{FeedConfig, InstrumentGrid};
use crate::models::{ActionKind, OptionType};
use crate::policy::StrategyProfile;
use crate::pricing::{IntrinsicPricer, PricingModel, SubprocessPricer};
use crate::submit::{RetryPolicy, SubmitterSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Largest supported token decimals (keeps `i128` math far from overflow)
pub const MAX_DECIMALS: u32 = 18;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Invalid amount {value:?} for {field}")]
    Amount { field: String, value: String },
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

/// A group of identically configured agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_count")]
    pub count: usize,
    /// Stablecoin minted to each agent at bootstrap (decimal string)
    #[serde(default = "default_funds")]
    pub starting_funds: String,
    #[serde(default)]
    pub strategy: StrategyProfile,
}

fn default_count() -> usize {
    1
}

fn default_funds() -> String {
    "0".to_string()
}

impl AgentConfig {
    pub fn new(starting_funds: impl Into<String>, strategy: StrategyProfile) -> Self {
        Self {
            count: 1,
            starting_funds: starting_funds.into(),
            strategy,
        }
    }
}

/// Instruments to keep listed, as written in the config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub strikes: Vec<String>,
    pub maturities_days: Vec<u64>,
    pub option_types: Vec<OptionType>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            strikes: vec!["1800".into(), "2000".into(), "2200".into()],
            maturities_days: vec![7, 30],
            option_types: vec![OptionType::Call, OptionType::Put],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum PricingConfig {
    Builtin(IntrinsicPricer),
    Subprocess(SubprocessPricer),
}

impl Default for PricingConfig {
    fn default() -> Self {
        PricingConfig::Builtin(IntrinsicPricer::default())
    }
}

impl PricingConfig {
    pub fn build(&self) -> Box<dyn PricingModel> {
        match self {
            PricingConfig::Builtin(pricer) => Box::new(pricer.clone()),
            PricingConfig::Subprocess(pricer) => Box::new(pricer.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: u64,
    /// Stablecoin decimals; strikes, prices, volumes and shares share them
    pub decimals: u32,
    pub agents: Vec<AgentConfig>,
    /// Smallest wallet balance worth depositing (decimal string)
    pub min_deposit: String,
    pub gas_budget: u64,
    pub gas_price: u64,
    pub retry: RetryPolicy,
    pub receipt_poll_ms: u64,
    pub receipt_timeout_ms: u64,
    pub time: TimeAdvance,
    /// Ledger clock at deployment (in-memory ledger only)
    pub start_timestamp: u64,
    pub feed: FeedConfig,
    pub grid: GridConfig,
    pub pricing: PricingConfig,
    pub risk_free_rate: f64,
    /// Monte Carlo samples requested from the pricing model
    pub samples: u32,
    /// Shared nonce region file; in-process region when absent
    pub nonce_region: Option<PathBuf>,
    /// Where approval records persist; in memory when absent
    pub approvals_dir: Option<PathBuf>,
    pub max_epochs: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            decimals: 6,
            agents: vec![AgentConfig {
                count: 3,
                starting_funds: "1000".to_string(),
                strategy: StrategyProfile::default(),
            }],
            min_deposit: "1".to_string(),
            gas_budget: 500_000,
            gas_price: 225_000_000_000,
            retry: RetryPolicy::default(),
            receipt_poll_ms: 50,
            receipt_timeout_ms: 120_000,
            time: TimeAdvance::default(),
            start_timestamp: 1_700_000_000,
            feed: FeedConfig::default(),
            grid: GridConfig::default(),
            pricing: PricingConfig::default(),
            risk_free_rate: 0.05,
            samples: 1_000,
            nonce_region: None,
            approvals_dir: None,
            max_epochs: None,
        }
    }
}

impl SimulationConfig {
    /// Load from a TOML file and validate
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn amount(&self, field: &str, value: &str) -> Result<Amount, ConfigError> {
        Amount::parse_decimal(value, self.decimals).map_err(|_| ConfigError::Amount {
            field: field.to_string(),
            value: value.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.decimals > MAX_DECIMALS {
            return Err(invalid(format!("decimals must be <= {MAX_DECIMALS}")));
        }
        if self.agent_count() == 0 {
            return Err(invalid("Must have at least one agent"));
        }
        for (i, group) in self.agents.iter().enumerate() {
            let funds = self.amount(&format!("agents[{i}].starting_funds"), &group.starting_funds)?;
            if funds.raw() < 0 {
                return Err(invalid(format!("agents[{i}].starting_funds must be >= 0")));
            }
            Self::validate_strategy(i, &group.strategy)?;
        }
        if self.min_deposit_amount()?.raw() < 0 {
            return Err(invalid("min_deposit must be >= 0"));
        }
        if self.gas_budget == 0 {
            return Err(invalid("gas_budget must be > 0"));
        }
        if self.retry.max_attempts == Some(0) {
            return Err(invalid("retry.max_attempts must be > 0"));
        }
        if !(self.retry.multiplier >= 1.0) {
            return Err(invalid("retry.multiplier must be >= 1"));
        }
        if self.time.active_secs == 0 || self.time.idle_secs == 0 {
            return Err(invalid("time advances must be > 0"));
        }
        if self.feed.name.is_empty() || self.feed.name.contains("-E") {
            return Err(invalid("feed.name must be non-empty and must not contain \"-E\""));
        }
        if !self.initial_price()?.is_positive() {
            return Err(invalid("feed.initial_price must be > 0"));
        }
        let rates = [
            self.feed.daily_volatility,
            self.feed.daily_drift,
            self.feed.initial_volatility,
            self.risk_free_rate,
        ];
        if rates.iter().any(|r| !r.is_finite()) || self.feed.daily_volatility < 0.0 {
            return Err(invalid("feed rates must be finite and volatility >= 0"));
        }
        for strike in &self.grid()?.strikes {
            if !strike.is_positive() {
                return Err(invalid("grid strikes must be > 0"));
            }
        }
        Ok(())
    }

    fn validate_strategy(group: usize, strategy: &StrategyProfile) -> Result<(), ConfigError> {
        for (name, weight) in &strategy.weights {
            name.parse::<ActionKind>()
                .map_err(|e| invalid(format!("agents[{group}].strategy.weights: {e}")))?;
            if !weight.is_finite() || *weight < 0.0 {
                return Err(invalid(format!(
                    "agents[{group}].strategy.weights.{name} must be finite and >= 0"
                )));
            }
        }
        if !(0.0..=1.0).contains(&strategy.commitment_max) {
            return Err(invalid(format!(
                "agents[{group}].strategy.commitment_max must be within [0, 1]"
            )));
        }
        if !strategy.sell_urgency.is_finite() || strategy.sell_urgency < 0.0 {
            return Err(invalid(format!("agents[{group}].strategy.sell_urgency must be >= 0")));
        }
        if let Some(sentiment) = &strategy.sentiment {
            if !(sentiment.min <= sentiment.max) || sentiment.period_blocks == 0 {
                return Err(invalid(format!(
                    "agents[{group}].strategy.sentiment needs min <= max and period_blocks > 0"
                )));
            }
        }
        Ok(())
    }

    pub fn agent_count(&self) -> usize {
        self.agents.iter().map(|g| g.count).sum()
    }

    /// One `(starting funds, strategy)` per agent, groups expanded in order
    pub fn agent_plans(&self) -> Result<Vec<(Amount, StrategyProfile)>, ConfigError> {
        let mut plans = Vec::with_capacity(self.agent_count());
        for (i, group) in self.agents.iter().enumerate() {
            let funds = self.amount(&format!("agents[{i}].starting_funds"), &group.starting_funds)?;
            for _ in 0..group.count {
                plans.push((funds, group.strategy.clone()));
            }
        }
        Ok(plans)
    }

    pub fn min_deposit_amount(&self) -> Result<Amount, ConfigError> {
        self.amount("min_deposit", &self.min_deposit)
    }

    pub fn initial_price(&self) -> Result<Amount, ConfigError> {
        self.amount("feed.initial_price", &self.feed.initial_price)
    }

    pub fn grid(&self) -> Result<InstrumentGrid, ConfigError> {
        let strikes = self
            .grid
            .strikes
            .iter()
            .enumerate()
            .map(|(i, s)| self.amount(&format!("grid.strikes[{i}]"), s))
            .collect::<Result<_, _>>()?;
        Ok(InstrumentGrid {
            strikes,
            maturities_days: self.grid.maturities_days.clone(),
            option_types: self.grid.option_types.clone(),
        })
    }

    pub fn ledger_setup(&self) -> Result<LedgerSetup, ConfigError> {
        Ok(LedgerSetup {
            decimals: self.decimals,
            start_timestamp: self.start_timestamp,
            feed: self.feed.name.clone(),
            initial_price: self.initial_price()?.raw(),
            initial_volatility: self.feed.initial_volatility,
            ..LedgerSetup::default()
        })
    }

    pub fn submitter_settings(&self) -> SubmitterSettings {
        SubmitterSettings {
            gas_price: self.gas_price,
            retry: self.retry.clone(),
            receipt_poll: Duration::from_millis(self.receipt_poll_ms),
            receipt_timeout: Duration::from_millis(self.receipt_timeout_ms),
        }
    }
}
