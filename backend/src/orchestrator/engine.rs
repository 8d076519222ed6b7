//! Orchestrator Engine
//!
//! Drives the agent population against one ledger, one epoch at a time:
//!
//! ```text
//! For each epoch:
//! 1. Refresh token caches (stablecoin, pool shares)
//! 2. On a new calendar day: maintenance (price sample, listings, curves)
//! 3. Re-split instruments into active / expired / to-burn
//! 4. Shuffle agent order
//! 5. Per agent: observe, draw an action, size it, approve, submit
//! 6. Wait for receipts and classify outcomes
//! 7. Report the epoch
//! ```
//!
//! # Critical Invariants
//!
//! 1. A failing agent never halts the epoch and a failing epoch never halts
//!    the run; only fatal errors (see [`SimulationError::is_fatal`])
//!    propagate
//! 2. Every random choice goes through the run's seeded [`RngManager`]
//! 3. Balances are never stored on agents; they are re-observed every epoch
//!
//! # Example
//!
//! ```rust
//! use options_sim_core::ledger::InMemoryLedger;
//! use options_sim_core::nonce::InMemoryRegion;
//! use options_sim_core::orchestrator::Orchestrator;
//! use options_sim_core::SimulationConfig;
//! use std::sync::Arc;
//!
//! let config = SimulationConfig::default();
//! let ledger = Arc::new(InMemoryLedger::deploy(config.ledger_setup().unwrap()));
//! let deployment = ledger.deployment().clone();
//! let pricing = config.pricing.build();
//! let mut sim = Orchestrator::new(
//!     config,
//!     ledger,
//!     deployment,
//!     Arc::new(InMemoryRegion::new()),
//!     pricing,
//! )
//! .unwrap();
//!
//! sim.bootstrap().unwrap();
//! let summary = sim.run(Some(3)).unwrap();
//! assert!(summary.epochs <= 3);
//! ```

use super::planner::{plan_action, spender_for, to_remote_call};
use super::report::{EpochLog, EpochRow, MarketSnapshot};
use crate::cache::{TokenCache, UpdateOutcome};
use crate::config::{ConfigError, SimulationConfig};
use crate::core::{months_to_expiry, Amount, SimClock};
use crate::error::SimulationError;
use crate::ledger::{Deployment, Ledger, RemoteCall};
use crate::market::{InstrumentGrid, MarketState, PriceFeed};
use crate::models::{Action, ActionKind, Address, Agent, Event, EventLog, Identity, Symbol};
use crate::nonce::{NonceCoordinator, NonceRegion};
use crate::policy::{InstrumentView, Observation, PoolQuote, Strategy, StrategyEngine};
use crate::pricing::{PricingInput, PricingModel};
use crate::rng::RngManager;
use crate::submit::{Submission, TransactionSubmitter};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Agent addresses start here so they never collide with contracts
const FIRST_AGENT_INDEX: u64 = 1;

/// Failed epochs in a row after which [`Orchestrator::run`] gives up
pub const MAX_CONSECUTIVE_FAILED_EPOCHS: u32 = 10;

/// What became of one agent's turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionStatus {
    Succeeded,
    /// Mined but reverted by the ledger
    Reverted(String),
    /// Never reached a receipt (submission, approval or observation error)
    Failed(String),
    /// Drawn, but there was nothing to commit
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    pub agent: Address,
    pub action: ActionKind,
    pub sequence: Option<u64>,
    pub status: ActionStatus,
}

/// Result of a single epoch
#[derive(Debug, Clone)]
pub struct EpochResult {
    pub epoch: u64,
    pub block: u64,
    pub timestamp: u64,
    /// Some agent drew an action this epoch
    pub anyone_acted: bool,
    /// Agent that ran the daily maintenance, if it was due
    pub maintainer: Option<Address>,
    pub succeeded: Vec<ActionKind>,
    pub failed: Vec<ActionKind>,
    /// Agents whose ledger reads failed before they could draw
    pub unobserved: Vec<Address>,
    pub records: Vec<ActionRecord>,
}

impl EpochResult {
    /// Actions that reached the ledger or failed trying
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failures()
    }

    /// Failed actions plus failed observations
    pub fn failures(&self) -> usize {
        self.failed.len() + self.unobserved.len()
    }

    /// A write, buy or sell went through
    pub fn traded(&self) -> bool {
        self.succeeded.iter().any(|kind| kind.is_trade())
    }
}

/// Totals over a whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub epochs: u64,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Epochs abandoned on a non-fatal error (included in `epochs`)
    pub failed_epochs: u64,
}

impl RunSummary {
    fn absorb(&mut self, result: &EpochResult) {
        self.epochs += 1;
        self.attempted += result.attempted();
        self.succeeded += result.succeeded.len();
        self.failed += result.failures();
    }
}

/// Shared per-epoch market data, read once before agents act
struct MarketContext {
    spot: Amount,
    pool_free: Amount,
    quotes: BTreeMap<String, PoolQuote>,
    option_tokens: BTreeMap<String, Address>,
}

/// Outcome of one agent's turn before receipts are in
enum Turn {
    Idle,
    Skipped(ActionKind, String),
    Submitted(ActionKind, Action, Submission),
}

/// Main orchestrator managing agents and the epoch loop
///
/// # Determinism
///
/// All randomness is via `rng` with seeded xorshift64*.
/// Same seed + same config + same ledger = identical decisions.
pub struct Orchestrator {
    config: SimulationConfig,
    decimals: u32,
    ledger: Arc<dyn Ledger>,
    deployment: Deployment,
    submitter: TransactionSubmitter,
    pricing: Box<dyn PricingModel>,

    /// Wallet balances
    stablecoin: TokenCache,
    /// Liquidity pool shares
    pool_shares: TokenCache,

    agents: Vec<Agent>,
    starting_funds: Vec<Amount>,

    market: MarketState,
    grid: InstrumentGrid,
    feed: PriceFeed,
    min_deposit: Amount,

    clock: SimClock,
    rng: RngManager,
    event_log: EventLog,
}

impl Orchestrator {
    /// Wire every component from one validated configuration.
    ///
    /// The ledger's stablecoin must use the configured decimals and the
    /// deployment's feed must be the configured one.
    pub fn new(
        config: SimulationConfig,
        ledger: Arc<dyn Ledger>,
        deployment: Deployment,
        region: Arc<dyn NonceRegion>,
        pricing: Box<dyn PricingModel>,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let decimals = config.decimals;

        if deployment.feed != config.feed.name {
            return Err(ConfigError::Invalid(format!(
                "deployment feed {} differs from configured feed {}",
                deployment.feed, config.feed.name
            ))
            .into());
        }

        let submitter = TransactionSubmitter::new(
            ledger.clone(),
            NonceCoordinator::new(region),
            config.submitter_settings(),
        );
        let approvals_dir = config.approvals_dir.as_deref();
        let stablecoin = TokenCache::open(ledger.clone(), deployment.stablecoin.clone(), approvals_dir)?;
        let pool_shares = TokenCache::open(ledger.clone(), deployment.pool.clone(), approvals_dir)?;
        if stablecoin.decimals() != decimals {
            return Err(ConfigError::Invalid(format!(
                "stablecoin {} has {} decimals, config says {}",
                stablecoin.symbol(),
                stablecoin.decimals(),
                decimals
            ))
            .into());
        }

        let mut agents = Vec::with_capacity(config.agent_count());
        let mut starting_funds = Vec::with_capacity(config.agent_count());
        for (i, (funds, profile)) in config.agent_plans()?.into_iter().enumerate() {
            agents.push(Agent::new(Address::from_index(FIRST_AGENT_INDEX + i as u64), profile));
            starting_funds.push(funds);
        }

        let spot = Amount::new(ledger.feed_price(&deployment.feed)?, decimals);
        let feed = PriceFeed::new(spot, config.feed.daily_volatility, config.feed.daily_drift);

        info!(
            agents = agents.len(),
            seed = config.seed,
            decimals,
            feed = %deployment.feed,
            "orchestrator ready"
        );

        Ok(Self {
            decimals,
            grid: config.grid()?,
            min_deposit: config.min_deposit_amount()?,
            rng: RngManager::new(config.seed),
            config,
            ledger,
            deployment,
            submitter,
            pricing,
            stablecoin,
            pool_shares,
            agents,
            starting_funds,
            market: MarketState::new(),
            feed,
            clock: SimClock::new(),
            event_log: EventLog::new(),
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    pub fn submitter(&self) -> &TransactionSubmitter {
        &self.submitter
    }

    pub fn stablecoin(&self) -> &TokenCache {
        &self.stablecoin
    }

    pub fn pool_shares(&self) -> &TokenCache {
        &self.pool_shares
    }

    pub fn market(&self) -> &MarketState {
        &self.market
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn current_epoch(&self) -> u64 {
        self.clock.epoch()
    }

    // ========================================================================
    // Driver
    // ========================================================================

    /// Fund agents and seed the caches with their addresses
    pub fn bootstrap(&mut self) -> Result<(), SimulationError> {
        for (agent, funds) in self.agents.iter().zip(&self.starting_funds) {
            if !funds.is_positive() {
                continue;
            }
            let call = RemoteCall::Mint {
                token: self.deployment.stablecoin.clone(),
                to: agent.address().clone(),
                amount: funds.to_raw_units(self.decimals)?,
            };
            let receipt = self
                .submitter
                .submit_and_wait(agent, &call, self.config.gas_budget)?;
            if !receipt.success {
                return Err(SimulationError::Reverted(receipt.reason.unwrap_or_default()));
            }
            debug!(agent = %agent.address(), amount = %funds, "funded");
        }

        let addresses: Vec<Address> = self.agents.iter().map(|a| a.address().clone()).collect();
        self.stablecoin.update(&addresses)?;
        self.pool_shares.update(&addresses)?;
        info!(agents = addresses.len(), "bootstrap complete");
        Ok(())
    }

    /// Run one epoch
    ///
    /// The epoch counter moves on even when the epoch fails part way.
    pub fn step(&mut self) -> Result<EpochResult, SimulationError> {
        let outcome = self.play_epoch();
        self.clock.advance_epoch();
        outcome
    }

    fn play_epoch(&mut self) -> Result<EpochResult, SimulationError> {
        let epoch = self.clock.epoch();
        let block = self.ledger.block_number()?;
        let now = self.ledger.block_timestamp()?;
        let new_day = self.clock.observe(now);
        self.event_log.log(Event::EpochStarted {
            epoch,
            block,
            timestamp: now,
        });
        debug!(epoch, block, timestamp = now, new_day, "epoch started");

        // STEP 1: CACHES
        self.refresh_caches()?;

        // STEP 2: DAILY MAINTENANCE
        let maintainer = if new_day {
            self.maintain(epoch, now)?
        } else {
            None
        };

        // STEP 3: INSTRUMENT LIFECYCLE
        self.refresh_market(epoch, now)?;

        // STEP 4: AGENT ORDER
        let mut order: Vec<usize> = (0..self.agents.len()).collect();
        self.rng.shuffle(&mut order);

        // STEP 5: AGENT TURNS
        let context = self.market_context(now)?;
        let mut records = Vec::new();
        let mut unobserved = Vec::new();
        let mut pending = Vec::new();
        for index in order {
            let agent = self.agents[index].address().clone();
            let turn = match self.take_turn(index, block, now, &context) {
                Ok(turn) => turn,
                Err((kind, e)) if e.is_fatal() => {
                    warn!(agent = %agent, action = ?kind, error = %e, "fatal error");
                    return Err(e);
                }
                Err((Some(kind), e)) => {
                    warn!(agent = %agent, action = %kind, error = %e, "agent turn failed");
                    self.agents[index].record_rejection();
                    self.event_log.log(Event::ActionFailed {
                        epoch,
                        agent: agent.to_string(),
                        action: kind,
                        error: e.to_string(),
                    });
                    records.push(ActionRecord {
                        agent,
                        action: kind,
                        sequence: None,
                        status: ActionStatus::Failed(e.to_string()),
                    });
                    continue;
                }
                Err((None, e)) => {
                    warn!(agent = %agent, error = %e, "observation failed");
                    self.event_log.log(Event::ObservationFailed {
                        epoch,
                        agent: agent.to_string(),
                        error: e.to_string(),
                    });
                    unobserved.push(agent);
                    continue;
                }
            };

            match turn {
                Turn::Idle => {}
                Turn::Skipped(kind, reason) => {
                    self.event_log.log(Event::ActionSkipped {
                        epoch,
                        agent: agent.to_string(),
                        action: kind,
                        reason: reason.clone(),
                    });
                    records.push(ActionRecord {
                        agent,
                        action: kind,
                        sequence: None,
                        status: ActionStatus::Skipped(reason),
                    });
                }
                Turn::Submitted(kind, action, submission) => {
                    self.event_log.log(Event::ActionSubmitted {
                        epoch,
                        agent: agent.to_string(),
                        action: kind,
                        sequence: submission.sequence,
                        attempts: submission.attempts,
                    });
                    info!(agent = %agent, action = %action, sequence = submission.sequence, "submitted");
                    pending.push((index, kind, submission));
                }
            }
        }

        // STEP 6: RECEIPTS
        for (index, kind, submission) in pending {
            let agent = self.agents[index].address().clone();
            let status = match self.submitter.wait_receipt(&submission.handle) {
                Ok(receipt) if receipt.success => ActionStatus::Succeeded,
                Ok(receipt) => ActionStatus::Reverted(receipt.reason.unwrap_or_default()),
                Err(e) => ActionStatus::Failed(e.to_string()),
            };
            let success = status == ActionStatus::Succeeded;
            self.agents[index].record_outcome(success);
            if !success {
                warn!(agent = %agent, action = %kind, status = ?status, "action did not succeed");
            }
            self.event_log.log(Event::ReceiptObserved {
                epoch,
                agent: agent.to_string(),
                action: kind,
                success,
            });
            records.push(ActionRecord {
                agent,
                action: kind,
                sequence: Some(submission.sequence),
                status,
            });
        }

        // STEP 7: REPORT
        let succeeded: Vec<ActionKind> = records
            .iter()
            .filter(|r| r.status == ActionStatus::Succeeded)
            .map(|r| r.action)
            .collect();
        let failed: Vec<ActionKind> = records
            .iter()
            .filter(|r| matches!(r.status, ActionStatus::Reverted(_) | ActionStatus::Failed(_)))
            .map(|r| r.action)
            .collect();
        let result = EpochResult {
            epoch,
            block,
            timestamp: now,
            // an unobserved agent might have acted; do not end the run on it
            anyone_acted: !records.is_empty() || !unobserved.is_empty(),
            maintainer,
            succeeded,
            failed,
            unobserved,
            records,
        };
        self.event_log.log(Event::EpochCompleted {
            epoch,
            attempted: result.attempted(),
            succeeded: result.succeeded.len(),
            failed: result.failures(),
        });
        info!(
            epoch,
            attempted = result.attempted(),
            succeeded = result.succeeded.len(),
            failed = result.failures(),
            "epoch complete"
        );
        Ok(result)
    }

    /// Move the ledger clock forward; shorter after a trade went through
    pub fn advance_time(&mut self, result: &EpochResult) -> Result<u64, SimulationError> {
        let seconds = self.config.time.seconds_for(result.traded());
        self.ledger.increase_time(seconds)?;
        debug!(seconds, traded = result.traded(), "advanced ledger time");
        Ok(seconds)
    }

    /// Run until an epoch has no actions or `max_epochs` is reached
    pub fn run(&mut self, max_epochs: Option<u64>) -> Result<RunSummary, SimulationError> {
        self.run_inner::<std::io::Sink>(max_epochs, None)
    }

    /// [`Orchestrator::run`], writing one log row per epoch
    pub fn run_with_log<W: Write>(
        &mut self,
        max_epochs: Option<u64>,
        log: &mut EpochLog<W>,
    ) -> Result<RunSummary, SimulationError> {
        self.run_inner(max_epochs, Some(log))
    }

    fn run_inner<W: Write>(
        &mut self,
        max_epochs: Option<u64>,
        mut log: Option<&mut EpochLog<W>>,
    ) -> Result<RunSummary, SimulationError> {
        let mut summary = RunSummary::default();
        let mut failed_in_a_row = 0u32;
        loop {
            if max_epochs.is_some_and(|max| summary.epochs >= max) {
                info!(epochs = summary.epochs, "epoch limit reached");
                break;
            }
            let result = match self.step() {
                Ok(result) => result,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    let epoch = self.clock.epoch().saturating_sub(1);
                    failed_in_a_row += 1;
                    summary.epochs += 1;
                    summary.failed_epochs += 1;
                    warn!(epoch, failed_in_a_row, error = %e, "epoch failed; continuing");
                    self.event_log.log(Event::EpochFailed {
                        epoch,
                        error: e.to_string(),
                    });
                    if failed_in_a_row >= MAX_CONSECUTIVE_FAILED_EPOCHS {
                        warn!(failed_in_a_row, "too many failed epochs in a row; stopping");
                        return Err(e);
                    }
                    let seconds = self.config.time.seconds_for(false);
                    if let Err(e) = self.ledger.increase_time(seconds) {
                        warn!(seconds, error = %e, "could not advance ledger time");
                    }
                    continue;
                }
            };
            failed_in_a_row = 0;
            summary.absorb(&result);

            if let Some(log) = log.as_deref_mut() {
                match self.snapshot() {
                    Ok(snapshot) => log.record(&EpochRow {
                        epoch: result.epoch,
                        snapshot,
                        attempted: result.attempted(),
                        succeeded: result.succeeded.len(),
                        failed: result.failures(),
                    })?,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => warn!(epoch = result.epoch, error = %e, "snapshot unavailable; row not written"),
                }
            }

            if !result.anyone_acted {
                info!(epoch = result.epoch, "no agent acted; stopping");
                break;
            }
            match self.advance_time(&result) {
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(error = %e, "could not advance ledger time"),
            }
        }
        Ok(summary)
    }

    /// Aggregate positions of every agent right now
    pub fn snapshot(&self) -> Result<MarketSnapshot, SimulationError> {
        let d = self.decimals;
        let mut written = Amount::zero(d);
        let mut held = Amount::zero(d);
        let mut collateral = Amount::zero(d);
        let mut credit = Amount::zero(d);

        let symbols: Vec<String> = self
            .market
            .active()
            .chain(self.market.expired())
            .map(Symbol::key)
            .collect();
        let mut tokens = Vec::with_capacity(symbols.len());
        for key in &symbols {
            tokens.push(self.ledger.option_token(key)?);
        }

        for agent in &self.agents {
            let who = agent.address();
            collateral = collateral.checked_add(&Amount::new(self.ledger.collateral(who)?, d))?;
            credit = credit.checked_add(&Amount::new(self.ledger.exchange_balance(who)?, d))?;
            for (key, token) in symbols.iter().zip(&tokens) {
                written = written.checked_add(&Amount::new(self.ledger.written_volume(who, key)?, d))?;
                if let Some(token) = token {
                    held = held.checked_add(&Amount::new(self.ledger.balance_of(token, who)?, d))?;
                }
            }
        }

        Ok(MarketSnapshot {
            block: self.ledger.block_number()?,
            timestamp: self.ledger.block_timestamp()?,
            price: Amount::new(self.ledger.feed_price(&self.deployment.feed)?, d),
            written,
            held,
            collateral,
            credit,
        })
    }

    // ========================================================================
    // Epoch phases
    // ========================================================================

    fn refresh_caches(&mut self) -> Result<(), SimulationError> {
        for cache in [&mut self.stablecoin, &mut self.pool_shares] {
            match cache.update(&[])? {
                UpdateOutcome::Applied { events, seeded } => {
                    debug!(token = %cache.symbol(), events, seeded, "cache refreshed");
                }
                UpdateOutcome::Skipped => {
                    warn!(token = %cache.symbol(), "transfer events unavailable; keeping cached balances");
                }
            }
        }
        Ok(())
    }

    fn refresh_market(&mut self, epoch: u64, now: u64) -> Result<(), SimulationError> {
        for symbol in self.market.refresh(self.ledger.as_ref(), now, self.decimals)? {
            self.event_log.log(Event::InstrumentRetired {
                epoch,
                symbol: symbol.key(),
            });
        }
        Ok(())
    }

    /// Daily upkeep by a randomly chosen agent: price sample, listings, curves
    fn maintain(&mut self, epoch: u64, now: u64) -> Result<Option<Address>, SimulationError> {
        if self.agents.is_empty() {
            return Ok(None);
        }
        let maintainer = self.agents[self.rng.index(self.agents.len())].address().clone();
        let feed = self.deployment.feed.clone();
        info!(maintainer = %maintainer, epoch, "daily maintenance");

        let price = self.feed.step(&mut self.rng)?;
        let call = RemoteCall::AppendPrice {
            feed: feed.clone(),
            price: price.to_raw_units(self.decimals)?,
        };
        if self.tolerate(self.submit_maintenance(&maintainer, &call), "append price")? {
            self.event_log.log(Event::PriceAppended {
                epoch,
                feed: feed.clone(),
                price: price.raw(),
            });
        }

        for symbol in self.market.missing(&self.grid, &feed, now) {
            let key = symbol.key();
            self.market.mark_listed(&key);
            let call = RemoteCall::AddSymbol { symbol: key.clone() };
            if self.tolerate(self.submit_maintenance(&maintainer, &call), "list instrument")? {
                self.event_log.log(Event::SymbolListed { epoch, symbol: key });
            }
        }
        let refreshed = self.refresh_market(epoch, now);
        self.tolerate(refreshed, "refresh instruments")?;

        let (spot, volatility) = match self.feed_inputs(&feed) {
            Ok(inputs) => inputs,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(feed = %feed, error = %e, "feed unavailable; keeping previous curves");
                return Ok(Some(maintainer));
            }
        };
        let active: Vec<Symbol> = self.market.active().cloned().collect();
        for symbol in active {
            let key = symbol.key();
            let input = PricingInput {
                price: spot,
                volatility,
                strike: symbol.strike().to_f64(),
                samples: self.config.samples,
                risk_free_rate: self.config.risk_free_rate,
                months_to_expiry: months_to_expiry(now, symbol.maturity()),
                option_type: symbol.option_type(),
            };
            let curve = match self.pricing.curve(&input, self.decimals) {
                Ok(curve) => curve,
                Err(e) => {
                    warn!(symbol = %key, error = %e, "pricing unavailable; keeping previous curve");
                    self.event_log.log(Event::PricingSkipped {
                        epoch,
                        symbol: key,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let (x, buy, sell) = curve.to_raw(self.decimals)?;
            let call = RemoteCall::UpdateCurve {
                symbol: key.clone(),
                x,
                buy,
                sell,
            };
            if self.tolerate(self.submit_maintenance(&maintainer, &call), "update curve")? {
                self.event_log.log(Event::CurveUpdated { epoch, symbol: key });
            }
        }

        Ok(Some(maintainer))
    }

    /// Spot price and annualised volatility of `feed`
    fn feed_inputs(&self, feed: &str) -> Result<(f64, f64), SimulationError> {
        let spot = Amount::new(self.ledger.feed_price(feed)?, self.decimals);
        let volatility = Amount::new(self.ledger.feed_volatility(feed)?, self.decimals);
        Ok((spot.to_f64(), volatility.to_f64()))
    }

    fn submit_maintenance(&self, from: &Address, call: &RemoteCall) -> Result<(), SimulationError> {
        let receipt = self
            .submitter
            .submit_and_wait(from, call, self.config.gas_budget)?;
        if receipt.success {
            Ok(())
        } else {
            Err(SimulationError::Reverted(receipt.reason.unwrap_or_default()))
        }
    }

    /// `Ok(true)` on success, `Ok(false)` after logging a non-fatal error
    fn tolerate(&self, outcome: Result<(), SimulationError>, what: &str) -> Result<bool, SimulationError> {
        match outcome {
            Ok(()) => Ok(true),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(task = what, error = %e, "maintenance task failed");
                Ok(false)
            }
        }
    }

    fn market_context(&self, now: u64) -> Result<MarketContext, SimulationError> {
        let d = self.decimals;
        let mut quotes = BTreeMap::new();
        let mut option_tokens = BTreeMap::new();
        for symbol in self.market.active().chain(self.market.expired()) {
            let key = symbol.key();
            if let Some(token) = self.ledger.option_token(&key)? {
                option_tokens.insert(key.clone(), token);
            }
            if symbol.is_expired(now) {
                continue;
            }
            if let Some(q) = self.ledger.quote(&key)? {
                quotes.insert(
                    key,
                    PoolQuote {
                        buy_price: Amount::new(q.buy_price, d),
                        sell_price: Amount::new(q.sell_price, d),
                        max_volume: Amount::new(q.max_volume, d),
                    },
                );
            }
        }
        Ok(MarketContext {
            spot: Amount::new(self.ledger.feed_price(&self.deployment.feed)?, d),
            pool_free: Amount::new(self.ledger.pool_free_balance()?, d),
            quotes,
            option_tokens,
        })
    }

    /// Everything agent `index` can see right now
    fn observe(&self, index: usize, block: u64, now: u64, ctx: &MarketContext) -> Result<Observation, SimulationError> {
        let d = self.decimals;
        let agent = &self.agents[index];
        let who = agent.address();

        let mut instruments = Vec::new();
        let listed = self
            .market
            .active()
            .map(|s| (s, false))
            .chain(self.market.expired().map(|s| (s, true)));
        for (symbol, expired) in listed {
            let key = symbol.key();
            let held = match ctx.option_tokens.get(&key) {
                Some(token) => self.ledger.balance_of(token, who)?,
                None => 0,
            };
            instruments.push(InstrumentView {
                symbol: symbol.clone(),
                expired,
                held: Amount::new(held, d),
                written: Amount::new(self.ledger.written_volume(who, &key)?, d),
                quote: if expired { None } else { ctx.quotes.get(&key).copied() },
            });
        }

        Ok(Observation {
            block,
            now,
            spot: ctx.spot,
            wallet: self.stablecoin.get(agent)?,
            exchange_free: Amount::new(self.ledger.exchange_balance(who)?, d),
            pool_shares: self.pool_shares.get(agent)?,
            pool_free: ctx.pool_free,
            min_deposit: self.min_deposit,
            instruments,
        })
    }

    /// Observe, draw, size, approve and submit for agent `index`
    ///
    /// Errors carry the drawn action when there was one.
    fn take_turn(
        &mut self,
        index: usize,
        block: u64,
        now: u64,
        ctx: &MarketContext,
    ) -> Result<Turn, (Option<ActionKind>, SimulationError)> {
        let obs = self.observe(index, block, now, ctx).map_err(|e| (None, e))?;
        let Some(kind) = StrategyEngine::choose(self.agents[index].profile(), &obs, &mut self.rng) else {
            return Ok(Turn::Idle);
        };
        self.perform(index, kind, &obs).map_err(|e| (Some(kind), e))
    }

    fn perform(&mut self, index: usize, kind: ActionKind, obs: &Observation) -> Result<Turn, SimulationError> {
        let commitment = self.agents[index].profile().commitment(&mut self.rng);
        let Some(action) = plan_action(kind, obs, commitment, &mut self.rng)? else {
            return Ok(Turn::Skipped(kind, "nothing to commit".to_string()));
        };

        let agent = &self.agents[index];
        if let Some(spender) = spender_for(kind, &self.deployment) {
            self.stablecoin
                .ensure_approved(agent, spender, &self.submitter, self.config.gas_budget)?;
        }
        let call = to_remote_call(&action, agent.address(), &self.deployment, self.decimals)?;
        let submission = self.submitter.submit(agent, &call, self.config.gas_budget)?;
        self.agents[index].record_submission(submission.sequence);
        Ok(Turn::Submitted(kind, action, submission))
    }
}
