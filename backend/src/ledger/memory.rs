//! In-process ledger
//!
//! A deterministic stand-in for the remote chain: ERC20-style tokens with
//! transfer logs, an options exchange, a liquidity pool and a price feed,
//! behind the same [`Ledger`] trait the simulator uses for a real node.
//!
//! Every accepted transaction mines its own block. Business-rule failures
//! revert (the receipt reports `success == false`) but still consume the
//! sender's sequence number, as on a real chain.
//!
//! Test hooks:
//! - [`InMemoryLedger::inject_fault`] queues errors returned by the next
//!   `transact` calls before any sequence check
//! - [`InMemoryLedger::set_events_available`] simulates an event-source outage
//! - [`InMemoryLedger::balance_queries`] counts `balance_of` round trips

use super::{
    Deployment, Ledger, LedgerError, Quote, Receipt, RemoteCall, TokenInfo, TransferBatch,
    TransferEvent, TxHandle, TxOptions,
};
use crate::core::Amount;
use crate::models::{Address, Symbol};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Allowance value treated as "never runs out"
const UNLIMITED: i128 = i128::MAX;

/// Parameters for a fresh deployment
#[derive(Debug, Clone)]
pub struct LedgerSetup {
    /// Decimals of the stablecoin; option volumes, strikes, prices and pool
    /// shares use the same scale
    pub decimals: u32,
    pub stablecoin_symbol: String,
    pub start_timestamp: u64,
    pub feed: String,
    /// First feed sample, raw units
    pub initial_price: i128,
    /// Annualised volatility reported until the feed has two samples
    pub initial_volatility: f64,
}

impl Default for LedgerSetup {
    fn default() -> Self {
        Self {
            decimals: 6,
            stablecoin_symbol: "USDC".to_string(),
            start_timestamp: 1_700_000_000,
            feed: "ETH/USD".to_string(),
            initial_price: 2_000_000_000,
            initial_volatility: 0.8,
        }
    }
}

#[derive(Debug, Default)]
struct Token {
    symbol: String,
    decimals: u32,
    total_supply: i128,
    balances: HashMap<Address, i128>,
    allowances: HashMap<(Address, Address), i128>,
    log: Vec<TransferEvent>,
}

impl Token {
    fn new(symbol: impl Into<String>, decimals: u32) -> Self {
        Self {
            symbol: symbol.into(),
            decimals,
            ..Self::default()
        }
    }

    fn balance(&self, who: &Address) -> i128 {
        self.balances.get(who).copied().unwrap_or(0)
    }
}

#[derive(Debug)]
struct Curve {
    x: Vec<i128>,
    buy: Vec<i128>,
    sell: Vec<i128>,
}

#[derive(Debug)]
struct Listing {
    symbol: Symbol,
    token: Address,
    curve: Option<Curve>,
}

#[derive(Debug)]
struct State {
    block: u64,
    timestamp: u64,
    next_address: u64,
    tx_counts: HashMap<Address, u64>,
    receipts: HashMap<TxHandle, Receipt>,
    tokens: HashMap<Address, Token>,
    deposits: HashMap<Address, i128>,
    written: HashMap<(Address, String), i128>,
    pool_written: HashMap<String, i128>,
    listings: BTreeMap<String, Listing>,
    feeds: HashMap<String, Vec<i128>>,
    faults: VecDeque<LedgerError>,
    read_faults: HashMap<String, VecDeque<LedgerError>>,
    events_available: bool,
    balance_queries: u64,
}

type Revert = String;

fn mul_div(a: i128, b: i128, divisor: i128) -> Result<i128, Revert> {
    a.checked_mul(b)
        .map(|v| v / divisor)
        .ok_or_else(|| "arithmetic overflow".to_string())
}

impl State {
    fn fresh_address(&mut self) -> Address {
        self.next_address += 1;
        // contracts live well above the agent range
        Address::from_index(0xc0_0000_0000 + self.next_address)
    }

    fn token(&self, token: &Address) -> Result<&Token, Revert> {
        self.tokens
            .get(token)
            .ok_or_else(|| format!("no token at {token}"))
    }

    fn token_mut(&mut self, token: &Address) -> Result<&mut Token, Revert> {
        self.tokens
            .get_mut(token)
            .ok_or_else(|| format!("no token at {token}"))
    }

    fn transfer(&mut self, token: &Address, from: &Address, to: &Address, value: i128) -> Result<(), Revert> {
        let t = self.token_mut(token)?;
        if value < 0 || t.balance(from) < value {
            return Err(format!("{}: transfer amount exceeds balance", t.symbol));
        }
        *t.balances.entry(from.clone()).or_default() -= value;
        *t.balances.entry(to.clone()).or_default() += value;
        t.log.push(TransferEvent {
            from: from.clone(),
            to: to.clone(),
            value,
        });
        Ok(())
    }

    fn transfer_from(
        &mut self,
        token: &Address,
        spender: &Address,
        owner: &Address,
        to: &Address,
        value: i128,
    ) -> Result<(), Revert> {
        let t = self.token_mut(token)?;
        let key = (owner.clone(), spender.clone());
        let allowance = t.allowances.get(&key).copied().unwrap_or(0);
        if allowance < value {
            return Err(format!("{}: transfer amount exceeds allowance", t.symbol));
        }
        self.transfer(token, owner, to, value)?;
        if allowance != UNLIMITED {
            self.token_mut(token)?.allowances.insert(key, allowance - value);
        }
        Ok(())
    }

    fn mint(&mut self, token: &Address, to: &Address, value: i128) -> Result<(), Revert> {
        let t = self.token_mut(token)?;
        t.total_supply = t
            .total_supply
            .checked_add(value)
            .ok_or_else(|| "total supply overflow".to_string())?;
        *t.balances.entry(to.clone()).or_default() += value;
        t.log.push(TransferEvent {
            from: Address::zero(),
            to: to.clone(),
            value,
        });
        Ok(())
    }

    fn burn(&mut self, token: &Address, from: &Address, value: i128) -> Result<(), Revert> {
        let t = self.token_mut(token)?;
        if t.balance(from) < value {
            return Err(format!("{}: burn amount exceeds balance", t.symbol));
        }
        t.total_supply -= value;
        *t.balances.entry(from.clone()).or_default() -= value;
        t.log.push(TransferEvent {
            from: from.clone(),
            to: Address::zero(),
            value,
        });
        Ok(())
    }

    fn listing(&self, key: &str) -> Result<&Listing, Revert> {
        self.listings
            .get(key)
            .ok_or_else(|| format!("unknown symbol {key}"))
    }

    fn spot(&self, feed: &str) -> Result<i128, Revert> {
        self.feeds
            .get(feed)
            .and_then(|samples| samples.last().copied())
            .ok_or_else(|| format!("feed {feed} has no price"))
    }
}

/// Deterministic in-memory [`Ledger`]
///
/// # Example
/// ```
/// use options_sim_core::ledger::{InMemoryLedger, Ledger, LedgerSetup};
///
/// let ledger = InMemoryLedger::deploy(LedgerSetup::default());
/// let usdc = ledger.deployment().stablecoin.clone();
/// let alice = options_sim_core::Address::from_index(1);
///
/// ledger.mint(&usdc, &alice, 5_000_000).unwrap();
/// assert_eq!(ledger.balance_of(&usdc, &alice).unwrap(), 5_000_000);
/// ```
#[derive(Debug)]
pub struct InMemoryLedger {
    state: Mutex<State>,
    deployment: Deployment,
    decimals: u32,
    initial_volatility: f64,
}

impl InMemoryLedger {
    /// Create the contracts and seed the feed with its first sample
    pub fn deploy(setup: LedgerSetup) -> Self {
        let mut state = State {
            block: 0,
            timestamp: setup.start_timestamp,
            next_address: 0,
            tx_counts: HashMap::new(),
            receipts: HashMap::new(),
            tokens: HashMap::new(),
            deposits: HashMap::new(),
            written: HashMap::new(),
            pool_written: HashMap::new(),
            listings: BTreeMap::new(),
            feeds: HashMap::new(),
            faults: VecDeque::new(),
            read_faults: HashMap::new(),
            events_available: true,
            balance_queries: 0,
        };

        let stablecoin = state.fresh_address();
        state
            .tokens
            .insert(stablecoin.clone(), Token::new(setup.stablecoin_symbol.clone(), setup.decimals));
        let exchange = state.fresh_address();
        let pool = state.fresh_address();
        state
            .tokens
            .insert(pool.clone(), Token::new("LP", setup.decimals));
        state
            .feeds
            .insert(setup.feed.clone(), vec![setup.initial_price]);

        Self {
            state: Mutex::new(state),
            deployment: Deployment {
                stablecoin,
                exchange,
                pool,
                feed: setup.feed,
            },
            decimals: setup.decimals,
            initial_volatility: setup.initial_volatility,
        }
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, LedgerError> {
        self.state
            .lock()
            .map_err(|_| LedgerError::Unavailable("ledger state poisoned".to_string()))
    }

    /// Faucet mint outside the transaction flow (no sequence consumed)
    pub fn mint(&self, token: &Address, to: &Address, amount: i128) -> Result<(), LedgerError> {
        let mut state = self.state()?;
        state.block += 1;
        state.mint(token, to, amount).map_err(LedgerError::Rejected)
    }

    /// Faucet transfer outside the transaction flow (no sequence consumed)
    pub fn transfer(&self, token: &Address, from: &Address, to: &Address, amount: i128) -> Result<(), LedgerError> {
        let mut state = self.state()?;
        state.block += 1;
        state.transfer(token, from, to, amount).map_err(LedgerError::Rejected)
    }

    /// Queue an error for the next `transact` call
    pub fn inject_fault(&self, error: LedgerError) -> Result<(), LedgerError> {
        self.state()?.faults.push_back(error);
        Ok(())
    }

    /// Queue an error for the next call of the read named `query`
    /// (`"block_number"`, `"pool_free_balance"`, ...)
    pub fn inject_read_fault(&self, query: &str, error: LedgerError) -> Result<(), LedgerError> {
        self.state()?
            .read_faults
            .entry(query.to_string())
            .or_default()
            .push_back(error);
        Ok(())
    }

    fn read(&self, query: &str) -> Result<MutexGuard<'_, State>, LedgerError> {
        let mut state = self.state()?;
        if let Some(fault) = state.read_faults.get_mut(query).and_then(VecDeque::pop_front) {
            return Err(fault);
        }
        Ok(state)
    }

    pub fn set_events_available(&self, available: bool) -> Result<(), LedgerError> {
        self.state()?.events_available = available;
        Ok(())
    }

    /// Number of `balance_of` calls served so far
    pub fn balance_queries(&self) -> u64 {
        self.state.lock().map(|s| s.balance_queries).unwrap_or(0)
    }

    fn scale(&self) -> Result<i128, Revert> {
        10i128
            .checked_pow(self.decimals)
            .ok_or_else(|| "decimals too large".to_string())
    }

    fn collateral_of(&self, state: &State, who: &Address) -> Result<i128, Revert> {
        let one = self.scale()?;
        let mut total = 0i128;
        for ((owner, key), volume) in &state.written {
            if owner != who || *volume == 0 {
                continue;
            }
            let strike = state.listing(key)?.symbol.strike().raw();
            total += mul_div(strike, *volume, one)?;
        }
        Ok(total)
    }

    fn free_balance_of(&self, state: &State, who: &Address) -> Result<i128, Revert> {
        let deposits = state.deposits.get(who).copied().unwrap_or(0);
        Ok(deposits - self.collateral_of(state, who)?)
    }

    fn pool_free_of(&self, state: &State) -> Result<i128, Revert> {
        let one = self.scale()?;
        let balance = state.token(&self.deployment.stablecoin)?.balance(&self.deployment.pool);
        let mut locked = 0i128;
        for (key, volume) in &state.pool_written {
            let listing = state.listing(key)?;
            if !listing.symbol.is_expired(state.timestamp) {
                locked += mul_div(listing.symbol.strike().raw(), *volume, one)?;
            }
        }
        Ok(balance - locked)
    }

    fn intrinsic(&self, state: &State, symbol: &Symbol) -> Result<i128, Revert> {
        let spot = Amount::new(state.spot(symbol.feed())?, self.decimals);
        symbol
            .intrinsic_value(&spot)
            .map(|v| v.raw())
            .map_err(|e| e.to_string())
    }

    fn active_listing<'a>(&self, state: &'a State, key: &str) -> Result<&'a Listing, Revert> {
        let listing = state.listing(key)?;
        if listing.symbol.is_expired(state.timestamp) {
            return Err(format!("{key} has expired"));
        }
        Ok(listing)
    }

    fn expired_listing<'a>(&self, state: &'a State, key: &str) -> Result<&'a Listing, Revert> {
        let listing = state.listing(key)?;
        if !listing.symbol.is_expired(state.timestamp) {
            return Err(format!("{key} has not expired"));
        }
        Ok(listing)
    }

    fn quote_of(listing: &Listing) -> Option<Quote> {
        let curve = listing.curve.as_ref()?;
        Some(Quote {
            buy_price: *curve.buy.first()?,
            sell_price: *curve.sell.first()?,
            max_volume: *curve.x.last()?,
        })
    }

    /// Apply one call; on `Err` nothing has been changed
    fn execute(&self, state: &mut State, from: &Address, call: &RemoteCall) -> Result<(), Revert> {
        let d = &self.deployment;
        let one = self.scale()?;
        match call {
            RemoteCall::Approve {
                token,
                spender,
                amount,
            } => {
                state
                    .token_mut(token)?
                    .allowances
                    .insert((from.clone(), spender.clone()), *amount);
                Ok(())
            }
            RemoteCall::Mint { token, to, amount } => {
                if token != &d.stablecoin {
                    return Err("only the stablecoin has a faucet".to_string());
                }
                state.mint(token, to, *amount)
            }
            RemoteCall::DepositTokens { to, token, amount } => {
                if token != &d.stablecoin {
                    return Err("token not accepted as collateral".to_string());
                }
                state.transfer_from(token, &d.exchange, from, &d.exchange, *amount)?;
                *state.deposits.entry(to.clone()).or_default() += amount;
                Ok(())
            }
            RemoteCall::Withdraw { amount } => {
                if *amount <= 0 || self.free_balance_of(state, from)? < *amount {
                    return Err("insufficient free balance".to_string());
                }
                state.transfer(&d.stablecoin, &d.exchange, from, *amount)?;
                *state.deposits.entry(from.clone()).or_default() -= amount;
                Ok(())
            }
            RemoteCall::WriteOptions { symbol, volume } => {
                let listing = self.active_listing(state, symbol)?;
                if *volume <= 0 {
                    return Err("volume must be positive".to_string());
                }
                let required = mul_div(listing.symbol.strike().raw(), *volume, one)?;
                if self.free_balance_of(state, from)? < required {
                    return Err("insufficient collateral".to_string());
                }
                let token = listing.token.clone();
                state.mint(&token, from, *volume)?;
                *state
                    .written
                    .entry((from.clone(), symbol.clone()))
                    .or_default() += volume;
                Ok(())
            }
            RemoteCall::BurnOptions { symbol, volume } => {
                let token = self.active_listing(state, symbol)?.token.clone();
                let key = (from.clone(), symbol.clone());
                let written = state.written.get(&key).copied().unwrap_or(0);
                if *volume <= 0 || written < *volume {
                    return Err("burn exceeds written volume".to_string());
                }
                state.burn(&token, from, *volume)?;
                state.written.insert(key, written - volume);
                Ok(())
            }
            RemoteCall::LiquidateOptions { symbol } => {
                let listing = self.expired_listing(state, symbol)?;
                let key = (from.clone(), symbol.clone());
                let written = state.written.get(&key).copied().unwrap_or(0);
                if written <= 0 {
                    return Err("nothing to liquidate".to_string());
                }
                let owed = mul_div(self.intrinsic(state, &listing.symbol)?, written, one)?;
                let deposits = state.deposits.entry(from.clone()).or_default();
                *deposits -= owed.min(*deposits);
                state.written.insert(key, 0);
                Ok(())
            }
            RemoteCall::Redeem { symbol } => {
                let listing = self.expired_listing(state, symbol)?;
                let token = listing.token.clone();
                let held = state.token(&token)?.balance(from);
                if held <= 0 {
                    return Err("nothing to redeem".to_string());
                }
                let payout = mul_div(self.intrinsic(state, &listing.symbol)?, held, one)?;
                state.burn(&token, from, held)?;
                *state.deposits.entry(from.clone()).or_default() += payout;
                Ok(())
            }
            RemoteCall::Buy {
                symbol,
                price,
                volume,
                token,
            } => {
                if token != &d.stablecoin {
                    return Err("pool only accepts the stablecoin".to_string());
                }
                let listing = self.active_listing(state, symbol)?;
                let quote = Self::quote_of(listing).ok_or_else(|| format!("{symbol} has no curve"))?;
                if *volume <= 0 || *volume > quote.max_volume {
                    return Err("volume outside curve".to_string());
                }
                if *price < quote.buy_price {
                    return Err("price below pool ask".to_string());
                }
                let required = mul_div(listing.symbol.strike().raw(), *volume, one)?;
                if self.pool_free_of(state)? < required {
                    return Err("pool cannot collateralize".to_string());
                }
                let option_token = listing.token.clone();
                let cost = mul_div(*price, *volume, one)?;
                state.transfer_from(token, &d.pool, from, &d.pool, cost)?;
                state.mint(&option_token, from, *volume)?;
                *state.pool_written.entry(symbol.clone()).or_default() += volume;
                Ok(())
            }
            RemoteCall::Sell {
                symbol,
                price,
                volume,
            } => {
                let listing = self.active_listing(state, symbol)?;
                let quote = Self::quote_of(listing).ok_or_else(|| format!("{symbol} has no curve"))?;
                if *price > quote.sell_price {
                    return Err("price above pool bid".to_string());
                }
                let option_token = listing.token.clone();
                if *volume <= 0 || state.token(&option_token)?.balance(from) < *volume {
                    return Err("sell exceeds holdings".to_string());
                }
                let payment = mul_div(*price, *volume, one)?;
                if self.pool_free_of(state)? < payment {
                    return Err("pool lacks free balance".to_string());
                }
                state.burn(&option_token, from, *volume)?;
                let open = state.pool_written.entry(symbol.clone()).or_default();
                *open = (*open - volume).max(0);
                state.transfer(&d.stablecoin, &d.pool, from, payment)
            }
            RemoteCall::DepositPool { amount } => {
                if *amount <= 0 {
                    return Err("amount must be positive".to_string());
                }
                let value = state.token(&d.stablecoin)?.balance(&d.pool);
                let supply = state.token(&d.pool)?.total_supply;
                let shares = if supply == 0 || value == 0 {
                    *amount
                } else {
                    mul_div(*amount, supply, value)?
                };
                state.transfer_from(&d.stablecoin, &d.pool, from, &d.pool, *amount)?;
                state.mint(&d.pool, from, shares)
            }
            RemoteCall::WithdrawPool { shares } => {
                let supply = state.token(&d.pool)?.total_supply;
                if *shares <= 0 || state.token(&d.pool)?.balance(from) < *shares {
                    return Err("withdraw exceeds shares".to_string());
                }
                let payout = mul_div(self.pool_free_of(state)?.max(0), *shares, supply)?;
                state.burn(&d.pool, from, *shares)?;
                state.transfer(&d.stablecoin, &d.pool, from, payout)
            }
            RemoteCall::AddSymbol { symbol } => {
                if state.listings.contains_key(symbol) {
                    return Err(format!("{symbol} already listed"));
                }
                let parsed = Symbol::parse(symbol, self.decimals).map_err(|e| e.to_string())?;
                if !state.feeds.contains_key(parsed.feed()) {
                    return Err(format!("unknown feed {}", parsed.feed()));
                }
                let token = state.fresh_address();
                state
                    .tokens
                    .insert(token.clone(), Token::new(symbol.clone(), self.decimals));
                state.listings.insert(
                    symbol.clone(),
                    Listing {
                        symbol: parsed,
                        token,
                        curve: None,
                    },
                );
                Ok(())
            }
            RemoteCall::UpdateCurve { symbol, x, buy, sell } => {
                if x.is_empty() || x.len() != buy.len() || x.len() != sell.len() {
                    return Err("curve arrays must be non-empty and of equal length".to_string());
                }
                let listing = state
                    .listings
                    .get_mut(symbol)
                    .ok_or_else(|| format!("unknown symbol {symbol}"))?;
                listing.curve = Some(Curve {
                    x: x.clone(),
                    buy: buy.clone(),
                    sell: sell.clone(),
                });
                Ok(())
            }
            RemoteCall::AppendPrice { feed, price } => {
                if *price <= 0 {
                    return Err("price must be positive".to_string());
                }
                state.feeds.entry(feed.clone()).or_default().push(*price);
                Ok(())
            }
        }
    }
}

impl Ledger for InMemoryLedger {
    fn block_number(&self) -> Result<u64, LedgerError> {
        Ok(self.read("block_number")?.block)
    }

    fn block_timestamp(&self) -> Result<u64, LedgerError> {
        Ok(self.read("block_timestamp")?.timestamp)
    }

    fn transaction_count(&self, account: &Address) -> Result<u64, LedgerError> {
        Ok(self.read("transaction_count")?.tx_counts.get(account).copied().unwrap_or(0))
    }

    fn token_info(&self, token: &Address) -> Result<TokenInfo, LedgerError> {
        let state = self.read("token_info")?;
        let t = state.token(token).map_err(LedgerError::Rejected)?;
        Ok(TokenInfo {
            symbol: t.symbol.clone(),
            decimals: t.decimals,
            total_supply: t.total_supply,
        })
    }

    fn balance_of(&self, token: &Address, who: &Address) -> Result<i128, LedgerError> {
        let mut state = self.read("balance_of")?;
        state.balance_queries += 1;
        let t = state.token(token).map_err(LedgerError::Rejected)?;
        Ok(t.balance(who))
    }

    fn transfer_log_head(&self, token: &Address) -> Result<u64, LedgerError> {
        let state = self.read("transfer_log_head")?;
        let t = state.token(token).map_err(LedgerError::Rejected)?;
        Ok(t.log.len() as u64)
    }

    fn transfer_events(&self, token: &Address, cursor: u64) -> Result<TransferBatch, LedgerError> {
        let state = self.read("transfer_events")?;
        if !state.events_available {
            return Err(LedgerError::Unavailable("event filter not responding".to_string()));
        }
        let t = state.token(token).map_err(LedgerError::Rejected)?;
        let start = (cursor as usize).min(t.log.len());
        Ok(TransferBatch {
            events: t.log[start..].to_vec(),
            next_cursor: t.log.len() as u64,
        })
    }

    fn exchange_balance(&self, who: &Address) -> Result<i128, LedgerError> {
        let state = self.read("exchange_balance")?;
        self.free_balance_of(&state, who).map_err(LedgerError::Rejected)
    }

    fn collateral(&self, who: &Address) -> Result<i128, LedgerError> {
        let state = self.read("collateral")?;
        self.collateral_of(&state, who).map_err(LedgerError::Rejected)
    }

    fn written_volume(&self, who: &Address, symbol: &str) -> Result<i128, LedgerError> {
        let state = self.read("written_volume")?;
        Ok(state
            .written
            .get(&(who.clone(), symbol.to_string()))
            .copied()
            .unwrap_or(0))
    }

    fn option_token(&self, symbol: &str) -> Result<Option<Address>, LedgerError> {
        Ok(self.read("option_token")?.listings.get(symbol).map(|l| l.token.clone()))
    }

    fn option_supply(&self, symbol: &str) -> Result<i128, LedgerError> {
        let state = self.read("option_supply")?;
        let listing = state.listing(symbol).map_err(LedgerError::Rejected)?;
        let t = state.token(&listing.token).map_err(LedgerError::Rejected)?;
        Ok(t.total_supply)
    }

    fn symbols(&self) -> Result<Vec<String>, LedgerError> {
        Ok(self.read("symbols")?.listings.keys().cloned().collect())
    }

    fn quote(&self, symbol: &str) -> Result<Option<Quote>, LedgerError> {
        let state = self.read("quote")?;
        Ok(state.listings.get(symbol).and_then(Self::quote_of))
    }

    fn pool_free_balance(&self) -> Result<i128, LedgerError> {
        let state = self.read("pool_free_balance")?;
        self.pool_free_of(&state).map_err(LedgerError::Rejected)
    }

    fn feed_price(&self, feed: &str) -> Result<i128, LedgerError> {
        self.read("feed_price")?.spot(feed).map_err(LedgerError::Rejected)
    }

    fn feed_volatility(&self, feed: &str) -> Result<i128, LedgerError> {
        let state = self.read("feed_volatility")?;
        let samples = state
            .feeds
            .get(feed)
            .ok_or_else(|| LedgerError::Rejected(format!("unknown feed {feed}")))?;

        let returns: Vec<f64> = samples
            .windows(2)
            .filter(|w| w[0] > 0 && w[1] > 0)
            .map(|w| (w[1] as f64 / w[0] as f64).ln())
            .collect();
        let annualised = if returns.len() < 2 {
            self.initial_volatility
        } else {
            let n = returns.len() as f64;
            let mean = returns.iter().sum::<f64>() / n;
            let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
            // one sample per simulated day
            (var * 365.0).sqrt()
        };
        Ok((annualised * 10f64.powi(self.decimals as i32)) as i128)
    }

    fn transact(&self, call: &RemoteCall, opts: &TxOptions) -> Result<TxHandle, LedgerError> {
        let mut state = self.state()?;
        if let Some(fault) = state.faults.pop_front() {
            return Err(fault);
        }

        let expected = state.tx_counts.get(&opts.from).copied().unwrap_or(0);
        if opts.sequence < expected {
            return Err(LedgerError::SequenceTooLow {
                account: opts.from.clone(),
                given: opts.sequence,
                expected,
            });
        }
        if opts.gas_budget == 0 {
            return Err(LedgerError::Rejected("intrinsic gas too low".to_string()));
        }

        // gaps are accepted: the transaction is mined right away
        state.tx_counts.insert(opts.from.clone(), opts.sequence + 1);
        state.block += 1;

        let handle = TxHandle::new();
        let outcome = self.execute(&mut state, &opts.from, call);
        let receipt = Receipt {
            handle,
            block_number: state.block,
            success: outcome.is_ok(),
            reason: outcome.err(),
        };
        state.receipts.insert(handle, receipt);
        Ok(handle)
    }

    fn receipt(&self, handle: &TxHandle) -> Result<Option<Receipt>, LedgerError> {
        self.state()?
            .receipts
            .get(handle)
            .cloned()
            .map(Some)
            .ok_or(LedgerError::UnknownHandle(*handle))
    }

    fn increase_time(&self, seconds: u64) -> Result<(), LedgerError> {
        let mut state = self.state()?;
        state.timestamp += seconds;
        state.block += 1;
        Ok(())
    }
}
