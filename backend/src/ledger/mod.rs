//! Remote ledger interface
//!
//! The ledger is the single source of truth for balances, positions, quotes
//! and time. The simulator only ever reads it through views and mutates it
//! through ordered transactions signed with a per-account sequence number.
//!
//! # Critical Invariants
//!
//! 1. Every amount crossing this boundary is raw integer units (`i128`);
//!    callers convert with [`crate::Amount::to_raw_units`] so scale mistakes
//!    fail before a call is built
//! 2. `transact` consumes the sequence number only when it returns `Ok`
//! 3. A reverted transaction still consumes its sequence number; the failure
//!    shows up in its [`Receipt`], not as an error from `transact`

pub mod memory;

use crate::models::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

pub use memory::{InMemoryLedger, LedgerSetup};

/// Errors reported by the ledger client
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Sequence {given} too low for {account} (next is {expected})")]
    SequenceTooLow {
        account: Address,
        given: u64,
        expected: u64,
    },

    #[error("Replacement transaction underpriced for {account} at sequence {sequence}")]
    ReplacementUnderpriced { account: Address, sequence: u64 },

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Call rejected: {0}")]
    Rejected(String),

    #[error("Unknown transaction handle {0}")]
    UnknownHandle(TxHandle),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl LedgerError {
    /// The candidate sequence number collided with one already used
    pub fn is_sequence_conflict(&self) -> bool {
        matches!(
            self,
            LedgerError::SequenceTooLow { .. } | LedgerError::ReplacementUnderpriced { .. }
        )
    }
}

/// Opaque identifier of a submitted transaction, used to poll its receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHandle(Uuid);

impl TxHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TxHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signing options for one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOptions {
    pub sequence: u64,
    pub from: Address,
    pub gas_budget: u64,
    pub gas_price: u64,
}

/// Outcome of a mined transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub handle: TxHandle,
    pub block_number: u64,
    pub success: bool,
    /// Revert message when `success` is false
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub symbol: String,
    pub decimals: u32,
    pub total_supply: i128,
}

/// One ERC20-style `Transfer(from, to, value)` log entry.
///
/// The zero address on either side marks a mint or burn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    pub value: i128,
}

/// Transfer events after a cursor, plus the cursor to resume from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransferBatch {
    pub events: Vec<TransferEvent>,
    pub next_cursor: u64,
}

/// Pool prices for one instrument, taken from the head of its curve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    /// What the pool charges per unit
    pub buy_price: i128,
    /// What the pool pays per unit
    pub sell_price: i128,
    /// Largest volume the curve covers
    pub max_volume: i128,
}

/// Where the simulated contracts live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Settlement token agents hold and deposit
    pub stablecoin: Address,
    /// Options exchange holding deposits and collateral
    pub exchange: Address,
    /// Liquidity pool; also the token of its shares
    pub pool: Address,
    /// Price feed the instruments settle against
    pub feed: String,
}

/// State-mutating calls the simulator can submit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Approve {
        token: Address,
        spender: Address,
        amount: i128,
    },
    Mint {
        token: Address,
        to: Address,
        amount: i128,
    },
    DepositTokens {
        to: Address,
        token: Address,
        amount: i128,
    },
    Withdraw {
        amount: i128,
    },
    WriteOptions {
        symbol: String,
        volume: i128,
    },
    Buy {
        symbol: String,
        price: i128,
        volume: i128,
        token: Address,
    },
    Sell {
        symbol: String,
        price: i128,
        volume: i128,
    },
    BurnOptions {
        symbol: String,
        volume: i128,
    },
    LiquidateOptions {
        symbol: String,
    },
    Redeem {
        symbol: String,
    },
    DepositPool {
        amount: i128,
    },
    WithdrawPool {
        shares: i128,
    },
    AddSymbol {
        symbol: String,
    },
    UpdateCurve {
        symbol: String,
        x: Vec<i128>,
        buy: Vec<i128>,
        sell: Vec<i128>,
    },
    AppendPrice {
        feed: String,
        price: i128,
    },
}

impl RemoteCall {
    pub fn name(&self) -> &'static str {
        match self {
            RemoteCall::Approve { .. } => "approve",
            RemoteCall::Mint { .. } => "mint",
            RemoteCall::DepositTokens { .. } => "depositTokens",
            RemoteCall::Withdraw { .. } => "withdraw",
            RemoteCall::WriteOptions { .. } => "writeOptions",
            RemoteCall::Buy { .. } => "buy",
            RemoteCall::Sell { .. } => "sell",
            RemoteCall::BurnOptions { .. } => "burn",
            RemoteCall::LiquidateOptions { .. } => "liquidateOptions",
            RemoteCall::Redeem { .. } => "redeem",
            RemoteCall::DepositPool { .. } => "depositTokens(pool)",
            RemoteCall::WithdrawPool { .. } => "withdraw(pool)",
            RemoteCall::AddSymbol { .. } => "addSymbol",
            RemoteCall::UpdateCurve { .. } => "setParameters",
            RemoteCall::AppendPrice { .. } => "appendPrice",
        }
    }
}

/// Client for the remote ledger.
///
/// Views take `&self` and may be called from several threads; the client is
/// responsible for its own connection handling.
pub trait Ledger: Send + Sync {
    fn block_number(&self) -> Result<u64, LedgerError>;

    /// Timestamp of the latest block, in seconds
    fn block_timestamp(&self) -> Result<u64, LedgerError>;

    /// Transactions the ledger has accepted from `account` (its next sequence)
    fn transaction_count(&self, account: &Address) -> Result<u64, LedgerError>;

    fn token_info(&self, token: &Address) -> Result<TokenInfo, LedgerError>;

    fn balance_of(&self, token: &Address, who: &Address) -> Result<i128, LedgerError>;

    /// Cursor just past the newest transfer event of `token`
    fn transfer_log_head(&self, token: &Address) -> Result<u64, LedgerError>;

    fn transfer_events(&self, token: &Address, cursor: u64) -> Result<TransferBatch, LedgerError>;

    /// Exchange free balance: deposits minus required collateral
    fn exchange_balance(&self, who: &Address) -> Result<i128, LedgerError>;

    fn collateral(&self, who: &Address) -> Result<i128, LedgerError>;

    fn written_volume(&self, who: &Address, symbol: &str) -> Result<i128, LedgerError>;

    /// Token contract of a listed instrument
    fn option_token(&self, symbol: &str) -> Result<Option<Address>, LedgerError>;

    fn option_supply(&self, symbol: &str) -> Result<i128, LedgerError>;

    /// Keys of every listed instrument
    fn symbols(&self) -> Result<Vec<String>, LedgerError>;

    fn quote(&self, symbol: &str) -> Result<Option<Quote>, LedgerError>;

    fn pool_free_balance(&self) -> Result<i128, LedgerError>;

    fn feed_price(&self, feed: &str) -> Result<i128, LedgerError>;

    /// Annualised volatility of the feed, in the feed's raw units
    fn feed_volatility(&self, feed: &str) -> Result<i128, LedgerError>;

    fn transact(&self, call: &RemoteCall, opts: &TxOptions) -> Result<TxHandle, LedgerError>;

    /// Receipt of a submitted transaction; `None` while still pending
    fn receipt(&self, handle: &TxHandle) -> Result<Option<Receipt>, LedgerError>;

    /// Move the ledger clock forward (test networks only)
    fn increase_time(&self, seconds: u64) -> Result<(), LedgerError>;
}
