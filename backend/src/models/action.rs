//! Agent actions
//!
//! [`ActionKind`] is what the strategy draws; [`Action`] is the same choice
//! with concrete amounts attached, ready to be turned into remote calls.

use crate::core::Amount;
use crate::models::instrument::Symbol;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    DepositExchange,
    WithdrawExchange,
    Write,
    Buy,
    Sell,
    BurnToken,
    LiquidateSelf,
    RedeemToken,
    DepositPool,
    WithdrawPool,
}

impl ActionKind {
    pub const ALL: [ActionKind; 10] = [
        ActionKind::DepositExchange,
        ActionKind::WithdrawExchange,
        ActionKind::Write,
        ActionKind::Buy,
        ActionKind::Sell,
        ActionKind::BurnToken,
        ActionKind::LiquidateSelf,
        ActionKind::RedeemToken,
        ActionKind::DepositPool,
        ActionKind::WithdrawPool,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::DepositExchange => "deposit_exchange",
            ActionKind::WithdrawExchange => "withdraw_exchange",
            ActionKind::Write => "write",
            ActionKind::Buy => "buy",
            ActionKind::Sell => "sell",
            ActionKind::BurnToken => "burn_token",
            ActionKind::LiquidateSelf => "liquidate_self",
            ActionKind::RedeemToken => "redeem_token",
            ActionKind::DepositPool => "deposit_pool",
            ActionKind::WithdrawPool => "withdraw_pool",
        }
    }

    /// Trading actions move the clock by the short "active" step
    pub fn is_trade(&self) -> bool {
        matches!(self, ActionKind::Write | ActionKind::Buy | ActionKind::Sell)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown action {s:?}"))
    }
}

/// A drawn action with its planned amounts
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    DepositExchange { amount: Amount },
    WithdrawExchange { amount: Amount },
    Write { symbol: Symbol, volume: Amount },
    Buy { symbol: Symbol, price: Amount, volume: Amount },
    Sell { symbol: Symbol, price: Amount, volume: Amount },
    BurnToken { symbol: Symbol, volume: Amount },
    LiquidateSelf { symbol: Symbol },
    RedeemToken { symbol: Symbol },
    DepositPool { amount: Amount },
    WithdrawPool { shares: Amount },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::DepositExchange { .. } => ActionKind::DepositExchange,
            Action::WithdrawExchange { .. } => ActionKind::WithdrawExchange,
            Action::Write { .. } => ActionKind::Write,
            Action::Buy { .. } => ActionKind::Buy,
            Action::Sell { .. } => ActionKind::Sell,
            Action::BurnToken { .. } => ActionKind::BurnToken,
            Action::LiquidateSelf { .. } => ActionKind::LiquidateSelf,
            Action::RedeemToken { .. } => ActionKind::RedeemToken,
            Action::DepositPool { .. } => ActionKind::DepositPool,
            Action::WithdrawPool { .. } => ActionKind::WithdrawPool,
        }
    }

    pub fn symbol(&self) -> Option<&Symbol> {
        match self {
            Action::Write { symbol, .. }
            | Action::Buy { symbol, .. }
            | Action::Sell { symbol, .. }
            | Action::BurnToken { symbol, .. }
            | Action::LiquidateSelf { symbol }
            | Action::RedeemToken { symbol } => Some(symbol),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::DepositExchange { amount }
            | Action::WithdrawExchange { amount }
            | Action::DepositPool { amount } => write!(f, "{} {}", self.kind(), amount),
            Action::WithdrawPool { shares } => write!(f, "{} {} shares", self.kind(), shares),
            Action::Write { symbol, volume } | Action::BurnToken { symbol, volume } => {
                write!(f, "{} {} of {}", self.kind(), volume, symbol)
            }
            Action::Buy { symbol, price, volume } | Action::Sell { symbol, price, volume } => {
                write!(f, "{} {} of {} at {}", self.kind(), volume, symbol, price)
            }
            Action::LiquidateSelf { symbol } | Action::RedeemToken { symbol } => {
                write!(f, "{} {}", self.kind(), symbol)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_are_snake_case() {
        for kind in ActionKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_parse_round_trip() {
        for kind in ActionKind::ALL {
            assert_eq!(kind.as_str().parse::<ActionKind>().unwrap(), kind);
        }
        assert!("coupon_bid".parse::<ActionKind>().is_err());
    }

    #[test]
    fn test_only_write_buy_sell_are_trades() {
        let trades: Vec<_> = ActionKind::ALL.iter().filter(|k| k.is_trade()).collect();
        assert_eq!(trades, vec![&ActionKind::Write, &ActionKind::Buy, &ActionKind::Sell]);
    }
}
