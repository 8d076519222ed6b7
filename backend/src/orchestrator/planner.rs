//! From a drawn action kind to concrete amounts and remote calls
//!
//! The strategy only says *what* to do. Planning picks the instrument (one
//! uniform draw among the eligible ones) and sizes the action as the
//! agent's commitment fraction of the balance it draws on. Planning yields
//! nothing when that size rounds down to zero.

use crate::core::{Amount, AmountError};
use crate::ledger::{Deployment, RemoteCall};
use crate::models::{Action, ActionKind, Address};
use crate::policy::{InstrumentView, Observation};
use crate::rng::RngManager;

fn positive(amount: Amount) -> Option<Amount> {
    amount.is_positive().then_some(amount)
}

fn pick<'a>(obs: &'a Observation, kind: ActionKind, rng: &mut RngManager) -> Option<&'a InstrumentView> {
    let candidates = obs.candidates(kind);
    if candidates.is_empty() {
        return None;
    }
    Some(candidates[rng.index(candidates.len())])
}

/// Size `kind` for the agent behind `obs`
///
/// `commitment` is the fraction of the relevant balance to use (see
/// [`Amount::portion_dedusted`]).
pub fn plan_action(
    kind: ActionKind,
    obs: &Observation,
    commitment: f64,
    rng: &mut RngManager,
) -> Result<Option<Action>, AmountError> {
    let action = match kind {
        ActionKind::DepositExchange => positive(obs.wallet.portion_dedusted(commitment)?)
            .map(|amount| Action::DepositExchange { amount }),

        ActionKind::WithdrawExchange => positive(obs.exchange_free.portion_dedusted(commitment)?)
            .map(|amount| Action::WithdrawExchange { amount }),

        ActionKind::Write => {
            let Some(view) = pick(obs, kind, rng) else {
                return Ok(None);
            };
            let coverable = obs.exchange_free.quantity_at_price(&view.symbol.strike())?;
            positive(coverable.portion_dedusted(commitment)?).map(|volume| Action::Write {
                symbol: view.symbol.clone(),
                volume,
            })
        }

        ActionKind::Buy => {
            let Some(view) = pick(obs, kind, rng) else {
                return Ok(None);
            };
            let Some(quote) = view.quote else {
                return Ok(None);
            };
            if !quote.buy_price.is_positive() || !view.symbol.strike().is_positive() {
                return Ok(None);
            }
            let budget = obs.wallet.portion_dedusted(commitment)?;
            let volume = budget
                .quantity_at_price(&quote.buy_price)?
                .try_min(&quote.max_volume)?
                .try_min(&obs.pool_free.quantity_at_price(&view.symbol.strike())?)?;
            positive(volume).map(|volume| Action::Buy {
                symbol: view.symbol.clone(),
                price: quote.buy_price,
                volume,
            })
        }

        ActionKind::Sell => {
            let Some(view) = pick(obs, kind, rng) else {
                return Ok(None);
            };
            let Some(quote) = view.quote else {
                return Ok(None);
            };
            positive(view.held.portion_dedusted(commitment)?).map(|volume| Action::Sell {
                symbol: view.symbol.clone(),
                price: quote.sell_price,
                volume,
            })
        }

        ActionKind::BurnToken => {
            let Some(view) = pick(obs, kind, rng) else {
                return Ok(None);
            };
            let burnable = view.held.try_min(&view.written)?;
            positive(burnable.portion_dedusted(commitment)?).map(|volume| Action::BurnToken {
                symbol: view.symbol.clone(),
                volume,
            })
        }

        ActionKind::LiquidateSelf => pick(obs, kind, rng).map(|view| Action::LiquidateSelf {
            symbol: view.symbol.clone(),
        }),

        ActionKind::RedeemToken => pick(obs, kind, rng).map(|view| Action::RedeemToken {
            symbol: view.symbol.clone(),
        }),

        ActionKind::DepositPool => positive(obs.wallet.portion_dedusted(commitment)?)
            .map(|amount| Action::DepositPool { amount }),

        ActionKind::WithdrawPool => positive(obs.pool_shares.portion_dedusted(commitment)?)
            .map(|shares| Action::WithdrawPool { shares }),
    };
    Ok(action)
}

/// Contract that must be allowed to pull the agent's stablecoin for `kind`
pub fn spender_for(kind: ActionKind, deployment: &Deployment) -> Option<&Address> {
    match kind {
        ActionKind::DepositExchange => Some(&deployment.exchange),
        ActionKind::Buy | ActionKind::DepositPool => Some(&deployment.pool),
        _ => None,
    }
}

/// Remote call for `action`, checking every amount carries `decimals`
pub fn to_remote_call(
    action: &Action,
    agent: &Address,
    deployment: &Deployment,
    decimals: u32,
) -> Result<RemoteCall, AmountError> {
    let raw = |amount: &Amount| amount.to_raw_units(decimals);
    let call = match action {
        Action::DepositExchange { amount } => RemoteCall::DepositTokens {
            to: agent.clone(),
            token: deployment.stablecoin.clone(),
            amount: raw(amount)?,
        },
        Action::WithdrawExchange { amount } => RemoteCall::Withdraw {
            amount: raw(amount)?,
        },
        Action::Write { symbol, volume } => RemoteCall::WriteOptions {
            symbol: symbol.key(),
            volume: raw(volume)?,
        },
        Action::Buy {
            symbol,
            price,
            volume,
        } => RemoteCall::Buy {
            symbol: symbol.key(),
            price: raw(price)?,
            volume: raw(volume)?,
            token: deployment.stablecoin.clone(),
        },
        Action::Sell {
            symbol,
            price,
            volume,
        } => RemoteCall::Sell {
            symbol: symbol.key(),
            price: raw(price)?,
            volume: raw(volume)?,
        },
        Action::BurnToken { symbol, volume } => RemoteCall::BurnOptions {
            symbol: symbol.key(),
            volume: raw(volume)?,
        },
        Action::LiquidateSelf { symbol } => RemoteCall::LiquidateOptions {
            symbol: symbol.key(),
        },
        Action::RedeemToken { symbol } => RemoteCall::Redeem {
            symbol: symbol.key(),
        },
        Action::DepositPool { amount } => RemoteCall::DepositPool {
            amount: raw(amount)?,
        },
        Action::WithdrawPool { shares } => RemoteCall::WithdrawPool {
            shares: raw(shares)?,
        },
    };
    Ok(call)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OptionType, Symbol};
    use crate::policy::PoolQuote;

    fn tokens(n: i128) -> Amount {
        Amount::from_tokens(n, 6).unwrap()
    }

    fn observation() -> Observation {
        Observation {
            block: 1,
            now: 1_000,
            spot: tokens(2000),
            wallet: tokens(1000),
            exchange_free: tokens(0),
            pool_shares: tokens(0),
            pool_free: tokens(100_000),
            min_deposit: tokens(1),
            instruments: vec![InstrumentView {
                symbol: Symbol::new("ETH/USD", tokens(2000), 5_000, OptionType::Call),
                expired: false,
                held: tokens(3),
                written: tokens(2),
                quote: Some(PoolQuote {
                    buy_price: tokens(100),
                    sell_price: tokens(90),
                    max_volume: tokens(10),
                }),
            }],
        }
    }

    #[test]
    fn test_deposit_uses_commitment() {
        let mut rng = RngManager::new(1);
        let action = plan_action(ActionKind::DepositExchange, &observation(), 0.1, &mut rng)
            .unwrap()
            .unwrap();
        assert_eq!(action, Action::DepositExchange { amount: tokens(100) });
    }

    #[test]
    fn test_dust_is_swept() {
        let mut obs = observation();
        obs.wallet = Amount::new(1_500_000, 6);
        let mut rng = RngManager::new(1);
        let action = plan_action(ActionKind::DepositPool, &obs, 0.1, &mut rng)
            .unwrap()
            .unwrap();
        assert_eq!(action, Action::DepositPool { amount: obs.wallet });
    }

    #[test]
    fn test_buy_capped_by_curve_volume() {
        let mut rng = RngManager::new(1);
        // the whole wallet buys exactly the curve's largest volume
        let action = plan_action(ActionKind::Buy, &observation(), 1.0, &mut rng)
            .unwrap()
            .unwrap();
        match action {
            Action::Buy { price, volume, .. } => {
                assert_eq!(price, tokens(100));
                assert_eq!(volume, tokens(10));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_burn_limited_to_written() {
        let mut rng = RngManager::new(1);
        let action = plan_action(ActionKind::BurnToken, &observation(), 1.0, &mut rng)
            .unwrap()
            .unwrap();
        assert!(matches!(action, Action::BurnToken { volume, .. } if volume == tokens(2)));
    }

    #[test]
    fn test_nothing_to_commit() {
        let mut obs = observation();
        obs.wallet = tokens(0);
        let mut rng = RngManager::new(1);
        assert_eq!(
            plan_action(ActionKind::DepositExchange, &obs, 0.5, &mut rng).unwrap(),
            None
        );
        assert_eq!(plan_action(ActionKind::Write, &obs, 0.5, &mut rng).unwrap(), None);
    }

    #[test]
    fn test_remote_call_checks_scale() {
        let deployment = Deployment {
            stablecoin: Address::from_index(10),
            exchange: Address::from_index(11),
            pool: Address::from_index(12),
            feed: "ETH/USD".to_string(),
        };
        let agent = Address::from_index(1);
        let action = Action::DepositExchange { amount: tokens(5) };

        let call = to_remote_call(&action, &agent, &deployment, 6).unwrap();
        assert_eq!(
            call,
            RemoteCall::DepositTokens {
                to: agent.clone(),
                token: deployment.stablecoin.clone(),
                amount: 5_000_000,
            }
        );
        assert!(matches!(
            to_remote_call(&action, &agent, &deployment, 18),
            Err(AmountError::ScaleMismatch { .. })
        ));
        assert_eq!(
            spender_for(ActionKind::Buy, &deployment),
            Some(&deployment.pool)
        );
        assert_eq!(spender_for(ActionKind::Sell, &deployment), None);
    }
}
