//! Agent strategy
//!
//! Each epoch an agent gets an [`Observation`] of everything it can see on
//! the ledger. The [`StrategyEngine`] works out which actions are possible,
//! asks the agent's [`Strategy`] how much it wants each, and makes one
//! weighted draw with the run's seeded RNG.
//!
//! # Eligibility
//!
//! | action | eligible when |
//! |---|---|
//! | `deposit_exchange` | wallet ≥ minimum deposit |
//! | `withdraw_exchange` | exchange free balance > 0 |
//! | `write` | an active instrument the free balance can collateralize ≥ 1 raw unit of |
//! | `buy` | an active quoted instrument, wallet > 0, pool free balance > 0 |
//! | `sell` | an active quoted instrument with held volume > 0 |
//! | `burn_token` | an active instrument with held and written volume |
//! | `liquidate_self` | an expired instrument with written volume |
//! | `redeem_token` | an expired instrument with held volume |
//! | `deposit_pool` | wallet ≥ minimum deposit |
//! | `withdraw_pool` | pool shares > 0 |
//!
//! Zero-weight actions never win a draw. Given the same seed and the same
//! observations, the draws are identical.
//!
//! # Example
//!
//! ```rust
//! use options_sim_core::models::ActionKind;
//! use options_sim_core::policy::{Observation, StrategyEngine, StrategyProfile};
//! use options_sim_core::{Amount, RngManager};
//!
//! let zero = Amount::zero(6);
//! let obs = Observation {
//!     block: 1,
//!     now: 0,
//!     spot: Amount::from_tokens(2000, 6).unwrap(),
//!     wallet: Amount::from_tokens(1000, 6).unwrap(),
//!     exchange_free: zero,
//!     pool_shares: zero,
//!     pool_free: zero,
//!     min_deposit: Amount::from_tokens(1, 6).unwrap(),
//!     instruments: vec![],
//! };
//!
//! let profile = StrategyProfile::only(ActionKind::DepositExchange);
//! let mut rng = RngManager::new(1);
//! assert_eq!(
//!     StrategyEngine::choose(&profile, &obs, &mut rng),
//!     Some(ActionKind::DepositExchange)
//! );
//! ```

mod profile;

pub use profile::{Sentiment, StrategyProfile};

use crate::core::Amount;
use crate::models::{ActionKind, Symbol};
use crate::rng::RngManager;

/// Pool quote in amounts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolQuote {
    pub buy_price: Amount,
    pub sell_price: Amount,
    pub max_volume: Amount,
}

/// What an agent sees of one listed instrument
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentView {
    pub symbol: Symbol,
    pub expired: bool,
    /// Option tokens the agent holds
    pub held: Amount,
    /// Volume the agent has written and not yet burnt or liquidated
    pub written: Amount,
    pub quote: Option<PoolQuote>,
}

/// Everything an agent can observe in one epoch
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub block: u64,
    pub now: u64,
    pub spot: Amount,
    pub wallet: Amount,
    pub exchange_free: Amount,
    pub pool_shares: Amount,
    pub pool_free: Amount,
    pub min_deposit: Amount,
    pub instruments: Vec<InstrumentView>,
}

impl Observation {
    pub fn active_count(&self) -> usize {
        self.instruments.iter().filter(|i| !i.expired).count()
    }

    pub fn expired_count(&self) -> usize {
        self.instruments.iter().filter(|i| i.expired).count()
    }

    /// Holds option tokens of any active instrument
    pub fn holds_position(&self) -> bool {
        self.instruments
            .iter()
            .any(|i| !i.expired && i.held.is_positive())
    }

    fn can_collateralize(&self, view: &InstrumentView) -> bool {
        view.symbol.strike().is_positive()
            && self
                .exchange_free
                .quantity_at_price(&view.symbol.strike())
                .is_ok_and(|volume| volume.is_positive())
    }

    fn fits(&self, kind: ActionKind, i: &InstrumentView) -> bool {
        match kind {
            ActionKind::Write => !i.expired && self.can_collateralize(i),
            ActionKind::Buy => {
                !i.expired
                    && i.quote.is_some()
                    && self.wallet.is_positive()
                    && self.pool_free.is_positive()
            }
            ActionKind::Sell => !i.expired && i.quote.is_some() && i.held.is_positive(),
            ActionKind::BurnToken => !i.expired && i.held.is_positive() && i.written.is_positive(),
            ActionKind::LiquidateSelf => i.expired && i.written.is_positive(),
            ActionKind::RedeemToken => i.expired && i.held.is_positive(),
            _ => false,
        }
    }

    /// Instruments `kind` could act on; empty for non-instrument actions
    pub fn candidates(&self, kind: ActionKind) -> Vec<&InstrumentView> {
        self.instruments
            .iter()
            .filter(|i| self.fits(kind, i))
            .collect()
    }

    pub fn is_eligible(&self, kind: ActionKind) -> bool {
        match kind {
            ActionKind::DepositExchange | ActionKind::DepositPool => {
                self.wallet.is_positive() && self.wallet >= self.min_deposit
            }
            ActionKind::WithdrawExchange => self.exchange_free.is_positive(),
            ActionKind::WithdrawPool => self.pool_shares.is_positive(),
            _ => !self.candidates(kind).is_empty(),
        }
    }
}

/// Decides how much an agent wants each eligible action
pub trait Strategy {
    /// Relative weight; zero or negative removes the action from the draw
    fn weight(&self, kind: ActionKind, obs: &Observation) -> f64;

    /// Fraction of the relevant balance to commit to the drawn action
    fn commitment(&self, rng: &mut RngManager) -> f64;
}

/// Eligibility plus weighted draw
pub struct StrategyEngine;

impl StrategyEngine {
    pub fn eligible(obs: &Observation) -> Vec<ActionKind> {
        ActionKind::ALL
            .into_iter()
            .filter(|kind| obs.is_eligible(*kind))
            .collect()
    }

    /// Eligible actions with a positive weight, in [`ActionKind::ALL`] order
    pub fn weighted(strategy: &dyn Strategy, obs: &Observation) -> Vec<(ActionKind, f64)> {
        Self::eligible(obs)
            .into_iter()
            .map(|kind| (kind, strategy.weight(kind, obs)))
            .filter(|(_, weight)| weight.is_finite() && *weight > 0.0)
            .collect()
    }

    /// One weighted draw; `None` when the agent cannot act
    pub fn choose(strategy: &dyn Strategy, obs: &Observation, rng: &mut RngManager) -> Option<ActionKind> {
        let options = Self::weighted(strategy, obs);
        let weights: Vec<f64> = options.iter().map(|(_, w)| *w).collect();
        rng.choose_weighted(&weights).map(|i| options[i].0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OptionType;

    fn tokens(n: i128) -> Amount {
        Amount::from_tokens(n, 6).unwrap()
    }

    fn view(expired: bool, held: i128, written: i128, quoted: bool) -> InstrumentView {
        InstrumentView {
            symbol: Symbol::new("ETH/USD", tokens(2000), 100, OptionType::Call),
            expired,
            held: tokens(held),
            written: tokens(written),
            quote: quoted.then(|| PoolQuote {
                buy_price: tokens(50),
                sell_price: tokens(45),
                max_volume: tokens(10),
            }),
        }
    }

    fn empty() -> Observation {
        Observation {
            block: 0,
            now: 0,
            spot: tokens(2000),
            wallet: tokens(0),
            exchange_free: tokens(0),
            pool_shares: tokens(0),
            pool_free: tokens(0),
            min_deposit: tokens(1),
            instruments: vec![],
        }
    }

    #[test]
    fn test_nothing_eligible_without_funds() {
        assert!(StrategyEngine::eligible(&empty()).is_empty());
    }

    #[test]
    fn test_wallet_below_minimum_cannot_deposit() {
        let mut obs = empty();
        obs.wallet = Amount::parse_decimal("0.5", 6).unwrap();
        assert!(!obs.is_eligible(ActionKind::DepositExchange));
        obs.wallet = tokens(1);
        assert!(obs.is_eligible(ActionKind::DepositExchange));
        assert!(obs.is_eligible(ActionKind::DepositPool));
    }

    #[test]
    fn test_write_needs_collateral_for_one_raw_unit() {
        let mut obs = empty();
        obs.instruments.push(view(false, 0, 0, false));
        // 2000 per unit: one raw unit (1e-6) needs 0.002
        obs.exchange_free = Amount::parse_decimal("0.001", 6).unwrap();
        assert!(!obs.is_eligible(ActionKind::Write));
        obs.exchange_free = Amount::parse_decimal("0.002", 6).unwrap();
        assert!(obs.is_eligible(ActionKind::Write));
    }

    #[test]
    fn test_expired_instruments_switch_actions() {
        let mut obs = empty();
        obs.wallet = tokens(100);
        obs.pool_free = tokens(100);
        obs.exchange_free = tokens(10_000);
        obs.instruments.push(view(true, 3, 2, true));

        let eligible = StrategyEngine::eligible(&obs);
        assert!(!eligible.contains(&ActionKind::Write));
        assert!(!eligible.contains(&ActionKind::Buy));
        assert!(!eligible.contains(&ActionKind::Sell));
        assert!(!eligible.contains(&ActionKind::BurnToken));
        assert!(eligible.contains(&ActionKind::RedeemToken));
        assert!(eligible.contains(&ActionKind::LiquidateSelf));
    }

    #[test]
    fn test_zero_weight_never_drawn() {
        let mut obs = empty();
        obs.wallet = tokens(100);
        obs.exchange_free = tokens(5);

        let profile = StrategyProfile::default().with_weight(ActionKind::WithdrawExchange, 0.0);
        let mut rng = RngManager::new(42);
        for _ in 0..200 {
            let kind = StrategyEngine::choose(&profile, &obs, &mut rng).unwrap();
            assert_ne!(kind, ActionKind::WithdrawExchange);
        }
    }

    #[test]
    fn test_same_seed_same_draws() {
        let mut obs = empty();
        obs.wallet = tokens(100);
        obs.exchange_free = tokens(5);
        obs.pool_shares = tokens(5);
        let profile = StrategyProfile::default();

        let draw = |seed| {
            let mut rng = RngManager::new(seed);
            (0..50)
                .map(|_| StrategyEngine::choose(&profile, &obs, &mut rng))
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(9), draw(9));
    }
}
