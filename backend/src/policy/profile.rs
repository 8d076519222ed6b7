//! Configurable agent strategy
//!
//! Weights default to 1.0 per action, may be overridden per action name, and
//! get two fixed biases on top:
//! - `sell` is multiplied by `sell_urgency` while the agent holds a position
//! - with a [`Sentiment`], a spot above the agent's target boosts `sell` and
//!   `write`, a spot below it boosts `buy`

use super::{Observation, Strategy};
use crate::models::ActionKind;
use crate::rng::RngManager;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Oscillating price target
///
/// The target swings sinusoidally between `min` and `max` with a period of
/// `period_blocks`, so agents alternate between feeling the market is rich
/// and cheap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub min: f64,
    pub max: f64,
    #[serde(default = "default_period")]
    pub period_blocks: u64,
}

fn default_period() -> u64 {
    50
}

impl Sentiment {
    /// Target price at `block`
    ///
    /// # Example
    /// ```
    /// use options_sim_core::policy::Sentiment;
    ///
    /// let s = Sentiment { min: 1000.0, max: 3000.0, period_blocks: 40 };
    /// assert_eq!(s.target(0), 2000.0);
    /// assert!((s.target(10) - 3000.0).abs() < 1e-9);
    /// ```
    pub fn target(&self, block: u64) -> f64 {
        let center = (self.max + self.min) / 2.0;
        let swing = (self.max - self.min) / 2.0;
        let period = self.period_blocks.max(1) as f64;
        let phase = (block % self.period_blocks.max(1)) as f64;
        center + swing * (phase * std::f64::consts::TAU / period).sin()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyProfile {
    /// Per-action weight overrides, keyed by action name (`"buy"`, ...)
    pub weights: BTreeMap<String, f64>,
    /// Multiplier on `sell` while holding a position
    pub sell_urgency: f64,
    /// Upper bound of the random fraction of a balance committed per action
    pub commitment_max: f64,
    pub sentiment: Option<Sentiment>,
    /// Multiplier applied by sentiment
    pub sentiment_boost: f64,
}

impl Default for StrategyProfile {
    fn default() -> Self {
        Self {
            weights: BTreeMap::new(),
            sell_urgency: 10.0,
            commitment_max: 0.1,
            sentiment: None,
            sentiment_boost: 2.0,
        }
    }
}

impl StrategyProfile {
    /// Profile that only ever draws `kind` (when eligible)
    pub fn only(kind: ActionKind) -> Self {
        let weights = ActionKind::ALL
            .iter()
            .map(|k| (k.as_str().to_string(), if *k == kind { 1.0 } else { 0.0 }))
            .collect();
        Self {
            weights,
            ..Self::default()
        }
    }

    pub fn with_weight(mut self, kind: ActionKind, weight: f64) -> Self {
        self.weights.insert(kind.as_str().to_string(), weight);
        self
    }

    pub fn base_weight(&self, kind: ActionKind) -> f64 {
        self.weights.get(kind.as_str()).copied().unwrap_or(1.0)
    }
}

impl Strategy for StrategyProfile {
    fn weight(&self, kind: ActionKind, obs: &Observation) -> f64 {
        let mut weight = self.base_weight(kind);

        if kind == ActionKind::Sell && obs.holds_position() {
            weight *= self.sell_urgency;
        }

        if let Some(sentiment) = &self.sentiment {
            let target = sentiment.target(obs.block);
            let spot = obs.spot.to_f64();
            let boosted = if spot > target {
                matches!(kind, ActionKind::Sell | ActionKind::Write)
            } else if spot < target {
                kind == ActionKind::Buy
            } else {
                false
            };
            if boosted {
                weight *= self.sentiment_boost;
            }
        }

        weight
    }

    fn commitment(&self, rng: &mut RngManager) -> f64 {
        rng.next_f64() * self.commitment_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Amount;
    use crate::models::{OptionType, Symbol};
    use crate::policy::InstrumentView;

    fn observation(held: i128) -> Observation {
        let zero = Amount::zero(6);
        Observation {
            block: 0,
            now: 0,
            spot: Amount::from_tokens(2000, 6).unwrap(),
            wallet: zero,
            exchange_free: zero,
            pool_shares: zero,
            pool_free: zero,
            min_deposit: zero,
            instruments: vec![InstrumentView {
                symbol: Symbol::new("ETH/USD", Amount::from_tokens(2000, 6).unwrap(), 10, OptionType::Call),
                expired: false,
                held: Amount::new(held, 6),
                written: zero,
                quote: None,
            }],
        }
    }

    #[test]
    fn test_sell_urgency_only_when_holding() {
        let profile = StrategyProfile::default();
        assert_eq!(profile.weight(ActionKind::Sell, &observation(0)), 1.0);
        assert_eq!(profile.weight(ActionKind::Sell, &observation(5)), 10.0);
    }

    #[test]
    fn test_sentiment_boosts_by_side() {
        let profile = StrategyProfile {
            sentiment: Some(Sentiment {
                min: 1000.0,
                max: 1000.0,
                period_blocks: 50,
            }),
            ..StrategyProfile::default()
        };
        // spot 2000 above target 1000: market looks rich
        let obs = observation(0);
        assert_eq!(profile.weight(ActionKind::Write, &obs), 2.0);
        assert_eq!(profile.weight(ActionKind::Buy, &obs), 1.0);
    }

    #[test]
    fn test_only_zeroes_other_actions() {
        let profile = StrategyProfile::only(ActionKind::DepositExchange);
        assert_eq!(profile.base_weight(ActionKind::DepositExchange), 1.0);
        assert_eq!(profile.base_weight(ActionKind::Buy), 0.0);
    }

    #[test]
    fn test_commitment_bounded() {
        let profile = StrategyProfile::default();
        let mut rng = RngManager::new(5);
        for _ in 0..100 {
            let c = profile.commitment(&mut rng);
            assert!((0.0..0.1).contains(&c));
        }
    }
}
