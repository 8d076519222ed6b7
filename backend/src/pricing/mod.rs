//! Option pricing collaborator
//!
//! The pricing model is a pure function from market inputs to a price/volume
//! curve: a volume grid `x` with the pool's buy and sell price at each point.
//! Curves are parsed straight into [`Amount`]s; no float ever sits between
//! the model output and the remote call.
//!
//! Curve text format (what external models print):
//!
//! ```text
//! 0.5,1,1.5        <- volume grid
//! 102.1,103,104.2  <- buy curve
//! 98.7,97.9,96.5   <- sell curve
//! ```

mod subprocess;

pub use subprocess::SubprocessPricer;

use crate::core::{Amount, AmountError};
use crate::models::OptionType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PricingError {
    #[error("Failed to run pricing model: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Pricing model exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Malformed curve: {0}")]
    Malformed(String),

    #[error("Invalid pricing input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Amount(#[from] AmountError),
}

/// Inputs of one curve computation
#[derive(Debug, Clone, PartialEq)]
pub struct PricingInput {
    pub price: f64,
    /// Annualised volatility as a fraction (0.8 = 80%)
    pub volatility: f64,
    pub strike: f64,
    pub samples: u32,
    pub risk_free_rate: f64,
    pub months_to_expiry: f64,
    pub option_type: OptionType,
}

impl PricingInput {
    pub fn validate(&self) -> Result<(), PricingError> {
        let finite = [
            self.price,
            self.volatility,
            self.strike,
            self.risk_free_rate,
            self.months_to_expiry,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite || self.price <= 0.0 || self.strike <= 0.0 || self.volatility < 0.0 {
            return Err(PricingError::InvalidInput(format!("{self:?}")));
        }
        Ok(())
    }
}

/// Volume grid with buy and sell prices at each point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Curve {
    pub x: Vec<Amount>,
    pub buy: Vec<Amount>,
    pub sell: Vec<Amount>,
}

impl Curve {
    /// Build a curve, checking all three series have the same non-zero length
    pub fn new(x: Vec<Amount>, buy: Vec<Amount>, sell: Vec<Amount>) -> Result<Self, PricingError> {
        if x.is_empty() {
            return Err(PricingError::Malformed("empty volume grid".to_string()));
        }
        if x.len() != buy.len() || x.len() != sell.len() {
            return Err(PricingError::Malformed(format!(
                "series lengths differ: x={}, buy={}, sell={}",
                x.len(),
                buy.len(),
                sell.len()
            )));
        }
        Ok(Self { x, buy, sell })
    }

    /// Raw units of each series, checking they carry `scale` decimals
    pub fn to_raw(&self, scale: u32) -> Result<(Vec<i128>, Vec<i128>, Vec<i128>), AmountError> {
        let raw = |series: &[Amount]| -> Result<Vec<i128>, AmountError> {
            series.iter().map(|a| a.to_raw_units(scale)).collect()
        };
        Ok((raw(&self.x)?, raw(&self.buy)?, raw(&self.sell)?))
    }
}

/// Parse the three-line curve format
///
/// # Example
/// ```
/// use options_sim_core::pricing::parse_curve;
///
/// let curve = parse_curve("1,2\n10.5,11\n9.5,9\n", 2).unwrap();
/// assert_eq!(curve.buy[0].raw(), 1050);
/// assert!(parse_curve("1,2\n10.5\n9.5,9\n", 2).is_err());
/// ```
pub fn parse_curve(text: &str, scale: u32) -> Result<Curve, PricingError> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.len() < 3 {
        return Err(PricingError::Malformed(format!(
            "expected 3 lines, got {}",
            lines.len()
        )));
    }

    let series = |line: &str| -> Result<Vec<Amount>, PricingError> {
        line.split(',')
            .map(|field| {
                Amount::parse_decimal(field.trim(), scale)
                    .map_err(|_| PricingError::Malformed(format!("bad number {field:?}")))
            })
            .collect()
    };
    Curve::new(series(lines[0])?, series(lines[1])?, series(lines[2])?)
}

/// Anything that can price an instrument
pub trait PricingModel: Send + Sync {
    fn curve(&self, input: &PricingInput, scale: u32) -> Result<Curve, PricingError>;
}

/// Built-in closed-form model
///
/// Fair value is intrinsic value plus an at-the-money time value
/// (`0.4·S·σ·√T`) that decays with moneyness. The pool asks `spread` above
/// fair value and bids `spread` below it, widening by another `spread` per
/// grid step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntrinsicPricer {
    pub spread: f64,
    pub points: usize,
    pub max_volume: f64,
}

impl Default for IntrinsicPricer {
    fn default() -> Self {
        Self {
            spread: 0.02,
            points: 5,
            max_volume: 10.0,
        }
    }
}

impl IntrinsicPricer {
    fn fair_value(input: &PricingInput) -> f64 {
        let years = input.months_to_expiry / 12.0;
        let intrinsic = match input.option_type {
            OptionType::Call => (input.price - input.strike).max(0.0),
            OptionType::Put => (input.strike - input.price).max(0.0),
        };
        if years <= 0.0 || input.volatility <= 0.0 {
            return intrinsic;
        }
        let spread = input.volatility * years.sqrt();
        let moneyness = (input.price / input.strike).ln();
        let decay = (-(moneyness * moneyness) / (2.0 * spread * spread)).exp();
        let discount = (-input.risk_free_rate * years).exp();
        (intrinsic + 0.4 * input.price * spread * decay) * discount
    }
}

fn to_amount(value: f64, scale: u32) -> Result<Amount, PricingError> {
    if !value.is_finite() {
        return Err(PricingError::Malformed(format!("non-finite value {value}")));
    }
    Ok(Amount::parse_decimal(
        &format!("{:.*}", scale as usize, value.max(0.0)),
        scale,
    )?)
}

impl PricingModel for IntrinsicPricer {
    fn curve(&self, input: &PricingInput, scale: u32) -> Result<Curve, PricingError> {
        input.validate()?;
        let fair = Self::fair_value(input);
        let points = self.points.max(1);
        let step = self.max_volume / points as f64;

        let mut x = Vec::with_capacity(points);
        let mut buy = Vec::with_capacity(points);
        let mut sell = Vec::with_capacity(points);
        for i in 1..=points {
            let widen = self.spread * i as f64;
            x.push(to_amount(step * i as f64, scale)?);
            buy.push(to_amount(fair * (1.0 + widen), scale)?);
            sell.push(to_amount(fair * (1.0 - widen), scale)?);
        }
        Curve::new(x, buy, sell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(option_type: OptionType, strike: f64) -> PricingInput {
        PricingInput {
            price: 2000.0,
            volatility: 0.8,
            strike,
            samples: 100,
            risk_free_rate: 0.0,
            months_to_expiry: 1.0,
            option_type,
        }
    }

    #[test]
    fn test_parse_rejects_short_output() {
        assert!(matches!(
            parse_curve("1,2\n3,4\n", 6),
            Err(PricingError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_rejects_garbage_field() {
        assert!(parse_curve("1,x\n3,4\n5,6\n", 6).is_err());
    }

    #[test]
    fn test_parse_rejects_huge_exponent() {
        assert!(matches!(
            parse_curve("1,2\n1e9223372036854775807,4\n5,6\n", 6),
            Err(PricingError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_is_exact() {
        let curve = parse_curve(" 0.1 , 0.2 \n\n 100.123456,101\n99,98.000001\n", 6).unwrap();
        assert_eq!(curve.x[0], Amount::new(100_000, 6));
        assert_eq!(curve.buy[0], Amount::new(100_123_456, 6));
        assert_eq!(curve.sell[1], Amount::new(98_000_001, 6));
    }

    #[test]
    fn test_builtin_buy_above_sell() {
        let curve = IntrinsicPricer::default()
            .curve(&input(OptionType::Call, 2100.0), 6)
            .unwrap();
        assert_eq!(curve.x.len(), 5);
        for (b, s) in curve.buy.iter().zip(&curve.sell) {
            assert!(b > s);
        }
    }

    #[test]
    fn test_builtin_respects_intrinsic_at_expiry() {
        let mut at_expiry = input(OptionType::Put, 2500.0);
        at_expiry.months_to_expiry = 0.0;
        let pricer = IntrinsicPricer {
            spread: 0.0,
            points: 1,
            max_volume: 1.0,
        };
        let curve = pricer.curve(&at_expiry, 2).unwrap();
        assert_eq!(curve.buy[0], Amount::from_tokens(500, 2).unwrap());
    }

    #[test]
    fn test_invalid_input_rejected() {
        let mut bad = input(OptionType::Call, 2000.0);
        bad.price = f64::NAN;
        assert!(matches!(
            IntrinsicPricer::default().curve(&bad, 6),
            Err(PricingError::InvalidInput(_))
        ));
    }
}
