//! Fixed-point token amounts
//!
//! Token balances must be accurate to the atomic unit. Holding them as floats
//! could turn a balance back into a raw amount slightly different from what the
//! account actually holds, and the ledger would reject the spend. `Amount`
//! keeps the raw integer units together with the number of decimals they are
//! scaled by.
//!
//! # Critical Invariants
//!
//! 1. All balance math is integer math on `raw` (no f64 round trips)
//! 2. Two amounts only combine when their `scale` matches
//! 3. Amount × Amount is not offered: the type has no `Mul<Amount>`/`Div<Amount>`
//!
//! # Example
//! ```
//! use options_sim_core::Amount;
//!
//! let a = Amount::from_tokens(5, 6).unwrap();
//! let b = Amount::parse_decimal("1.25", 6).unwrap();
//! assert_eq!(a.checked_sub(&b).unwrap().to_string(), "3.750000");
//! ```

use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Parts-per-billion resolution used when applying a float fraction.
const FRACTION_RESOLUTION: i128 = 1_000_000_000;

/// Errors from fixed-point arithmetic
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AmountError {
    #[error("Cannot combine amounts with different decimals: {left} vs {right}")]
    ScaleMismatch { left: u32, right: u32 },

    #[error("Fixed-point arithmetic overflowed")]
    Overflow,

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Invalid decimal string: {0:?}")]
    Parse(String),

    #[error("Fraction must be finite and non-negative, got {0}")]
    InvalidFraction(f64),
}

/// Exact decimal-scaled amount: `raw / 10^scale`
///
/// Equality compares raw units *and* scale, so `1.0 (scale 1)` and
/// `1.00 (scale 2)` are different values. Ordering across scales is undefined
/// (`partial_cmp` returns `None`); use [`Amount::try_cmp`] to get an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Amount {
    raw: i128,
    scale: u32,
}

fn pow10(exp: u32) -> Result<i128, AmountError> {
    10i128.checked_pow(exp).ok_or(AmountError::Overflow)
}

impl Amount {
    /// Wrap raw units reported by the ledger
    pub const fn new(raw: i128, scale: u32) -> Self {
        Self { raw, scale }
    }

    pub const fn zero(scale: u32) -> Self {
        Self { raw: 0, scale }
    }

    /// Scale a whole number of tokens up to raw units
    pub fn from_tokens(tokens: i128, scale: u32) -> Result<Self, AmountError> {
        let raw = tokens
            .checked_mul(pow10(scale)?)
            .ok_or(AmountError::Overflow)?;
        Ok(Self { raw, scale })
    }

    pub fn raw(&self) -> i128 {
        self.raw
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn is_zero(&self) -> bool {
        self.raw == 0
    }

    pub fn is_positive(&self) -> bool {
        self.raw > 0
    }

    /// Raw units for a remote call that expects `expected_scale` decimals.
    ///
    /// Every remote-call input goes through here so a balance of the wrong
    /// token can never be sent with silently wrong magnitude.
    pub fn to_raw_units(&self, expected_scale: u32) -> Result<i128, AmountError> {
        self.ensure_scale(expected_scale)?;
        Ok(self.raw)
    }

    fn ensure_scale(&self, scale: u32) -> Result<(), AmountError> {
        if self.scale != scale {
            return Err(AmountError::ScaleMismatch {
                left: self.scale,
                right: scale,
            });
        }
        Ok(())
    }

    pub fn checked_add(&self, other: &Amount) -> Result<Amount, AmountError> {
        self.ensure_scale(other.scale)?;
        let raw = self
            .raw
            .checked_add(other.raw)
            .ok_or(AmountError::Overflow)?;
        Ok(Amount::new(raw, self.scale))
    }

    pub fn checked_sub(&self, other: &Amount) -> Result<Amount, AmountError> {
        self.ensure_scale(other.scale)?;
        let raw = self
            .raw
            .checked_sub(other.raw)
            .ok_or(AmountError::Overflow)?;
        Ok(Amount::new(raw, self.scale))
    }

    /// Sum amounts that all carry `scale` decimals
    pub fn checked_sum<'a, I>(amounts: I, scale: u32) -> Result<Amount, AmountError>
    where
        I: IntoIterator<Item = &'a Amount>,
    {
        amounts
            .into_iter()
            .try_fold(Amount::zero(scale), |acc, a| acc.checked_add(a))
    }

    /// Multiply by a dimensionless integer
    pub fn mul_scalar(&self, factor: i128) -> Result<Amount, AmountError> {
        let raw = self.raw.checked_mul(factor).ok_or(AmountError::Overflow)?;
        Ok(Amount::new(raw, self.scale))
    }

    /// Divide by a dimensionless integer, truncating toward zero
    pub fn div_scalar(&self, divisor: i128) -> Result<Amount, AmountError> {
        if divisor == 0 {
            return Err(AmountError::DivisionByZero);
        }
        let raw = self
            .raw
            .checked_div(divisor)
            .ok_or(AmountError::Overflow)?;
        Ok(Amount::new(raw, self.scale))
    }

    /// Apply a dimensionless fraction (e.g. 0.07 of a balance).
    ///
    /// The fraction is rounded to parts-per-billion and applied with integer
    /// math; the result truncates toward zero.
    pub fn mul_fraction(&self, fraction: f64) -> Result<Amount, AmountError> {
        if !fraction.is_finite() || fraction < 0.0 {
            return Err(AmountError::InvalidFraction(fraction));
        }
        let ppb = (fraction * FRACTION_RESOLUTION as f64).round() as i128;
        let raw = self.raw.checked_mul(ppb).ok_or(AmountError::Overflow)? / FRACTION_RESOLUTION;
        Ok(Amount::new(raw, self.scale))
    }

    /// How much of this total to use without leaving dust behind.
    ///
    /// Takes `fraction` of the total, unless what would remain is at most one
    /// whole token, in which case the whole total is used.
    pub fn portion_dedusted(&self, fraction: f64) -> Result<Amount, AmountError> {
        let part = self.mul_fraction(fraction)?;
        let rest = self.checked_sub(&part)?;
        if rest.raw <= pow10(self.scale)? {
            Ok(*self)
        } else {
            Ok(part)
        }
    }

    /// Same value at a different number of decimals, truncating toward zero
    ///
    /// # Example
    /// ```
    /// use options_sim_core::Amount;
    ///
    /// let a = Amount::new(1_999_999, 6); // 1.999999
    /// assert_eq!(a.rescale(2).unwrap(), Amount::new(199, 2));
    /// assert_eq!(a.rescale(8).unwrap(), Amount::new(199_999_900, 8));
    /// ```
    pub fn rescale(&self, new_scale: u32) -> Result<Amount, AmountError> {
        let raw = match new_scale.cmp(&self.scale) {
            Ordering::Equal => self.raw,
            Ordering::Greater => self
                .raw
                .checked_mul(pow10(new_scale - self.scale)?)
                .ok_or(AmountError::Overflow)?,
            Ordering::Less => self.raw / pow10(self.scale - new_scale)?,
        };
        Ok(Amount::new(raw, new_scale))
    }

    /// Compare, failing on differing scales
    pub fn try_cmp(&self, other: &Amount) -> Result<Ordering, AmountError> {
        self.ensure_scale(other.scale)?;
        Ok(self.raw.cmp(&other.raw))
    }

    pub fn try_min(&self, other: &Amount) -> Result<Amount, AmountError> {
        Ok(match self.try_cmp(other)? {
            Ordering::Greater => *other,
            _ => *self,
        })
    }

    /// Notional of `self` units at a per-unit `price` (same decimals)
    pub fn value_at_price(&self, price: &Amount) -> Result<Amount, AmountError> {
        self.ensure_scale(price.scale)?;
        let raw = self
            .raw
            .checked_mul(price.raw)
            .ok_or(AmountError::Overflow)?
            / pow10(self.scale)?;
        Ok(Amount::new(raw, self.scale))
    }

    /// Units purchasable with `self` at a per-unit `price` (same decimals)
    pub fn quantity_at_price(&self, price: &Amount) -> Result<Amount, AmountError> {
        self.ensure_scale(price.scale)?;
        if price.raw == 0 {
            return Err(AmountError::DivisionByZero);
        }
        let raw = self
            .raw
            .checked_mul(pow10(self.scale)?)
            .ok_or(AmountError::Overflow)?
            / price.raw;
        Ok(Amount::new(raw, self.scale))
    }

    /// Approximate float value, for display and pricing inputs only
    pub fn to_f64(&self) -> f64 {
        self.raw as f64 / 10f64.powi(self.scale as i32)
    }

    /// Parse a human decimal string (`"12.5"`, `"-0.003"`, `"1.5e-3"`) at `scale`.
    ///
    /// Digits beyond `scale` decimals are truncated toward zero.
    pub fn parse_decimal(input: &str, scale: u32) -> Result<Amount, AmountError> {
        let bad = || AmountError::Parse(input.to_string());
        let text = input.trim();

        let (negative, unsigned) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };

        let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
            Some(pos) => {
                let exp: i64 = unsigned[pos + 1..].parse().map_err(|_| bad())?;
                (&unsigned[..pos], exp)
            }
            None => (unsigned, 0),
        };

        let (int_part, frac_part) = match mantissa.split_once('.') {
            Some((i, f)) => (i, f),
            None => (mantissa, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(bad());
        }
        if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
            return Err(bad());
        }

        let mut digits = format!("{int_part}{frac_part}");
        let shift = i64::from(scale)
            .checked_add(exponent)
            .and_then(|s| s.checked_sub(frac_part.len() as i64))
            .ok_or(AmountError::Overflow)?;
        if shift < 0 {
            let cut = shift.unsigned_abs() as usize;
            if cut >= digits.len() {
                digits.clear();
            } else {
                digits.truncate(digits.len() - cut);
            }
        }

        let mut raw: i128 = if digits.is_empty() {
            0
        } else {
            digits.parse().map_err(|_| AmountError::Overflow)?
        };
        if shift > 0 {
            let shift = u32::try_from(shift).map_err(|_| AmountError::Overflow)?;
            raw = raw.checked_mul(pow10(shift)?).ok_or(AmountError::Overflow)?;
        }
        if negative {
            raw = -raw;
        }
        Ok(Amount::new(raw, scale))
    }
}

impl PartialOrd for Amount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.scale != other.scale {
            return None;
        }
        Some(self.raw.cmp(&other.raw))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.raw < 0 { "-" } else { "" };
        let magnitude = self.raw.unsigned_abs();
        if self.scale == 0 {
            return write!(f, "{sign}{magnitude}");
        }
        let Some(base) = 10u128.checked_pow(self.scale) else {
            return write!(f, "{sign}{magnitude}e-{}", self.scale);
        };
        let width = self.scale as usize;
        write!(
            f,
            "{sign}{}.{:0width$}",
            magnitude / base,
            magnitude % base,
            width = width
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_pads_fraction() {
        assert_eq!(Amount::new(1_050_000, 6).to_string(), "1.050000");
        assert_eq!(Amount::new(-5, 2).to_string(), "-0.05");
        assert_eq!(Amount::new(42, 0).to_string(), "42");
    }

    #[test]
    fn test_parse_truncates_extra_digits() {
        let a = Amount::parse_decimal("1.23456789", 4).unwrap();
        assert_eq!(a, Amount::new(12345, 4));
    }

    #[test]
    fn test_parse_exponent() {
        assert_eq!(
            Amount::parse_decimal("1.5e-3", 6).unwrap(),
            Amount::new(1500, 6)
        );
        assert_eq!(
            Amount::parse_decimal("2E2", 2).unwrap(),
            Amount::new(20000, 2)
        );
    }

    #[test]
    fn test_parse_huge_exponent_overflows() {
        assert_eq!(
            Amount::parse_decimal("1e9223372036854775807", 6),
            Err(AmountError::Overflow)
        );
        assert_eq!(
            Amount::parse_decimal("1.25e-9223372036854775808", 0),
            Err(AmountError::Overflow)
        );
        assert_eq!(Amount::parse_decimal("1e40", 0), Err(AmountError::Overflow));
        // far below the smallest unit truncates to zero
        assert_eq!(
            Amount::parse_decimal("1e-9223372036854775800", 6).unwrap(),
            Amount::zero(6)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Amount::parse_decimal("abc", 2).is_err());
        assert!(Amount::parse_decimal(".", 2).is_err());
        assert!(Amount::parse_decimal("1.2.3", 2).is_err());
        assert!(Amount::parse_decimal("", 2).is_err());
    }

    #[test]
    fn test_partial_cmp_across_scales_is_none() {
        let a = Amount::new(1, 2);
        let b = Amount::new(1, 3);
        assert_eq!(a.partial_cmp(&b), None);
        assert!(matches!(
            a.try_cmp(&b),
            Err(AmountError::ScaleMismatch { left: 2, right: 3 })
        ));
    }

    #[test]
    fn test_portion_dedusted_takes_all_near_total() {
        let total = Amount::from_tokens(2, 2).unwrap();
        // 0.6 of 2.00 leaves 0.80 (< 1 token) so the whole total is used
        assert_eq!(total.portion_dedusted(0.6).unwrap(), total);

        let big = Amount::from_tokens(100, 2).unwrap();
        assert_eq!(
            big.portion_dedusted(0.1).unwrap(),
            Amount::from_tokens(10, 2).unwrap()
        );
    }

    #[test]
    fn test_price_conversions() {
        let volume = Amount::parse_decimal("2.5", 6).unwrap();
        let price = Amount::parse_decimal("4", 6).unwrap();
        assert_eq!(
            volume.value_at_price(&price).unwrap(),
            Amount::from_tokens(10, 6).unwrap()
        );

        let budget = Amount::from_tokens(10, 6).unwrap();
        assert_eq!(budget.quantity_at_price(&price).unwrap(), volume);
        assert_eq!(
            budget.quantity_at_price(&Amount::zero(6)),
            Err(AmountError::DivisionByZero)
        );
    }

    #[test]
    fn test_mul_fraction_rejects_negative() {
        let a = Amount::from_tokens(1, 2).unwrap();
        assert!(matches!(
            a.mul_fraction(-0.5),
            Err(AmountError::InvalidFraction(_))
        ));
    }
}
